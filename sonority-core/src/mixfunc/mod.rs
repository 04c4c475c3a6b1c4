//! Saturating 16-bit PCM summation, specialised per source count.
//!
//! A [`MixFuncTable`] holds one function per exact source count from 0 up to
//! the maximum its [`MixFamily`] supports, plus a generic function for any
//! larger count. The family is chosen once from [`CpuCaps`].

use crate::error::{Result, SonorityError};
use crate::mix_manager::MixEntry;

/// Expands to a `Vec<MixFn>` holding `$kernel::<N>` for every listed `N`.
macro_rules! arity_table {
    ($kernel:ident; $($n:literal)*) => {
        vec![$($kernel::<$n> as MixFn),*]
    };
}

#[cfg(target_arch = "x86_64")]
mod avx2;
mod cpu;
mod scalar;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod sse2;

pub use cpu::CpuCaps;

/// Largest table a caller may request.
pub const MAX_MIX_SOURCES: usize = 64;

/// A mixing kernel: sums `entries` into `dst` with i16 saturation.
pub type MixFn = fn(dst: &mut [i16], entries: &[MixEntry]);

/// Kernel family, ordered by vector width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixFamily {
    Scalar,
    Sse2,
    Avx2,
}

impl MixFamily {
    /// Widest family `caps` can run.
    pub fn select(caps: CpuCaps) -> Self {
        if caps.avx2() {
            Self::Avx2
        } else if caps.sse2() {
            Self::Sse2
        } else {
            Self::Scalar
        }
    }

    /// Largest source count this family has a specialised kernel for.
    pub fn max_arity(self) -> usize {
        match self {
            Self::Scalar => 64,
            Self::Sse2 | Self::Avx2 => 32,
        }
    }

    fn kernels(self) -> (Vec<MixFn>, MixFn) {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => (avx2::table(), avx2::mix_n),
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            Self::Sse2 => (sse2::table(), sse2::mix_n),
            _ => (scalar::table(), scalar::mix_n),
        }
    }
}

fn mix_nothing(_dst: &mut [i16], _entries: &[MixEntry]) {}

fn mix_copy(dst: &mut [i16], entries: &[MixEntry]) {
    if let Some(entry) = entries.first() {
        let len = common_len(dst, entries);
        dst[..len].copy_from_slice(&entry.samples()[..len]);
    }
}

/// Shortest length across the destination and every entry.
fn common_len(dst: &[i16], entries: &[MixEntry]) -> usize {
    entries
        .iter()
        .map(|entry| entry.samples().len())
        .fold(dst.len(), usize::min)
}

/// Dispatch table of specialised kernels indexed by source count.
#[derive(Debug, Clone)]
pub struct MixFuncTable {
    family: MixFamily,
    funcs: Vec<MixFn>,
    generic: MixFn,
}

impl MixFuncTable {
    /// Build a table with specialised kernels for counts `0..=min(size, family max)`.
    ///
    /// Fails when `size` is 0 or larger than [`MAX_MIX_SOURCES`].
    pub fn new(size: usize, caps: CpuCaps) -> Result<Self> {
        if size == 0 || size > MAX_MIX_SOURCES {
            return Err(SonorityError::InvalidConfiguration(format!(
                "Mix table size {} outside 1..={}",
                size, MAX_MIX_SOURCES
            )));
        }

        let family = MixFamily::select(caps);
        let max = size.min(family.max_arity());
        let (mut funcs, generic) = family.kernels();
        funcs.truncate(max + 1);
        funcs[0] = mix_nothing;
        funcs[1] = mix_copy;

        log::debug!(
            "Mix table: {:?} family, specialised up to {} sources",
            family,
            max
        );

        Ok(Self {
            family,
            funcs,
            generic,
        })
    }

    /// A scalar-only table of the largest size.
    pub fn scalar() -> Self {
        let (funcs, generic) = MixFamily::Scalar.kernels();
        let mut table = Self {
            family: MixFamily::Scalar,
            funcs,
            generic,
        };
        table.funcs[0] = mix_nothing;
        table.funcs[1] = mix_copy;
        table
    }

    pub fn family(&self) -> MixFamily {
        self.family
    }

    /// Largest source count with a specialised kernel.
    pub fn max_arity(&self) -> usize {
        self.funcs.len() - 1
    }

    /// Whether `count` sources are mixed by a specialised kernel rather than
    /// the generic one.
    pub fn is_specialised(&self, count: usize) -> bool {
        count < self.funcs.len()
    }

    /// Sum `entries` into `dst`. No entries leaves `dst` untouched; samples
    /// past the shortest entry are not written.
    pub fn mix(&self, dst: &mut [i16], entries: &[MixEntry]) {
        match self.funcs.get(entries.len()) {
            Some(func) => func(dst, entries),
            None => (self.generic)(dst, entries),
        }
    }

    /// Mix through the generic kernel regardless of count.
    pub fn mix_generic(&self, dst: &mut [i16], entries: &[MixEntry]) {
        if !entries.is_empty() {
            (self.generic)(dst, entries);
        }
    }
}
