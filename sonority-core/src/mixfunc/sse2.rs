//! 128-bit kernels: eight samples per step, widened to two i32x4 accumulators.

#[cfg(target_arch = "x86")]
use std::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use super::{MixFn, common_len, scalar};
use crate::mix_manager::MixEntry;

const LANES: usize = 8;

#[target_feature(enable = "sse2")]
unsafe fn mix_blocks<'a, I>(dst: &mut [i16], entries: I, len: usize)
where
    I: IntoIterator<Item = &'a MixEntry> + Copy,
{
    let blocks = len / LANES;
    unsafe {
        for block in 0..blocks {
            let offset = block * LANES;
            let mut lo = _mm_setzero_si128();
            let mut hi = _mm_setzero_si128();
            for entry in entries {
                let src = entry.samples().as_ptr().add(offset) as *const __m128i;
                let v = _mm_loadu_si128(src);
                // Duplicate each sample into a 32-bit lane, then shift down to sign-extend.
                lo = _mm_add_epi32(lo, _mm_srai_epi32(_mm_unpacklo_epi16(v, v), 16));
                hi = _mm_add_epi32(hi, _mm_srai_epi32(_mm_unpackhi_epi16(v, v), 16));
            }
            let out = dst.as_mut_ptr().add(offset) as *mut __m128i;
            _mm_storeu_si128(out, _mm_packs_epi32(lo, hi));
        }
    }
    scalar::accumulate(dst, entries, blocks * LANES..len);
}

pub(super) fn mix_exact<const N: usize>(dst: &mut [i16], entries: &[MixEntry]) {
    let Ok(fixed) = <&[MixEntry; N]>::try_from(entries) else {
        return mix_n(dst, entries);
    };
    let len = common_len(dst, entries);
    // SAFETY: this table is only installed when sse2 was detected.
    unsafe { mix_blocks(dst, fixed, len) }
}

pub(super) fn mix_n(dst: &mut [i16], entries: &[MixEntry]) {
    let len = common_len(dst, entries);
    // SAFETY: as above.
    unsafe { mix_blocks(dst, entries, len) }
}

pub(super) fn table() -> Vec<MixFn> {
    arity_table!(mix_exact;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
        17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32)
}
