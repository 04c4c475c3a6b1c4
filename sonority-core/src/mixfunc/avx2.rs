//! 256-bit kernels: sixteen samples per step.

use std::arch::x86_64::*;

use super::{MixFn, common_len, scalar};
use crate::mix_manager::MixEntry;

const LANES: usize = 16;

#[target_feature(enable = "avx2")]
unsafe fn mix_blocks<'a, I>(dst: &mut [i16], entries: I, len: usize)
where
    I: IntoIterator<Item = &'a MixEntry> + Copy,
{
    let blocks = len / LANES;
    unsafe {
        for block in 0..blocks {
            let offset = block * LANES;
            let mut lo = _mm256_setzero_si256();
            let mut hi = _mm256_setzero_si256();
            for entry in entries {
                let src = entry.samples().as_ptr().add(offset) as *const __m256i;
                let v = _mm256_loadu_si256(src);
                lo = _mm256_add_epi32(lo, _mm256_cvtepi16_epi32(_mm256_castsi256_si128(v)));
                hi = _mm256_add_epi32(hi, _mm256_cvtepi16_epi32(_mm256_extracti128_si256(v, 1)));
            }
            // packs works per 128-bit lane; reorder the 64-bit quarters back to 0,2,1,3.
            let packed = _mm256_permute4x64_epi64(_mm256_packs_epi32(lo, hi), 0xD8);
            let out = dst.as_mut_ptr().add(offset) as *mut __m256i;
            _mm256_storeu_si256(out, packed);
        }
    }
    scalar::accumulate(dst, entries, blocks * LANES..len);
}

pub(super) fn mix_exact<const N: usize>(dst: &mut [i16], entries: &[MixEntry]) {
    let Ok(fixed) = <&[MixEntry; N]>::try_from(entries) else {
        return mix_n(dst, entries);
    };
    let len = common_len(dst, entries);
    // SAFETY: this table is only installed when avx2 was detected.
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
