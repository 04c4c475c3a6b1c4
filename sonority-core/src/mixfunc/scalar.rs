//! Portable kernels. Also used for the tails the vector kernels leave behind.

use super::{MixFn, common_len};
use crate::mix_manager::MixEntry;
use std::ops::Range;

#[inline]
pub(super) fn saturate(acc: i32) -> i32 {
    acc.clamp(i16::MIN as i32, i16::MAX as i32)
}

/// Sum `entries` into `dst` over `range`, saturating each sample.
#[inline]
pub(super) fn accumulate<'a, I>(dst: &mut [i16], entries: I, range: Range<usize>)
where
    I: IntoIterator<Item = &'a MixEntry> + Copy,
{
    for i in range {
        let mut acc = 0i32;
        for entry in entries {
            acc += i32::from(entry.samples()[i]);
        }
        dst[i] = saturate(acc) as i16;
    }
}

pub(super) fn mix_exact<const N: usize>(dst: &mut [i16], entries: &[MixEntry]) {
    let Ok(fixed) = <&[MixEntry; N]>::try_from(entries) else {
        return mix_n(dst, entries);
    };
    let len = common_len(dst, entries);
    accumulate(dst, fixed, 0..len);
}

pub(super) fn mix_n(dst: &mut [i16], entries: &[MixEntry]) {
    let len = common_len(dst, entries);
    accumulate(dst, entries, 0..len);
}

pub(super) fn table() -> Vec<MixFn> {
    arity_table!(mix_exact;
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
        17 18 19 20 21 22 23 24 25 26 27 28 29 30 31 32
        33 34 35 36 37 38 39 40 41 42 43 44 45 46 47 48
        49 50 51 52 53 54 55 56 57 58 59 60 61 62 63 64)
}
