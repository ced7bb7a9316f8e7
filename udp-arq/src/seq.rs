//! Sequence-number space: unsigned 16-bit, modulo 2^16.
//!
//! Comparisons use serial-number arithmetic: `a` precedes `b` when the
//! wrapping distance from `a` to `b` is less than half the space.  This is
//! only meaningful while every pair of live sequence numbers is within
//! [`MAX_WINDOW`] of each other, which is why windows are capped there.

/// Largest window for which modulo-aware comparison stays unambiguous.
pub const MAX_WINDOW: usize = 1 << 15;

/// Returns `true` when sequence number `a` is strictly before `b`.
#[inline]
pub fn seq_lt(a: u16, b: u16) -> bool {
    a != b && seq_le(a, b)
}

/// Returns `true` when sequence number `a` is ≤ `b` in wrap-around space.
#[inline]
pub fn seq_le(a: u16, b: u16) -> bool {
    b.wrapping_sub(a) < (1 << 15)
}

/// Signed distance from `from` to `to`, in `[-2^15, 2^15)`.
#[inline]
pub fn seq_diff(from: u16, to: u16) -> i32 {
    i32::from(to.wrapping_sub(from) as i16)
}

/// `true` when `seq` lies in `[base, base + size)` modulo 2^16.
#[inline]
pub fn in_window(seq: u16, base: u16, size: usize) -> bool {
    (seq.wrapping_sub(base) as usize) < size
}
