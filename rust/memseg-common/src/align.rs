//! Power-of-two alignment arithmetic over byte addresses and offsets.

/// Rounds `n` up to the next multiple of `alignment`, or `None` if the
/// result does not fit in `u64`.
///
/// ```
/// use memseg_common::align::checked_align_up_u64;
///
/// assert_eq!(checked_align_up_u64(0, 8), Some(0));
/// assert_eq!(checked_align_up_u64(1, 8), Some(8));
/// assert_eq!(checked_align_up_u64(9, 8), Some(16));
/// assert_eq!(checked_align_up_u64(u64::MAX, 8), None);
/// ```
#[inline]
pub fn checked_align_up_u64(n: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two());
    n.checked_add(alignment - 1).map(|v| v & !(alignment - 1))
}

/// Checks whether `n` lies on an `alignment` boundary.
///
/// ```
/// use memseg_common::align::is_aligned_u64;
///
/// assert!(is_aligned_u64(0, 8));
/// assert!(!is_aligned_u64(12, 8));
/// assert!(is_aligned_u64(16, 8));
/// ```
#[inline]
pub fn is_aligned_u64(n: u64, alignment: u64) -> bool {
    debug_assert!(alignment.is_power_of_two());
    (n & (alignment - 1)) == 0
}

/// The largest power of two dividing `address`; `1 << 63` for address zero.
///
/// This is the maximal alignment any access through `address` can claim.
#[inline]
pub fn max_alignment_of(address: u64) -> u64 {
    if address == 0 {
        1 << 63
    } else {
        1 << address.trailing_zeros()
    }
}
