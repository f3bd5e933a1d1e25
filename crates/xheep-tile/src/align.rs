//! Alignment helpers.

/// Alignment of every host buffer handed to the tile (8 bytes).
pub const BUFFER_ALIGN: usize = 8;

/// Round `value` up to the next multiple of 8.
///
/// Returns `None` if the rounded value does not fit in a `usize`.
#[must_use]
pub const fn align_up_8(value: usize) -> Option<usize> {
    align_up(value, BUFFER_ALIGN)
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[must_use]
pub const fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_eight() {
        assert_eq!(align_up_8(0), Some(0));
        assert_eq!(align_up_8(1), Some(8));
        assert_eq!(align_up_8(8), Some(8));
        assert_eq!(align_up_8(0xFA80 + 128), Some(0xFB00));
        assert_eq!(align_up_8(13), Some(16));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(align_up_8(usize::MAX), None);
    }
}
