//! Range checks applied before values reach the sink.
//!
//! Out-of-range values become `None` (a null column) instead of wrapping.

/// Fits a 16-bit signed column.
pub fn small_int(value: i32) -> Option<i16> {
    i16::try_from(value).ok()
}

/// Fits an 8-bit unsigned column.
pub fn tiny_int(value: i32) -> Option<u8> {
    u8::try_from(value).ok()
}

/// Device sequence numbers are unsigned; the store is signed. Saturates.
pub fn sequence(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_int_bounds() {
        assert_eq!(small_int(32767), Some(32767));
        assert_eq!(small_int(-32768), Some(-32768));
        assert_eq!(small_int(32768), None);
        assert_eq!(small_int(-32769), None);
    }

    #[test]
    fn tiny_int_bounds() {
        assert_eq!(tiny_int(0), Some(0));
        assert_eq!(tiny_int(255), Some(255));
        assert_eq!(tiny_int(256), None);
        assert_eq!(tiny_int(-1), None);
    }

    #[test]
    fn sequence_saturates() {
        assert_eq!(sequence(17), 17);
        assert_eq!(sequence(u32::MAX), i32::MAX);
        assert_eq!(sequence(i32::MAX as u32 + 1), i32::MAX);
    }
}
