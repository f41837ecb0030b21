//! Tolerant decoding of record fields.
//!
//! Device firmware is inconsistent about number formats, so a malformed field
//! never aborts a record: it is logged and replaced by the type's default.
//! Empty fields decode to the default silently.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

/// Substituted for any timestamp that cannot be parsed.
pub fn default_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1996, 1, 2)
        .and_then(|d| d.and_hms_opt(1, 2, 3))
        .unwrap_or_default()
}

const DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d"];

fn malformed<T: Default>(field: &str, kind: &'static str) -> T {
    warn!(field, kind, "malformed field, using default");
    T::default()
}

/// Integer field. A decimal value (dot after the first character) is rounded
/// half-to-even.
pub fn int(field: &str) -> i32 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }
    if field.find('.').is_some_and(|at| at > 0) {
        return match field.parse::<f64>() {
            Ok(v) if v.is_finite() => {
                let rounded = v.round_ties_even();
                if rounded >= f64::from(i32::MIN) && rounded <= f64::from(i32::MAX) {
                    rounded as i32
                } else {
                    malformed(field, "int")
                }
            }
            _ => malformed(field, "int"),
        };
    }
    field.parse().unwrap_or_else(|_| malformed(field, "int"))
}

pub fn short(field: &str) -> i16 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }
    field.parse().unwrap_or_else(|_| malformed(field, "short"))
}

pub fn byte(field: &str) -> u8 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }
    field.parse().unwrap_or_else(|_| malformed(field, "byte"))
}

pub fn double(field: &str) -> f64 {
    let field = field.trim();
    if field.is_empty() {
        return 0.0;
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => malformed(field, "double"),
    }
}

/// Up to `digits` leading characters. `None` when the cut would split a
/// character.
fn hex_prefix(field: &str, digits: usize) -> Option<&str> {
    field.get(..digits.min(field.len()))
}

/// Up to two leading hex digits of the field.
pub fn byte_hex(field: &str) -> u8 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }
    hex_prefix(field, 2)
        .and_then(|s| u8::from_str_radix(s, 16).ok())
        .unwrap_or_else(|| malformed(field, "byte_hex"))
}

/// Up to four leading hex digits of the field.
pub fn short_hex(field: &str) -> u16 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }
    hex_prefix(field, 4)
        .and_then(|s| u16::from_str_radix(s, 16).ok())
        .unwrap_or_else(|| malformed(field, "short_hex"))
}

/// Up to eight leading hex digits of the field.
pub fn int_hex(field: &str) -> u32 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }
    hex_prefix(field, 8)
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .unwrap_or_else(|| malformed(field, "int_hex"))
}

/// Day-first timestamp. Falls back to [`default_timestamp`].
pub fn datetime(field: &str) -> NaiveDateTime {
    let field = field.trim();
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(field, format) {
            return ts;
        }
    }
    for format in DATE_FORMATS {
        if let Some(ts) = NaiveDate::parse_from_str(field, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return ts;
        }
    }
    warn!(field, kind = "datetime", "malformed field, using default");
    default_timestamp()
}

pub fn swap_u16(v: u16) -> u16 {
    v.swap_bytes()
}

pub fn swap_u32(v: u32) -> u32 {
    v.swap_bytes()
}

pub fn u16_le(b0: u8, b1: u8) -> u16 {
    u16::from_le_bytes([b0, b1])
}

pub fn i16_le(b0: u8, b1: u8) -> i16 {
    i16::from_le_bytes([b0, b1])
}

pub fn u24_le(b0: u8, b1: u8, b2: u8) -> u32 {
    u32::from_le_bytes([b0, b1, b2, 0])
}

pub fn u32_le(bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(bytes)
}

pub fn i32_le(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

pub fn u64_le(bytes: [u8; 8]) -> u64 {
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_rounds_half_to_even() {
        assert_eq!(int("2.5"), 2);
        assert_eq!(int("3.5"), 4);
        assert_eq!(int("-2.5"), -2);
        assert_eq!(int("7.2"), 7);
        assert_eq!(int(" 42 "), 42);
    }

    #[test]
    fn malformed_numbers_fall_back_to_default() {
        assert_eq!(int("abc"), 0);
        assert_eq!(int(".5"), 0);
        assert_eq!(int("99999999999.0"), 0);
        assert_eq!(short("70000"), 0);
        assert_eq!(byte("-1"), 0);
        assert_eq!(double("north"), 0.0);
        assert_eq!(double("NaN"), 0.0);
        assert_eq!(int(""), 0);
    }

    #[test]
    fn hex_uses_fixed_width_prefix() {
        assert_eq!(byte_hex("1Fzz"), 0x1F);
        assert_eq!(short_hex("beef00"), 0xBEEF);
        assert_eq!(int_hex("DEADBEEF"), 0xDEAD_BEEF);
        assert_eq!(byte_hex("GG"), 0);
        assert_eq!(byte_hex(""), 0);
        // A multi-byte character straddling the prefix must not panic.
        assert_eq!(byte_hex("é"), 0);
        assert_eq!(byte_hex("1é"), 0);
    }

    #[test]
    fn short_hex_fields_use_every_digit() {
        assert_eq!(byte_hex("F"), 0x0F);
        assert_eq!(byte_hex(" 7 "), 0x07);
        assert_eq!(short_hex("FF"), 0x00FF);
        assert_eq!(short_hex("abc"), 0x0ABC);
        assert_eq!(int_hex("1"), 1);
        assert_eq!(int_hex("12345"), 0x0001_2345);
    }

    #[test]
    fn datetime_is_day_first() {
        let ts = datetime("02/01/2024 10:11:12");
        assert_eq!(ts.to_string(), "2024-01-02 10:11:12");
        assert_eq!(datetime("2024-01-02 10:11:12"), ts);
        assert_eq!(datetime("02/01/2024").to_string(), "2024-01-02 00:00:00");
    }

    #[test]
    fn bad_datetime_uses_fixed_default() {
        assert_eq!(datetime("yesterday"), default_timestamp());
        assert_eq!(default_timestamp().to_string(), "1996-01-02 01:02:03");
    }

    #[test]
    fn byte_order_helpers() {
        assert_eq!(swap_u16(0x1234), 0x3412);
        assert_eq!(swap_u32(0x1234_5678), 0x7856_3412);
        assert_eq!(u16_le(0x34, 0x12), 0x1234);
        assert_eq!(i16_le(0xFF, 0xFF), -1);
        assert_eq!(u24_le(0x56, 0x34, 0x12), 0x12_3456);
        assert_eq!(u32_le([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(i32_le([0xFE, 0xFF, 0xFF, 0xFF]), -2);
        assert_eq!(u64_le([1, 0, 0, 0, 0, 0, 0, 1]), 0x0100_0000_0000_0001);
    }
}
