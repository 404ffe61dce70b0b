//! Strict number parsing and formatting for HINCRBY / HINCRBYFLOAT.
//!
//! Stored values are plain byte strings. Increments only accept values that
//! round-trip exactly: `" 1"`, `"+1"` or `"01"` are not integers.

use bytes::Bytes;

/// Longest decimal representation of an i64 (`-9223372036854775808`).
const MAX_I64_DIGITS: usize = 20;

/// Parses a canonical base-10 signed 64-bit integer.
pub fn parse_i64(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || bytes.len() > MAX_I64_DIGITS {
        return None;
    }
    if bytes == b"0" {
        return Some(0);
    }

    let (negative, digits) = match bytes[0] {
        b'-' => (true, &bytes[1..]),
        _ => (false, bytes),
    };

    // No leading zeros, no empty digit run, no "-0"
    match digits.first() {
        Some(b'1'..=b'9') => {}
        _ => return None,
    }

    let mut magnitude: u64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        magnitude = magnitude
            .checked_mul(10)?
            .checked_add(u64::from(b - b'0'))?;
    }

    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return None;
        }
        Some((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).ok()
    }
}

/// Parses a finite double. Whitespace, NaN and infinities are rejected.
pub fn parse_f64(bytes: &[u8]) -> Option<f64> {
    let s = std::str::from_utf8(bytes).ok()?;
    if s.is_empty() || s.bytes().any(|b| b.is_ascii_whitespace()) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Formats an integer the way it is stored.
pub fn format_i64(value: i64) -> Bytes {
    Bytes::from(value.to_string())
}

/// Formats a float in its shortest round-trip decimal form.
///
/// Never uses an exponent and never leaves trailing zeros: `3.0` is stored as
/// `3`, `1.5` as `1.5`. Negative zero is stored as `0`.
pub fn format_f64(value: f64) -> Bytes {
    if value == 0.0 {
        return Bytes::from_static(b"0");
    }
    Bytes::from(format!("{}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_i64_accepts_canonical() {
        assert_eq!(parse_i64(b"0"), Some(0));
        assert_eq!(parse_i64(b"10"), Some(10));
        assert_eq!(parse_i64(b"-42"), Some(-42));
        assert_eq!(parse_i64(b"9223372036854775807"), Some(i64::MAX));
        assert_eq!(parse_i64(b"-9223372036854775808"), Some(i64::MIN));
    }

    #[test]
    fn test_parse_i64_rejects_non_canonical() {
        assert_eq!(parse_i64(b""), None);
        assert_eq!(parse_i64(b" 1"), None);
        assert_eq!(parse_i64(b"1 "), None);
        assert_eq!(parse_i64(b"+1"), None);
        assert_eq!(parse_i64(b"01"), None);
        assert_eq!(parse_i64(b"-0"), None);
        assert_eq!(parse_i64(b"-"), None);
        assert_eq!(parse_i64(b"1.5"), None);
        assert_eq!(parse_i64(b"abc"), None);
        assert_eq!(parse_i64(b"9223372036854775808"), None);
        assert_eq!(parse_i64(b"-9223372036854775809"), None);
        assert_eq!(parse_i64(b"123456789012345678901"), None);
    }

    #[test]
    fn test_parse_f64() {
        assert_eq!(parse_f64(b"1.5"), Some(1.5));
        assert_eq!(parse_f64(b"-3"), Some(-3.0));
        assert_eq!(parse_f64(b"1e3"), Some(1000.0));
        assert_eq!(parse_f64(b".5"), Some(0.5));

        assert_eq!(parse_f64(b""), None);
        assert_eq!(parse_f64(b" 1.5"), None);
        assert_eq!(parse_f64(b"1.5\n"), None);
        assert_eq!(parse_f64(b"inf"), None);
        assert_eq!(parse_f64(b"nan"), None);
        assert_eq!(parse_f64(b"abc"), None);
        assert_eq!(parse_f64(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_format_f64() {
        assert_eq!(format_f64(3.0), Bytes::from("3"));
        assert_eq!(format_f64(1.5), Bytes::from("1.5"));
        assert_eq!(format_f64(-0.0), Bytes::from("0"));
        assert_eq!(format_f64(-2.25), Bytes::from("-2.25"));
        assert_eq!(format_f64(1e21), Bytes::from("1000000000000000000000"));
        assert_eq!(format_f64(0.1 + 0.2), Bytes::from("0.30000000000000004"));
    }

    #[test]
    fn test_format_roundtrips() {
        for v in [0.1, 1.0 / 3.0, 123456.789, -1e-7, 5e300] {
            let formatted = format_f64(v);
            assert_eq!(parse_f64(&formatted), Some(v));
        }
    }
}
