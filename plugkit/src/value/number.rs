//! Arbitrary precision numbers and narrowing adapters

use crate::error::{PlugkitError, Result};
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use std::str::FromStr;

/// Magnitudes beyond this never fit an `i64`.
const I64_MAX_MAGNITUDE: i64 = 19;
/// Magnitudes an `f64` can hold, subnormals included.
const F64_MAGNITUDES: std::ops::RangeInclusive<i64> = -323..=309;
/// Significant digits an `f64` round-trips.
const F64_DIGITS: u64 = 17;
/// Largest exponent rendered as plain digits.
const PLAIN_TEXT_SCALE: u64 = 1024;

/// Parses a decimal literal (plain or exponent form).
pub fn parse(s: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(s.trim())
        .map_err(|e| PlugkitError::DecodingError(format!("invalid number {:?}: {}", s, e)))
}

/// Converts a float using its shortest round-tripping decimal form.
pub fn from_f64(f: f64) -> Result<BigDecimal> {
    if !f.is_finite() {
        return Err(PlugkitError::DecodingError(format!(
            "{} cannot be represented as a number",
            f
        )));
    }
    parse(&format!("{}", f))
}

/// Decimal order of magnitude: the number of digits before the point,
/// negative when leading zeros follow it. Zero has magnitude 0.
///
/// Only reads the digit count and scale, so it stays cheap for any exponent.
pub fn magnitude(n: &BigDecimal) -> i64 {
    if n.is_zero() {
        return 0;
    }
    let (_, scale) = n.as_bigint_and_exponent();
    i64::try_from(n.digits())
        .unwrap_or(i64::MAX)
        .saturating_sub(scale)
}

/// Integer view of a number; fractional and out-of-range numbers have none.
pub fn to_i64(n: &BigDecimal) -> Option<i64> {
    if magnitude(n) > I64_MAX_MAGNITUDE {
        return None;
    }
    let n = n.normalized();
    let (_, scale) = n.as_bigint_and_exponent();
    if scale > 0 {
        return None;
    }
    n.with_scale(0).to_i64()
}

/// Float view of a number; `None` when the magnitude is outside `f64`.
pub fn to_f64(n: &BigDecimal) -> Option<f64> {
    if n.is_zero() {
        return Some(0.0);
    }
    if !F64_MAGNITUDES.contains(&magnitude(n)) {
        return None;
    }
    n.to_f64()
}

/// Decimal text for a number. Large exponents stay in exponent form.
pub fn to_text(n: &BigDecimal) -> String {
    let n = n.normalized();
    let (digits, scale) = n.as_bigint_and_exponent();
    if scale.unsigned_abs() <= PLAIN_TEXT_SCALE {
        n.to_string()
    } else {
        format!("{}e{}", digits, -scale)
    }
}

/// How a number is laid out on the msgpack wire without losing precision.
#[derive(Debug, Clone, PartialEq)]
pub enum WireNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Picks the narrowest lossless wire form: integer, then float, then text.
pub fn wire_form(n: &BigDecimal) -> WireNumber {
    if let Some(i) = to_i64(n) {
        return WireNumber::Int(i);
    }
    if n.normalized().digits() <= F64_DIGITS {
        if let Some(f) = to_f64(n) {
            if f.is_finite() && from_f64(f).is_ok_and(|back| back == *n) {
                return WireNumber::Float(f);
            }
        }
    }
    WireNumber::Text(to_text(n))
}

/// Failure narrowing a number into a 32-bit float.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Float32Error {
    #[error("Value {0} cannot be represented as a 32-bit floating point: out of range")]
    OutOfRange(String),
    #[error("Value {0} cannot be represented as a 32-bit floating point: below the smallest normal magnitude")]
    Subnormal(String),
}

/// Narrows a number into an `f32`.
///
/// Fails when the magnitude exceeds `f32::MAX` and when a non-zero magnitude
/// falls below `f32::MIN_POSITIVE`, where precision degrades.
pub fn to_f32(n: &BigDecimal) -> std::result::Result<f32, Float32Error> {
    let rendered = to_text(n);
    if !n.is_zero() && magnitude(n) < *F64_MAGNITUDES.start() {
        return Err(Float32Error::Subnormal(rendered));
    }
    let wide = to_f64(n).unwrap_or(f64::INFINITY);
    let magnitude = wide.abs();
    if !magnitude.is_finite() || magnitude > f64::from(f32::MAX) {
        return Err(Float32Error::OutOfRange(rendered));
    }
    if magnitude != 0.0 && magnitude < f64::from(f32::MIN_POSITIVE) {
        return Err(Float32Error::Subnormal(rendered));
    }
    Ok(wide as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_use_int_form() {
        assert_eq!(wire_form(&parse("200").unwrap()), WireNumber::Int(200));
        assert_eq!(wire_form(&parse("-7.000").unwrap()), WireNumber::Int(-7));
    }

    #[test]
    fn exact_floats_use_float_form() {
        assert_eq!(wire_form(&parse("1.5").unwrap()), WireNumber::Float(1.5));
    }

    #[test]
    fn high_precision_uses_text_form() {
        let n = parse("3.14159265358979323846264338327950288").unwrap();
        match wire_form(&n) {
            WireNumber::Text(text) => assert_eq!(parse(&text).unwrap(), n),
            other => panic!("expected text form, got {:?}", other),
        }
        let big = parse("123456789012345678901234567890").unwrap();
        assert!(matches!(wire_form(&big), WireNumber::Text(_)));
    }

    #[test]
    fn float32_narrowing_bounds() {
        assert_eq!(to_f32(&parse("1.5").unwrap()), Ok(1.5));
        assert_eq!(to_f32(&parse("0").unwrap()), Ok(0.0));
        assert!(matches!(
            to_f32(&parse("3.5e38").unwrap()),
            Err(Float32Error::OutOfRange(_))
        ));
        assert!(matches!(
            to_f32(&parse("-1e39").unwrap()),
            Err(Float32Error::OutOfRange(_))
        ));
        assert!(matches!(
            to_f32(&parse("1e-40").unwrap()),
            Err(Float32Error::Subnormal(_))
        ));
    }

    #[test]
    fn magnitude_counts_digits_before_the_point() {
        assert_eq!(magnitude(&parse("123.4").unwrap()), 3);
        assert_eq!(magnitude(&parse("0.05").unwrap()), -1);
        assert_eq!(magnitude(&parse("0").unwrap()), 0);
        assert_eq!(magnitude(&parse("1e50000000").unwrap()), 50_000_001);
    }

    #[test]
    fn integer_view_rejects_fractions_and_overflow() {
        assert_eq!(to_i64(&parse("4.000").unwrap()), Some(4));
        assert_eq!(to_i64(&parse("4.5").unwrap()), None);
        assert_eq!(to_i64(&parse("9223372036854775807").unwrap()), Some(i64::MAX));
        assert_eq!(to_i64(&parse("9223372036854775808").unwrap()), None);
    }

    #[test]
    fn huge_exponents_go_straight_to_text() {
        let start = std::time::Instant::now();
        for literal in ["1e50000000", "-7e50000000", "1e-50000000"] {
            let n = parse(literal).unwrap();
            match wire_form(&n) {
                WireNumber::Text(text) => assert_eq!(parse(&text).unwrap(), n),
                other => panic!("expected text form for {}, got {:?}", literal, other),
            }
            assert_eq!(to_i64(&n), None);
            assert_eq!(to_f64(&n), None);
        }
        assert!(matches!(
            to_f32(&parse("1e50000000").unwrap()),
            Err(Float32Error::OutOfRange(_))
        ));
        assert!(matches!(
            to_f32(&parse("1e-50000000").unwrap()),
            Err(Float32Error::Subnormal(_))
        ));
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert!(from_f64(f64::NAN).is_err());
        assert!(from_f64(f64::INFINITY).is_err());
    }
}
