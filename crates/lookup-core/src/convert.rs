//! Value coercion and comparison
//!
//! Conversions are pure and idempotent: converting a value that already has
//! the target type returns it unchanged, so `convert(convert(v, T), T)` is
//! always `convert(v, T)`. Format masks and locale-aware parsing are not
//! supported; strings are parsed in their canonical form only.

use crate::error::{LookupError, Result};
use crate::types::{DataType, Value, UNIX_EPOCH_DAYS_FROM_CE};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Convert `value` to `target`, failing when the value has no
/// representation in the target type.
pub fn convert(value: &Value, target: DataType) -> Result<Value> {
    let source = value.data_type();
    if source == target || value.is_null() {
        return Ok(value.clone());
    }

    let fail = || LookupError::conversion(value, source, target);

    let converted = match (value, target) {
        (Value::Utf8(s), _) if s.trim().is_empty() => Value::Null,
        (Value::Utf8(s), DataType::Int64) => {
            Value::Int64(s.trim().parse::<i64>().map_err(|_| fail())?)
        }
        (Value::Utf8(s), DataType::Float64) => {
            Value::Float64(s.trim().parse::<f64>().map_err(|_| fail())?)
        }
        (Value::Utf8(s), DataType::Boolean) => {
            Value::Boolean(parse_bool(s.trim()).ok_or_else(fail)?)
        }
        (Value::Utf8(s), DataType::Date32) => Value::Date32(parse_date(s.trim()).ok_or_else(fail)?),
        (Value::Utf8(s), DataType::Timestamp) => {
            Value::Timestamp(parse_timestamp(s.trim()).ok_or_else(fail)?)
        }
        (Value::Utf8(s), DataType::Binary) => Value::Binary(s.as_bytes().to_vec()),

        (Value::Binary(b), DataType::Utf8) => {
            Value::Utf8(String::from_utf8(b.clone()).map_err(|_| fail())?)
        }

        (_, DataType::Utf8) => Value::Utf8(value.to_string()),

        (Value::Boolean(b), DataType::Int64) => Value::Int64(i64::from(*b)),
        (Value::Boolean(b), DataType::Float64) => Value::Float64(if *b { 1.0 } else { 0.0 }),

        (Value::Int64(i), DataType::Float64) => Value::Float64(*i as f64),
        (Value::Int64(i), DataType::Boolean) => Value::Boolean(*i != 0),
        (Value::Int64(i), DataType::Date32) => {
            Value::Date32(i32::try_from(*i).map_err(|_| fail())?)
        }
        (Value::Int64(i), DataType::Timestamp) => Value::Timestamp(*i),

        (Value::Float64(f), DataType::Int64) => Value::Int64(float_to_int(*f).ok_or_else(fail)?),
        (Value::Float64(f), DataType::Boolean) => Value::Boolean(*f != 0.0),

        (Value::Date32(d), DataType::Int64) => Value::Int64(i64::from(*d)),
        (Value::Date32(d), DataType::Float64) => Value::Float64(f64::from(*d)),
        (Value::Date32(d), DataType::Timestamp) => Value::Timestamp(
            i64::from(*d)
                .checked_mul(MICROS_PER_DAY)
                .ok_or_else(fail)?,
        ),

        (Value::Timestamp(t), DataType::Int64) => Value::Int64(*t),
        (Value::Timestamp(t), DataType::Float64) => Value::Float64(*t as f64),
        (Value::Timestamp(t), DataType::Date32) => {
            Value::Date32(i32::try_from(t.div_euclid(MICROS_PER_DAY)).map_err(|_| fail())?)
        }

        _ => return Err(fail()),
    };

    Ok(converted)
}

/// Convert every value to the type at the same position.
pub fn convert_all(values: &[Value], types: &[DataType]) -> Result<Vec<Value>> {
    values
        .iter()
        .zip(types)
        .map(|(value, ty)| convert(value, *ty))
        .collect()
}

/// Parse a configuration literal (e.g. a default value) as `target`.
pub fn parse_literal(literal: &str, target: DataType) -> Result<Value> {
    convert(&Value::Utf8(literal.to_string()), target)
}

pub fn is_null(value: &Value) -> bool {
    value.is_null()
}

/// Total order over values.
///
/// Nulls sort first and are equal to each other. Integers and floats compare
/// numerically. For other mixed types the right operand is converted to the
/// left operand's type; if that is impossible the types' fixed rank decides.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Float64(x), Value::Float64(y)) => x.total_cmp(y),
        (Value::Int64(x), Value::Float64(y)) => (*x as f64).total_cmp(y),
        (Value::Float64(x), Value::Int64(y)) => x.total_cmp(&(*y as f64)),
        (Value::Utf8(x), Value::Utf8(y)) => x.cmp(y),
        (Value::Binary(x), Value::Binary(y)) => x.cmp(y),
        (Value::Date32(x), Value::Date32(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        _ => match convert(b, a.data_type()) {
            Ok(converted) if !converted.is_null() => compare(a, &converted),
            _ => a.data_type().rank().cmp(&b.data_type().rank()),
        },
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_uppercase().as_str() {
        "Y" | "YES" | "TRUE" | "1" => Some(true),
        "N" | "NO" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    Some(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

fn parse_timestamp(s: &str) -> Option<i64> {
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts.and_utc().timestamp_micros());
        }
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.timestamp_micros());
    }
    parse_date(s).map(|days| i64::from(days) * MICROS_PER_DAY)
}

fn float_to_int(f: f64) -> Option<i64> {
    let rounded = f.round();
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return None;
    }
    Some(rounded as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_numbers() {
        assert_eq!(
            convert(&Value::from("123"), DataType::Int64).unwrap(),
            Value::Int64(123)
        );
        assert_eq!(
            convert(&Value::from(" 1.5 "), DataType::Float64).unwrap(),
            Value::Float64(1.5)
        );
        assert!(matches!(
            convert(&Value::from("abc"), DataType::Int64),
            Err(LookupError::Conversion { .. })
        ));
    }

    #[test]
    fn test_empty_string_is_null_for_non_strings() {
        assert_eq!(
            convert(&Value::from("  "), DataType::Int64).unwrap(),
            Value::Null
        );
        assert_eq!(
            convert(&Value::from(""), DataType::Utf8).unwrap(),
            Value::from("")
        );
    }

    #[test]
    fn test_null_converts_to_anything() {
        for ty in [DataType::Int64, DataType::Utf8, DataType::Date32] {
            assert_eq!(convert(&Value::Null, ty).unwrap(), Value::Null);
        }
    }

    #[test]
    fn test_float_to_int_rounds() {
        assert_eq!(
            convert(&Value::Float64(2.5), DataType::Int64).unwrap(),
            Value::Int64(3)
        );
        assert_eq!(
            convert(&Value::Float64(-2.4), DataType::Int64).unwrap(),
            Value::Int64(-2)
        );
        assert!(convert(&Value::Float64(f64::INFINITY), DataType::Int64).is_err());
    }

    #[test]
    fn test_booleans() {
        assert_eq!(
            convert(&Value::from("yes"), DataType::Boolean).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            convert(&Value::Boolean(false), DataType::Utf8).unwrap(),
            Value::from("N")
        );
        assert!(convert(&Value::from("maybe"), DataType::Boolean).is_err());
    }

    #[test]
    fn test_dates_and_timestamps() {
        let date = convert(&Value::from("1970-01-02"), DataType::Date32).unwrap();
        assert_eq!(date, Value::Date32(1));
        assert_eq!(
            convert(&date, DataType::Timestamp).unwrap(),
            Value::Timestamp(MICROS_PER_DAY)
        );
        assert_eq!(
            convert(&Value::from("1970-01-01 00:00:01.5"), DataType::Timestamp).unwrap(),
            Value::Timestamp(1_500_000)
        );
        assert_eq!(
            convert(&Value::Timestamp(-1), DataType::Date32).unwrap(),
            Value::Date32(-1)
        );
    }

    #[test]
    fn test_conversion_idempotence() {
        let samples = vec![
            Value::from("42"),
            Value::from("3.25"),
            Value::from("Y"),
            Value::from("2024-02-29"),
            Value::Int64(7),
            Value::Float64(-0.5),
            Value::Boolean(true),
            Value::Date32(19_000),
            Value::Timestamp(1_700_000_000_000_000),
            Value::Null,
        ];
        let targets = [
            DataType::Int64,
            DataType::Float64,
            DataType::Utf8,
            DataType::Boolean,
            DataType::Date32,
            DataType::Timestamp,
        ];

        for value in &samples {
            for target in targets {
                if let Ok(once) = convert(value, target) {
                    let twice = convert(&once, target).unwrap();
                    assert_eq!(once, twice, "{:?} -> {}", value, target);
                }
            }
        }
    }

    #[test]
    fn test_string_round_trip_through_utf8() {
        let f = Value::Float64(1.0);
        let s = convert(&f, DataType::Utf8).unwrap();
        assert_eq!(convert(&s, DataType::Float64).unwrap(), f);
    }

    #[test]
    fn test_compare_nulls_first() {
        assert_eq!(compare(&Value::Null, &Value::Int64(1)), Ordering::Less);
        assert_eq!(compare(&Value::Int64(1), &Value::Null), Ordering::Greater);
        assert_eq!(compare(&Value::Null, &Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_compare_mixed_types() {
        assert_eq!(compare(&Value::Int64(2), &Value::Float64(2.0)), Ordering::Equal);
        assert_eq!(compare(&Value::Int64(10), &Value::from("9")), Ordering::Greater);
        assert_eq!(compare(&Value::Int64(1), &Value::from("x")), Ordering::Less);
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(
            parse_literal("-1", DataType::Int64).unwrap(),
            Value::Int64(-1)
        );
        assert_eq!(
            parse_literal("unknown", DataType::Utf8).unwrap(),
            Value::from("unknown")
        );
    }
}
