use arrow::datatypes::{DataType as ArrowDataType, TimeUnit};
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::LookupError;

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
pub(crate) const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
    Date32,    // days since epoch
    Timestamp, // microseconds since epoch, no timezone
    Null,
}

impl DataType {
    pub fn to_arrow(&self) -> ArrowDataType {
        match self {
            DataType::Boolean => ArrowDataType::Boolean,
            DataType::Int64 => ArrowDataType::Int64,
            DataType::Float64 => ArrowDataType::Float64,
            DataType::Utf8 => ArrowDataType::Utf8,
            DataType::Binary => ArrowDataType::Binary,
            DataType::Date32 => ArrowDataType::Date32,
            DataType::Timestamp => ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
            DataType::Null => ArrowDataType::Null,
        }
    }

    /// Map an Arrow type onto the lookup type system. Narrower integer and
    /// float widths collapse onto `Int64`/`Float64`; anything without a
    /// counterpart is carried as text.
    pub fn from_arrow(dt: &ArrowDataType) -> Self {
        match dt {
            ArrowDataType::Boolean => DataType::Boolean,
            ArrowDataType::Int8
            | ArrowDataType::Int16
            | ArrowDataType::Int32
            | ArrowDataType::Int64
            | ArrowDataType::UInt8
            | ArrowDataType::UInt16
            | ArrowDataType::UInt32
            | ArrowDataType::UInt64 => DataType::Int64,
            ArrowDataType::Float16 | ArrowDataType::Float32 | ArrowDataType::Float64 => {
                DataType::Float64
            }
            ArrowDataType::Binary | ArrowDataType::LargeBinary => DataType::Binary,
            ArrowDataType::Date32 | ArrowDataType::Date64 => DataType::Date32,
            ArrowDataType::Timestamp(_, _) => DataType::Timestamp,
            ArrowDataType::Null => DataType::Null,
            _ => DataType::Utf8,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Position used to order values of unrelated types.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            DataType::Null => 0,
            DataType::Boolean => 1,
            DataType::Int64 => 2,
            DataType::Float64 => 3,
            DataType::Date32 => 4,
            DataType::Timestamp => 5,
            DataType::Utf8 => 6,
            DataType::Binary => 7,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "Boolean",
            DataType::Int64 => "Int64",
            DataType::Float64 => "Float64",
            DataType::Utf8 => "Utf8",
            DataType::Binary => "Binary",
            DataType::Date32 => "Date32",
            DataType::Timestamp => "Timestamp",
            DataType::Null => "Null",
        };
        write!(f, "{}", name)
    }
}

/// Accepts both the type names above and the SQL-ish aliases users put in
/// step configuration (`integer`, `string`, `number`, ...).
impl FromStr for DataType {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Ok(DataType::Boolean),
            "int64" | "integer" | "int" | "bigint" => Ok(DataType::Int64),
            "float64" | "number" | "double" | "float" => Ok(DataType::Float64),
            "utf8" | "string" | "varchar" | "text" => Ok(DataType::Utf8),
            "binary" | "bytes" => Ok(DataType::Binary),
            "date32" | "date" => Ok(DataType::Date32),
            "timestamp" => Ok(DataType::Timestamp),
            "null" => Ok(DataType::Null),
            other => Err(LookupError::Configuration(format!(
                "Unknown data type '{}'",
                other
            ))),
        }
    }
}

/// A single typed cell of a row.
///
/// Floats compare and hash by their canonical bit pattern (`-0.0` folds onto
/// `0.0`, every NaN onto one NaN) so values can serve as hash keys.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Binary(Vec<u8>),
    Date32(i32),
    Timestamp(i64),
}

fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => canonical_bits(*a) == canonical_bits(*b),
            (Value::Utf8(a), Value::Utf8(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Date32(a), Value::Date32(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_type().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(v) => v.hash(state),
            Value::Int64(v) => v.hash(state),
            Value::Float64(v) => canonical_bits(*v).hash(state),
            Value::Utf8(v) => v.hash(state),
            Value::Binary(v) => v.hash(state),
            Value::Date32(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
        }
    }
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::Utf8(_) => DataType::Utf8,
            Value::Binary(_) => DataType::Binary,
            Value::Date32(_) => DataType::Date32,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(v) => write!(f, "{}", if *v { "Y" } else { "N" }),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Utf8(v) => write!(f, "{}", v),
            Value::Binary(v) => {
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Value::Date32(days) => {
                match days
                    .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                {
                    Some(date) => write!(f, "{}", date.format("%Y-%m-%d")),
                    None => write!(f, "{}", days),
                }
            }
            Value::Timestamp(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(dt) => write!(f, "{}", dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f")),
                None => write!(f, "{}", micros),
            },
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row travelling through the pipeline; positions are described by a
/// [`Schema`](crate::Schema) resolved once per run.
pub type Row = Vec<Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_float_hash_canonical() {
        let mut set = HashSet::new();
        set.insert(Value::Float64(0.0));
        assert!(set.contains(&Value::Float64(-0.0)));
        assert_eq!(Value::Float64(f64::NAN), Value::Float64(f64::NAN));
    }

    #[test]
    fn test_equality_is_typed() {
        assert_ne!(Value::Int64(1), Value::Float64(1.0));
        assert_ne!(Value::Utf8("1".into()), Value::Int64(1));
        assert_eq!(Value::Null, Value::Null);
    }

    #[test]
    fn test_data_type_parse_aliases() {
        assert_eq!("Integer".parse::<DataType>().unwrap(), DataType::Int64);
        assert_eq!("string".parse::<DataType>().unwrap(), DataType::Utf8);
        assert_eq!("Number".parse::<DataType>().unwrap(), DataType::Float64);
        assert!("decimal(10,2)".parse::<DataType>().is_err());
    }

    #[test]
    fn test_arrow_round_trip_for_narrow_ints() {
        assert_eq!(DataType::from_arrow(&ArrowDataType::Int32), DataType::Int64);
        assert_eq!(
            DataType::from_arrow(&ArrowDataType::Timestamp(TimeUnit::Second, None)),
            DataType::Timestamp
        );
        assert_eq!(DataType::from_arrow(&DataType::Date32.to_arrow()), DataType::Date32);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Date32(0).to_string(), "1970-01-01");
        assert_eq!(Value::Boolean(true).to_string(), "Y");
        assert_eq!(Value::Timestamp(1_500_000).to_string(), "1970-01-01 00:00:01.500");
        assert_eq!(Value::Binary(vec![0xab, 0x01]).to_string(), "ab01");
    }
}
