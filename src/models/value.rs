//! Dynamic cell values and typed conversions.
//!
//! `Value` is what a decoded column or a bound parameter holds. `FromValue`
//! turns it into a Rust type in one of two modes: a strict cast, or a lenient
//! parse of the value's text form.

use crate::error::{DbError, DbResult};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// DECIMAL kept in its exact textual form
    Decimal(String),
    String(String),
    #[serde(serialize_with = "base64_bytes::serialize")]
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Json(JsonValue),
}

impl Value {
    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the kind name of this value for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
        }
    }

    /// Text form used by the parsing conversions. `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::UInt(v) => Some(v.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Decimal(v) | Self::String(v) => Some(v.clone()),
            Self::Bytes(v) => Some(String::from_utf8_lossy(v).into_owned()),
            Self::Date(v) => Some(v.format("%Y-%m-%d").to_string()),
            Self::Time(v) => Some(v.format("%H:%M:%S%.f").to_string()),
            Self::DateTime(v) => Some(v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Self::Json(v) => Some(v.to_string()),
        }
    }

    /// Convert with the strict cast rules of `T`.
    pub fn cast<T: FromValue>(self) -> DbResult<T> {
        T::from_value(self)
    }

    /// Convert by parsing the text form with the rules of `T`.
    pub fn parse<T: FromValue>(self) -> DbResult<T> {
        T::parse_value(self)
    }

    /// Convert in the mode selected by `parse`.
    pub fn convert<T: FromValue>(self, parse: bool) -> DbResult<T> {
        if parse {
            T::parse_value(self)
        } else {
            T::from_value(self)
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

// =============================================================================
// Conversions into Value
// =============================================================================

macro_rules! value_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )+
    };
}

value_from!(Int: i8, i16, i32, i64);
value_from!(UInt: u8, u16, u32, u64);
value_from!(Bool: bool);
value_from!(String: String, &str);
value_from!(Bytes: Vec<u8>, &[u8]);
value_from!(Date: NaiveDate);
value_from!(Time: NaiveTime);
value_from!(DateTime: NaiveDateTime);
value_from!(Json: JsonValue);

/// NaN has no SQL representation and is stored as NULL.
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        if v.is_nan() { Value::Null } else { Value::Float(v) }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::from(v as f64)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::String(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Conversions out of Value
// =============================================================================

/// Conversion from a column value into a Rust type.
pub trait FromValue: Sized {
    /// Strict conversion: the value must already be of a compatible kind.
    fn from_value(value: Value) -> DbResult<Self>;

    /// Lenient conversion: parse the value's text form.
    fn parse_value(value: Value) -> DbResult<Self>;
}

fn mismatch<T>(value: &Value, target: &str) -> DbResult<T> {
    Err(DbError::conversion(format!(
        "cannot cast {} value '{}' to {}",
        value.type_name(),
        value,
        target
    )))
}

fn text_of(value: &Value, target: &str) -> DbResult<String> {
    value
        .to_text()
        .ok_or_else(|| DbError::conversion(format!("cannot parse NULL as {}", target)))
}

/// Parse a value's text form through `FromStr`.
///
/// Useful when implementing [`FromValue`] for an enum stored as text:
///
/// ```ignore
/// impl FromValue for Status {
///     fn from_value(value: Value) -> DbResult<Self> { parse_str(&value) }
///     fn parse_value(value: Value) -> DbResult<Self> { parse_str(&value) }
/// }
/// ```
pub fn parse_str<T: FromStr>(value: &Value) -> DbResult<T> {
    let target = std::any::type_name::<T>();
    let text = text_of(value, target)?;
    text.trim().parse().map_err(|_| {
        DbError::conversion(format!("cannot parse '{}' as {}", text, target))
    })
}

macro_rules! from_value_int {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> DbResult<Self> {
                    let converted = match &value {
                        Value::Int(v) => <$ty>::try_from(*v).ok(),
                        Value::UInt(v) => <$ty>::try_from(*v).ok(),
                        Value::Bool(v) => Some(<$ty>::from(*v)),
                        _ => return mismatch(&value, stringify!($ty)),
                    };
                    converted.ok_or_else(|| {
                        DbError::conversion(format!(
                            "value {} is out of range for {}",
                            value,
                            stringify!($ty)
                        ))
                    })
                }

                fn parse_value(value: Value) -> DbResult<Self> {
                    parse_str(&value)
                }
            }
        )+
    };
}

from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! from_value_float {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> DbResult<Self> {
                    match &value {
                        Value::Float(v) => Ok(*v as $ty),
                        Value::Int(v) => Ok(*v as $ty),
                        Value::UInt(v) => Ok(*v as $ty),
                        Value::Decimal(v) => v.parse().map_err(|_| {
                            DbError::conversion(format!("invalid decimal '{}'", v))
                        }),
                        _ => mismatch(&value, stringify!($ty)),
                    }
                }

                fn parse_value(value: Value) -> DbResult<Self> {
                    let text = text_of(&value, stringify!($ty))?.replace(',', ".");
                    text.trim().parse().map_err(|_| {
                        DbError::conversion(format!(
                            "cannot parse '{}' as {}",
                            text,
                            stringify!($ty)
                        ))
                    })
                }
            }
        )+
    };
}

from_value_float!(f32, f64);

impl FromValue for bool {
    fn from_value(value: Value) -> DbResult<Self> {
        match &value {
            Value::Bool(v) => Ok(*v),
            // BOOL columns are TINYINT(1) on the server
            Value::Int(0) | Value::UInt(0) => Ok(false),
            Value::Int(1) | Value::UInt(1) => Ok(true),
            _ => mismatch(&value, "bool"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        let text = text_of(&value, "bool")?;
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(DbError::conversion(format!(
                "cannot parse '{}' as bool",
                text
            ))),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::String(v) | Value::Decimal(v) => Ok(v),
            other => mismatch(&other, "String"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        text_of(&value, "String")
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::String(v) => Ok(v.into_bytes()),
            other => mismatch(&other, "Vec<u8>"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            other => text_of(&other, "Vec<u8>").map(String::into_bytes),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
];

fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| parse_date_text(text).map(|d| d.and_time(NaiveTime::MIN)))
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(text, "%d.%m.%Y"))
        .ok()
}

impl FromValue for NaiveDateTime {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::Date(v) => Ok(v.and_time(NaiveTime::MIN)),
            other => mismatch(&other, "NaiveDateTime"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        if let Value::DateTime(v) = value {
            return Ok(v);
        }
        let text = text_of(&value, "NaiveDateTime")?;
        parse_datetime_text(&text)
            .ok_or_else(|| DbError::conversion(format!("cannot parse '{}' as datetime", text)))
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Date(v) => Ok(v),
            Value::DateTime(v) => Ok(v.date()),
            other => mismatch(&other, "NaiveDate"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        if let Value::Date(v) = value {
            return Ok(v);
        }
        let text = text_of(&value, "NaiveDate")?;
        parse_date_text(&text)
            .or_else(|| parse_datetime_text(&text).map(|dt| dt.date()))
            .ok_or_else(|| DbError::conversion(format!("cannot parse '{}' as date", text)))
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Time(v) => Ok(v),
            other => mismatch(&other, "NaiveTime"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        if let Value::Time(v) = value {
            return Ok(v);
        }
        let text = text_of(&value, "NaiveTime")?;
        NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
            .map_err(|_| DbError::conversion(format!("cannot parse '{}' as time", text)))
    }
}

impl FromValue for JsonValue {
    fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::Json(v) => Ok(v),
            other => mismatch(&other, "JSON"),
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        if let Value::Json(v) = value {
            return Ok(v);
        }
        let text = text_of(&value, "JSON")?;
        serde_json::from_str(&text)
            .map_err(|e| DbError::conversion(format!("cannot parse JSON: {}", e)))
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> DbResult<Self> {
        Ok(value)
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> DbResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn parse_value(value: Value) -> DbResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::parse_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_becomes_null() {
        assert!(Value::from(f64::NAN).is_null());
        assert!(Value::from(f32::NAN).is_null());
        assert_eq!(Value::from(1.5f64), Value::Float(1.5));
    }

    #[test]
    fn test_option_into_value() {
        assert!(Value::from(None::<i32>).is_null());
        assert_eq!(Value::from(Some("x")), Value::String("x".to_string()));
    }

    #[test]
    fn test_integer_cast_checks_range() {
        assert_eq!(Value::Int(42).cast::<u8>().unwrap(), 42);
        assert_eq!(Value::UInt(7).cast::<i64>().unwrap(), 7);
        assert!(Value::Int(-1).cast::<u32>().is_err());
        assert!(Value::Int(300).cast::<i8>().is_err());
    }

    #[test]
    fn test_integer_cast_rejects_text() {
        let err = Value::String("42".to_string()).cast::<i32>().unwrap_err();
        assert!(err.to_string().contains("cannot cast string"));
    }

    #[test]
    fn test_integer_parse_accepts_text() {
        assert_eq!(Value::String(" 42 ".to_string()).parse::<i32>().unwrap(), 42);
        assert_eq!(Value::Decimal("17".to_string()).parse::<u64>().unwrap(), 17);
        assert!(Value::String("4x".to_string()).parse::<i32>().is_err());
    }

    #[test]
    fn test_float_parse_accepts_comma() {
        assert_eq!(Value::String("3,25".to_string()).parse::<f64>().unwrap(), 3.25);
        assert_eq!(Value::Decimal("10.50".to_string()).cast::<f64>().unwrap(), 10.5);
        assert_eq!(Value::Int(2).cast::<f32>().unwrap(), 2.0);
    }

    #[test]
    fn test_bool_conversions() {
        assert!(Value::Int(1).cast::<bool>().unwrap());
        assert!(!Value::UInt(0).cast::<bool>().unwrap());
        assert!(Value::Int(2).cast::<bool>().is_err());
        assert!(Value::String("TRUE".to_string()).parse::<bool>().unwrap());
        assert!(!Value::String("0".to_string()).parse::<bool>().unwrap());
        assert!(Value::String("maybe".to_string()).parse::<bool>().is_err());
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(Value::Null.cast::<Option<i32>>().unwrap(), None);
        assert_eq!(Value::Null.parse::<Option<String>>().unwrap(), None);
        assert!(Value::Null.parse::<i32>().is_err());
        assert!(Value::Null.cast::<String>().is_err());
    }

    #[test]
    fn test_datetime_parse_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        for text in ["2024-03-09 14:30:00", "2024-03-09T14:30:00", "09.03.2024 14:30:00"] {
            let parsed = Value::String(text.to_string())
                .parse::<NaiveDateTime>()
                .unwrap();
            assert_eq!(parsed, expected, "format {text}");
        }
        let midnight = Value::String("2024-03-09".to_string())
            .parse::<NaiveDateTime>()
            .unwrap();
        assert_eq!(midnight.time(), NaiveTime::MIN);
    }

    #[test]
    fn test_date_cast_from_datetime() {
        let dt = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).cast::<NaiveDate>().unwrap(),
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_parse_str_for_enums() {
        #[derive(Debug, PartialEq)]
        enum Color {
            Red,
            Blue,
        }
        impl FromStr for Color {
            type Err = ();
            fn from_str(s: &str) -> Result<Self, ()> {
                match s {
                    "red" => Ok(Color::Red),
                    "blue" => Ok(Color::Blue),
                    _ => Err(()),
                }
            }
        }
        assert_eq!(
            parse_str::<Color>(&Value::String("blue".to_string())).unwrap(),
            Color::Blue
        );
        assert!(parse_str::<Color>(&Value::String("green".to_string())).is_err());
        assert_ne!(
            parse_str::<Color>(&Value::String("red".to_string())).unwrap(),
            Color::Blue
        );
    }

    #[test]
    fn test_serialize_json() {
        let json = serde_json::to_value(vec![
            Value::Null,
            Value::Int(-3),
            Value::String("a".to_string()),
            Value::Bytes(b"hello world".to_vec()),
        ])
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!([null, -3, "a", "aGVsbG8gd29ybGQ="])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Decimal("1.10".to_string()).to_string(), "1.10");
    }
}
