//! MySQL column decoding.
//!
//! # Architecture
//!
//! Row decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the column's reported type name
//! 2. A per-category decoder extracts the cell into a [`Value`]
//!
//! NULL is detected once, before the category decoder runs.

use crate::error::{DbError, DbResult};
use crate::models::{DataTable, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    Time,
    DateTime,
    Unknown,
}

/// Classify a MySQL type name (as reported by the driver) into a category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal - check first as "numeric" would otherwise look like a number type
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    // The driver reports TINYINT(1) as BOOLEAN
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("int") || lower == "year" || lower == "bit" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower == "datetime" || lower == "timestamp" {
        return TypeCategory::DateTime;
    }
    if lower == "date" {
        return TypeCategory::Date;
    }
    if lower == "time" {
        return TypeCategory::Time;
    }

    if lower.contains("blob") || lower.contains("binary") {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Value stored for zero dates when conversion is enabled.
pub fn zero_datetime() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

/// Decode every cell of a row.
pub fn decode_row(row: &MySqlRow, convert_zero_datetime: bool) -> DbResult<Vec<Value>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let is_null = row
            .try_get_raw(idx)
            .map(|raw| raw.is_null())
            .map_err(DbError::from)?;
        if is_null {
            values.push(Value::Null);
            continue;
        }
        let category = categorize_type(type_name);
        let value = decode_column(row, idx, type_name, category, convert_zero_datetime)
            .map_err(|e| {
                DbError::conversion(format!(
                    "column '{}' ({}): {}",
                    column.name(),
                    type_name,
                    e
                ))
            })?;
        values.push(value);
    }
    Ok(values)
}

/// Decode a list of rows into a [`DataTable`].
pub fn rows_to_table(rows: &[MySqlRow], convert_zero_datetime: bool) -> DbResult<DataTable> {
    let columns = rows
        .first()
        .map(|r| {
            r.columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let mut table = DataTable::new(columns);
    for row in rows {
        table.push_row(decode_row(row, convert_zero_datetime)?)?;
    }
    Ok(table)
}

fn decode_column(
    row: &MySqlRow,
    idx: usize,
    type_name: &str,
    category: TypeCategory,
    convert_zero_datetime: bool,
) -> Result<Value, sqlx::Error> {
    match category {
        TypeCategory::Decimal => row.try_get::<RawDecimal, _>(idx).map(|v| Value::Decimal(v.0)),
        TypeCategory::Integer => decode_integer(row, idx, type_name),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).map(Value::Bytes),
        TypeCategory::Json => row.try_get::<JsonValue, _>(idx).map(Value::Json),
        TypeCategory::DateTime => match row.try_get::<NaiveDateTime, _>(idx) {
            Ok(v) => Ok(Value::DateTime(v)),
            Err(_) if convert_zero_datetime && raw_is_zero_date(row, idx) => {
                Ok(Value::DateTime(zero_datetime()))
            }
            Err(e) => Err(e),
        },
        TypeCategory::Date => match row.try_get::<NaiveDate, _>(idx) {
            Ok(v) => Ok(Value::Date(v)),
            Err(_) if convert_zero_datetime && raw_is_zero_date(row, idx) => {
                Ok(Value::Date(zero_datetime().date()))
            }
            Err(e) => Err(e),
        },
        TypeCategory::Time => row.try_get::<NaiveTime, _>(idx).map(Value::Time),
        TypeCategory::Text => row.try_get::<String, _>(idx).map(Value::String),
        TypeCategory::Unknown => decode_unknown(row, idx),
    }
}

fn raw_is_zero_date(row: &MySqlRow, idx: usize) -> bool {
    row.try_get_unchecked::<&[u8], _>(idx)
        .is_ok_and(is_zero_date)
}

/// Whether a raw DATE/DATETIME cell holds a zero date.
///
/// Text rows carry `0000-00-00...`. Binary rows carry a length byte followed
/// by year (2 bytes), month and day; a zero date has length 0 or all-zero
/// date bytes.
fn is_zero_date(raw: &[u8]) -> bool {
    if raw.starts_with(b"0000-00-00") {
        return true;
    }
    match raw.split_first() {
        Some((&len, rest)) => len as usize == rest.len() && rest.iter().take(4).all(|b| *b == 0),
        None => false,
    }
}

fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let unsigned = type_name.to_lowercase().contains("unsigned");
    if unsigned {
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Ok(Value::UInt(v));
        }
    }
    // Try signed types
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(Value::Int(v));
    }
    if let Ok(v) = row.try_get::<i32, _>(idx) {
        return Ok(Value::Int(v.into()));
    }
    if let Ok(v) = row.try_get::<i16, _>(idx) {
        return Ok(Value::Int(v.into()));
    }
    if let Ok(v) = row.try_get::<i8, _>(idx) {
        return Ok(Value::Int(v.into()));
    }
    // Try unsigned types (YEAR, BIT)
    if let Ok(v) = row.try_get::<u16, _>(idx) {
        return Ok(Value::UInt(v.into()));
    }
    row.try_get::<u64, _>(idx).map(Value::UInt)
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
    match row.try_get::<bool, _>(idx) {
        Ok(v) => Ok(Value::Bool(v)),
        Err(_) => row.try_get::<i8, _>(idx).map(|v| Value::Int(v.into())),
    }
}

fn decode_float(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(Value::from(v));
    }
    row.try_get::<f32, _>(idx).map(Value::from)
}

fn decode_unknown(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(Value::String(v));
    }
    row.try_get_unchecked::<Vec<u8>, _>(idx).map(Value::Bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("YEAR"), TypeCategory::Integer);
    }

    #[test]
    fn test_categorize_type_boolean() {
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("DECIMAL UNSIGNED"), TypeCategory::Decimal);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("DATETIME"), TypeCategory::DateTime);
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::DateTime);
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("TIME"), TypeCategory::Time);
    }

    #[test]
    fn test_categorize_type_text_and_binary() {
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("MEDIUMTEXT"), TypeCategory::Text);
        assert_eq!(categorize_type("ENUM"), TypeCategory::Text);
        assert_eq!(categorize_type("VARBINARY"), TypeCategory::Binary);
        assert_eq!(categorize_type("LONGBLOB"), TypeCategory::Binary);
        assert_eq!(categorize_type("JSON"), TypeCategory::Json);
        assert_eq!(categorize_type("GEOMETRY"), TypeCategory::Unknown);
    }

    #[test]
    fn test_is_zero_date_text() {
        assert!(is_zero_date(b"0000-00-00"));
        assert!(is_zero_date(b"0000-00-00 00:00:00"));
        assert!(!is_zero_date(b"2024-02-30 10:00:00"));
        assert!(!is_zero_date(b"not a date"));
        assert!(!is_zero_date(b""));
    }

    #[test]
    fn test_is_zero_date_binary() {
        assert!(is_zero_date(&[0]));
        assert!(is_zero_date(&[4, 0, 0, 0, 0]));
        assert!(is_zero_date(&[7, 0, 0, 0, 0, 0, 0, 0]));
        // 2024-01-15
        assert!(!is_zero_date(&[4, 0xE8, 0x07, 1, 15]));
        // Length byte that does not match the payload
        assert!(!is_zero_date(&[9, 0, 0]));
    }

    #[test]
    fn test_zero_datetime() {
        let zero = zero_datetime();
        assert_eq!(zero.to_string(), "0001-01-01 00:00:00");
    }
}
