//! Row to JSON conversion.
//!
//! Query results have no static shape, so every row is converted into an ordered
//! map of column name to JSON value.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! SQLite is classified by the runtime storage class of each value rather than
//! the declared column type, since expressions have no declared type.

use crate::models::{DatabaseType, Row as JsonRow};
use serde_json::Value as JsonValue;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use std::fmt::Write as _;

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
///
/// Names are matched by their first word, so `VARCHAR(255)` and
/// `TINYINT UNSIGNED` classify like `VARCHAR` and `TINYINT`.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();
    let base = lower
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    match base {
        "decimal" | "numeric" | "dec" if db == DatabaseType::SQLite => TypeCategory::Float,
        "decimal" | "numeric" | "dec" => TypeCategory::Decimal,
        "bool" | "boolean" => TypeCategory::Boolean,
        "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "smallserial" | "bigserial" | "serial2" | "serial4"
        | "serial8" | "year" => TypeCategory::Integer,
        "float" | "float4" | "float8" | "double" | "real" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" | "bytea" => {
            TypeCategory::Binary
        }
        "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "datetime" => {
            TypeCategory::Temporal
        }
        "character" | "name" | "citext" | "clob" | "enum" | "set" => TypeCategory::Text,
        // char, varchar, bpchar, nvarchar, tinytext, longtext, ...
        other if other.ends_with("char") || other.ends_with("text") => TypeCategory::Text,
        _ => TypeCategory::Unknown,
    }
}

/// ISO 8601 duration, one signed field per component the way PostgreSQL's
/// `iso_8601` interval style prints it, e.g. `P1Y2M3DT4H5M6.5S`.
pub fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    const MICROS_PER_HOUR: i64 = 3_600_000_000;
    const MICROS_PER_MINUTE: i64 = 60_000_000;

    if months == 0 && days == 0 && microseconds == 0 {
        return "PT0S".to_string();
    }

    let mut out = String::from("P");
    if months / 12 != 0 {
        let _ = write!(out, "{}Y", months / 12);
    }
    if months % 12 != 0 {
        let _ = write!(out, "{}M", months % 12);
    }
    if days != 0 {
        let _ = write!(out, "{}D", days);
    }
    if microseconds != 0 {
        out.push('T');
        let hours = microseconds / MICROS_PER_HOUR;
        let minutes = (microseconds % MICROS_PER_HOUR) / MICROS_PER_MINUTE;
        let micros = microseconds % MICROS_PER_MINUTE;
        if hours != 0 {
            let _ = write!(out, "{}H", hours);
        }
        if minutes != 0 {
            let _ = write!(out, "{}M", minutes);
        }
        if micros != 0 {
            let sign = if micros < 0 { "-" } else { "" };
            let micros = micros.unsigned_abs();
            let fraction = format!("{:06}", micros % 1_000_000);
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                let _ = write!(out, "{}{}S", sign, micros / 1_000_000);
            } else {
                let _ = write!(out, "{}{}.{}S", sign, micros / 1_000_000, fraction);
            }
        }
    }
    out
}

/// MONEY amount in cents as a decimal string with two fraction digits.
pub fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Base64-encode binary column data.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL/NUMERIC value kept as its exact decimal string.
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
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, BoxDynError> {
        // MySQL sends DECIMAL as text in both protocols
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("numeric")
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawDecimal(value.as_str()?.to_string())),
            PgValueFormat::Binary => Ok(RawDecimal(pg_numeric_to_string(value.as_bytes()?)?)),
        }
    }
}

/// Render PostgreSQL's binary NUMERIC layout as a decimal string.
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit big endian) followed by
/// `ndigits` base-10000 digits. `weight` is the power of 10000 of the first digit.
pub fn pg_numeric_to_string(buf: &[u8]) -> Result<String, BoxDynError> {
    const NUMERIC_NEG: u16 = 0x4000;
    const NUMERIC_NAN: u16 = 0xC000;
    const NUMERIC_PINF: u16 = 0xD000;
    const NUMERIC_NINF: u16 = 0xF000;

    if buf.len() < 8 {
        return Err("NUMERIC value is shorter than its header".into());
    }
    let word = |at: usize| u16::from_be_bytes([buf[at], buf[at + 1]]);

    let ndigits = word(0) as usize;
    let weight = word(2) as i16 as i32;
    let sign = word(4);
    let dscale = word(6) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    if buf.len() < 8 + ndigits * 2 {
        return Err("NUMERIC value is shorter than its digit count".into());
    }

    let digit = |idx: i32| -> u16 {
        if idx >= 0 && (idx as usize) < ndigits {
            word(8 + idx as usize * 2)
        } else {
            0
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", digit(i));
            } else {
                let _ = write!(out, "{:04}", digit(i));
            }
        }
    }

    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", digit(i));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_row(&self) -> JsonRow;
}

impl RowToJson for PgRow {
    fn to_json_row(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_info = col.type_info();
                let category = categorize_type(type_info.name(), DatabaseType::PostgreSQL);
                let value = postgres::decode_column(self, idx, type_info, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for MySqlRow {
    fn to_json_row(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                let value = mysql::decode_column(self, idx, type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_row(&self) -> JsonRow {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let declared = col.type_info().name().to_string();
                let value = sqlite::decode_column(self, idx, &declared);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use serde_json::json;
    use sqlx::postgres::PgTypeKind;
    use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgPoint, PgTimeTz};

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_info: &PgTypeInfo,
        category: TypeCategory,
    ) -> JsonValue {
        if matches!(row.try_get_raw(idx), Ok(v) if v.is_null()) {
            return JsonValue::Null;
        }
        let value = match category {
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| encode_binary(&v)),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
            TypeCategory::Uuid => row
                .try_get::<sqlx::types::Uuid, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.to_string())),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Text => row
                .try_get::<String, _>(idx)
                .ok()
                .map(JsonValue::String)
                .or_else(|| decode_other(row, idx, type_info)),
            TypeCategory::Unknown => decode_other(row, idx, type_info),
        };

        value.unwrap_or_else(|| {
            tracing::warn!(
                column = idx,
                type_name = type_info.name(),
                "Unsupported PostgreSQL value, returning null"
            );
            JsonValue::Null
        })
    }

    fn decode_other(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> Option<JsonValue> {
        match type_info.name() {
            "INTERVAL" => {
                return row
                    .try_get::<PgInterval, _>(idx)
                    .ok()
                    .map(|v| JsonValue::String(format_interval(v.months, v.days, v.microseconds)));
            }
            "MONEY" => {
                return row
                    .try_get::<PgMoney, _>(idx)
                    .ok()
                    .map(|v| JsonValue::String(format_money(v.0)));
            }
            "POINT" => {
                return row
                    .try_get::<PgPoint, _>(idx)
                    .ok()
                    .map(|p| json!({ "x": float_value(p.x), "y": float_value(p.y) }));
            }
            "OID" => return row.try_get::<Oid, _>(idx).ok().map(|v| v.0.into()),
            _ => {}
        }

        if is_textual(type_info) {
            // Same wire format as TEXT, but String refuses the type by name
            return row
                .try_get_unchecked::<String, _>(idx)
                .ok()
                .map(JsonValue::String);
        }
        None
    }

    /// Enums, domains over text and `citext`.
    fn is_textual(type_info: &PgTypeInfo) -> bool {
        match type_info.kind() {
            PgTypeKind::Enum(_) => true,
            PgTypeKind::Domain(base) => <String as Type<sqlx::Postgres>>::compatible(base),
            _ => type_info.name().eq_ignore_ascii_case("citext"),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(v.into());
        }
        None
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_value(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_value(v as f64))
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Some(JsonValue::String(v.to_rfc3339()));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Some(JsonValue::String(
                v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            ));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        if let Ok(v) = row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(idx) {
            return Some(JsonValue::String(format!("{}{}", v.time, v.offset)));
        }
        None
    }
}

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        if matches!(row.try_get_raw(idx), Ok(v) if v.is_null()) {
            return JsonValue::Null;
        }
        let value = match category {
            TypeCategory::Decimal => row
                .try_get::<RawDecimal, _>(idx)
                .ok()
                .map(|v| JsonValue::String(v.0)),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(JsonValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => row.try_get::<JsonValue, _>(idx).ok(),
            TypeCategory::Temporal => decode_temporal(row, idx),
            TypeCategory::Text | TypeCategory::Uuid | TypeCategory::Unknown => {
                decode_text(row, idx)
            }
        };

        value.unwrap_or_else(|| {
            tracing::warn!(column = idx, type_name, "Unsupported MySQL value, returning null");
            JsonValue::Null
        })
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Some(v.into());
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Some(v.into());
        }
        row.try_get::<u64, _>(idx).ok().map(JsonValue::from)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(float_value(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| float_value(v as f64))
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        // BINARY columns that hold text are common in MySQL catalogs
        row.try_get::<Vec<u8>, _>(idx).ok().map(|bytes| {
            match String::from_utf8(bytes) {
                Ok(s) => JsonValue::String(s),
                Err(e) => encode_binary(e.as_bytes()),
            }
        })
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
            return Some(JsonValue::String(v.to_rfc3339()));
        }
        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return Some(JsonValue::String(
                v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            ));
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return Some(JsonValue::String(v.to_string()));
        }
        decode_text(row, idx)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Option<JsonValue> {
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Some(JsonValue::String(v));
        }
        decode_binary(row, idx)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, declared: &str) -> JsonValue {
        let storage = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return JsonValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(_) => return JsonValue::Null,
        };
        let declared = categorize_type(declared, DatabaseType::SQLite);

        match storage.as_str() {
            "INTEGER" | "BOOLEAN" => match row.try_get::<i64, _>(idx) {
                Ok(v) if declared == TypeCategory::Boolean => JsonValue::Bool(v != 0),
                Ok(v) => JsonValue::Number(v.into()),
                Err(_) => JsonValue::Null,
            },
            "REAL" => row
                .try_get::<f64, _>(idx)
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            _ => match row.try_get::<String, _>(idx) {
                Ok(v) if declared == TypeCategory::Json => {
                    serde_json::from_str(&v).unwrap_or(JsonValue::String(v))
                }
                Ok(v) => JsonValue::String(v),
                Err(_) => JsonValue::Null,
            },
        }
    }
}
