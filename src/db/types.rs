//! Row-to-JSON normalization.
//!
//! Values coming back from any backend are normalized to a small set of JSON
//! shapes: integers, floats, text, booleans, null, base64 binary, and
//! ISO-8601 date/time strings. Decoding is driven by the logical type mapped
//! from the backend-native column type, so the caller sees one type system
//! regardless of backend.

use crate::dialect::logical_type_from_native;
use crate::models::{ColumnMetadata, LogicalType};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Encode binary column data as base64 text.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// DECIMAL/NUMERIC fetched as its exact textual representation.
///
/// Decoding into f64 would silently lose precision, so the raw string the
/// backend sends is kept as-is and surfaced as JSON text.
#[derive(Debug)]
struct DecimalText(String);

impl Type<sqlx::MySql> for DecimalText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for DecimalText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for DecimalText {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for DecimalText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

/// Conversion of driver rows into normalized JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
}

macro_rules! impl_sqlx_row_to_json {
    ($row:ty, $decode:path) => {
        impl RowToJson for $row {
            fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let native = col.type_info().name();
                        let value = $decode(self, idx, native, logical_type_from_native(native));
                        (col.name().to_string(), value)
                    })
                    .collect()
            }

            fn column_metadata(&self) -> Vec<ColumnMetadata> {
                self.columns()
                    .iter()
                    .map(|col| {
                        ColumnMetadata::new(
                            col.name(),
                            col.type_info().name(),
                            !col.type_info().is_null(),
                        )
                    })
                    .collect()
            }
        }
    };
}

impl_sqlx_row_to_json!(SqliteRow, sqlite::decode_column);
impl_sqlx_row_to_json!(PgRow, postgres::decode_column);
impl_sqlx_row_to_json!(MySqlRow, mysql::decode_column);

mod sqlite {
    use super::*;

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        native: &str,
        logical: LogicalType,
    ) -> JsonValue {
        match logical {
            LogicalType::Integer | LogicalType::BigInt => row
                .try_get::<Option<i64>, _>(idx)
                .ok()
                .flatten()
                .map(|v| JsonValue::Number(v.into()))
                .unwrap_or(JsonValue::Null),
            LogicalType::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            LogicalType::Real | LogicalType::Decimal => row
                .try_get::<Option<f64>, _>(idx)
                .ok()
                .flatten()
                .map(float_value)
                .unwrap_or(JsonValue::Null),
            LogicalType::Blob => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            _ => decode_text(row, idx, native),
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize, native: &str) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            if native.to_lowercase().contains("json") {
                if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                    return json;
                }
            }
            return JsonValue::String(v);
        }
        // Dynamic typing: a TEXT-declared column can still hold a number
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        JsonValue::Null
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        native: &str,
        logical: LogicalType,
    ) -> JsonValue {
        match logical {
            LogicalType::Integer | LogicalType::BigInt => decode_integer(row, idx),
            LogicalType::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            LogicalType::Real => decode_float(row, idx),
            LogicalType::Decimal => match row.try_get::<Option<DecimalText>, _>(idx) {
                Ok(Some(v)) => JsonValue::String(v.0),
                _ => JsonValue::Null,
            },
            LogicalType::Blob => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            LogicalType::Date => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(JsonValue::Null),
            LogicalType::DateTime => decode_datetime(row, idx),
            LogicalType::Text => decode_text(row, idx, native),
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_datetime(row: &PgRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
        JsonValue::Null
    }

    fn decode_text(row: &PgRow, idx: usize, native: &str) -> JsonValue {
        let lower = native.to_lowercase();
        if lower == "json" || lower == "jsonb" {
            if let Ok(Some(v)) = row.try_get::<Option<JsonValue>, _>(idx) {
                return v;
            }
        }
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return JsonValue::String(v.format("%H:%M:%S%.f").to_string());
        }
        JsonValue::Null
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        native: &str,
        logical: LogicalType,
    ) -> JsonValue {
        match logical {
            LogicalType::Integer | LogicalType::BigInt => decode_integer(row, idx),
            LogicalType::Boolean => row
                .try_get::<Option<bool>, _>(idx)
                .ok()
                .flatten()
                .map(JsonValue::Bool)
                .unwrap_or(JsonValue::Null),
            LogicalType::Real => {
                if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
                    float_value(v)
                } else if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
                    float_value(v as f64)
                } else {
                    JsonValue::Null
                }
            }
            LogicalType::Decimal => match row.try_get::<Option<DecimalText>, _>(idx) {
                Ok(Some(v)) => JsonValue::String(v.0),
                _ => JsonValue::Null,
            },
            LogicalType::Blob => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .ok()
                .flatten()
                .map(|v| encode_binary(&v))
                .unwrap_or(JsonValue::Null),
            LogicalType::Date => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .ok()
                .flatten()
                .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(JsonValue::Null),
            LogicalType::DateTime => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .ok()
                .flatten()
                .map(|v| JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                .unwrap_or(JsonValue::Null),
            LogicalType::Text => decode_text(row, idx, native),
        }
    }

    // MySQL integer columns decode strictly by width and signedness
    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_text(row: &MySqlRow, idx: usize, native: &str) -> JsonValue {
        let lower = native.to_lowercase();
        if lower.contains("json") {
            if let Ok(Some(v)) = row.try_get::<Option<JsonValue>, _>(idx) {
                return v;
            }
        }
        row.try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    }
}

// =============================================================================
// SQL Server
// =============================================================================

/// Convert a tiberius row to a normalized JSON map.
///
/// Date/time cells go through chrono getters; everything else converts
/// directly from the wire representation.
pub fn mssql_row_to_json(row: &tiberius::Row) -> serde_json::Map<String, JsonValue> {
    use tiberius::ColumnData;

    row.cells()
        .enumerate()
        .map(|(i, (col, data))| {
            let value = match data {
                ColumnData::DateTime(Some(_))
                | ColumnData::SmallDateTime(Some(_))
                | ColumnData::DateTime2(Some(_)) => row
                    .try_get::<chrono::NaiveDateTime, _>(i)
                    .ok()
                    .flatten()
                    .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                    .unwrap_or(JsonValue::Null),
                ColumnData::DateTimeOffset(Some(_)) => row
                    .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                    .ok()
                    .flatten()
                    .map(|dt| JsonValue::String(dt.to_rfc3339()))
                    .unwrap_or(JsonValue::Null),
                ColumnData::Date(Some(_)) => row
                    .try_get::<chrono::NaiveDate, _>(i)
                    .ok()
                    .flatten()
                    .map(|d| JsonValue::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(JsonValue::Null),
                ColumnData::Time(Some(_)) => row
                    .try_get::<chrono::NaiveTime, _>(i)
                    .ok()
                    .flatten()
                    .map(|t| JsonValue::String(t.format("%H:%M:%S%.f").to_string()))
                    .unwrap_or(JsonValue::Null),
                other => mssql_column_data_to_json(other),
            };
            (col.name().to_string(), value)
        })
        .collect()
}

fn mssql_column_data_to_json(data: &tiberius::ColumnData<'_>) -> JsonValue {
    use tiberius::ColumnData;

    match data {
        ColumnData::Bit(Some(b)) => JsonValue::Bool(*b),
        ColumnData::U8(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::I16(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::I32(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::I64(Some(v)) => JsonValue::Number((*v).into()),
        ColumnData::F32(Some(v)) => float_value(*v as f64),
        ColumnData::F64(Some(v)) => float_value(*v),
        ColumnData::Numeric(Some(n)) => {
            float_value(n.value() as f64 / 10f64.powi(n.scale() as i32))
        }
        ColumnData::String(Some(s)) => JsonValue::String(s.to_string()),
        ColumnData::Guid(Some(g)) => JsonValue::String(g.to_string()),
        ColumnData::Binary(Some(b)) => encode_binary(b),
        ColumnData::Xml(Some(xml)) => JsonValue::String(xml.to_string()),
        _ => JsonValue::Null,
    }
}

/// Extract column metadata from tiberius result columns.
pub fn mssql_column_metadata(columns: &[tiberius::Column]) -> Vec<ColumnMetadata> {
    columns
        .iter()
        .map(|col| ColumnMetadata::new(col.name(), format!("{:?}", col.column_type()), true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_binary_is_base64() {
        assert_eq!(
            encode_binary(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(encode_binary(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_finite_and_nonfinite() {
        assert_eq!(float_value(2.5), serde_json::json!(2.5));
        // NaN has no JSON number form; falls back to text
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }

    #[test]
    fn test_mssql_scalar_conversion() {
        use tiberius::ColumnData;
        assert_eq!(
            mssql_column_data_to_json(&ColumnData::I32(Some(7))),
            serde_json::json!(7)
        );
        assert_eq!(
            mssql_column_data_to_json(&ColumnData::Bit(Some(true))),
            JsonValue::Bool(true)
        );
        assert_eq!(
            mssql_column_data_to_json(&ColumnData::I32(None)),
            JsonValue::Null
        );
    }
}
