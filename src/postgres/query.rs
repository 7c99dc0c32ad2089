use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::FromSql;

use crate::error::SprocDbError;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `SprocDbError::MappingError` if the column cannot be decoded, or
/// `SprocDbError::Unimplemented` for column types with no `RowValues` counterpart.
pub fn extract_value(row: &Row, idx: usize) -> Result<RowValues, SprocDbError> {
    let type_info = row.columns()[idx].type_();

    match type_info.name() {
        "int2" => {
            let val: Option<i16> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "float4" => {
            let val: Option<f32> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "bool" => {
            let val: Option<bool> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "timestamptz" => {
            let val: Option<DateTime<Utc>> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())))
        }
        "date" => {
            let val: Option<NaiveDate> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, |v| {
                RowValues::Timestamp(v.and_time(NaiveTime::default()))
            }))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        "text" | "varchar" | "bpchar" | "name" | "unknown" => {
            let val: Option<String> = get(row, idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
        other => Err(SprocDbError::Unimplemented(format!(
            "column {} has unsupported Postgres type {other}",
            row.columns()[idx].name()
        ))),
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<T, SprocDbError> {
    row.try_get(idx).map_err(|e| decode_failure(row.columns()[idx].name(), e))
}

fn decode_failure(column: &str, err: impl std::fmt::Display) -> SprocDbError {
    SprocDbError::mapping(format!("column {column} could not be decoded: {err}"))
}

/// Extract every column of `row`, in order.
///
/// # Errors
/// Returns the first column extraction error.
pub fn extract_row(row: &Row) -> Result<Vec<RowValues>, SprocDbError> {
    (0..row.len()).map(|idx| extract_value(row, idx)).collect()
}
