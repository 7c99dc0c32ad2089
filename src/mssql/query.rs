use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use tiberius::{ColumnData, FromSql, QueryItem, QueryStream, Row};

use crate::error::SprocDbError;
use crate::results::{ColumnNames, ProcRow};
use crate::types::RowValues;

/// One buffered result set of a batch.
#[derive(Debug, Clone)]
pub struct MssqlResultSet {
    pub columns: Arc<ColumnNames>,
    pub rows: Vec<ProcRow>,
}

/// Drain a query stream into its result sets, in the order the server sent them.
///
/// # Errors
/// Returns the driver error if the server fails mid-stream.
pub async fn collect_result_sets(
    mut stream: QueryStream<'_>,
) -> Result<Vec<MssqlResultSet>, SprocDbError> {
    let mut sets: Vec<MssqlResultSet> = Vec::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let names = meta
                    .columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect();
                sets.push(MssqlResultSet {
                    columns: ColumnNames::new(names),
                    rows: Vec::new(),
                });
            }
            QueryItem::Row(row) => {
                let set = sets.last_mut().ok_or_else(|| {
                    SprocDbError::ConnectionError("row received before column metadata".into())
                })?;
                let values = row_values(row)?;
                set.rows.push(ProcRow::new(set.columns.clone(), values));
            }
        }
    }
    Ok(sets)
}

fn row_values(row: Row) -> Result<Vec<RowValues>, SprocDbError> {
    row.into_iter().map(column_value).collect()
}

/// Convert one SQL Server column value into a [`RowValues`].
///
/// # Errors
/// Returns `SprocDbError::MssqlError` if a date or time value cannot be decoded.
pub fn column_value(data: ColumnData<'static>) -> Result<RowValues, SprocDbError> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| RowValues::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| {
            RowValues::Float(n.value() as f64 / 10f64.powi(i32::from(n.scale())))
        }),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| RowValues::Text(x.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(RowValues::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?
            .map(|d| RowValues::Timestamp(d.and_time(NaiveTime::default()))),
        ColumnData::Time(_) => {
            NaiveTime::from_sql(&data)?.map(|t| RowValues::Text(t.format("%H:%M:%S%.f").to_string()))
        }
        ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(&data)?
            .map(|dt| RowValues::Timestamp(dt.naive_utc())),
    };
    Ok(value.unwrap_or(RowValues::Null))
}
