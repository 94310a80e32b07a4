use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind};
use tokio_postgres::{Client, SimpleQueryMessage, Statement};
use uuid::Uuid;

use super::decode::{PgInterval, RawValue};
use super::params::{Params, date_to_timestamp};
use crate::error::EngineError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `EngineError` if the column cannot be retrieved.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, EngineError> {
    let type_info = row.columns()[idx].type_();

    match type_info.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Int))
        }
        "oid" => {
            let val: Option<u32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Float))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Bool))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Timestamp))
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Timestamp(date_to_timestamp(v))))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::JSON))
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Blob))
        }
        "numeric" => {
            let val: Option<Decimal> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Decimal))
        }
        "uuid" => {
            let val: Option<Uuid> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Uuid))
        }
        "time" => {
            let val: Option<NaiveTime> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string())))
        }
        "interval" => {
            let val: Option<PgInterval> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string())))
        }
        "_int2" => array_value::<i16>(row, idx),
        "_int4" => array_value::<i32>(row, idx),
        "_int8" => array_value::<i64>(row, idx),
        "_float8" => array_value::<f64>(row, idx),
        "_bool" => array_value::<bool>(row, idx),
        "_text" | "_varchar" => array_value::<String>(row, idx),
        _ if <String as FromSql>::accepts(type_info) => {
            // text, varchar, bpchar, name, citext and friends
            let val: Option<String> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, RowValues::Text))
        }
        _ => {
            let val: Option<RawValue> = row.try_get(idx)?;
            Ok(val.map_or(RowValues::Null, |RawValue(bytes)| {
                // enum labels travel as plain text; anything else stays raw
                if matches!(type_info.kind(), Kind::Enum(_)) {
                    RowValues::Text(String::from_utf8_lossy(&bytes).into_owned())
                } else {
                    RowValues::Blob(bytes)
                }
            }))
        }
    }
}

/// One-dimensional arrays come back as a JSON array.
fn array_value<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Result<RowValues, EngineError>
where
    T: FromSql<'a> + Into<Value>,
{
    let val: Option<Vec<Option<T>>> = row.try_get(idx)?;
    Ok(val.map_or(RowValues::Null, |items| {
        RowValues::JSON(Value::Array(items.into_iter().map(Value::from).collect()))
    }))
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, EngineError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    build_result_set(column_names, rows)
}

fn build_result_set(
    column_names: Vec<String>,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, EngineError> {
    let column_count = column_names.len();
    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Prepare and run a statement, returning its rows.
///
/// # Errors
/// Returns errors from preparation, execution, or value extraction.
pub async fn fetch_on_client(
    client: &Client,
    query: &str,
    params: &[RowValues],
) -> Result<ResultSet, EngineError> {
    let stmt = client.prepare(query).await?;
    let converted = Params::convert(params);
    let rows = client.query(&stmt, converted.as_refs()).await?;
    build_result_set_from_statement(&stmt, &rows)
}

/// Run one or more statements over the simple query protocol.
///
/// Values come back as text; the rows of the last statement that returned any
/// are kept.
///
/// # Errors
/// Returns the driver error if any statement fails.
pub async fn simple_on_client(client: &Client, sql: &str) -> Result<ResultSet, EngineError> {
    let messages = client.simple_query(sql).await?;

    let mut result_set = ResultSet::default();
    let mut started_new = true;
    for message in messages {
        match message {
            SimpleQueryMessage::Row(row) => {
                if started_new {
                    let names: Vec<String> =
                        row.columns().iter().map(|c| c.name().to_string()).collect();
                    result_set = ResultSet::default();
                    result_set.set_column_names(Arc::new(names));
                    started_new = false;
                }
                let values = (0..row.len())
                    .map(|i| row.get(i).map_or(RowValues::Null, |v| RowValues::Text(v.to_string())))
                    .collect();
                result_set.add_row_values(values);
            }
            SimpleQueryMessage::CommandComplete(_) => started_new = true,
            _ => {}
        }
    }
    Ok(result_set)
}

/// Run a statement and return the affected row count.
///
/// # Errors
/// Returns errors from execution or row-count conversion.
pub async fn execute_on_client(
    client: &Client,
    query: &str,
    params: &[RowValues],
) -> Result<usize, EngineError> {
    let converted = Params::convert(params);
    let rows = client.execute(query, converted.as_refs()).await?;
    usize::try_from(rows)
        .map_err(|e| EngineError::ExecutionError(format!("Invalid rows affected count: {e}")))
}
