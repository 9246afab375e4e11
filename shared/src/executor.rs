//! Execution of validator-approved SQL against the read-only database.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as _, TypeInfo};
use thiserror::Error;

use crate::config::QueryLimits;
use crate::validator::ApprovedSql;

/// Extra time allowed past the statement timeout before the call is abandoned.
const TIMEOUT_GRACE: Duration = Duration::from_secs(1);

/// One result row, columns in select-list order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Rows in the order the database returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// More rows existed than the row limit allowed
    pub truncated: bool,
}

/// A generated query that could not be run.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("query exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only access to the live database.
///
/// Implementations must return at most `row_limit` rows and give up after
/// `timeout`.
#[async_trait]
pub trait ReadOnlyDatabase: Send + Sync {
    async fn fetch_rows(
        &self,
        sql: &str,
        row_limit: usize,
        timeout: Duration,
    ) -> Result<Vec<Row>, ExecutionError>;
}

/// Runs approved statements with the configured row and time budget.
///
/// Failed statements are not retried.
#[derive(Clone)]
pub struct QueryExecutor {
    db: Arc<dyn ReadOnlyDatabase>,
    limits: QueryLimits,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn ReadOnlyDatabase>, limits: QueryLimits) -> Self {
        Self { db, limits }
    }

    pub async fn execute(&self, sql: &ApprovedSql) -> Result<QueryResult, ExecutionError> {
        let budget = self.limits.statement_timeout;
        // one extra row tells us whether the result was cut off
        let fetch = self
            .db
            .fetch_rows(sql.as_str(), self.limits.row_limit.saturating_add(1), budget);

        let mut rows = tokio::time::timeout(budget.saturating_add(TIMEOUT_GRACE), fetch)
            .await
            .map_err(|_| ExecutionError::Timeout(budget))??;

        let truncated = rows.len() > self.limits.row_limit;
        rows.truncate(self.limits.row_limit);
        Ok(QueryResult { rows, truncated })
    }
}

/// Postgres implementation using a read-only transaction per statement.
#[derive(Clone)]
pub struct PgReadOnlyDatabase {
    pool: PgPool,
}

impl PgReadOnlyDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadOnlyDatabase for PgReadOnlyDatabase {
    async fn fetch_rows(
        &self,
        sql: &str,
        row_limit: usize,
        timeout: Duration,
    ) -> Result<Vec<Row>, ExecutionError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        // SET does not take bind parameters
        let millis = timeout.as_millis().min(i32::MAX as u128);
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", millis))
            .execute(&mut *tx)
            .await?;

        let mut rows = Vec::new();
        {
            let mut stream = sqlx::query(sql).fetch(&mut *tx);
            while let Some(pg_row) = stream.try_next().await? {
                rows.push(convert_row(&pg_row)?);
                if rows.len() >= row_limit {
                    break;
                }
            }
        }

        tx.rollback().await?;
        Ok(rows)
    }
}

fn convert_row(pg_row: &PgRow) -> Result<Row, sqlx::Error> {
    let mut columns = Vec::with_capacity(pg_row.len());
    for column in pg_row.columns() {
        let value = decode_column(pg_row, column.ordinal(), column.type_info().name())?;
        columns.push((column.name().to_string(), value));
    }
    Ok(Row::new(columns))
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| Value::from(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::from),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|d| Value::String(d.normalize().to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)?
            .map(|t| Value::String(t.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)?
            .map(|t| Value::String(t.to_rfc3339())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)?
            .map(|d| Value::String(d.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx)?,
        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(idx)?
            .map(|i| Value::String(format_interval(&i))),
        "BOOL[]" => row.try_get::<Option<Vec<bool>>, _>(idx)?.map(Value::from),
        "INT2[]" => row.try_get::<Option<Vec<i16>>, _>(idx)?.map(Value::from),
        "INT4[]" => row.try_get::<Option<Vec<i32>>, _>(idx)?.map(Value::from),
        "INT8[]" => row.try_get::<Option<Vec<i64>>, _>(idx)?.map(Value::from),
        "FLOAT8[]" => row.try_get::<Option<Vec<f64>>, _>(idx)?.map(Value::from),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            row.try_get::<Option<Vec<String>>, _>(idx)?.map(Value::from)
        }
        // Anything else without a text representation is shown by type name
        // instead of failing the whole answer
        _ => match row.try_get::<Option<String>, _>(idx) {
            Ok(text) => text.map(Value::String),
            Err(sqlx::Error::ColumnDecode { .. }) => {
                Some(Value::String(format!("<{}>", type_name.to_ascii_lowercase())))
            }
            Err(e) => return Err(e),
        },
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Postgres-style interval text, e.g. `1 year 2 mons 3 days 04:05:06`.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day"));
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let total = interval.microseconds.unsigned_abs();
        let (secs, frac) = (total / 1_000_000, total % 1_000_000);
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60
        );
        if frac != 0 {
            let digits = format!("{:06}", frac);
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

fn unit(n: i32, name: &str) -> String {
    if n.abs() == 1 {
        format!("{} {}", n, name)
    } else {
        format!("{} {}s", n, name)
    }
}
