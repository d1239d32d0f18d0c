//! Connections to the relational store that generated SQL runs against.
//!
//! Production deployments point at PostgreSQL/TimescaleDB. Local runs and tests
//! use an embedded sqlite database where the configured schema is attached as
//! an in-memory database, so `oebb.arrivals` resolves the same way on both.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use railsql_core::config::{WarehouseConfig, WarehouseKind};
use railsql_core::domain::conversation::RowRecord;
use railsql_core::warehouse::{
    split_statements, ExecutionError, QueryExecutor, SchemaCatalog, TableSchema, TRACKED_TABLES,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{debug, warn};

use crate::fixtures::{self, DemoSeedSummary};

/// Message reported when the statement group outlives its budget.
pub const STATEMENT_TIMEOUT_MESSAGE: &str = "canceling statement due to statement timeout";

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("unsupported warehouse url `{0}`")]
    UnsupportedUrl(String),
    #[error("invalid warehouse schema name `{0}`")]
    InvalidSchema(String),
    #[error("demo seeding is only available for the sqlite warehouse")]
    SeedUnsupported,
    #[error("warehouse database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone, Debug)]
enum WarehousePool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

#[derive(Clone, Debug)]
pub struct Warehouse {
    pool: WarehousePool,
    schema: String,
    statement_timeout: Duration,
}

pub async fn connect_warehouse(config: &WarehouseConfig) -> Result<Warehouse, WarehouseError> {
    if !is_identifier(&config.schema) {
        return Err(WarehouseError::InvalidSchema(config.schema.clone()));
    }
    let acquire_timeout = Duration::from_secs(config.timeout_secs.max(1));

    let pool = match config.kind() {
        Some(WarehouseKind::Postgres) => WarehousePool::Postgres(
            PgPoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .acquire_timeout(acquire_timeout)
                .connect(&config.url)
                .await?,
        ),
        Some(WarehouseKind::Sqlite) => {
            let attach = format!("ATTACH DATABASE ':memory:' AS {}", config.schema);
            // One long-lived connection: the attached schema lives only as long
            // as the connection that attached it.
            let sqlite = SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(acquire_timeout)
                .after_connect(move |conn, _meta| {
                    let attach = attach.clone();
                    Box::pin(async move {
                        sqlx::query(&attach).execute(&mut *conn).await?;
                        Ok(())
                    })
                })
                .connect(&config.url)
                .await?;
            WarehousePool::Sqlite(sqlite)
        }
        None => return Err(WarehouseError::UnsupportedUrl(config.url.clone())),
    };

    let warehouse = Warehouse {
        pool,
        schema: config.schema.clone(),
        statement_timeout: Duration::from_millis(config.statement_timeout_ms),
    };

    debug!(
        event_name = "warehouse.connected",
        kind = warehouse.kind_name(),
        schema = %warehouse.schema,
        statement_timeout_ms = config.statement_timeout_ms,
        "warehouse connected"
    );
    Ok(warehouse)
}

impl Warehouse {
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    pub fn kind_name(&self) -> &'static str {
        match self.pool {
            WarehousePool::Postgres(_) => "postgres",
            WarehousePool::Sqlite(_) => "sqlite",
        }
    }

    pub async fn ping(&self) -> Result<(), WarehouseError> {
        match &self.pool {
            WarehousePool::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            WarehousePool::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Creates and fills the tracked tables with deterministic demo rows.
    pub async fn seed_demo(&self) -> Result<DemoSeedSummary, WarehouseError> {
        match &self.pool {
            WarehousePool::Sqlite(pool) => {
                Ok(fixtures::seed_demo_warehouse(pool, &self.schema).await?)
            }
            WarehousePool::Postgres(_) => Err(WarehouseError::SeedUnsupported),
        }
    }

    /// Reads column lists of the tracked tables that exist, in tracked order.
    pub async fn introspect(&self) -> Result<SchemaCatalog, WarehouseError> {
        let mut tables = Vec::new();
        for name in TRACKED_TABLES {
            let columns = match &self.pool {
                WarehousePool::Postgres(pool) => {
                    sqlx::query_scalar::<_, String>(
                        "SELECT column_name::text
                         FROM information_schema.columns
                         WHERE table_schema = $1 AND table_name = $2
                         ORDER BY ordinal_position",
                    )
                    .bind(&self.schema)
                    .bind(name)
                    .fetch_all(pool)
                    .await?
                }
                WarehousePool::Sqlite(pool) => {
                    sqlx::query_scalar::<_, String>(
                        "SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid",
                    )
                    .bind(name)
                    .bind(&self.schema)
                    .fetch_all(pool)
                    .await?
                }
            };

            if columns.is_empty() {
                warn!(
                    event_name = "warehouse.introspect.missing_table",
                    schema = %self.schema,
                    table = name,
                    "tracked table not found"
                );
                continue;
            }
            tables.push(TableSchema { name: name.to_string(), columns });
        }

        Ok(SchemaCatalog::new(self.schema.clone(), tables))
    }

    pub async fn close(&self) {
        match &self.pool {
            WarehousePool::Postgres(pool) => pool.close().await,
            WarehousePool::Sqlite(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl QueryExecutor for Warehouse {
    async fn execute(&self, sql_text: &str) -> Result<Vec<RowRecord>, ExecutionError> {
        let statements = split_statements(sql_text);
        let started = Instant::now();

        let result = match &self.pool {
            WarehousePool::Postgres(pool) => {
                let owned = statements.iter().map(|statement| statement.to_string()).collect();
                execute_postgres(pool, self.statement_timeout, owned).await
            }
            WarehousePool::Sqlite(pool) => {
                let execution = execute_sqlite(pool, &statements);
                match tokio::time::timeout(self.statement_timeout, execution).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            event_name = "warehouse.execute.timeout",
                            timeout_ms = self.statement_timeout.as_millis() as u64,
                            "statement group timed out"
                        );
                        return Err(ExecutionError::new(STATEMENT_TIMEOUT_MESSAGE));
                    }
                }
            }
        };

        match result {
            Ok(rows) => {
                debug!(
                    event_name = "warehouse.execute.completed",
                    statements = statements.len(),
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "statement group executed"
                );
                Ok(rows)
            }
            Err(error) => Err(ExecutionError::new(database_message(&error))),
        }
    }
}

async fn execute_postgres(
    pool: &PgPool,
    statement_timeout: Duration,
    statements: Vec<String>,
) -> Result<Vec<RowRecord>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let set_timeout =
        format!("SET LOCAL statement_timeout = {}", statement_timeout.as_millis());
    sqlx::query(set_timeout.as_str()).persistent(false).execute(&mut *tx).await?;

    let mut records = Vec::new();
    for statement in &statements {
        let rows =
            sqlx::query(statement.as_str()).persistent(false).fetch_all(&mut *tx).await?;
        records.extend(rows.iter().map(pg_row_to_record));
    }

    // Generated text is never committed.
    tx.rollback().await?;
    Ok(records)
}

async fn execute_sqlite(
    pool: &SqlitePool,
    statements: &[&str],
) -> Result<Vec<RowRecord>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let mut records = Vec::new();
    for statement in statements {
        let rows = sqlx::query(statement).persistent(false).fetch_all(&mut *tx).await?;
        records.extend(rows.iter().map(sqlite_row_to_record));
    }

    tx.rollback().await?;
    Ok(records)
}

fn database_message(error: &sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(database) => database.message().to_string(),
        other => other.to_string(),
    }
}

fn pg_row_to_record(row: &PgRow) -> RowRecord {
    let values = row.columns().iter().map(|column| {
        let index = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => pg_get::<bool>(row, index).map(Value::Bool),
            "INT2" => pg_get::<i16>(row, index).map(|value| Value::from(i64::from(value))),
            "INT4" => pg_get::<i32>(row, index).map(|value| Value::from(i64::from(value))),
            "INT8" => pg_get::<i64>(row, index).map(Value::from),
            "FLOAT4" => pg_get::<f32>(row, index).map(|value| float(f64::from(value))),
            "FLOAT8" => pg_get::<f64>(row, index).map(float),
            "NUMERIC" => pg_get::<Decimal>(row, index).map(decimal),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
                pg_get::<String>(row, index).map(Value::String)
            }
            "DATE" => pg_get::<chrono::NaiveDate>(row, index)
                .map(|value| Value::String(value.to_string())),
            "TIME" => pg_get::<chrono::NaiveTime>(row, index)
                .map(|value| Value::String(value.to_string())),
            "TIMESTAMP" => pg_get::<chrono::NaiveDateTime>(row, index)
                .map(|value| Value::String(value.to_string())),
            "TIMESTAMPTZ" => pg_get::<chrono::DateTime<chrono::Utc>>(row, index)
                .map(|value| Value::String(value.to_rfc3339())),
            "JSON" | "JSONB" => pg_get::<Value>(row, index),
            "UUID" => {
                pg_get::<uuid::Uuid>(row, index).map(|value| Value::String(value.to_string()))
            }
            "INTERVAL" => {
                pg_get::<PgInterval>(row, index).map(|value| Value::String(interval(&value)))
            }
            _ => None,
        };
        (column.name(), value.unwrap_or(Value::Null))
    });
    record_from_columns(values)
}

fn pg_get<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

fn sqlite_row_to_record(row: &SqliteRow) -> RowRecord {
    record_from_columns(
        row.columns().iter().map(|column| (column.name(), sqlite_value(row, column.ordinal()))),
    )
}

/// Keeps select order. A repeated column name gets a `_2`, `_3`, ... suffix
/// instead of overwriting the earlier value.
fn record_from_columns<'a>(columns: impl Iterator<Item = (&'a str, Value)>) -> RowRecord {
    let mut record = RowRecord::new();
    for (name, value) in columns {
        let mut key = name.to_string();
        let mut occurrence = 1;
        while record.contains_key(&key) {
            occurrence += 1;
            key = format!("{name}_{occurrence}");
        }
        record.insert(key, value);
    }
    record
}

/// sqlite is dynamically typed; decode by the storage class of the value.
fn sqlite_value(row: &SqliteRow, index: usize) -> Value {
    let storage_class = match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => raw.type_info().name().to_string(),
        _ => return Value::Null,
    };

    match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => {
            row.try_get_unchecked::<i64, _>(index).map(Value::from).unwrap_or(Value::Null)
        }
        "REAL" => row.try_get_unchecked::<f64, _>(index).map(float).unwrap_or(Value::Null),
        "TEXT" | "DATETIME" | "DATE" | "TIME" => {
            row.try_get_unchecked::<String, _>(index).map(Value::String).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn decimal(value: Decimal) -> Value {
    match value.to_f64().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => Value::String(value.to_string()),
    }
}

/// Renders an interval like PostgreSQL does by default, e.g. `1 day 00:05:30`.
fn interval(value: &PgInterval) -> String {
    let mut parts = Vec::new();
    if value.months != 0 {
        parts.push(format!("{} mons", value.months));
    }
    if value.days != 0 {
        let unit = if value.days.abs() == 1 { "day" } else { "days" };
        parts.push(format!("{} {unit}", value.days));
    }
    if value.microseconds != 0 || parts.is_empty() {
        let sign = if value.microseconds < 0 { "-" } else { "" };
        let micros = value.microseconds.unsigned_abs();
        let seconds = micros / 1_000_000;
        let fraction = micros % 1_000_000;
        let mut clock =
            format!("{sign}{:02}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60);
        if fraction != 0 {
            clock.push_str(&format!(".{fraction:06}"));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !value.starts_with(|ch: char| ch.is_ascii_digit())
}
