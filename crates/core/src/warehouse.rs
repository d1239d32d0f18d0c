use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::conversation::RowRecord;

/// Tables the query prompt describes, in prompt order.
pub const TRACKED_TABLES: [&str; 5] =
    ["arrivals", "departures", "station", "trainnames", "holidays"];

pub const DEFAULT_SCHEMA: &str = "oebb";

/// Hard per-connection limit for one generated statement group.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_millis(450_000);

/// Any database-level failure: syntax, timeout, connectivity.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Runs every `;`-separated statement of `sql_text` in order on one
    /// connection and returns the concatenated rows. Zero matching rows is an
    /// empty vector, not an error.
    async fn execute(&self, sql_text: &str) -> Result<Vec<RowRecord>, ExecutionError>;
}

/// Splits on `;`, trims, and drops empty or whitespace-only fragments.
pub fn split_statements(sql_text: &str) -> Vec<&str> {
    sql_text.split(';').map(str::trim).filter(|statement| !statement.is_empty()).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Read-only description of the warehouse, introspected once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub schema: String,
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    pub fn new(schema: impl Into<String>, tables: Vec<TableSchema>) -> Self {
        Self { schema: schema.into(), tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Tracked tables that introspection did not find.
    pub fn missing_tables(&self) -> Vec<&'static str> {
        TRACKED_TABLES.into_iter().filter(|name| self.table(name).is_none()).collect()
    }

    /// One `- table: [columns]` line per table.
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(|table| format!("- {}: [{}]", table.name, table.columns.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
