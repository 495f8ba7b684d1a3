//! Backing-store adapters
//!
//! Both the primary relational store and the legacy core-banking store
//! expose the same `query(sql, params) -> rows` capability; the demo data
//! set is not a store and lives behind the gateway's last fallback tier.

pub mod demo;
pub mod legacy;
pub mod sqlite;

use async_trait::async_trait;
use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;
use serde_json::{Map, Value};
use std::fmt;

pub use legacy::{LegacyDsn, LegacyStore};
pub use sqlite::{SqliteHandle, SqliteStore};

/// One result row, column name to value
pub type Row = Map<String, Value>;
pub type Rows = Vec<Row>;

/// Bound query parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            SqlParam::Text(s) => s.to_sql(),
            SqlParam::Int(n) => n.to_sql(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be opened or reached
    Unavailable(String),
    NotConnected(String),
    Query(String),
    InvalidDsn(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
            Self::NotConnected(store) => write!(f, "{} store is not connected", store),
            Self::Query(msg) => write!(f, "query failed: {}", msg),
            Self::InvalidDsn(msg) => write!(f, "invalid connection string: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short name used in logs and availability reports
    fn name(&self) -> &str;

    /// Open the store if needed and verify it answers.
    async fn probe(&self) -> Result<(), StoreError>;

    async fn query(&self, sql: &str, params: Vec<SqlParam>) -> Result<Rows, StoreError>;
}

/// Integer column of the first row, 0 when absent or NULL.
pub fn first_u64(rows: &Rows, column: &str) -> u64 {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}
