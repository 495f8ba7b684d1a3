//! Legacy core-banking store
//!
//! Configured through an ODBC-style connection string
//! (`DSN=...;UID=...;PWD=...;DATABASE=...`). The adapter reaches the
//! legacy data through the SQLite export named by `DATABASE` and keeps the
//! explicit connect / test / close lifecycle of the legacy driver.

use super::sqlite::SqliteHandle;
use super::{RecordStore, Rows, SqlParam, StoreError};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Parsed legacy connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDsn {
    pub dsn: String,
    pub uid: Option<String>,
    pub pwd: Option<String>,
    pub database: PathBuf,
}

impl LegacyDsn {
    /// Keys are case-insensitive; unknown keys are ignored like ODBC does.
    pub fn parse(connection_string: &str) -> Result<Self, StoreError> {
        let mut dsn = None;
        let mut uid = None;
        let mut pwd = None;
        let mut database = None;

        for part in connection_string.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| StoreError::InvalidDsn(format!("`{}` is not KEY=VALUE", part)))?;
            let value = value.trim().to_string();
            match key.trim().to_ascii_uppercase().as_str() {
                "DSN" => dsn = Some(value),
                "UID" => uid = Some(value),
                "PWD" => pwd = Some(value),
                "DATABASE" => database = Some(PathBuf::from(value)),
                _ => {}
            }
        }

        Ok(Self {
            dsn: dsn.ok_or_else(|| StoreError::InvalidDsn("missing DSN".to_string()))?,
            uid,
            pwd,
            database: database
                .ok_or_else(|| StoreError::InvalidDsn("missing DATABASE".to_string()))?,
        })
    }
}

/// Password is never printed.
impl fmt::Display for LegacyDsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DSN={}", self.dsn)?;
        if let Some(uid) = &self.uid {
            write!(f, ";UID={}", uid)?;
        }
        if self.pwd.is_some() {
            write!(f, ";PWD=****")?;
        }
        write!(f, ";DATABASE={}", self.database.display())
    }
}

pub struct LegacyStore {
    dsn: LegacyDsn,
    handle: SqliteHandle,
}

impl LegacyStore {
    pub fn new(dsn: LegacyDsn) -> Self {
        Self {
            dsn,
            handle: SqliteHandle::new(),
        }
    }

    pub fn from_connection_string(connection_string: &str) -> Result<Self, StoreError> {
        Ok(Self::new(LegacyDsn::parse(connection_string)?))
    }

    pub fn dsn(&self) -> &LegacyDsn {
        &self.dsn
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_open()
    }

    pub async fn connect(&self) -> Result<(), StoreError> {
        self.handle.open(&self.dsn.database).await?;
        info!("🏛️ Connected to legacy store {}", self.dsn);
        Ok(())
    }

    pub async fn test_connection(&self) -> Result<(), StoreError> {
        self.handle
            .query(self.name(), "SELECT count(*) AS n FROM sqlite_master", Vec::new())
            .await
            .map(|_| ())
    }

    pub fn close(&self) {
        if self.handle.is_open() {
            self.handle.close();
            info!("🔌 Legacy store connection closed");
        }
    }
}

#[async_trait]
impl RecordStore for LegacyStore {
    fn name(&self) -> &str {
        "legacy"
    }

    async fn probe(&self) -> Result<(), StoreError> {
        if !self.is_connected() {
            self.connect().await?;
        }
        if let Err(e) = self.test_connection().await {
            warn!("⚠️ Legacy store test query failed: {}", e);
            self.close();
            return Err(StoreError::Unavailable(e.to_string()));
        }
        Ok(())
    }

    async fn query(&self, sql: &str, params: Vec<SqlParam>) -> Result<Rows, StoreError> {
        self.handle.query(self.name(), sql, params).await
    }
}
