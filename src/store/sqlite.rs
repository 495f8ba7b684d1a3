//! SQLite-backed stores
//!
//! - `SqliteHandle`: shared, lazily opened read-only connection; queries run
//!   on the blocking pool so store I/O never stalls the runtime
//! - `SqliteStore`: the primary relational store
//! - schema helpers for provisioning the `clients` and `agencies` tables

use super::{RecordStore, Row, Rows, SqlParam, StoreError};
use crate::models::{ClientRecord, Field};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, InterruptHandle, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub const CLIENTS_TABLE: &str = "clients";
pub const AGENCIES_TABLE: &str = "agencies";

/// `clients` table with one TEXT column per [`Field`].
pub fn clients_schema() -> String {
    let columns: Vec<String> = Field::ALL.iter().map(|f| format!("{} TEXT", f)).collect();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} ({columns});
CREATE INDEX IF NOT EXISTS idx_clients_cli ON {table}(cli);
CREATE INDEX IF NOT EXISTS idx_clients_tcli ON {table}(tcli);
CREATE INDEX IF NOT EXISTS idx_clients_age ON {table}(age);
CREATE TABLE IF NOT EXISTS {agencies} (code_agence TEXT PRIMARY KEY, lib_agence TEXT);
"#,
        table = CLIENTS_TABLE,
        agencies = AGENCIES_TABLE,
        columns = columns.join(", ")
    )
}

pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&clients_schema())
}

/// Bulk insert in one transaction.
pub fn insert_clients(conn: &mut Connection, records: &[ClientRecord]) -> rusqlite::Result<usize> {
    let columns: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
    let slots = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        CLIENTS_TABLE,
        columns.join(", "),
        slots
    );

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&sql)?;
        for record in records {
            stmt.execute(params_from_iter(Field::ALL.iter().map(|f| record.get(*f))))?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

/// Branch directory rows `(code, name)`; existing codes are renamed.
pub fn insert_agencies(conn: &mut Connection, agencies: &[(&str, &str)]) -> rusqlite::Result<usize> {
    let sql = format!(
        "INSERT OR REPLACE INTO {} (code_agence, lib_agence) VALUES (?, ?)",
        AGENCIES_TABLE
    );
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare_cached(&sql)?;
        for (code, name) in agencies {
            stmt.execute(rusqlite::params![code, name])?;
        }
    }
    tx.commit()?;
    Ok(agencies.len())
}

/// Rows as JSON maps; BLOBs are not part of the client model and map to null.
pub fn collect_rows(conn: &Connection, sql: &str, params: &[SqlParam]) -> rusqlite::Result<Rows> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = match row.get_ref(idx)? {
                ValueRef::Null | ValueRef::Blob(_) => Value::Null,
                ValueRef::Integer(n) => Value::from(n),
                ValueRef::Real(f) => serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            };
            map.insert(name.clone(), value);
        }
        out.push(map);
    }
    Ok(out)
}

/// Read-only SQLite connection shared by clones of the handle.
///
/// A query whose caller stops waiting (backend timeout, abort) is
/// interrupted, so it does not keep the connection from later queries.
#[derive(Clone, Default)]
pub struct SqliteHandle {
    conn: Arc<Mutex<Option<Connection>>>,
    // lock order: conn, then running
    running: Arc<Mutex<Option<RunningQuery>>>,
    next_query: Arc<AtomicU64>,
}

struct RunningQuery {
    id: u64,
    interrupt: InterruptHandle,
}

/// Cancels its query when dropped before `finish`.
struct QueryGuard {
    id: u64,
    running: Arc<Mutex<Option<RunningQuery>>>,
    cancelled: Arc<AtomicBool>,
    finished: bool,
}

impl QueryGuard {
    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for QueryGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        let running = self.running.lock();
        if let Some(query) = running.as_ref().filter(|q| q.id == self.id) {
            debug!("✂️ Interrupting abandoned query #{}", self.id);
            query.interrupt.interrupt();
        }
    }
}

impl SqliteHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Open `path` read-only and read the schema so a missing or corrupt
    /// file fails here rather than on the first query.
    pub async fn open(&self, path: &Path) -> Result<(), StoreError> {
        let path = path.to_path_buf();
        let slot = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            let conn = Connection::open_with_flags(&path, flags).map_err(|e| {
                StoreError::Unavailable(format!("cannot open {}: {}", path.display(), e))
            })?;
            conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
            *slot.lock() = Some(conn);
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("open task failed: {}", e)))?
    }

    pub fn close(&self) {
        self.conn.lock().take();
    }

    pub async fn query(&self, store: &str, sql: &str, params: Vec<SqlParam>) -> Result<Rows, StoreError> {
        let id = self.next_query.fetch_add(1, Ordering::Relaxed);
        let cancelled = Arc::new(AtomicBool::new(false));
        let guard = QueryGuard {
            id,
            running: self.running.clone(),
            cancelled: cancelled.clone(),
            finished: false,
        };

        let slot = self.conn.clone();
        let running = self.running.clone();
        let sql = sql.to_string();
        let store = store.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let conn_guard = slot.lock();
            let conn = conn_guard.as_ref().ok_or(StoreError::NotConnected(store))?;
            if cancelled.load(Ordering::SeqCst) {
                return Err(StoreError::Query("cancelled before start".to_string()));
            }
            *running.lock() = Some(RunningQuery {
                id,
                interrupt: conn.get_interrupt_handle(),
            });
            let rows = collect_rows(conn, &sql, &params).map_err(|e| StoreError::Query(e.to_string()));
            running.lock().take();
            rows
        })
        .await
        .map_err(|e| StoreError::Query(format!("query task failed: {}", e)));

        guard.finish();
        result?
    }
}

/// Primary relational store
pub struct SqliteStore {
    path: PathBuf,
    handle: SqliteHandle,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: SqliteHandle::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn name(&self) -> &str {
        "primary"
    }

    async fn probe(&self) -> Result<(), StoreError> {
        if !self.handle.is_open() {
            self.handle.open(&self.path).await?;
            info!("🗄️ Primary store opened at {}", self.path.display());
        }
        match self.handle.query(self.name(), "SELECT 1 AS ok", Vec::new()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.handle.close();
                Err(StoreError::Unavailable(e.to_string()))
            }
        }
    }

    async fn query(&self, sql: &str, params: Vec<SqlParam>) -> Result<Rows, StoreError> {
        debug!("primary query: {}", sql);
        self.handle.query(self.name(), sql, params).await
    }
}
