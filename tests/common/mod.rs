//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use dataquality_backend::availability::{AvailabilityManager, ProbePolicy};
use dataquality_backend::gateway::{Gateway, GatewayConfig};
use dataquality_backend::rules::{RuleBook, RuleCatalog};
use dataquality_backend::service::DataQualityService;
use dataquality_backend::store::sqlite::{create_schema, insert_agencies, insert_clients};
use dataquality_backend::store::{demo, RecordStore, Rows, SqlParam, StoreError};
use rusqlite::Connection;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

/// SQLite file holding the demo sample clients and branch directory.
pub fn seeded_db(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut conn = Connection::open(&path).unwrap();
    create_schema(&conn).unwrap();
    insert_clients(&mut conn, &demo::sample_clients()).unwrap();
    insert_agencies(&mut conn, demo::AGENCIES).unwrap();
    path
}

/// Scriptable store: answers every query with `rows` after `delay`,
/// counting calls.
pub struct MockStore {
    pub name: &'static str,
    pub up: bool,
    /// Probe succeeds but every query fails
    pub broken: bool,
    pub delay: Duration,
    /// Applied to every probe after the first
    pub reprobe_delay: Duration,
    pub rows: Rows,
    pub queries: AtomicUsize,
    pub probes: AtomicUsize,
}

impl MockStore {
    pub fn up(name: &'static str, rows: Value) -> Arc<Self> {
        Arc::new(Self {
            name,
            up: true,
            broken: false,
            delay: Duration::ZERO,
            rows: vec![rows.as_object().cloned().unwrap_or_default()],
            reprobe_delay: Duration::ZERO,
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &'static str, rows: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            up: true,
            broken: false,
            delay,
            rows: vec![rows.as_object().cloned().unwrap_or_default()],
            reprobe_delay: Duration::ZERO,
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn down(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            up: false,
            broken: false,
            delay: Duration::ZERO,
            rows: Vec::new(),
            reprobe_delay: Duration::ZERO,
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn broken(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            up: true,
            broken: true,
            delay: Duration::ZERO,
            rows: Vec::new(),
            reprobe_delay: Duration::ZERO,
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    /// Healthy store whose re-probes take `delay`.
    pub fn slow_to_reprobe(name: &'static str, rows: Value, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            up: true,
            broken: false,
            delay: Duration::ZERO,
            reprobe_delay: delay,
            rows: vec![rows.as_object().cloned().unwrap_or_default()],
            queries: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MockStore {
    fn name(&self) -> &str {
        self.name
    }

    async fn probe(&self) -> Result<(), StoreError> {
        if self.probes.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(self.reprobe_delay).await;
        }
        if self.up {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} is down", self.name)))
        }
    }

    async fn query(&self, _sql: &str, _params: Vec<SqlParam>) -> Result<Rows, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.up && !self.broken {
            Ok(self.rows.clone())
        } else {
            Err(StoreError::Unavailable(format!("{} is down", self.name)))
        }
    }
}

pub fn policy(allow_degraded: bool) -> ProbePolicy {
    ProbePolicy {
        allow_degraded,
        attempts: 1,
        retry_delay: Duration::from_millis(1),
        probe_timeout: Duration::from_millis(500),
    }
}

/// Service over the given stores, started with degraded mode allowed.
pub async fn service(
    primary: Arc<dyn RecordStore>,
    legacy: Arc<dyn RecordStore>,
    config: GatewayConfig,
) -> Arc<DataQualityService> {
    let availability = Arc::new(AvailabilityManager::new(primary, legacy, policy(true)));
    availability.startup().await.unwrap();
    let rules = Arc::new(RuleBook::new(RuleCatalog::builtin().unwrap()));
    Arc::new(DataQualityService::new(rules, Gateway::new(config, availability)).with_clock(today))
}
