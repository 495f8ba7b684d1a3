//! Gateway behavior across store outages, slow backends and concurrent callers.

mod common;

use async_trait::async_trait;
use common::{policy, seeded_db, service, MockStore};
use dataquality_backend::availability::{AvailabilityManager, ServiceMode};
use dataquality_backend::gateway::{
    DataSource, FailureKind, FetchPriority, GatewayConfig, GatewayError, ResourceKey, ResourcePlan,
};
use dataquality_backend::models::ClientStats;
use dataquality_backend::store::{demo, LegacyDsn, LegacyStore, RecordStore, SqliteStore, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn stats_row() -> Value {
    json!({
        "total": 10,
        "individual": 7,
        "corporate": 2,
        "institutional": 1,
        "anomalies": 3,
        "fatca": 1
    })
}

fn legacy_over(path: &std::path::Path) -> Arc<LegacyStore> {
    let dsn = format!("DSN=core;UID=reader;PWD=secret;DATABASE={}", path.display());
    Arc::new(LegacyStore::new(LegacyDsn::parse(&dsn).unwrap()))
}

/// Resource with no demo data, so an exhausted chain surfaces as an error.
struct ProbeCount;

#[async_trait]
impl ResourcePlan for ProbeCount {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("probe_count")
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let rows = store.query("SELECT 1 AS ok", Vec::new()).await?;
        Ok(json!(rows.len()))
    }

    fn demo(&self) -> Option<Value> {
        None
    }
}

#[tokio::test]
async fn concurrent_callers_share_one_backend_fetch() {
    let primary = MockStore::slow("primary", stats_row(), Duration::from_millis(150));
    let legacy = MockStore::up("legacy", stats_row());
    let svc = service(primary.clone(), legacy.clone(), GatewayConfig::default()).await;

    let (a, b) = tokio::join!(svc.get_client_stats(), svc.get_client_stats());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.data, b.data);
    assert_eq!(a.data.total, 10);
    assert_eq!(a.source, DataSource::Primary);
    assert_eq!(primary.query_count(), 1);
    assert_eq!(legacy.query_count(), 0);
    assert_eq!(svc.gateway().stats().dedup_joins, 1);

    let third = svc.get_client_stats().await.unwrap();
    assert!(third.cached);
    assert_eq!(primary.query_count(), 1);
}

#[tokio::test]
async fn cached_results_expire_after_ttl() {
    let primary = MockStore::up("primary", stats_row());
    let legacy = MockStore::up("legacy", stats_row());
    let config = GatewayConfig {
        cache_ttl: Duration::from_millis(80),
        ..GatewayConfig::default()
    };
    let svc = service(primary.clone(), legacy, config).await;

    assert!(!svc.get_client_stats().await.unwrap().cached);
    assert!(svc.get_client_stats().await.unwrap().cached);
    assert_eq!(primary.query_count(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    let refreshed = svc.get_client_stats().await.unwrap();
    assert!(!refreshed.cached);
    assert_eq!(primary.query_count(), 2);
}

#[tokio::test]
async fn unavailable_stores_are_never_queried() {
    let primary = MockStore::down("primary");
    let legacy = MockStore::down("legacy");
    let svc = service(primary.clone(), legacy.clone(), GatewayConfig::default()).await;

    assert_eq!(svc.health().mode, ServiceMode::DemoOnly);

    let stats = svc.get_client_stats().await.unwrap();
    assert_eq!(stats.source, DataSource::Demo);
    assert!(stats.fallback);
    assert!(!stats.legacy_available);
    assert!(!stats.degraded);
    assert_eq!(stats.data, demo::client_stats());

    assert_eq!(primary.query_count(), 0);
    assert_eq!(legacy.query_count(), 0);
    assert_eq!(svc.gateway().stats().backend_calls, 0);
}

#[tokio::test]
async fn demo_data_is_not_cached() {
    let svc = service(MockStore::down("primary"), MockStore::down("legacy"), GatewayConfig::default()).await;

    let first = svc.get_client_stats().await.unwrap();
    let second = svc.get_client_stats().await.unwrap();
    assert!(first.fallback && second.fallback);
    assert!(!second.cached);
    assert_eq!(svc.gateway().stats().cache_entries, 0);
}

#[tokio::test]
async fn legacy_backed_data_when_primary_is_down() {
    let dir = TempDir::new().unwrap();
    let legacy = legacy_over(&seeded_db(&dir, "legacy.db"));
    let svc = service(MockStore::down("primary"), legacy.clone(), GatewayConfig::default()).await;

    assert_eq!(svc.health().mode, ServiceMode::Degraded);

    let stats = svc.get_client_stats().await.unwrap();
    assert_eq!(stats.source, DataSource::Legacy);
    assert!(!stats.fallback);
    assert!(stats.legacy_available);
    assert_eq!(stats.data.total, 13);
    assert_eq!(stats.data.anomalies, 7);

    let branches = svc.get_anomalies_by_branch().await.unwrap();
    assert_eq!(branches.source, DataSource::Legacy);
    assert!(!branches.degraded);
    assert_eq!(branches.data.iter().map(|b| b.anomaly_count).sum::<u64>(), 7);

    legacy.close();
}

#[tokio::test]
async fn branch_breakdown_falls_back_to_demo_when_everything_is_down() {
    let svc = service(MockStore::down("primary"), MockStore::down("legacy"), GatewayConfig::default()).await;

    let branches = svc.get_anomalies_by_branch().await.unwrap();
    assert_eq!(branches.source, DataSource::Demo);
    assert!(branches.fallback);
    assert!(branches.degraded);
    assert_eq!(branches.data, demo::branch_anomalies());
}

#[tokio::test]
async fn legacy_dependent_resources_are_flagged_degraded() {
    let dir = TempDir::new().unwrap();
    let primary = Arc::new(SqliteStore::new(seeded_db(&dir, "primary.db")));
    let svc = service(primary, MockStore::down("legacy"), GatewayConfig::default()).await;

    let stats = svc.get_client_stats().await.unwrap();
    assert_eq!(stats.source, DataSource::Primary);
    assert!(!stats.degraded);

    let fatca = svc.get_fatca_stats(None).await.unwrap();
    assert_eq!(fatca.source, DataSource::Primary);
    assert!(fatca.degraded);
    assert!(!fatca.legacy_available);
}

#[tokio::test]
async fn slow_backend_times_out_and_next_tier_answers() {
    let primary = MockStore::slow("primary", stats_row(), Duration::from_millis(400));
    let mut legacy_row = stats_row();
    legacy_row["total"] = json!(11);
    let legacy = MockStore::up("legacy", legacy_row);
    let config = GatewayConfig {
        backend_timeout: Duration::from_millis(50),
        ..GatewayConfig::default()
    };
    let svc = service(primary.clone(), legacy.clone(), config).await;

    let stats = svc.get_client_stats().await.unwrap();
    assert_eq!(stats.source, DataSource::Legacy);
    assert_eq!(stats.data.total, 11);
    assert_eq!(primary.query_count(), 1);
    assert_eq!(legacy.query_count(), 1);
    assert_eq!(svc.gateway().stats().timeouts, 1);
}

#[tokio::test]
async fn exhausted_chain_without_demo_is_data_unavailable() {
    let svc = service(MockStore::broken("primary"), MockStore::broken("legacy"), GatewayConfig::default()).await;

    let err = svc
        .gateway()
        .fetch(Arc::new(ProbeCount), FetchPriority::Interactive)
        .await
        .unwrap_err();

    match err {
        GatewayError::DataUnavailable {
            resource,
            attempts,
            timed_out,
        } => {
            assert_eq!(resource, "probe_count");
            assert!(!timed_out);
            assert_eq!(attempts.len(), 2);
            assert!(attempts
                .iter()
                .all(|a| matches!(a.kind, FailureKind::Unavailable { .. })));
        }
        other => panic!("expected DataUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn startup_refuses_without_legacy_unless_degraded_allowed() {
    let dir = TempDir::new().unwrap();
    let primary: Arc<dyn RecordStore> = Arc::new(SqliteStore::new(seeded_db(&dir, "primary.db")));
    let missing = dir.path().join("no-such-legacy.db");

    let strict = AvailabilityManager::new(primary.clone(), legacy_over(&missing), policy(false));
    let err = strict.startup().await.unwrap_err();
    assert!(!err.reason.is_empty());

    let lenient = AvailabilityManager::new(primary, legacy_over(&missing), policy(true));
    let snapshot = lenient.startup().await.unwrap();
    assert!(snapshot.primary_available());
    assert!(!snapshot.legacy_available());
    assert_eq!(snapshot.mode(), ServiceMode::Degraded);
}

#[tokio::test]
async fn rule_edits_invalidate_cached_results() {
    let primary = MockStore::up("primary", stats_row());
    let svc = service(primary.clone(), MockStore::up("legacy", stats_row()), GatewayConfig::default()).await;

    svc.get_client_stats().await.unwrap();
    assert_eq!(svc.gateway().stats().cache_entries, 1);

    assert!(!svc.toggle_rule("PP_NOM_REQUIRED").unwrap());
    assert_eq!(svc.gateway().stats().cache_entries, 0);

    let after = svc.get_client_stats().await.unwrap();
    assert!(!after.cached);
    assert_eq!(primary.query_count(), 2);
}

#[tokio::test]
async fn real_stores_serve_the_seeded_population() {
    let dir = TempDir::new().unwrap();
    let primary = Arc::new(SqliteStore::new(seeded_db(&dir, "primary.db")));
    let legacy = legacy_over(&seeded_db(&dir, "legacy.db"));
    let svc = service(primary, legacy, GatewayConfig::default()).await;

    assert_eq!(svc.health().mode, ServiceMode::Full);

    let stats: ClientStats = svc.get_client_stats().await.unwrap().data;
    assert_eq!((stats.total, stats.individual, stats.corporate, stats.institutional), (13, 7, 4, 2));
    assert_eq!(stats.fatca, 3);

    let metrics = svc.get_validation_metrics().await.unwrap();
    assert_eq!(metrics.data.iter().map(|m| m.total_records).sum::<u64>(), 13);
    assert_eq!(metrics.data.iter().map(|m| m.valid_records).sum::<u64>(), 6);
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let primary = MockStore::slow("primary", stats_row(), Duration::from_millis(500));
    let svc = service(primary, MockStore::down("legacy"), GatewayConfig::default()).await;

    let waiter = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.get_client_stats().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(svc.shutdown(), 1);
    assert_eq!(svc.shutdown(), 0);
    assert!(matches!(waiter.await.unwrap(), Err(GatewayError::Aborted { .. })));
}

#[tokio::test]
async fn rule_edit_during_fetch_is_not_served_stale_results() {
    let primary = MockStore::slow("primary", stats_row(), Duration::from_millis(300));
    let svc = service(primary.clone(), MockStore::down("legacy"), GatewayConfig::default()).await;

    let before_edit = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.get_client_stats().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    svc.toggle_rule("PP_NOM_REQUIRED").unwrap();

    let after_edit = svc.get_client_stats().await.unwrap();
    assert!(!after_edit.cached);
    assert_eq!(primary.query_count(), 2);
    assert_eq!(svc.gateway().stats().dedup_joins, 0);

    let stale = before_edit.await.unwrap().unwrap();
    assert!(!stale.cached);

    let later = svc.get_client_stats().await.unwrap();
    assert!(later.cached);
    assert_eq!(primary.query_count(), 2);
}

#[tokio::test]
async fn reads_during_reprobe_use_last_known_availability() {
    let primary = MockStore::slow_to_reprobe("primary", stats_row(), Duration::from_millis(300));
    let legacy = MockStore::slow_to_reprobe("legacy", stats_row(), Duration::from_millis(300));
    let svc = service(primary.clone(), legacy, GatewayConfig::default()).await;

    let reprobe = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.reprobe().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(svc.health().mode, ServiceMode::Full);
    let during = svc.get_client_stats().await.unwrap();
    assert_eq!(during.source, DataSource::Primary);
    assert!(!during.fallback);
    assert_eq!(primary.query_count(), 1);

    let after = reprobe.await.unwrap();
    assert_eq!(after.mode(), ServiceMode::Full);
}
