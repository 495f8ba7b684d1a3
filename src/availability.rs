//! Store Availability Manager
//!
//! Two independent probe states, one per store, published together as one
//! immutable snapshot through `ArcSwap`: readers always see a consistent
//! pair, writers (startup and on-demand re-probe) replace it whole.

use crate::gateway::DataSource;
use crate::store::{RecordStore, StoreError};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeState {
    Unknown,
    Probing,
    Available,
    Unavailable { reason: String },
}

impl ProbeState {
    pub fn is_available(&self) -> bool {
        matches!(self, ProbeState::Available)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceMode {
    /// Both stores answer
    Full,
    /// Legacy store down, running on primary data and fallbacks
    Degraded,
    /// No live store, demo data only
    DemoOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreAvailability {
    pub primary: ProbeState,
    pub legacy: ProbeState,
    pub checked_at: Option<DateTime<Utc>>,
}

impl Default for StoreAvailability {
    fn default() -> Self {
        Self {
            primary: ProbeState::Unknown,
            legacy: ProbeState::Unknown,
            checked_at: None,
        }
    }
}

impl StoreAvailability {
    pub fn primary_available(&self) -> bool {
        self.primary.is_available()
    }

    pub fn legacy_available(&self) -> bool {
        self.legacy.is_available()
    }

    pub fn mode(&self) -> ServiceMode {
        match (self.primary_available(), self.legacy_available()) {
            (true, true) => ServiceMode::Full,
            (false, false) => ServiceMode::DemoOnly,
            _ => ServiceMode::Degraded,
        }
    }
}

/// Live tier of the gateway's fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTier {
    Primary,
    Legacy,
}

impl StoreTier {
    pub fn source(&self) -> DataSource {
        match self {
            StoreTier::Primary => DataSource::Primary,
            StoreTier::Legacy => DataSource::Legacy,
        }
    }
}

impl fmt::Display for StoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTier::Primary => write!(f, "primary"),
            StoreTier::Legacy => write!(f, "legacy"),
        }
    }
}

#[derive(Clone)]
pub struct TierHandle {
    pub tier: StoreTier,
    pub store: Arc<dyn RecordStore>,
    pub available: bool,
}

#[derive(Debug, Clone)]
pub struct ProbePolicy {
    pub allow_degraded: bool,
    /// Attempts per store at startup; re-probes try once
    pub attempts: u32,
    pub retry_delay: Duration,
    pub probe_timeout: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            allow_degraded: false,
            attempts: 3,
            retry_delay: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(8),
        }
    }
}

/// Legacy store unreachable while degraded mode is not permitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupFatal {
    pub reason: String,
}

impl fmt::Display for StartupFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "legacy store unavailable ({}) and degraded mode is not allowed",
            self.reason
        )
    }
}

impl std::error::Error for StartupFatal {}

pub struct AvailabilityManager {
    primary: Arc<dyn RecordStore>,
    legacy: Arc<dyn RecordStore>,
    policy: ProbePolicy,
    current: ArcSwap<StoreAvailability>,
    probe_lock: Mutex<()>,
}

impl AvailabilityManager {
    pub fn new(primary: Arc<dyn RecordStore>, legacy: Arc<dyn RecordStore>, policy: ProbePolicy) -> Self {
        Self {
            primary,
            legacy,
            policy,
            current: ArcSwap::new(Arc::new(StoreAvailability::default())),
            probe_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    pub fn snapshot(&self) -> Arc<StoreAvailability> {
        self.current.load_full()
    }

    /// Probe both stores with retries and decide whether the process may
    /// serve traffic.
    pub async fn startup(&self) -> Result<Arc<StoreAvailability>, StartupFatal> {
        let snapshot = self.probe_all(self.policy.attempts.max(1)).await;

        if let ProbeState::Unavailable { reason } = &snapshot.legacy {
            if !self.policy.allow_degraded {
                error!("🛑 Legacy store unavailable and degraded mode not allowed: {}", reason);
                return Err(StartupFatal { reason: reason.clone() });
            }
            warn!("⚠️ Starting in DEGRADED mode: legacy store unavailable ({})", reason);
        }

        info!(
            "🚦 Store availability: primary={} legacy={} mode={:?}",
            snapshot.primary_available(),
            snapshot.legacy_available(),
            snapshot.mode()
        );
        Ok(snapshot)
    }

    /// Operator-triggered single-attempt re-check.
    pub async fn reprobe(&self) -> Arc<StoreAvailability> {
        let snapshot = self.probe_all(1).await;
        info!(
            "🔄 Re-probed stores: primary={} legacy={}",
            snapshot.primary_available(),
            snapshot.legacy_available()
        );
        snapshot
    }

    async fn probe_all(&self, attempts: u32) -> Arc<StoreAvailability> {
        let _guard = self.probe_lock.lock().await;

        // Only the very first probe is published as in progress; later
        // probes keep serving the last known state until the new one is ready.
        if self.snapshot().checked_at.is_none() {
            self.current.store(Arc::new(StoreAvailability {
                primary: ProbeState::Probing,
                legacy: ProbeState::Probing,
                checked_at: None,
            }));
        }

        let (primary, legacy) = tokio::join!(
            probe_with_retry(self.primary.as_ref(), attempts, &self.policy),
            probe_with_retry(self.legacy.as_ref(), attempts, &self.policy),
        );

        let snapshot = Arc::new(StoreAvailability {
            primary,
            legacy,
            checked_at: Some(Utc::now()),
        });
        self.current.store(snapshot.clone());
        snapshot
    }

    /// Live tiers in fallback order, flagged with the availability they had
    /// in `snapshot`.
    pub fn tiers(&self, snapshot: &StoreAvailability) -> Vec<TierHandle> {
        vec![
            TierHandle {
                tier: StoreTier::Primary,
                store: self.primary.clone(),
                available: snapshot.primary_available(),
            },
            TierHandle {
                tier: StoreTier::Legacy,
                store: self.legacy.clone(),
                available: snapshot.legacy_available(),
            },
        ]
    }
}

async fn probe_with_retry(store: &dyn RecordStore, attempts: u32, policy: &ProbePolicy) -> ProbeState {
    let mut last = StoreError::Unavailable("not probed".to_string());

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.probe_timeout, store.probe()).await {
            Ok(Ok(())) => {
                info!("✅ {} store available", store.name());
                return ProbeState::Available;
            }
            Ok(Err(e)) => {
                warn!("⚠️ {} store probe {}/{} failed: {}", store.name(), attempt, attempts, e);
                last = e;
            }
            Err(_) => {
                warn!(
                    "⏱️ {} store probe {}/{} timed out after {:?}",
                    store.name(),
                    attempt,
                    attempts,
                    policy.probe_timeout
                );
                last = StoreError::Unavailable(format!("probe timed out after {:?}", policy.probe_timeout));
            }
        }
        if attempt < attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    ProbeState::Unavailable { reason: last.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Rows, SqlParam};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` probes, then answers.
    struct Flaky {
        failures: u32,
        probes: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                probes: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl RecordStore for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn probe(&self) -> Result<(), StoreError> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(StoreError::Unavailable("connection refused".into()))
            } else {
                Ok(())
            }
        }

        async fn query(&self, _sql: &str, _params: Vec<SqlParam>) -> Result<Rows, StoreError> {
            Ok(Vec::new())
        }
    }

    /// Answers the first probe at once and every later one after `delay`.
    struct Sluggish {
        delay: Duration,
        probes: AtomicU32,
    }

    #[async_trait]
    impl RecordStore for Sluggish {
        fn name(&self) -> &str {
            "sluggish"
        }

        async fn probe(&self) -> Result<(), StoreError> {
            if self.probes.fetch_add(1, Ordering::SeqCst) > 0 {
                tokio::time::sleep(self.delay).await;
            }
            Ok(())
        }

        async fn query(&self, _sql: &str, _params: Vec<SqlParam>) -> Result<Rows, StoreError> {
            Ok(Vec::new())
        }
    }

    fn policy(allow_degraded: bool) -> ProbePolicy {
        ProbePolicy {
            allow_degraded,
            attempts: 3,
            retry_delay: Duration::from_millis(1),
            probe_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn starts_unknown_and_retries_until_available() {
        let primary = Flaky::new(2);
        let manager = AvailabilityManager::new(primary.clone(), Flaky::new(0), policy(false));
        assert_eq!(*manager.snapshot(), StoreAvailability::default());

        let snapshot = manager.startup().await.unwrap();
        assert!(snapshot.primary_available());
        assert!(snapshot.legacy_available());
        assert_eq!(snapshot.mode(), ServiceMode::Full);
        assert_eq!(primary.probes.load(Ordering::SeqCst), 3);
        assert!(snapshot.checked_at.is_some());
    }

    #[tokio::test]
    async fn legacy_down_is_fatal_unless_degraded_allowed() {
        let strict = AvailabilityManager::new(Flaky::new(0), Flaky::new(u32::MAX), policy(false));
        let err = strict.startup().await.unwrap_err();
        assert!(err.reason.contains("connection refused"));

        let lenient = AvailabilityManager::new(Flaky::new(0), Flaky::new(u32::MAX), policy(true));
        let snapshot = lenient.startup().await.unwrap();
        assert!(!snapshot.legacy_available());
        assert_eq!(snapshot.mode(), ServiceMode::Degraded);
        assert!(matches!(snapshot.legacy, ProbeState::Unavailable { .. }));
    }

    #[tokio::test]
    async fn reprobe_picks_up_recovered_store() {
        let legacy = Flaky::new(3);
        let manager = AvailabilityManager::new(Flaky::new(u32::MAX), legacy, policy(true));
        let first = manager.startup().await.unwrap();
        assert_eq!(first.mode(), ServiceMode::DemoOnly);

        let second = manager.reprobe().await;
        assert!(second.legacy_available());
        assert!(!second.primary_available());
        assert_eq!(second.mode(), ServiceMode::Degraded);

        let tiers = manager.tiers(&second);
        assert_eq!(tiers[0].tier, StoreTier::Primary);
        assert!(!tiers[0].available);
        assert!(tiers[1].available);
    }

    #[tokio::test]
    async fn readers_keep_last_known_state_during_reprobe() {
        let sluggish = || {
            Arc::new(Sluggish {
                delay: Duration::from_millis(150),
                probes: AtomicU32::new(0),
            })
        };
        let manager = Arc::new(AvailabilityManager::new(sluggish(), sluggish(), policy(false)));
        let before = manager.startup().await.unwrap();

        let reprobe = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reprobe().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let during = manager.snapshot();
        assert_eq!(during.mode(), ServiceMode::Full);
        assert_eq!(during.checked_at, before.checked_at);

        let after = reprobe.await.unwrap();
        assert_eq!(after.mode(), ServiceMode::Full);
        assert!(after.checked_at > before.checked_at);
    }
}
