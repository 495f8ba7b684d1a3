//! Data Access Gateway
//!
//! `fetch(plan, priority)` tries, in order:
//! 1. the TTL cache
//! 2. the live stores available in the current availability snapshot
//!    (primary, then legacy), one shared fetch per in-flight key
//! 3. the plan's bundled demo data, never cached
//!
//! A caller's timeout only ends that caller's wait; the shared fetch keeps
//! running and fills the cache for the other waiters. `abort_all` cancels
//! every in-flight fetch.

pub mod cache;
pub mod chain;

use crate::availability::{AvailabilityManager, TierHandle};
use crate::store::{RecordStore, StoreError};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

pub use cache::{CacheEntry, TtlCache};
pub use chain::{FailureKind, Loaded, TierFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Primary,
    Legacy,
    Demo,
}

/// Caller class, selects the wait bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPriority {
    /// User-triggered
    Interactive,
    /// Speculative warm-up
    Prefetch,
    /// Bulk export
    Export,
}

/// Cache and dedup key: resource name plus normalized parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    name: &'static str,
    params: BTreeMap<&'static str, String>,
}

impl ResourceKey {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, param: &'static str, value: impl ToString) -> Self {
        self.params.insert(param, value.to_string());
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        let mut sep = '?';
        for (k, v) in &self.params {
            write!(f, "{}{}={}", sep, k, v)?;
            sep = '&';
        }
        Ok(())
    }
}

/// How one resource is loaded from a live store, and what stands in for it
/// when no store answers.
#[async_trait]
pub trait ResourcePlan: Send + Sync {
    fn key(&self) -> ResourceKey;

    /// Authoritative data lives in the legacy store
    fn legacy_dependent(&self) -> bool {
        false
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError>;

    /// Demo data of the same shape; `None` when there is none
    fn demo(&self) -> Option<Value>;
}

/// Gateway result plus where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fetched<T> {
    pub data: T,
    pub source: DataSource,
    pub fallback: bool,
    pub cached: bool,
    pub legacy_available: bool,
    /// Legacy-dependent resource served while the legacy store is down
    pub degraded: bool,
}

impl<T> Fetched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            source: self.source,
            fallback: self.fallback,
            cached: self.cached,
            legacy_available: self.legacy_available,
            degraded: self.degraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Every tier failed and the resource has no demo data
    DataUnavailable {
        resource: String,
        attempts: Vec<TierFailure>,
        timed_out: bool,
    },
    Aborted { resource: String },
    Decode { resource: String, reason: String },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataUnavailable {
                resource,
                attempts,
                timed_out,
            } => {
                write!(f, "data unavailable for {}", resource)?;
                if *timed_out {
                    write!(f, " (wait timed out)")?;
                }
                for attempt in attempts {
                    write!(f, "; {}", attempt)?;
                }
                Ok(())
            }
            Self::Aborted { resource } => write!(f, "fetch of {} was aborted", resource),
            Self::Decode { resource, reason } => write!(f, "cannot decode {}: {}", resource, reason),
        }
    }
}

impl std::error::Error for GatewayError {}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub sweep_interval: Duration,
    pub interactive_timeout: Duration,
    pub prefetch_timeout: Duration,
    pub export_timeout: Duration,
    /// Bound on one store call inside the chain
    pub backend_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 100,
            sweep_interval: Duration::from_secs(60),
            interactive_timeout: Duration::from_millis(8000),
            prefetch_timeout: Duration::from_millis(5000),
            export_timeout: Duration::from_millis(15000),
            backend_timeout: Duration::from_millis(8000),
        }
    }
}

impl GatewayConfig {
    pub fn timeout_for(&self, priority: FetchPriority) -> Duration {
        match priority {
            FetchPriority::Interactive => self.interactive_timeout,
            FetchPriority::Prefetch => self.prefetch_timeout,
            FetchPriority::Export => self.export_timeout,
        }
    }
}

#[derive(Debug, Default)]
pub struct GatewayStats {
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub backend_calls: AtomicU64,
    pub dedup_joins: AtomicU64,
    pub fallbacks: AtomicU64,
    pub timeouts: AtomicU64,
    pub aborted: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub backend_calls: u64,
    pub dedup_joins: u64,
    pub fallbacks: u64,
    pub timeouts: u64,
    pub aborted: u64,
    pub cache_entries: usize,
    pub in_flight: usize,
}

/// Outcome shared by every waiter of one live fetch
#[derive(Debug, Clone)]
enum LiveOutcome {
    Loaded(Loaded),
    Failed(Vec<TierFailure>),
    Aborted,
}

type SharedFetch = Shared<BoxFuture<'static, LiveOutcome>>;

struct InFlight {
    id: u64,
    fetch: SharedFetch,
    abort: AbortHandle,
}

enum Join {
    Cached(CacheEntry),
    Pending(SharedFetch),
}

struct Inner {
    config: GatewayConfig,
    availability: Arc<AvailabilityManager>,
    cache: TtlCache,
    // lock order: in_flight, then cache
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_id: AtomicU64,
    stats: GatewayStats,
}

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, availability: Arc<AvailabilityManager>) -> Self {
        let cache = TtlCache::new(config.cache_ttl, config.cache_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                availability,
                cache,
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                stats: GatewayStats::default(),
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn availability(&self) -> &Arc<AvailabilityManager> {
        &self.inner.availability
    }

    pub async fn fetch(
        &self,
        plan: Arc<dyn ResourcePlan>,
        priority: FetchPriority,
    ) -> Result<Fetched<Arc<Value>>, GatewayError> {
        let inner = &self.inner;
        let key = plan.key().to_string();
        let availability = inner.availability.snapshot();
        let legacy_available = availability.legacy_available();
        let envelope = |data: Arc<Value>, source: DataSource, fallback: bool, cached: bool| Fetched {
            data,
            source,
            fallback,
            cached,
            legacy_available,
            degraded: plan.legacy_dependent() && !legacy_available,
        };

        if let Some(hit) = inner.cache.get(&key) {
            inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("🎯 Cache hit for {}", key);
            return Ok(envelope(hit.data, hit.source, false, true));
        }
        inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let tiers = inner.availability.tiers(&availability);
        let (failures, timed_out) = if tiers.iter().any(|t| t.available) {
            match self.join_or_start(&key, plan.clone(), tiers) {
                Join::Cached(hit) => {
                    inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(envelope(hit.data, hit.source, false, true));
                }
                Join::Pending(fetch) => {
                    let wait = inner.config.timeout_for(priority);
                    match tokio::time::timeout(wait, fetch).await {
                        Ok(LiveOutcome::Loaded(loaded)) => {
                            return Ok(envelope(loaded.data, loaded.source, false, false));
                        }
                        Ok(LiveOutcome::Failed(failures)) => (failures, false),
                        Ok(LiveOutcome::Aborted) => return Err(GatewayError::Aborted { resource: key }),
                        Err(_) => {
                            inner.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                            warn!("⏱️ Gave up waiting for {} after {:?}", key, wait);
                            (Vec::new(), true)
                        }
                    }
                }
            }
        } else {
            let skipped = tiers
                .iter()
                .map(|t| TierFailure {
                    tier: t.tier,
                    kind: FailureKind::Skipped,
                })
                .collect();
            (skipped, false)
        };

        match plan.demo() {
            Some(data) => {
                inner.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                warn!("🧪 Serving demo data for {}", key);
                Ok(envelope(Arc::new(data), DataSource::Demo, true, false))
            }
            None => Err(GatewayError::DataUnavailable {
                resource: key,
                attempts: failures,
                timed_out,
            }),
        }
    }

    /// `fetch` decoded into `T`.
    pub async fn fetch_as<T: DeserializeOwned>(
        &self,
        plan: Arc<dyn ResourcePlan>,
        priority: FetchPriority,
    ) -> Result<Fetched<T>, GatewayError> {
        let resource = plan.key().to_string();
        let fetched = self.fetch(plan, priority).await?;
        let data = T::deserialize(fetched.data.as_ref()).map_err(|e| GatewayError::Decode {
            resource,
            reason: e.to_string(),
        })?;
        Ok(fetched.map(|_| data))
    }

    fn join_or_start(
        &self,
        key: &str,
        plan: Arc<dyn ResourcePlan>,
        tiers: Vec<TierHandle>,
    ) -> Join {
        let mut in_flight = self.inner.in_flight.lock();

        // a fetch may have completed between the first lookup and this lock
        if let Some(hit) = self.inner.cache.get(key) {
            return Join::Cached(hit);
        }
        if let Some(existing) = in_flight.get(key) {
            self.inner.stats.dedup_joins.fetch_add(1, Ordering::Relaxed);
            debug!("🔗 Joining in-flight fetch for {}", key);
            return Join::Pending(existing.fetch.clone());
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let task_inner = self.inner.clone();
        let task_key = key.to_string();
        let handle: JoinHandle<Result<Loaded, Vec<TierFailure>>> = tokio::spawn(async move {
            let outcome = chain::run(
                &tiers,
                plan.as_ref(),
                task_inner.config.backend_timeout,
                &task_inner.stats,
            )
            .await;

            let mut in_flight = task_inner.in_flight.lock();
            if let Ok(loaded) = &outcome {
                task_inner.cache.put(&task_key, loaded.data.clone(), loaded.source);
            }
            if in_flight.get(&task_key).map_or(false, |f| f.id == id) {
                in_flight.remove(&task_key);
            }
            outcome
        });

        let abort = handle.abort_handle();
        let fetch = async move {
            match handle.await {
                Ok(Ok(loaded)) => LiveOutcome::Loaded(loaded),
                Ok(Err(failures)) => LiveOutcome::Failed(failures),
                Err(e) if e.is_cancelled() => LiveOutcome::Aborted,
                Err(e) => {
                    warn!("⚠️ Live fetch task failed: {}", e);
                    LiveOutcome::Failed(Vec::new())
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                fetch: fetch.clone(),
                abort,
            },
        );
        Join::Pending(fetch)
    }

    /// Cancel every in-flight fetch. Waiters get `GatewayError::Aborted`.
    /// Safe to call any number of times.
    pub fn abort_all(&self) -> usize {
        let drained: Vec<InFlight> = self.inner.in_flight.lock().drain().map(|(_, f)| f).collect();
        for fetch in &drained {
            fetch.abort.abort();
        }
        let n = drained.len();
        if n > 0 {
            self.inner.stats.aborted.fetch_add(n as u64, Ordering::Relaxed);
            info!("🛑 Aborted {} in-flight fetches", n);
        }
        n
    }

    pub fn clear_cache(&self) -> usize {
        let n = self.inner.cache.clear();
        info!("🧹 Cache cleared ({} entries)", n);
        n
    }

    pub fn stats(&self) -> GatewayStatsSnapshot {
        let s = &self.inner.stats;
        GatewayStatsSnapshot {
            cache_hits: s.cache_hits.load(Ordering::Relaxed),
            cache_misses: s.cache_misses.load(Ordering::Relaxed),
            backend_calls: s.backend_calls.load(Ordering::Relaxed),
            dedup_joins: s.dedup_joins.load(Ordering::Relaxed),
            fallbacks: s.fallbacks.load(Ordering::Relaxed),
            timeouts: s.timeouts.load(Ordering::Relaxed),
            aborted: s.aborted.load(Ordering::Relaxed),
            cache_entries: self.inner.cache.len(),
            in_flight: self.inner.in_flight.lock().len(),
        }
    }

    /// Periodic removal of expired entries, independent of traffic. Stops
    /// once the gateway is dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let removed = inner.cache.sweep();
                if removed > 0 {
                    debug!("🧹 Cache sweep removed {} expired entries", removed);
                }
            }
        })
    }
}
