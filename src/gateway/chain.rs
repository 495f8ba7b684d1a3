//! Live tiers of the fallback chain
//!
//! An ordered list of stores tried in a loop. Every tier outcome is kept as
//! a [`TierFailure`] so an exhausted chain can be reported as data.

use super::{DataSource, GatewayStats, ResourcePlan};
use crate::availability::{StoreTier, TierHandle};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Store marked unavailable, not attempted
    Skipped,
    Unavailable { reason: String },
    TimedOut { after_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierFailure {
    pub tier: StoreTier,
    #[serde(flatten)]
    pub kind: FailureKind,
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Skipped => write!(f, "{}: marked unavailable", self.tier),
            FailureKind::Unavailable { reason } => write!(f, "{}: {}", self.tier, reason),
            FailureKind::TimedOut { after_ms } => write!(f, "{}: timed out after {}ms", self.tier, after_ms),
        }
    }
}

/// Successful live result
#[derive(Debug, Clone)]
pub struct Loaded {
    pub data: Arc<Value>,
    pub source: DataSource,
}

pub async fn run(
    tiers: &[TierHandle],
    plan: &dyn ResourcePlan,
    backend_timeout: Duration,
    stats: &GatewayStats,
) -> Result<Loaded, Vec<TierFailure>> {
    let resource = plan.key();
    let mut failures = Vec::with_capacity(tiers.len());

    for handle in tiers {
        if !handle.available {
            failures.push(TierFailure {
                tier: handle.tier,
                kind: FailureKind::Skipped,
            });
            continue;
        }

        stats.backend_calls.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(backend_timeout, plan.load(handle.store.as_ref())).await {
            Ok(Ok(data)) => {
                debug!("📥 {} served by {} store", resource, handle.tier);
                return Ok(Loaded {
                    data: Arc::new(data),
                    source: handle.tier.source(),
                });
            }
            Ok(Err(e)) => {
                warn!("⚠️ {} store failed for {}: {}", handle.tier, resource, e);
                failures.push(TierFailure {
                    tier: handle.tier,
                    kind: FailureKind::Unavailable { reason: e.to_string() },
                });
            }
            Err(_) => {
                stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "⏱️ {} store timed out after {:?} for {}",
                    handle.tier, backend_timeout, resource
                );
                failures.push(TierFailure {
                    tier: handle.tier,
                    kind: FailureKind::TimedOut {
                        after_ms: backend_timeout.as_millis() as u64,
                    },
                });
            }
        }
    }

    Err(failures)
}
