//! Inbound operations
//!
//! One `DataQualityService` per process (or per test), built from explicit
//! parts: the rule book, the gateway and the availability manager. Reads go
//! through the gateway; record validation and catalog edits do not touch
//! any store.

use crate::availability::{AvailabilityManager, ServiceMode, StoreAvailability};
use crate::fatca::{FatcaClient, FatcaIndicators, FatcaStats};
use crate::gateway::{FetchPriority, Fetched, Gateway, GatewayError, GatewayStatsSnapshot};
use crate::models::{BranchCount, CategoryMetrics, ClientCategory, ClientRecord, ClientStats, Page};
use crate::queries::{
    AnomaliesByBranchPlan, AnomaliesPlan, ClientStatsPlan, FatcaClientsPlan, FatcaIndicatorsPlan,
    FatcaStatsPlan, PageRequest, ValidationMetricsPlan,
};
use crate::rules::{evaluate, ConfigurationError, RuleBook, RuleEditError, ValidationResult, ValidationRule};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub type Clock = fn() -> NaiveDate;

pub fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// Anomaly listing request as received from callers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalyQuery {
    pub category: Option<ClientCategory>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub branch: Option<String>,
    pub for_export: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub mode: ServiceMode,
    pub availability: StoreAvailability,
    pub gateway: GatewayStatsSnapshot,
    pub rules: usize,
    pub active_rules: usize,
}

pub struct DataQualityService {
    rules: Arc<RuleBook>,
    gateway: Gateway,
    availability: Arc<AvailabilityManager>,
    clock: Clock,
}

impl DataQualityService {
    pub fn new(rules: Arc<RuleBook>, gateway: Gateway) -> Self {
        let availability = gateway.availability().clone();
        Self {
            rules,
            gateway,
            availability,
            clock: local_today,
        }
    }

    /// Fixed "today" for reproducible evaluation.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn rules(&self) -> &Arc<RuleBook> {
        &self.rules
    }

    pub async fn get_client_stats(&self) -> Result<Fetched<ClientStats>, GatewayError> {
        let plan = ClientStatsPlan {
            catalog: self.rules.snapshot(),
            today: self.today(),
        };
        self.gateway.fetch_as(Arc::new(plan), FetchPriority::Interactive).await
    }

    pub async fn get_validation_metrics(&self) -> Result<Fetched<Vec<CategoryMetrics>>, GatewayError> {
        let plan = ValidationMetricsPlan {
            catalog: self.rules.snapshot(),
            today: self.today(),
        };
        self.gateway.fetch_as(Arc::new(plan), FetchPriority::Interactive).await
    }

    pub async fn get_anomalies(&self, query: AnomalyQuery) -> Result<Fetched<Page<ClientRecord>>, GatewayError> {
        let priority = if query.for_export {
            FetchPriority::Export
        } else {
            FetchPriority::Interactive
        };
        let plan = AnomaliesPlan {
            catalog: self.rules.snapshot(),
            today: self.today(),
            category: query.category,
            branch: query.branch.filter(|b| !b.trim().is_empty()),
            page: PageRequest::new(query.page, query.limit, query.for_export),
            for_export: query.for_export,
        };
        self.gateway.fetch_as(Arc::new(plan), priority).await
    }

    pub async fn get_anomalies_by_branch(&self) -> Result<Fetched<Vec<BranchCount>>, GatewayError> {
        let plan = AnomaliesByBranchPlan {
            catalog: self.rules.snapshot(),
            today: self.today(),
        };
        self.gateway.fetch_as(Arc::new(plan), FetchPriority::Interactive).await
    }

    /// Always a structured result; only an inconsistent catalog or an
    /// unknown category is an error.
    pub fn validate_record(&self, record: &ClientRecord) -> Result<ValidationResult, ConfigurationError> {
        evaluate(record, &self.rules.snapshot(), self.today())
    }

    pub async fn get_fatca_stats(&self, scope: Option<ClientCategory>) -> Result<Fetched<FatcaStats>, GatewayError> {
        let plan = FatcaStatsPlan {
            today: self.today(),
            scope,
        };
        self.gateway.fetch_as(Arc::new(plan), FetchPriority::Interactive).await
    }

    pub async fn get_fatca_indicators(&self) -> Result<Fetched<FatcaIndicators>, GatewayError> {
        let plan = FatcaIndicatorsPlan { today: self.today() };
        self.gateway.fetch_as(Arc::new(plan), FetchPriority::Interactive).await
    }

    pub async fn get_fatca_clients(
        &self,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Fetched<Page<FatcaClient>>, GatewayError> {
        let plan = FatcaClientsPlan {
            today: self.today(),
            page: PageRequest::new(page, limit, false),
        };
        self.gateway.fetch_as(Arc::new(plan), FetchPriority::Interactive).await
    }

    /// Warm the cache with the dashboard headline resources.
    pub async fn prefetch(&self) {
        let stats = ClientStatsPlan {
            catalog: self.rules.snapshot(),
            today: self.today(),
        };
        let metrics = ValidationMetricsPlan {
            catalog: self.rules.snapshot(),
            today: self.today(),
        };
        let (a, b) = tokio::join!(
            self.gateway.fetch(Arc::new(stats), FetchPriority::Prefetch),
            self.gateway.fetch(Arc::new(metrics), FetchPriority::Prefetch),
        );
        info!(
            "🔥 Prefetch done: client_stats={} validation_metrics={}",
            a.map(|f| format!("{:?}", f.source)).unwrap_or_else(|e| e.to_string()),
            b.map(|f| format!("{:?}", f.source)).unwrap_or_else(|e| e.to_string())
        );
    }

    pub fn list_rules(&self, category: Option<ClientCategory>) -> Vec<ValidationRule> {
        self.rules.list(category)
    }

    pub fn add_rule(&self, rule: ValidationRule) -> Result<(), RuleEditError> {
        self.rules.add(rule)?;
        // anomaly counts must never lag the rules
        self.gateway.clear_cache();
        Ok(())
    }

    pub fn update_rule(&self, id: &str, rule: ValidationRule) -> Result<(), RuleEditError> {
        self.rules.update(id, rule)?;
        self.gateway.clear_cache();
        Ok(())
    }

    pub fn delete_rule(&self, id: &str) -> Result<ValidationRule, RuleEditError> {
        let removed = self.rules.delete(id)?;
        self.gateway.clear_cache();
        Ok(removed)
    }

    /// Returns the new active state.
    pub fn toggle_rule(&self, id: &str) -> Result<bool, RuleEditError> {
        let active = self.rules.toggle(id)?;
        self.gateway.clear_cache();
        Ok(active)
    }

    pub fn clear_cache(&self) -> usize {
        self.gateway.clear_cache()
    }

    pub async fn reprobe(&self) -> Arc<StoreAvailability> {
        let snapshot = self.availability.reprobe().await;
        self.gateway.clear_cache();
        snapshot
    }

    pub fn health(&self) -> HealthReport {
        let availability = self.availability.snapshot();
        let catalog = self.rules.snapshot();
        HealthReport {
            mode: availability.mode(),
            availability: (*availability).clone(),
            gateway: self.gateway.stats(),
            rules: catalog.rules().len(),
            active_rules: catalog.rules().iter().filter(|r| r.is_active).count(),
        }
    }

    pub fn shutdown(&self) -> usize {
        self.gateway.abort_all()
    }
}
