//! Resource plans for the gateway
//!
//! Each plan pushes the compiled anomaly filters (or the FATCA indicia)
//! down to a store as SQL and knows its demo stand-in. Demo listings run
//! the same predicates in memory over the bundled sample clients, so live
//! and fallback views never disagree on what an anomaly is.

use crate::fatca::{self, FatcaClient, FatcaIndicium, FatcaStats};
use crate::gateway::{ResourceKey, ResourcePlan};
use crate::models::{BranchCount, CategoryMetrics, ClientCategory, ClientRecord, ClientStats, Field, Page};
use crate::rules::compiler::in_category;
use crate::rules::{Predicate, RuleCatalog, SqlFilter};
use crate::store::sqlite::{AGENCIES_TABLE, CLIENTS_TABLE};
use crate::store::{demo, first_u64, RecordStore, Rows, SqlParam, StoreError};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const MAX_EXPORT_PAGE_SIZE: u32 = 5000;
const MAX_BRANCHES: i64 = 100;

fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Query(format!("cannot encode result: {}", e)))
}

fn to_records(rows: Rows) -> Result<Vec<ClientRecord>, StoreError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| StoreError::Query(format!("malformed client row: {}", e)))
        })
        .collect()
}

/// `SUM(CASE WHEN <filter> THEN 1 ELSE 0 END)`, 0 on an empty table
fn count_where(filter: &SqlFilter, alias: &str) -> String {
    format!(
        "COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0) AS {}",
        filter.clause, alias
    )
}

/// Page number and size after clamping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>, for_export: bool) -> Self {
        let ceiling = if for_export { MAX_EXPORT_PAGE_SIZE } else { MAX_PAGE_SIZE };
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, ceiling),
        }
    }

    fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let data = items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect();
        Page {
            data,
            page: self.page,
            limit: self.limit,
            total,
        }
    }
}

/// Count plus one ordered page of clients matching `filter`.
async fn client_page(
    store: &dyn RecordStore,
    filter: &SqlFilter,
    page: PageRequest,
) -> Result<Page<ClientRecord>, StoreError> {
    let count_sql = format!("SELECT COUNT(*) AS n FROM {} WHERE {}", CLIENTS_TABLE, filter.clause);
    let total = first_u64(&store.query(&count_sql, filter.params.clone()).await?, "n");

    let page_sql = format!(
        "SELECT * FROM {} WHERE {} ORDER BY cli LIMIT ? OFFSET ?",
        CLIENTS_TABLE, filter.clause
    );
    let mut params = filter.params.clone();
    params.push(SqlParam::Int(page.limit as i64));
    params.push(SqlParam::Int(page.offset()));
    let data = to_records(store.query(&page_sql, params).await?)?;

    Ok(Page {
        data,
        page: page.page,
        limit: page.limit,
        total,
    })
}

fn demo_matching(filter: &Predicate, today: NaiveDate) -> Vec<ClientRecord> {
    let mut matching: Vec<ClientRecord> = demo::sample_clients()
        .into_iter()
        .filter(|r| filter.matches(r, today))
        .collect();
    matching.sort_by(|a, b| a.cli.cmp(&b.cli));
    matching
}

/// Headline counts
pub struct ClientStatsPlan {
    pub catalog: Arc<RuleCatalog>,
    pub today: NaiveDate,
}

#[async_trait]
impl ResourcePlan for ClientStatsPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("client_stats")
            .with("rules", self.catalog.generation())
            .with("today", self.today)
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let anomalies = self.catalog.filters().any_category().to_sql(self.today);
        let fatca = fatca::any_indicium().to_sql(self.today);

        let mut columns = vec!["COUNT(*) AS total".to_string()];
        for category in ClientCategory::ALL {
            columns.push(format!(
                "COALESCE(SUM(CASE WHEN tcli = '{}' THEN 1 ELSE 0 END), 0) AS {}",
                category.code(),
                category.as_str()
            ));
        }
        columns.push(count_where(&anomalies, "anomalies"));
        columns.push(count_where(&fatca, "fatca"));

        let sql = format!("SELECT {} FROM {}", columns.join(", "), CLIENTS_TABLE);
        let mut params = anomalies.params;
        params.extend(fatca.params);
        let rows = store.query(&sql, params).await?;

        to_value(&ClientStats {
            total: first_u64(&rows, "total"),
            individual: first_u64(&rows, ClientCategory::Individual.as_str()),
            corporate: first_u64(&rows, ClientCategory::Corporate.as_str()),
            institutional: first_u64(&rows, ClientCategory::Institutional.as_str()),
            anomalies: first_u64(&rows, "anomalies"),
            fatca: first_u64(&rows, "fatca"),
        })
    }

    fn demo(&self) -> Option<Value> {
        to_value(&demo::client_stats()).ok()
    }
}

/// Quality score per category
pub struct ValidationMetricsPlan {
    pub catalog: Arc<RuleCatalog>,
    pub today: NaiveDate,
}

#[async_trait]
impl ResourcePlan for ValidationMetricsPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("validation_metrics")
            .with("rules", self.catalog.generation())
            .with("today", self.today)
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let mut metrics = Vec::with_capacity(ClientCategory::ALL.len());
        for category in ClientCategory::ALL {
            let invalid = self.catalog.filters().for_category(category).to_sql(self.today);
            let sql = format!(
                "SELECT COUNT(*) AS total, {} FROM {} WHERE tcli = ?",
                count_where(&invalid, "invalid"),
                CLIENTS_TABLE
            );
            let mut params = invalid.params;
            params.push(SqlParam::Text(category.code().to_string()));
            let rows = store.query(&sql, params).await?;

            let total = first_u64(&rows, "total");
            let invalid = first_u64(&rows, "invalid").min(total);
            metrics.push(CategoryMetrics::new(category, total, total - invalid));
        }
        to_value(&metrics)
    }

    fn demo(&self) -> Option<Value> {
        to_value(&demo::validation_metrics()).ok()
    }
}

/// Paginated anomaly listing
pub struct AnomaliesPlan {
    pub catalog: Arc<RuleCatalog>,
    pub today: NaiveDate,
    pub category: Option<ClientCategory>,
    pub branch: Option<String>,
    pub page: PageRequest,
    pub for_export: bool,
}

impl AnomaliesPlan {
    /// Category (or cross-category) anomaly filter, narrowed to one branch.
    pub fn filter(&self) -> Predicate {
        let anomalies = match self.category {
            Some(category) => in_category(category, self.catalog.filters().for_category(category).clone()),
            None => self.catalog.filters().any_category(),
        };
        match &self.branch {
            Some(branch) => Predicate::and(vec![anomalies, Predicate::equals(Field::Age, branch.clone())]),
            None => anomalies,
        }
    }
}

#[async_trait]
impl ResourcePlan for AnomaliesPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("anomalies")
            .with("category", self.category.map(|c| c.code()).unwrap_or("all"))
            .with("branch", self.branch.as_deref().unwrap_or(""))
            .with("page", self.page.page)
            .with("limit", self.page.limit)
            .with("export", self.for_export)
            .with("rules", self.catalog.generation())
            .with("today", self.today)
    }

    fn legacy_dependent(&self) -> bool {
        true
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let page = client_page(store, &self.filter().to_sql(self.today), self.page).await?;
        to_value(&page)
    }

    fn demo(&self) -> Option<Value> {
        to_value(&self.page.slice(demo_matching(&self.filter(), self.today))).ok()
    }
}

/// Anomaly counts grouped by branch code
pub struct AnomaliesByBranchPlan {
    pub catalog: Arc<RuleCatalog>,
    pub today: NaiveDate,
}

#[async_trait]
impl ResourcePlan for AnomaliesByBranchPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("anomalies_by_branch")
            .with("rules", self.catalog.generation())
            .with("today", self.today)
    }

    fn legacy_dependent(&self) -> bool {
        true
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let filter = self.catalog.filters().any_category().to_sql(self.today);
        let sql = format!(
            "SELECT COALESCE(c.age, '') AS branch_code, MAX(a.lib_agence) AS branch_name, \
             COUNT(*) AS anomaly_count \
             FROM {} c LEFT JOIN {} a ON a.code_agence = c.age WHERE {} \
             GROUP BY COALESCE(c.age, '') ORDER BY anomaly_count DESC, branch_code LIMIT ?",
            CLIENTS_TABLE, AGENCIES_TABLE, filter.clause
        );
        let mut params = filter.params;
        params.push(SqlParam::Int(MAX_BRANCHES));

        let branches: Vec<BranchCount> = store
            .query(&sql, params)
            .await?
            .into_iter()
            .map(|row| BranchCount {
                branch_code: row
                    .get("branch_code")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                branch_name: row.get("branch_name").and_then(Value::as_str).map(str::to_string),
                anomaly_count: row.get("anomaly_count").and_then(Value::as_u64).unwrap_or(0),
            })
            .collect();
        to_value(&branches)
    }

    fn demo(&self) -> Option<Value> {
        to_value(&demo::branch_anomalies()).ok()
    }
}

/// FATCA totals with an estimated status breakdown
pub struct FatcaStatsPlan {
    pub today: NaiveDate,
    pub scope: Option<ClientCategory>,
}

impl FatcaStatsPlan {
    fn filter(&self) -> Predicate {
        match self.scope {
            Some(category) => in_category(category, fatca::any_indicium()),
            None => fatca::any_indicium(),
        }
    }
}

#[async_trait]
impl ResourcePlan for FatcaStatsPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("fatca_stats")
            .with("category", self.scope.map(|c| c.code()).unwrap_or("all"))
            .with("today", self.today)
    }

    fn legacy_dependent(&self) -> bool {
        true
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let filter = self.filter().to_sql(self.today);
        let sql = format!(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN tcli = '{}' THEN 1 ELSE 0 END), 0) AS individual, \
             COALESCE(SUM(CASE WHEN tcli IN ('{}', '{}') THEN 1 ELSE 0 END), 0) AS corporate \
             FROM {} WHERE {}",
            ClientCategory::Individual.code(),
            ClientCategory::Corporate.code(),
            ClientCategory::Institutional.code(),
            CLIENTS_TABLE,
            filter.clause
        );
        let rows = store.query(&sql, filter.params).await?;
        to_value(&FatcaStats::estimate(
            self.scope,
            first_u64(&rows, "total"),
            first_u64(&rows, "individual"),
            first_u64(&rows, "corporate"),
        ))
    }

    fn demo(&self) -> Option<Value> {
        to_value(&demo::fatca_stats(self.scope)).ok()
    }
}

/// Client count per FATCA indicium
pub struct FatcaIndicatorsPlan {
    pub today: NaiveDate,
}

#[async_trait]
impl ResourcePlan for FatcaIndicatorsPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("fatca_indicators").with("today", self.today)
    }

    fn legacy_dependent(&self) -> bool {
        true
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let mut columns = Vec::with_capacity(FatcaIndicium::ALL.len());
        let mut params = Vec::new();
        for indicium in FatcaIndicium::ALL {
            let filter = indicium.predicate().to_sql(self.today);
            columns.push(count_where(&filter, indicium.as_str()));
            params.extend(filter.params);
        }
        let sql = format!("SELECT {} FROM {}", columns.join(", "), CLIENTS_TABLE);
        let rows = store.query(&sql, params).await?;

        to_value(&fatca::FatcaIndicators {
            nationality: first_u64(&rows, FatcaIndicium::Nationality.as_str()),
            birthplace: first_u64(&rows, FatcaIndicium::Birthplace.as_str()),
            address: first_u64(&rows, FatcaIndicium::Address.as_str()),
            phone: first_u64(&rows, FatcaIndicium::Phone.as_str()),
            proxy: first_u64(&rows, FatcaIndicium::Proxy.as_str()),
        })
    }

    fn demo(&self) -> Option<Value> {
        to_value(&demo::fatca_indicators()).ok()
    }
}

/// Paginated list of clients carrying FATCA indicia
pub struct FatcaClientsPlan {
    pub today: NaiveDate,
    pub page: PageRequest,
}

#[async_trait]
impl ResourcePlan for FatcaClientsPlan {
    fn key(&self) -> ResourceKey {
        ResourceKey::new("fatca_clients")
            .with("page", self.page.page)
            .with("limit", self.page.limit)
            .with("today", self.today)
    }

    fn legacy_dependent(&self) -> bool {
        true
    }

    async fn load(&self, store: &dyn RecordStore) -> Result<Value, StoreError> {
        let page = client_page(store, &fatca::any_indicium().to_sql(self.today), self.page).await?;
        let today = self.today;
        to_value(&Page {
            data: page
                .data
                .iter()
                .map(|r| FatcaClient::from_record(r, today))
                .collect::<Vec<_>>(),
            page: page.page,
            limit: page.limit,
            total: page.total,
        })
    }

    fn demo(&self) -> Option<Value> {
        let clients = demo_matching(&fatca::any_indicium(), self.today)
            .iter()
            .map(|r| FatcaClient::from_record(r, self.today))
            .collect();
        to_value(&self.page.slice(clients)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::{create_schema, insert_agencies, insert_clients};
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    async fn seeded_store(dir: &TempDir) -> SqliteStore {
        let path = dir.path().join("primary.db");
        let mut conn = rusqlite::Connection::open(&path).unwrap();
        create_schema(&conn).unwrap();
        insert_clients(&mut conn, &demo::sample_clients()).unwrap();
        insert_agencies(&mut conn, demo::AGENCIES).unwrap();
        drop(conn);

        let store = SqliteStore::new(path);
        store.probe().await.unwrap();
        store
    }

    fn catalog() -> Arc<RuleCatalog> {
        Arc::new(RuleCatalog::builtin().unwrap())
    }

    #[test]
    fn page_requests_are_clamped() {
        assert_eq!(PageRequest::new(None, None, false), PageRequest { page: 1, limit: 50 });
        assert_eq!(PageRequest::new(Some(0), Some(10_000), false).limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(3), Some(10_000), true).limit, MAX_EXPORT_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(2), Some(0), false), PageRequest { page: 2, limit: 1 });
    }

    #[tokio::test]
    async fn live_and_demo_anomaly_listings_agree() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let plan = AnomaliesPlan {
            catalog: catalog(),
            today: today(),
            category: None,
            branch: None,
            page: PageRequest::new(Some(1), Some(100), false),
            for_export: false,
        };

        let live: Page<ClientRecord> = serde_json::from_value(plan.load(&store).await.unwrap()).unwrap();
        let demo: Page<ClientRecord> = serde_json::from_value(plan.demo().unwrap()).unwrap();
        assert_eq!(live, demo);
        assert_eq!(live.total, 7);
        assert_eq!(live.data[0].cli.as_deref(), Some("CLI000002"));
    }

    #[tokio::test]
    async fn branch_filter_and_paging() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;
        let plan = AnomaliesPlan {
            catalog: catalog(),
            today: today(),
            category: Some(ClientCategory::Individual),
            branch: Some("01001".to_string()),
            page: PageRequest::new(Some(2), Some(1), false),
            for_export: false,
        };
        let page: Page<ClientRecord> = serde_json::from_value(plan.load(&store).await.unwrap()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].cli.as_deref(), Some("CLI000009"));
        assert_eq!(plan.key().to_string(), "anomalies?branch=01001&category=1&export=false&limit=1&page=2&rules=0&today=2026-10-18");
    }

    #[tokio::test]
    async fn stats_metrics_and_branches_from_one_filter() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let stats: ClientStats = serde_json::from_value(
            ClientStatsPlan { catalog: catalog(), today: today() }.load(&store).await.unwrap(),
        )
        .unwrap();
        assert_eq!(stats.total, 13);
        assert_eq!((stats.individual, stats.corporate, stats.institutional), (7, 4, 2));
        assert_eq!(stats.anomalies, 7);
        assert_eq!(stats.fatca, 3);

        let metrics: Vec<CategoryMetrics> = serde_json::from_value(
            ValidationMetricsPlan { catalog: catalog(), today: today() }.load(&store).await.unwrap(),
        )
        .unwrap();
        let invalid: u64 = metrics.iter().map(|m| m.total_records - m.valid_records).sum();
        assert_eq!(invalid, stats.anomalies);

        let branches: Vec<BranchCount> = serde_json::from_value(
            AnomaliesByBranchPlan { catalog: catalog(), today: today() }.load(&store).await.unwrap(),
        )
        .unwrap();
        let per_branch: u64 = branches.iter().map(|b| b.anomaly_count).sum();
        assert_eq!(per_branch, stats.anomalies);
        let ganhi = branches.iter().find(|b| b.branch_code == "01001").unwrap();
        assert_eq!(ganhi.branch_name.as_deref(), Some("AGENCE GANHI"));
        assert_eq!(ganhi.anomaly_count, 2);
        assert!(branches.iter().all(|b| b.branch_name.is_some()));
    }

    #[tokio::test]
    async fn fatca_indicators_counted_per_indicium() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir).await;

        let indicators: fatca::FatcaIndicators =
            serde_json::from_value(FatcaIndicatorsPlan { today: today() }.load(&store).await.unwrap()).unwrap();
        assert_eq!(indicators.nationality, 2);
        assert_eq!(indicators.birthplace, 1);
        assert_eq!(indicators.address, 1);
        assert_eq!(indicators.phone, 1);
        assert_eq!(indicators.proxy, 1);

        let stats: FatcaStats = serde_json::from_value(
            FatcaStatsPlan { today: today(), scope: None }.load(&store).await.unwrap(),
        )
        .unwrap();
        assert_eq!((stats.total, stats.individual, stats.corporate), (3, 2, 1));
        assert!(stats.estimated);

        let clients: Page<FatcaClient> = serde_json::from_value(
            FatcaClientsPlan { today: today(), page: PageRequest::new(None, None, false) }
                .load(&store)
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(clients.total, 3);
        assert_eq!(clients.data[0].cli.as_deref(), Some("CLI000009"));
        assert_eq!(clients.data[2].indicia, vec![FatcaIndicium::Proxy]);
    }
}
