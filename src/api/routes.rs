use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::availability::StoreAvailability;
use crate::fatca::{FatcaClient, FatcaIndicators, FatcaStats};
use crate::gateway::{Fetched, GatewayError};
use crate::models::{BranchCount, CategoryMetrics, ClientCategory, ClientRecord, ClientStats, Page};
use crate::rules::{ConfigurationError, RuleEditError, ValidationResult, ValidationRule};
use crate::service::{AnomalyQuery, DataQualityService, HealthReport};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DataQualityService>,
}

/// Create the API router
pub fn create_router(service: Arc<DataQualityService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/clients/stats", get(get_client_stats))
        .route("/api/validation/metrics", get(get_validation_metrics))
        .route("/api/validation/validate", post(validate_record))
        .route("/api/anomalies", get(get_anomalies))
        .route("/api/anomalies/by-branch", get(get_anomalies_by_branch))
        .route("/api/fatca/stats", get(get_fatca_stats))
        .route("/api/fatca/indicators", get(get_fatca_indicators))
        .route("/api/fatca/clients", get(get_fatca_clients))
        .route("/api/rules", get(list_rules).post(add_rule))
        .route("/api/rules/:id", put(update_rule).delete(delete_rule))
        .route("/api/rules/:id/toggle", post(toggle_rule))
        .route("/api/admin/cache/clear", post(clear_cache))
        .route("/api/admin/stores/reprobe", post(reprobe_stores))
        .with_state(state)
}

// ===== Route Handlers =====

/// Availability snapshot, service mode and gateway counters
async fn health_check(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}

async fn get_client_stats(State(state): State<AppState>) -> Result<Json<Fetched<ClientStats>>, ApiError> {
    Ok(Json(state.service.get_client_stats().await?))
}

async fn get_validation_metrics(
    State(state): State<AppState>,
) -> Result<Json<Fetched<Vec<CategoryMetrics>>>, ApiError> {
    Ok(Json(state.service.get_validation_metrics().await?))
}

/// Check one record against the live catalog
async fn validate_record(
    State(state): State<AppState>,
    Json(record): Json<ClientRecord>,
) -> Result<Json<ValidationResult>, ApiError> {
    Ok(Json(state.service.validate_record(&record)?))
}

/// Paginated anomalies; `export=true` widens the page size ceiling
async fn get_anomalies(
    State(state): State<AppState>,
    Query(params): Query<AnomalyParams>,
) -> Result<Json<Fetched<Page<ClientRecord>>>, ApiError> {
    let query = AnomalyQuery {
        category: parse_category(params.category.as_deref())?,
        page: params.page,
        limit: params.limit,
        branch: params.branch,
        for_export: params.export.unwrap_or(false),
    };
    Ok(Json(state.service.get_anomalies(query).await?))
}

async fn get_anomalies_by_branch(
    State(state): State<AppState>,
) -> Result<Json<Fetched<Vec<BranchCount>>>, ApiError> {
    Ok(Json(state.service.get_anomalies_by_branch().await?))
}

async fn get_fatca_stats(
    State(state): State<AppState>,
    Query(params): Query<CategoryParams>,
) -> Result<Json<Fetched<FatcaStats>>, ApiError> {
    let scope = parse_category(params.category.as_deref())?;
    Ok(Json(state.service.get_fatca_stats(scope).await?))
}

async fn get_fatca_indicators(State(state): State<AppState>) -> Result<Json<Fetched<FatcaIndicators>>, ApiError> {
    Ok(Json(state.service.get_fatca_indicators().await?))
}

async fn get_fatca_clients(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<Fetched<Page<FatcaClient>>>, ApiError> {
    Ok(Json(state.service.get_fatca_clients(params.page, params.limit).await?))
}

async fn list_rules(
    State(state): State<AppState>,
    Query(params): Query<CategoryParams>,
) -> Result<Json<Vec<ValidationRule>>, ApiError> {
    let category = parse_category(params.category.as_deref())?;
    Ok(Json(state.service.list_rules(category)))
}

async fn add_rule(
    State(state): State<AppState>,
    Json(rule): Json<ValidationRule>,
) -> Result<(StatusCode, Json<ValidationRule>), ApiError> {
    state.service.add_rule(rule.clone())?;
    Ok((StatusCode::CREATED, Json(rule)))
}

async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut rule): Json<ValidationRule>,
) -> Result<Json<ValidationRule>, ApiError> {
    state.service.update_rule(&id, rule.clone())?;
    rule.id = id;
    Ok(Json(rule))
}

async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ValidationRule>, ApiError> {
    Ok(Json(state.service.delete_rule(&id)?))
}

async fn toggle_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let is_active = state.service.toggle_rule(&id)?;
    Ok(Json(ToggleResponse { id, is_active }))
}

async fn clear_cache(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.service.clear_cache();
    Json(json!({ "cleared": cleared }))
}

async fn reprobe_stores(State(state): State<AppState>) -> Json<StoreAvailability> {
    Json((*state.service.reprobe().await).clone())
}

fn parse_category(raw: Option<&str>) -> Result<Option<ClientCategory>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty() && *s != "all") {
        None => Ok(None),
        Some(s) => ClientCategory::parse(s)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown client category `{}`", s))),
    }
}

// ===== Request/Response Types =====

#[derive(Deserialize)]
struct AnomalyParams {
    /// Category name or `tcli` code; all categories when absent
    category: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
    /// Branch (agency) code
    branch: Option<String>,
    export: Option<bool>,
}

#[derive(Deserialize)]
struct CategoryParams {
    category: Option<String>,
}

#[derive(Deserialize)]
struct PageParams {
    page: Option<u32>,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct ToggleResponse {
    id: String,
    is_active: bool,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    Gateway(GatewayError),
    Configuration(ConfigurationError),
    NotFound(String),
    BadRequest(String),
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::Gateway(err)
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(err: ConfigurationError) -> Self {
        ApiError::Configuration(err)
    }
}

impl From<RuleEditError> for ApiError {
    fn from(err: RuleEditError) -> Self {
        match err {
            RuleEditError::NotFound(id) => ApiError::NotFound(format!("Rule {} not found", id)),
            RuleEditError::Invalid(err) => ApiError::Configuration(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Gateway(err @ GatewayError::DataUnavailable { attempts, .. }) => {
                tracing::warn!("Data unavailable: {}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": err.to_string(), "data_unavailable": true, "attempts": attempts }),
                )
            }
            ApiError::Gateway(err @ GatewayError::Aborted { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": err.to_string(), "aborted": true }),
            ),
            ApiError::Gateway(err @ GatewayError::Decode { .. }) => {
                tracing::error!("Gateway decode error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            ApiError::Configuration(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": err.to_string(), "configuration_error": true }),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let api_err: ApiError = RuleEditError::NotFound("PP_X".into()).into();
        assert!(matches!(api_err, ApiError::NotFound(_)));

        let api_err: ApiError = RuleEditError::Invalid(ConfigurationError::DuplicateRuleId("A".into())).into();
        assert_eq!(api_err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn exhausted_chain_is_distinct_from_empty_result() {
        let err = ApiError::Gateway(GatewayError::DataUnavailable {
            resource: "anomalies".into(),
            attempts: Vec::new(),
            timed_out: true,
        });
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn categories_parse_by_name_or_code() {
        assert_eq!(parse_category(Some("2")).unwrap(), Some(ClientCategory::Corporate));
        assert_eq!(parse_category(Some("individual")).unwrap(), Some(ClientCategory::Individual));
        assert_eq!(parse_category(Some("all")).unwrap(), None);
        assert_eq!(parse_category(None).unwrap(), None);
        assert!(matches!(parse_category(Some("trust")), Err(ApiError::BadRequest(_))));
    }
}
