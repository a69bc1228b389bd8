use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::delivery::{
    AddressCache, CacheStatistics, DeliveryConfiguration, DeliveryMode, DeliveryOverview, HybridPriority,
    HybridSetup, NeighborhoodZone, NewRadiusTier, NewZone, RadiusTier, ServiceLocale, UnifiedResult,
};
use crate::error::AppError;

use super::state::AppState;

type ApiResult<T> = Result<Json<T>, AppError>;

// ─── Health ──────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Validation ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ValidateRequest {
    address: String,
    #[serde(default)]
    order_total: Option<Decimal>,
}

pub async fn validate(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(req): Json<ValidateRequest>,
) -> ApiResult<UnifiedResult> {
    let address = req.address.trim();
    if address.is_empty() {
        return Err(AppError::BadRequest("'address' must not be empty".into()));
    }
    let result = state
        .coordinator
        .validate_address(address, tenant, req.order_total)
        .await?;
    Ok(Json(result))
}

// ─── Configuration ───────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConfigurationRequest {
    mode: DeliveryMode,
    #[serde(default)]
    free_delivery_minimum: Option<Decimal>,
    #[serde(default)]
    default_fee: Decimal,
    #[serde(default)]
    hybrid_priority: HybridPriority,
    #[serde(default)]
    locale: ServiceLocale,
}

pub async fn get_configuration(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
) -> ApiResult<DeliveryConfiguration> {
    state
        .admin
        .configuration(tenant)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("tenant {tenant} has no delivery configuration")))
}

pub async fn put_configuration(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(req): Json<ConfigurationRequest>,
) -> ApiResult<DeliveryConfiguration> {
    let config = DeliveryConfiguration {
        tenant_id: tenant,
        mode: req.mode,
        free_delivery_minimum: req.free_delivery_minimum,
        default_fee: req.default_fee,
        hybrid_priority: req.hybrid_priority,
        locale: req.locale,
    };
    Ok(Json(state.admin.save_configuration(config).await?))
}

// ─── Neighborhood zones ──────────────────────────────────────────

#[derive(Serialize)]
pub struct Created<T> {
    count: usize,
    created: Vec<T>,
}

impl<T> Created<T> {
    fn new(created: Vec<T>) -> Self {
        Self {
            count: created.len(),
            created,
        }
    }
}

pub async fn list_neighborhoods(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
) -> ApiResult<Vec<NeighborhoodZone>> {
    Ok(Json(state.admin.list_zones(tenant).await?))
}

pub async fn add_neighborhood(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(zone): Json<NewZone>,
) -> Result<(StatusCode, Json<NeighborhoodZone>), AppError> {
    let zone = state.admin.add_zone(tenant, zone).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn bulk_add_neighborhoods(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(zones): Json<Vec<NewZone>>,
) -> ApiResult<Created<NeighborhoodZone>> {
    let created = state.admin.bulk_add_neighborhoods(tenant, zones).await?;
    Ok(Json(Created::new(created)))
}

pub async fn deactivate_neighborhood(
    State(state): State<Arc<AppState>>,
    Path((tenant, zone)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.admin.deactivate_zone(tenant, zone).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Radius tiers ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddTierRequest {
    center_address: String,
    #[serde(flatten)]
    tier: NewRadiusTier,
}

#[derive(Deserialize)]
pub struct BulkTiersRequest {
    center_address: String,
    tiers: Vec<NewRadiusTier>,
}

pub async fn list_radius(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
) -> ApiResult<Vec<RadiusTier>> {
    Ok(Json(state.admin.list_tiers(tenant).await?))
}

pub async fn add_radius(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(req): Json<AddTierRequest>,
) -> Result<(StatusCode, Json<RadiusTier>), AppError> {
    let tier = state
        .admin
        .add_radius_tier(tenant, &req.center_address, req.tier)
        .await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

pub async fn bulk_add_radius(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(req): Json<BulkTiersRequest>,
) -> ApiResult<Created<RadiusTier>> {
    let created = state
        .admin
        .bulk_add_radius_tiers(tenant, &req.center_address, req.tiers)
        .await?;
    Ok(Json(Created::new(created)))
}

pub async fn deactivate_radius(
    State(state): State<Arc<AppState>>,
    Path((tenant, tier)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.admin.deactivate_tier(tenant, tier).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Hybrid & overview ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct HybridSetupRequest {
    center_address: String,
    #[serde(default)]
    neighborhoods: Vec<NewZone>,
    #[serde(default)]
    tiers: Vec<NewRadiusTier>,
}

pub async fn setup_hybrid(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(req): Json<HybridSetupRequest>,
) -> ApiResult<HybridSetup> {
    let setup = state
        .admin
        .setup_hybrid(tenant, &req.center_address, req.neighborhoods, req.tiers)
        .await?;
    Ok(Json(setup))
}

pub async fn overview(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
) -> ApiResult<DeliveryOverview> {
    Ok(Json(state.admin.delivery_overview(tenant).await?))
}

// ─── Cache maintenance ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct StatsQuery {
    days: Option<u32>,
}

pub async fn cache_stats(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Query(params): Query<StatsQuery>,
) -> ApiResult<CacheStatistics> {
    let days = params.days.unwrap_or(AddressCache::DEFAULT_TTL_DAYS);
    Ok(Json(state.coordinator.cache_statistics(tenant, days).await?))
}

#[derive(Deserialize)]
pub struct InvalidateRequest {
    address: String,
}

#[derive(Serialize)]
pub struct Invalidated {
    invalidated: bool,
}

pub async fn cache_invalidate(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<Uuid>,
    Json(req): Json<InvalidateRequest>,
) -> ApiResult<Invalidated> {
    let invalidated = state.coordinator.invalidate(&req.address, tenant).await?;
    Ok(Json(Invalidated { invalidated }))
}

#[derive(Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    tenant_id: Option<Uuid>,
    #[serde(default)]
    ttl_days: Option<u32>,
}

#[derive(Serialize)]
pub struct CleanupResponse {
    deleted: usize,
}

pub async fn cache_cleanup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CleanupRequest>,
) -> ApiResult<CleanupResponse> {
    let ttl_days = req.ttl_days.unwrap_or_else(|| state.coordinator.cache().ttl_days());
    let deleted = state.coordinator.cache_cleanup(req.tenant_id, ttl_days).await?;
    Ok(Json(CleanupResponse { deleted }))
}
