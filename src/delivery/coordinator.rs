//! Entry point for address validation.

use super::cache::{AddressCache, CacheError, CacheStatistics};
use super::geocoding::GeocodingGateway;
use super::hybrid::HybridResolver;
use super::neighborhood::NeighborhoodResolver;
use super::normalize::log_preview;
use super::radius::RadiusResolver;
use super::store::TenantStore;
use super::types::{DeliveryMode, Resolution, TenantId, UnifiedResult, ValidationMethod};
use super::DeliveryError;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads the tenant's configuration, dispatches to the matching resolver and
/// applies the free-delivery threshold.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    store: Arc<dyn TenantStore>,
    cache: AddressCache,
    neighborhood: NeighborhoodResolver,
    radius: RadiusResolver,
    hybrid: HybridResolver,
}

impl DeliveryCoordinator {
    pub fn new(store: Arc<dyn TenantStore>, cache: AddressCache, gateway: GeocodingGateway) -> Self {
        let neighborhood = NeighborhoodResolver::new(store.clone(), cache.clone(), gateway.clone());
        let radius = RadiusResolver::new(store.clone(), cache.clone(), gateway);
        let hybrid = HybridResolver::new(neighborhood.clone(), radius.clone(), cache.clone());
        Self {
            store,
            cache,
            neighborhood,
            radius,
            hybrid,
        }
    }

    pub fn cache(&self) -> &AddressCache {
        &self.cache
    }

    pub async fn validate_address(
        &self,
        address: &str,
        tenant: TenantId,
        order_total: Option<Decimal>,
    ) -> Result<UnifiedResult, DeliveryError> {
        let Some(config) = self.store.configuration(tenant).await? else {
            warn!(tenant = %tenant, "delivery not configured");
            return Ok(not_configured());
        };

        info!(tenant = %tenant, mode = %config.mode, address = %log_preview(address), "validating address");
        let resolution = match config.mode {
            DeliveryMode::Neighborhood => self.neighborhood.resolve(address, &config).await?,
            DeliveryMode::Radius => self.radius.resolve(address, &config).await?,
            DeliveryMode::Hybrid => self.hybrid.resolve(address, &config).await?,
        };

        let mut result = unify(resolution);
        if let (true, Some(minimum), Some(total)) = (result.is_deliverable, config.free_delivery_minimum, order_total) {
            if total >= minimum {
                info!(tenant = %tenant, %total, %minimum, "free delivery threshold reached");
                result.delivery_fee = Some(Decimal::ZERO);
                result.free_delivery_applied = true;
                result.message = format!("{} Free delivery applied for orders from {minimum}.", result.message);
            }
        }
        Ok(result)
    }

    pub async fn cache_statistics(&self, tenant: TenantId, window_days: u32) -> Result<CacheStatistics, CacheError> {
        self.cache.statistics(tenant, window_days).await
    }

    pub async fn cache_cleanup(&self, tenant: Option<TenantId>, ttl_days: u32) -> Result<usize, CacheError> {
        self.cache.cleanup(tenant, ttl_days).await
    }

    pub async fn invalidate(&self, address: &str, tenant: TenantId) -> Result<bool, CacheError> {
        self.cache.invalidate(address, tenant).await
    }
}

fn not_configured() -> UnifiedResult {
    UnifiedResult {
        is_deliverable: false,
        needs_clarification: false,
        delivery_fee: None,
        delivery_time_minutes: None,
        neighborhood: None,
        coordinates: None,
        normalized_address: None,
        distance_km: None,
        message: "Delivery is not configured for this store.".to_string(),
        reason: Some("not configured".to_string()),
        validation_method: Some(ValidationMethod::NotConfigured),
        tried_methods: Vec::new(),
        free_delivery_applied: false,
    }
}

fn unify(resolution: Resolution) -> UnifiedResult {
    match resolution {
        Resolution::Deliverable(quote) => {
            let area = quote
                .place
                .neighborhood
                .clone()
                .unwrap_or_else(|| quote.place.normalized_address.clone());
            let fee = if quote.fee.is_zero() {
                "free".to_string()
            } else {
                format!("fee {}", quote.fee)
            };
            UnifiedResult {
                is_deliverable: true,
                needs_clarification: false,
                delivery_fee: Some(quote.fee),
                delivery_time_minutes: Some(quote.eta_minutes),
                neighborhood: quote.place.neighborhood.clone(),
                coordinates: quote.place.coordinates,
                normalized_address: Some(quote.place.normalized_address.clone()),
                distance_km: quote.distance_km,
                message: format!(
                    "We deliver to {area}: {fee}, about {} minutes.",
                    quote.eta_minutes
                ),
                reason: None,
                validation_method: Some(quote.method),
                tried_methods: Vec::new(),
                free_delivery_applied: false,
            }
        }
        Resolution::NotDeliverable(rejection) => {
            let place = rejection.place.unwrap_or_default();
            UnifiedResult {
                is_deliverable: false,
                needs_clarification: false,
                delivery_fee: None,
                delivery_time_minutes: None,
                neighborhood: place.neighborhood,
                coordinates: place.coordinates,
                normalized_address: (!place.normalized_address.is_empty()).then_some(place.normalized_address),
                distance_km: rejection.distance_km,
                message: format!("Sorry, we do not deliver to this address: {}.", rejection.reason),
                reason: Some(rejection.reason),
                validation_method: Some(rejection.method),
                tried_methods: rejection.tried_methods,
                free_delivery_applied: false,
            }
        }
        Resolution::NeedsClarification { reason } => UnifiedResult {
            is_deliverable: false,
            needs_clarification: true,
            delivery_fee: None,
            delivery_time_minutes: None,
            neighborhood: None,
            coordinates: None,
            normalized_address: None,
            distance_km: None,
            message: "We could not find this address. Please send the street, number and neighborhood.".to_string(),
            reason: Some(reason),
            validation_method: None,
            tried_methods: Vec::new(),
            free_delivery_applied: false,
        },
    }
}
