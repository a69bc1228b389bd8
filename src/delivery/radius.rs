//! Resolution by great-circle distance from a tier's center.
//!
//! Tiers are scanned ascending by `km_start` and the first one whose closed
//! range contains the distance wins. Overlapping tiers are not rejected, so
//! the lower-starting tier always takes precedence.

use super::cache::AddressCache;
use super::geocoding::{GeocodeError, GeocodeSlot, GeocodingGateway};
use super::normalize::log_preview;
use super::store::TenantStore;
use super::types::{
    Coordinates, DeliveryConfiguration, DeliveryQuote, Rejection, Resolution, ValidationMethod,
};
use super::DeliveryError;
use std::sync::Arc;
use tracing::{debug, info};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometers.
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let (lat1, lat2) = (from.lat.to_radians(), to.lat.to_radians());
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

fn round_km(km: f64) -> f64 {
    (km * 100.0).round() / 100.0
}

#[derive(Clone)]
pub struct RadiusResolver {
    store: Arc<dyn TenantStore>,
    cache: AddressCache,
    gateway: GeocodingGateway,
}

impl RadiusResolver {
    pub fn new(store: Arc<dyn TenantStore>, cache: AddressCache, gateway: GeocodingGateway) -> Self {
        Self { store, cache, gateway }
    }

    pub async fn resolve(&self, address: &str, config: &DeliveryConfiguration) -> Result<Resolution, DeliveryError> {
        if let Some(hit) = self.cache.lookup(address, config.tenant_id).await {
            return Ok(hit.resolution());
        }
        let resolution = self.resolve_uncached(address, config, &GeocodeSlot::new()).await?;
        self.cache.remember(address, config.tenant_id, &resolution).await;
        Ok(resolution)
    }

    pub async fn resolve_uncached(
        &self,
        address: &str,
        config: &DeliveryConfiguration,
        slot: &GeocodeSlot,
    ) -> Result<Resolution, DeliveryError> {
        let tenant = config.tenant_id;
        let tiers = self.store.active_tiers(tenant).await?;
        if tiers.is_empty() {
            return Ok(Resolution::NotDeliverable(Rejection::not_set_up(
                ValidationMethod::Radius,
                "radius delivery not configured",
            )));
        }

        let found = match slot.resolve(&self.gateway, address, &config.locale).await {
            Ok(found) => found,
            Err(GeocodeError::Provider(err)) => return Err(err.into()),
            Err(err) => {
                info!(tenant = %tenant, address = %log_preview(address), reason = %err, "address not found for radius check");
                return Ok(Resolution::needs_clarification("address not found"));
            }
        };

        let point = found.coordinates();
        let mut last_distance = 0.0;
        for tier in &tiers {
            let distance = haversine_km(tier.center, point);
            last_distance = distance;
            debug!(tenant = %tenant, distance_km = distance, km_start = tier.km_start, km_end = tier.km_end, "checking radius tier");
            if tier.contains(distance) {
                info!(tenant = %tenant, distance_km = round_km(distance), "address inside radius tier");
                return Ok(Resolution::Deliverable(DeliveryQuote {
                    fee: tier.fee,
                    eta_minutes: tier.eta_minutes,
                    method: ValidationMethod::Radius,
                    place: found.place(),
                    distance_km: Some(round_km(distance)),
                }));
            }
        }

        info!(tenant = %tenant, distance_km = round_km(last_distance), "address outside every radius tier");
        let mut rejection = Rejection::new(
            ValidationMethod::Radius,
            format!("outside delivery area (distance: {:.1} km)", last_distance),
        )
        .with_place(found.place());
        rejection.distance_km = Some(round_km(last_distance));
        Ok(Resolution::NotDeliverable(rejection))
    }
}
