//! Resolution against a tenant's registered neighborhood zones.
//!
//! Text match first: the first active zone (registration order) whose
//! lowercased name occurs anywhere in the normalized address wins, with no
//! word-boundary check. A zone called "Vila" therefore also claims every
//! "Vila Mariana" address when it was registered first. Only when no zone
//! name occurs in the text is the address geocoded and its neighborhood
//! component compared against zone names.

use super::cache::AddressCache;
use super::geocoding::{GeocodeError, GeocodeSlot, GeocodingGateway};
use super::normalize::{log_preview, normalize_address};
use super::store::TenantStore;
use super::types::{
    DeliveryConfiguration, DeliveryQuote, NeighborhoodZone, PlaceDetails, Rejection, Resolution,
    ValidationMethod, ZoneDeliveryType,
};
use super::DeliveryError;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct NeighborhoodResolver {
    store: Arc<dyn TenantStore>,
    cache: AddressCache,
    gateway: GeocodingGateway,
}

impl NeighborhoodResolver {
    pub fn new(store: Arc<dyn TenantStore>, cache: AddressCache, gateway: GeocodingGateway) -> Self {
        Self { store, cache, gateway }
    }

    /// Cache first, then zones. Located outcomes are written back to the cache.
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
        let zones = self.store.active_zones(tenant).await?;
        if zones.is_empty() {
            return Ok(Resolution::NotDeliverable(Rejection::not_set_up(
                ValidationMethod::NeighborhoodText,
                "neighborhood delivery not configured",
            )));
        }

        let key = normalize_address(address);
        let text_match = zones
            .iter()
            .filter(|z| !z.name.trim().is_empty())
            .find(|z| key.contains(&z.name.to_lowercase()));
        if let Some(zone) = text_match {
            debug!(tenant = %tenant, zone = %zone.name, "zone matched in address text");
            let place = PlaceDetails {
                neighborhood: Some(zone.name.clone()),
                city: Some(zone.city.clone()),
                state: Some(zone.state.clone()),
                ..PlaceDetails::from_text(key)
            };
            return Ok(zone_outcome(zone, place, ValidationMethod::NeighborhoodText));
        }

        let found = match slot.resolve(&self.gateway, address, &config.locale).await {
            Ok(found) => found,
            Err(GeocodeError::Provider(err)) => return Err(err.into()),
            Err(err) => {
                info!(tenant = %tenant, address = %log_preview(address), reason = %err, "address needs clarification");
                return Ok(Resolution::needs_clarification(err.to_string()));
            }
        };

        let Some(neighborhood) = found.neighborhood.clone() else {
            return Ok(Resolution::needs_clarification(
                "could not determine the neighborhood for this address",
            ));
        };

        let wanted = neighborhood.trim().to_lowercase();
        let place = found.place();
        let resolution = match zones.iter().find(|z| z.name.trim().to_lowercase() == wanted) {
            Some(zone) => zone_outcome(zone, place, ValidationMethod::NeighborhoodGeocoded),
            None => Resolution::NotDeliverable(
                Rejection::new(
                    ValidationMethod::NeighborhoodGeocoded,
                    format!("neighborhood '{neighborhood}' is not in the delivery area"),
                )
                .with_place(place),
            ),
        };
        info!(
            tenant = %tenant,
            neighborhood = %neighborhood,
            deliverable = resolution.is_deliverable(),
            "neighborhood resolved via geocoding"
        );
        Ok(resolution)
    }
}

fn zone_outcome(zone: &NeighborhoodZone, place: PlaceDetails, method: ValidationMethod) -> Resolution {
    if zone.delivery_type == ZoneDeliveryType::Unavailable {
        return Resolution::NotDeliverable(
            Rejection::new(method, format!("delivery unavailable in {}", zone.name)).with_place(place),
        );
    }
    Resolution::Deliverable(DeliveryQuote {
        fee: zone.quoted_fee(),
        eta_minutes: zone.eta_minutes,
        method,
        place,
        distance_km: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::geocoding::ProviderError;
    use crate::delivery::cache::AddressCache;
    use crate::delivery::testing::{
        configuration, geo, memory_cache, seeded_store, zone, FailingCacheStore, ScriptedGeocoder,
    };
    use crate::delivery::types::DeliveryMode;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    async fn resolver(
        zones: Vec<NeighborhoodZone>,
        provider: Arc<ScriptedGeocoder>,
    ) -> (NeighborhoodResolver, DeliveryConfiguration) {
        let tenant = Uuid::new_v4();
        let config = configuration(tenant, DeliveryMode::Neighborhood);
        let store = seeded_store(Some(config.clone()), zones, vec![], tenant).await;
        let resolver = NeighborhoodResolver::new(store, memory_cache(), GeocodingGateway::new(provider));
        (resolver, config)
    }

    #[tokio::test]
    async fn test_free_zone_text_match_any_case() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) = resolver(vec![zone("Jardins", ZoneDeliveryType::Free, 9, 25)], provider.clone()).await;

        let result = resolver.resolve("Alameda Lorena 800, JARDINS", &config).await.unwrap();
        match result {
            Resolution::Deliverable(quote) => {
                assert_eq!(quote.fee, Decimal::ZERO);
                assert_eq!(quote.eta_minutes, 25);
                assert_eq!(quote.method, ValidationMethod::NeighborhoodText);
                assert_eq!(quote.place.neighborhood.as_deref(), Some("Jardins"));
            }
            other => panic!("expected Deliverable, got {other:?}"),
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_first_registered_substring_wins() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) = resolver(
            vec![
                zone("Vila", ZoneDeliveryType::Paid, 15, 50),
                zone("Vila Mariana", ZoneDeliveryType::Paid, 7, 30),
            ],
            provider,
        )
        .await;

        let result = resolver.resolve("Rua Domingos de Morais 100, Vila Mariana", &config).await.unwrap();
        assert_eq!(result.place().and_then(|p| p.neighborhood.clone()).as_deref(), Some("Vila"));
        assert_eq!(result.fee(), Some(Decimal::new(15, 0)));
    }

    #[tokio::test]
    async fn test_unavailable_zone_rejects_on_text_match() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) =
            resolver(vec![zone("Capão Redondo", ZoneDeliveryType::Unavailable, 0, 0)], provider).await;

        let result = resolver.resolve("Rua X 10, Capão Redondo", &config).await.unwrap();
        match result {
            Resolution::NotDeliverable(rejection) => assert!(rejection.reason.contains("Capão Redondo")),
            other => panic!("expected NotDeliverable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_geocoded_neighborhood_match() {
        let provider = Arc::new(ScriptedGeocoder::new().biased(
            "augusta",
            geo("R. Augusta, 1500 - Consolação", -23.5558, -46.6579, Some("consolação"), "São Paulo"),
        ));
        let (resolver, config) =
            resolver(vec![zone("Consolação", ZoneDeliveryType::Paid, 8, 35)], provider.clone()).await;

        let result = resolver.resolve("Rua Augusta, 1500", &config).await.unwrap();
        match result {
            Resolution::Deliverable(quote) => {
                assert_eq!(quote.method, ValidationMethod::NeighborhoodGeocoded);
                assert_eq!(quote.fee, Decimal::new(8, 0));
                assert!(quote.place.coordinates.is_some());
            }
            other => panic!("expected Deliverable, got {other:?}"),
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unserved_neighborhood_is_negatively_cached() {
        let provider = Arc::new(ScriptedGeocoder::new().biased(
            "itaquera",
            geo("Av. Itaquera, 5000", -23.54, -46.45, Some("Itaquera"), "São Paulo"),
        ));
        let (resolver, config) =
            resolver(vec![zone("Consolação", ZoneDeliveryType::Paid, 8, 35)], provider.clone()).await;

        let first = resolver.resolve("Av. Itaquera, 5000", &config).await.unwrap();
        assert!(!first.is_deliverable());
        let second = resolver.resolve("Av. Itaquera, 5000", &config).await.unwrap();
        assert_eq!(second.method(), Some(ValidationMethod::Cache));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_needs_clarification() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) =
            resolver(vec![zone("Consolação", ZoneDeliveryType::Paid, 8, 35)], provider).await;

        let result = resolver.resolve("asdfgh", &config).await.unwrap();
        assert!(matches!(result, Resolution::NeedsClarification { .. }));
    }

    #[tokio::test]
    async fn test_missing_neighborhood_component_needs_clarification() {
        let provider = Arc::new(ScriptedGeocoder::new().on("rodovia", geo("Rodovia", -23.5, -46.6, None, "São Paulo")));
        let (resolver, config) =
            resolver(vec![zone("Consolação", ZoneDeliveryType::Paid, 8, 35)], provider).await;

        let result = resolver.resolve("Rodovia Anhanguera km 20", &config).await.unwrap();
        assert!(matches!(result, Resolution::NeedsClarification { .. }));
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(ScriptedGeocoder::new().failing("augusta", ProviderError::Network("reset".into())));
        let (resolver, config) =
            resolver(vec![zone("Consolação", ZoneDeliveryType::Paid, 8, 35)], provider).await;

        let result = resolver.resolve("Rua Augusta, 1500", &config).await;
        assert!(matches!(result, Err(DeliveryError::Provider(ProviderError::Network(_)))));
    }

    #[tokio::test]
    async fn test_inactive_zone_is_ignored() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let mut closed = zone("Centro", ZoneDeliveryType::Paid, 5, 30);
        closed.status = crate::delivery::types::RecordStatus::Inactive;
        let (resolver, config) =
            resolver(vec![closed, zone("Moema", ZoneDeliveryType::Paid, 6, 30)], provider).await;

        let result = resolver.resolve("Rua Direita 10, Centro", &config).await.unwrap();
        assert!(!result.is_deliverable());
    }

    #[tokio::test]
    async fn test_unconfigured_rejection_is_not_cached() {
        let tenant = Uuid::new_v4();
        let config = configuration(tenant, DeliveryMode::Neighborhood);
        let store = seeded_store(Some(config.clone()), vec![], vec![], tenant).await;
        let cache = memory_cache();
        let resolver = NeighborhoodResolver::new(
            store.clone(),
            cache.clone(),
            GeocodingGateway::new(Arc::new(ScriptedGeocoder::new())),
        );

        match resolver.resolve("Rua Direita 10, Centro", &config).await.unwrap() {
            Resolution::NotDeliverable(rejection) => assert!(rejection.setup_incomplete),
            other => panic!("expected NotDeliverable, got {other:?}"),
        }
        assert_eq!(cache.count(tenant).await.unwrap(), 0);

        store.insert_zone(tenant, zone("Centro", ZoneDeliveryType::Paid, 5, 30)).await.unwrap();
        let result = resolver.resolve("Rua Direita 10, Centro", &config).await.unwrap();
        assert!(result.is_deliverable());
        assert_eq!(result.method(), Some(ValidationMethod::NeighborhoodText));
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_result() {
        let tenant = Uuid::new_v4();
        let config = configuration(tenant, DeliveryMode::Neighborhood);
        let store = seeded_store(
            Some(config.clone()),
            vec![zone("Jardins", ZoneDeliveryType::Paid, 9, 40)],
            vec![],
            tenant,
        )
        .await;
        let failing = Arc::new(FailingCacheStore::default());
        let resolver = NeighborhoodResolver::new(
            store,
            AddressCache::new(failing.clone()),
            GeocodingGateway::new(Arc::new(ScriptedGeocoder::new())),
        );

        let result = resolver.resolve("Rua Oscar Freire 10, Jardins", &config).await.unwrap();
        assert!(result.is_deliverable());
        assert_eq!(result.fee(), Some(Decimal::new(9, 0)));
        assert_eq!(failing.writes(), 1);
    }

    #[tokio::test]
    async fn test_blank_stored_zone_never_matches_text() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) = resolver(
            vec![zone("  ", ZoneDeliveryType::Paid, 3, 20), zone("Moema", ZoneDeliveryType::Paid, 6, 30)],
            provider.clone(),
        )
        .await;

        let result = resolver.resolve("Rua Qualquer 1, Lisboa Portugal", &config).await.unwrap();
        assert!(!result.is_deliverable());
        assert!(provider.calls() > 0);
    }

    #[tokio::test]
    async fn test_punctuated_zone_name_matches_only_via_geocode() {
        let provider = Arc::new(ScriptedGeocoder::new().on(
            "europa",
            geo("R. Alemanha, 20 - Jd. Europa", -23.57, -46.68, Some("Jd. Europa"), "São Paulo"),
        ));
        let (resolver, config) =
            resolver(vec![zone("Jd. Europa", ZoneDeliveryType::Paid, 12, 40)], provider.clone()).await;

        let result = resolver.resolve("R. Alemanha, 20 - Jd. Europa", &config).await.unwrap();
        assert_eq!(result.method(), Some(ValidationMethod::NeighborhoodGeocoded));
        assert_eq!(result.fee(), Some(Decimal::new(12, 0)));
        assert_eq!(provider.calls(), 1);
    }
}
