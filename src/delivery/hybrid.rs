//! Neighborhood and radius resolution combined.

use super::cache::AddressCache;
use super::geocoding::GeocodeSlot;
use super::neighborhood::NeighborhoodResolver;
use super::radius::RadiusResolver;
use super::types::{
    DeliveryConfiguration, HybridPriority, PlaceDetails, Rejection, Resolution, ResolverKind,
    ValidationMethod,
};
use super::DeliveryError;
use tracing::info;

impl ResolverKind {
    fn hybrid_method(self) -> ValidationMethod {
        match self {
            Self::Neighborhood => ValidationMethod::HybridNeighborhood,
            Self::Radius => ValidationMethod::HybridRadius,
        }
    }
}

impl HybridPriority {
    pub fn order(self) -> [ResolverKind; 2] {
        match self {
            Self::NeighborhoodFirst => [ResolverKind::Neighborhood, ResolverKind::Radius],
            Self::RadiusFirst => [ResolverKind::Radius, ResolverKind::Neighborhood],
        }
    }
}

/// Runs both strategies in the tenant's priority order under a single cache
/// lookup, sharing one geocode between them.
#[derive(Clone)]
pub struct HybridResolver {
    neighborhood: NeighborhoodResolver,
    radius: RadiusResolver,
    cache: AddressCache,
}

impl HybridResolver {
    pub fn new(neighborhood: NeighborhoodResolver, radius: RadiusResolver, cache: AddressCache) -> Self {
        Self {
            neighborhood,
            radius,
            cache,
        }
    }

    pub async fn resolve(&self, address: &str, config: &DeliveryConfiguration) -> Result<Resolution, DeliveryError> {
        let tenant = config.tenant_id;
        if let Some(hit) = self.cache.lookup(address, tenant).await {
            return Ok(hit.resolution());
        }

        let slot = GeocodeSlot::new();
        let mut tried = Vec::with_capacity(2);
        let mut rejections: Vec<(ResolverKind, Rejection)> = Vec::new();
        let mut clarification: Option<String> = None;

        for kind in config.hybrid_priority.order() {
            tried.push(kind);
            let outcome = match kind {
                ResolverKind::Neighborhood => self.neighborhood.resolve_uncached(address, config, &slot).await?,
                ResolverKind::Radius => self.radius.resolve_uncached(address, config, &slot).await?,
            };

            match outcome {
                Resolution::Deliverable(_) => {
                    let resolution = outcome.retagged(kind.hybrid_method());
                    info!(tenant = %tenant, method = %kind.hybrid_method(), "hybrid resolution succeeded");
                    self.cache.remember(address, tenant, &resolution).await;
                    return Ok(resolution);
                }
                Resolution::NotDeliverable(rejection) => rejections.push((kind, rejection)),
                Resolution::NeedsClarification { reason } => {
                    clarification.get_or_insert(reason);
                }
            }
        }

        let located = rejections.iter().any(|(_, r)| r.place.is_some());
        let resolution = match clarification {
            Some(reason) if !located => Resolution::needs_clarification(reason),
            _ => Resolution::NotDeliverable(combine(rejections, tried)),
        };
        info!(tenant = %tenant, "hybrid resolution found no serving strategy");
        self.cache.remember(address, tenant, &resolution).await;
        Ok(resolution)
    }
}

fn combine(rejections: Vec<(ResolverKind, Rejection)>, tried: Vec<ResolverKind>) -> Rejection {
    let detail: Vec<String> = rejections
        .iter()
        .map(|(kind, r)| {
            let label = match kind {
                ResolverKind::Neighborhood => "neighborhood",
                ResolverKind::Radius => "radius",
            };
            format!("{label}: {}", r.reason)
        })
        .collect();

    // Prefer the richest place description: geocoded details carry coordinates.
    let place: Option<PlaceDetails> = rejections
        .iter()
        .filter_map(|(_, r)| r.place.clone())
        .max_by_key(|p| p.coordinates.is_some());
    let distance_km = rejections.iter().find_map(|(_, r)| r.distance_km);
    let setup_incomplete = !rejections.is_empty() && rejections.iter().all(|(_, r)| r.setup_incomplete);

    let reason = if detail.is_empty() {
        "outside delivery area".to_string()
    } else {
        format!("outside delivery area ({})", detail.join("; "))
    };

    Rejection {
        reason,
        method: ValidationMethod::Hybrid,
        place,
        distance_km,
        tried_methods: tried,
        setup_incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::geocoding::GeocodingGateway;
    use crate::delivery::testing::{
        configuration, geo, memory_cache, seeded_store, tier, zone, ScriptedGeocoder,
    };
    use crate::delivery::types::{DeliveryMode, NeighborhoodZone, RadiusTier, ZoneDeliveryType};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn hybrid(
        priority: HybridPriority,
        zones: Vec<NeighborhoodZone>,
        tiers: Vec<RadiusTier>,
        provider: Arc<ScriptedGeocoder>,
    ) -> (HybridResolver, DeliveryConfiguration) {
        let tenant = Uuid::new_v4();
        let mut config = configuration(tenant, DeliveryMode::Hybrid);
        config.hybrid_priority = priority;
        let store = seeded_store(Some(config.clone()), zones, tiers, tenant).await;
        let cache = memory_cache();
        let gateway = GeocodingGateway::new(provider);
        let resolver = HybridResolver::new(
            NeighborhoodResolver::new(store.clone(), cache.clone(), gateway.clone()),
            RadiusResolver::new(store, cache.clone(), gateway),
            cache,
        );
        (resolver, config)
    }

    fn paulista() -> Arc<ScriptedGeocoder> {
        Arc::new(ScriptedGeocoder::new().on(
            "paulista",
            geo("Av. Paulista, 100", -23.5617, -46.6560, Some("Bela Vista"), "São Paulo"),
        ))
    }

    #[tokio::test]
    async fn test_neighborhood_hit_is_tagged() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) = hybrid(
            HybridPriority::NeighborhoodFirst,
            vec![zone("Moema", ZoneDeliveryType::Paid, 6, 30)],
            vec![tier(0.0, 5.0, 9, 45)],
            provider.clone(),
        )
        .await;

        let result = resolver.resolve("Av. Ibirapuera 2000, Moema", &config).await.unwrap();
        assert_eq!(result.method(), Some(ValidationMethod::HybridNeighborhood));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_to_radius() {
        let provider = paulista();
        let (resolver, config) = hybrid(
            HybridPriority::NeighborhoodFirst,
            vec![zone("Moema", ZoneDeliveryType::Paid, 6, 30)],
            vec![tier(0.0, 5.0, 9, 45)],
            provider.clone(),
        )
        .await;

        let result = resolver.resolve("Av. Paulista, 100", &config).await.unwrap();
        assert_eq!(result.method(), Some(ValidationMethod::HybridRadius));
        assert_eq!(result.fee(), Some(Decimal::new(9, 0)));
        // neighborhood and radius shared one geocode
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_radius_first_priority() {
        let provider = paulista();
        let (resolver, config) = hybrid(
            HybridPriority::RadiusFirst,
            vec![zone("Paulista", ZoneDeliveryType::Free, 0, 20)],
            vec![tier(0.0, 5.0, 9, 45)],
            provider,
        )
        .await;

        let result = resolver.resolve("Av. Paulista, 100", &config).await.unwrap();
        assert_eq!(result.method(), Some(ValidationMethod::HybridRadius));
    }

    #[tokio::test]
    async fn test_both_fail_lists_tried_methods() {
        let provider = paulista();
        let (resolver, config) = hybrid(
            HybridPriority::RadiusFirst,
            vec![zone("Moema", ZoneDeliveryType::Paid, 6, 30)],
            vec![tier(0.0, 1.0, 9, 45)],
            provider.clone(),
        )
        .await;

        match resolver.resolve("Av. Paulista, 100", &config).await.unwrap() {
            Resolution::NotDeliverable(rejection) => {
                assert_eq!(rejection.method, ValidationMethod::Hybrid);
                assert_eq!(rejection.tried_methods, vec![ResolverKind::Radius, ResolverKind::Neighborhood]);
                assert!(rejection.reason.contains("Bela Vista"));
                assert!(rejection.distance_km.is_some());
            }
            other => panic!("expected NotDeliverable, got {other:?}"),
        }
        assert_eq!(provider.calls(), 1);

        // negative result is cached for the whole hybrid attempt
        match resolver.resolve("Av. Paulista, 100", &config).await.unwrap() {
            Resolution::NotDeliverable(rejection) => {
                assert_eq!(rejection.method, ValidationMethod::Cache);
                assert_eq!(rejection.tried_methods, vec![ResolverKind::Radius, ResolverKind::Neighborhood]);
            }
            other => panic!("expected NotDeliverable, got {other:?}"),
        }
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_nothing_set_up_is_not_cached() {
        let provider = paulista();
        let (resolver, config) = hybrid(HybridPriority::NeighborhoodFirst, vec![], vec![], provider).await;

        match resolver.resolve("Av. Paulista, 100", &config).await.unwrap() {
            Resolution::NotDeliverable(rejection) => assert!(rejection.setup_incomplete),
            other => panic!("expected NotDeliverable, got {other:?}"),
        }
        assert_eq!(resolver.cache.count(config.tenant_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unlocatable_needs_clarification() {
        let provider = Arc::new(ScriptedGeocoder::new());
        let (resolver, config) = hybrid(
            HybridPriority::NeighborhoodFirst,
            vec![zone("Moema", ZoneDeliveryType::Paid, 6, 30)],
            vec![tier(0.0, 5.0, 9, 45)],
            provider,
        )
        .await;

        let result = resolver.resolve("qwerty", &config).await.unwrap();
        assert!(matches!(result, Resolution::NeedsClarification { .. }));
    }
}
