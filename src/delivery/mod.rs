//! Delivery eligibility: decides whether a free-text address is served by a
//! tenant, at what fee and ETA.
//!
//! Resolution order for every request:
//! 1. Address cache (exact, then fuzzy on the street number)
//! 2. The tenant's configured strategy: neighborhood zones, radius tiers or both
//! 3. Geocoding, only when the strategy needs it

pub mod admin;
pub mod cache;
pub mod coordinator;
pub mod geocoding;
pub mod hybrid;
pub mod neighborhood;
pub mod normalize;
pub mod providers;
pub mod radius;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use admin::{AdminError, DeliveryAdmin, DeliveryOverview, HybridSetup, NewRadiusTier, NewZone};
pub use cache::{AddressCache, CacheError, CacheStatistics, CacheStore, FileCacheStore};
pub use coordinator::DeliveryCoordinator;
pub use geocoding::{GeoResult, GeocodeError, GeocodingGateway, GeocodingProvider, ProviderError};
pub use providers::GoogleGeocoder;
pub use store::{JsonTenantStore, StoreError, TenantStore};
pub use types::*;

/// Failure that prevents a resolver from producing any answer.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("geocoding provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
