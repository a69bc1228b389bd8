//! Shared fixtures for unit tests.

use super::cache::{AddressCache, CacheError, CacheStore, CachedResolution, FileCacheStore};
use super::geocoding::{ComponentFilters, GeoResult, GeocodingProvider, ProviderError};
use super::store::{JsonTenantStore, TenantStore};
use super::types::{
    Coordinates, DeliveryConfiguration, DeliveryMode, NeighborhoodZone, RadiusTier, RecordStatus,
    ServiceLocale, TenantId, ZoneDeliveryType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Praça da Sé, used as the default radius center.
pub const CENTER: Coordinates = Coordinates {
    lat: -23.5505,
    lng: -46.6333,
};

#[derive(Clone, Copy, PartialEq)]
enum Bias {
    Any,
    Biased,
    Unbiased,
}

struct Rule {
    needle: String,
    bias: Bias,
    outcome: Result<Vec<GeoResult>, ProviderError>,
}

/// Provider that answers from a fixed script and counts calls.
///
/// Rules match when their needle is a case-insensitive substring of the
/// query. Unmatched queries return no candidates.
#[derive(Default)]
pub struct ScriptedGeocoder {
    rules: Vec<Rule>,
    calls: AtomicUsize,
}

impl ScriptedGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, needle: &str, bias: Bias, outcome: Result<Vec<GeoResult>, ProviderError>) -> Self {
        self.rules.push(Rule {
            needle: needle.to_lowercase(),
            bias,
            outcome,
        });
        self
    }

    pub fn on(self, needle: &str, result: GeoResult) -> Self {
        self.rule(needle, Bias::Any, Ok(vec![result]))
    }

    pub fn biased(self, needle: &str, result: GeoResult) -> Self {
        self.rule(needle, Bias::Biased, Ok(vec![result]))
    }

    pub fn unbiased(self, needle: &str, result: GeoResult) -> Self {
        self.rule(needle, Bias::Unbiased, Ok(vec![result]))
    }

    pub fn failing(self, needle: &str, error: ProviderError) -> Self {
        self.rule(needle, Bias::Any, Err(error))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingProvider for ScriptedGeocoder {
    async fn search(&self, query: &str, filters: &ComponentFilters) -> Result<Vec<GeoResult>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let query = query.to_lowercase();
        let biased = !filters.is_empty();

        let rule = self.rules.iter().find(|rule| {
            let bias_ok = match rule.bias {
                Bias::Any => true,
                Bias::Biased => biased,
                Bias::Unbiased => !biased,
            };
            bias_ok && query.contains(&rule.needle)
        });

        match rule {
            Some(rule) => rule.outcome.clone(),
            None => Ok(Vec::new()),
        }
    }
}

pub fn geo(formatted: &str, lat: f64, lng: f64, neighborhood: Option<&str>, city: &str) -> GeoResult {
    GeoResult {
        formatted_address: formatted.to_string(),
        lat,
        lng,
        neighborhood: neighborhood.map(str::to_string),
        city: Some(city.to_string()),
        state: Some("SP".to_string()),
        zip: None,
        place_id: Some(format!("place-{}", formatted.len())),
    }
}

pub fn sao_paulo() -> ServiceLocale {
    ServiceLocale {
        city: Some("São Paulo".into()),
        state: Some("SP".into()),
        country: Some("BR".into()),
    }
}

pub fn configuration(tenant: TenantId, mode: DeliveryMode) -> DeliveryConfiguration {
    let mut config = DeliveryConfiguration::new(tenant, mode);
    config.locale = sao_paulo();
    config.default_fee = Decimal::new(5, 0);
    config
}

pub fn zone(name: &str, delivery_type: ZoneDeliveryType, fee: i64, eta_minutes: u32) -> NeighborhoodZone {
    NeighborhoodZone {
        id: Uuid::new_v4(),
        name: name.to_string(),
        city: "São Paulo".to_string(),
        state: "SP".to_string(),
        delivery_type,
        fee: Decimal::new(fee, 0),
        eta_minutes,
        zip_codes: Vec::new(),
        status: RecordStatus::Active,
    }
}

pub fn tier(km_start: f64, km_end: f64, fee: i64, eta_minutes: u32) -> RadiusTier {
    RadiusTier {
        id: Uuid::new_v4(),
        center_address: Some("Praça da Sé, São Paulo".to_string()),
        center: CENTER,
        km_start,
        km_end,
        fee: Decimal::new(fee, 0),
        eta_minutes,
        status: RecordStatus::Active,
    }
}

pub fn memory_cache() -> AddressCache {
    AddressCache::new(Arc::new(FileCacheStore::in_memory()))
}

/// Cache store whose operations fail with an io error. With
/// `keyed_reads_miss` set, exact reads succeed as a miss so the scan path
/// is the one that fails.
#[derive(Default)]
pub struct FailingCacheStore {
    keyed_reads_miss: bool,
    writes: AtomicUsize,
}

impl FailingCacheStore {
    pub fn scan_failing() -> Self {
        Self {
            keyed_reads_miss: true,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn broken() -> CacheError {
        CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk unplugged"))
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _tenant: TenantId, _key: &str) -> Result<Option<CachedResolution>, CacheError> {
        if self.keyed_reads_miss {
            return Ok(None);
        }
        Err(Self::broken())
    }

    async fn upsert(&self, _entry: CachedResolution) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(Self::broken())
    }

    async fn remove(&self, _tenant: TenantId, _key: &str) -> Result<bool, CacheError> {
        Err(Self::broken())
    }

    async fn entries(&self, _tenant: TenantId) -> Result<Vec<CachedResolution>, CacheError> {
        Err(Self::broken())
    }

    async fn purge_older_than(
        &self,
        _tenant: Option<TenantId>,
        _cutoff: DateTime<Utc>,
    ) -> Result<usize, CacheError> {
        Err(Self::broken())
    }
}

/// In-memory tenant store seeded with one tenant's setup.
pub async fn seeded_store(
    config: Option<DeliveryConfiguration>,
    zones: Vec<NeighborhoodZone>,
    tiers: Vec<RadiusTier>,
    tenant: TenantId,
) -> Arc<JsonTenantStore> {
    let store = Arc::new(JsonTenantStore::in_memory());
    if let Some(config) = config {
        store.save_configuration(config).await.unwrap();
    }
    for zone in zones {
        store.insert_zone(tenant, zone).await.unwrap();
    }
    for tier in tiers {
        store.insert_tier(tenant, tier).await.unwrap();
    }
    store
}
