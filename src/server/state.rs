use crate::config::AppConfig;
use crate::delivery::{
    AddressCache, DeliveryAdmin, DeliveryCoordinator, FileCacheStore, GeocodingGateway, GoogleGeocoder,
    JsonTenantStore, TenantStore,
};
use std::sync::Arc;

pub struct AppState {
    pub coordinator: DeliveryCoordinator,
    pub admin: DeliveryAdmin,
}

impl AppState {
    pub fn new(store: Arc<dyn TenantStore>, cache: AddressCache, gateway: GeocodingGateway) -> Self {
        Self {
            coordinator: DeliveryCoordinator::new(store.clone(), cache.clone(), gateway.clone()),
            admin: DeliveryAdmin::new(store, cache, gateway),
        }
    }

    /// File-backed stores and the Google provider, as configured.
    pub fn from_config(config: &AppConfig) -> Self {
        let store = Arc::new(JsonTenantStore::load_from(config.storage.tenant_data_path.clone()));
        let cache = AddressCache::new(Arc::new(FileCacheStore::load_from(config.cache.path.clone())))
            .with_ttl_days(config.cache.ttl_days);
        let provider = Arc::new(GoogleGeocoder::new(
            config.geocoding.api_key.clone(),
            config.geocoding.base_url.clone(),
            config.geocoding.timeout,
        ));
        Self::new(store, cache, GeocodingGateway::new(provider))
    }
}
