//! Tenant setup: configuration, zones and radius tiers.

use super::cache::{AddressCache, CacheError};
use super::geocoding::{GeocodeError, GeocodingGateway, ProviderError};
use super::store::{RecordKind, StoreError, TenantStore};
use super::types::{
    Coordinates, DeliveryConfiguration, DeliveryMode, HybridPriority, NeighborhoodZone, RadiusTier,
    RecordStatus, ServiceLocale, TenantId, ZoneDeliveryType,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_CITY: &str = "São Paulo";
const DEFAULT_STATE: &str = "SP";
const DEFAULT_ETA_MINUTES: u32 = 60;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("could not geocode center address '{address}': {reason}")]
    CenterNotGeocoded { address: String, reason: String },
    #[error("invalid radius tier: {0}")]
    InvalidTier(String),
    #[error("invalid neighborhood zone: {0}")]
    InvalidZone(String),
    #[error("neighborhood '{0}' is already registered")]
    DuplicateZone(String),
    #[error("zone {0} not found")]
    ZoneNotFound(Uuid),
    #[error("radius tier {0} not found")]
    TierNotFound(Uuid),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("geocoding provider failed: {0}")]
    Provider(#[from] ProviderError),
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind: RecordKind::Zone, id } => Self::ZoneNotFound(id),
            StoreError::NotFound { kind: RecordKind::Tier, id } => Self::TierNotFound(id),
            other => Self::Store(other),
        }
    }
}

fn default_eta() -> u32 {
    DEFAULT_ETA_MINUTES
}

/// Zone as submitted by an operator. Missing city/state fall back to the
/// tenant's locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewZone {
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub delivery_type: ZoneDeliveryType,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default = "default_eta")]
    pub eta_minutes: u32,
    #[serde(default)]
    pub zip_codes: Vec<String>,
}

impl NewZone {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            city: None,
            state: None,
            delivery_type: ZoneDeliveryType::default(),
            fee: Decimal::ZERO,
            eta_minutes: DEFAULT_ETA_MINUTES,
            zip_codes: Vec::new(),
        }
    }

    fn into_zone(self, id: Uuid, locale: &ServiceLocale) -> NeighborhoodZone {
        NeighborhoodZone {
            id,
            name: self.name.trim().to_string(),
            city: self
                .city
                .or_else(|| locale.city.clone())
                .unwrap_or_else(|| DEFAULT_CITY.to_string()),
            state: self
                .state
                .or_else(|| locale.state.clone())
                .unwrap_or_else(|| DEFAULT_STATE.to_string()),
            delivery_type: self.delivery_type,
            fee: self.fee,
            eta_minutes: self.eta_minutes,
            zip_codes: self.zip_codes,
            status: RecordStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRadiusTier {
    pub km_start: f64,
    pub km_end: f64,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default = "default_eta")]
    pub eta_minutes: u32,
}

impl NewRadiusTier {
    fn validate(&self) -> Result<(), AdminError> {
        if !self.km_start.is_finite() || !self.km_end.is_finite() || self.km_start < 0.0 {
            return Err(AdminError::InvalidTier(format!(
                "distances must be finite and non-negative ({} - {})",
                self.km_start, self.km_end
            )));
        }
        if self.km_start > self.km_end {
            return Err(AdminError::InvalidTier(format!(
                "km_start {} is greater than km_end {}",
                self.km_start, self.km_end
            )));
        }
        Ok(())
    }

    fn into_tier(self, center_address: &str, center: Coordinates) -> RadiusTier {
        RadiusTier {
            id: Uuid::new_v4(),
            center_address: Some(center_address.to_string()),
            center,
            km_start: self.km_start,
            km_end: self.km_end,
            fee: self.fee,
            eta_minutes: self.eta_minutes,
            status: RecordStatus::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridSetup {
    pub zones_created: usize,
    pub tiers_created: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverviewStatus {
    Active,
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOverview {
    pub total_neighborhoods: usize,
    pub deliverable_neighborhoods: usize,
    pub radius_tiers: usize,
    pub cached_addresses: usize,
    pub mode: Option<DeliveryMode>,
    pub status: OverviewStatus,
}

#[derive(Clone)]
pub struct DeliveryAdmin {
    store: Arc<dyn TenantStore>,
    cache: AddressCache,
    gateway: GeocodingGateway,
}

impl DeliveryAdmin {
    pub fn new(store: Arc<dyn TenantStore>, cache: AddressCache, gateway: GeocodingGateway) -> Self {
        Self { store, cache, gateway }
    }

    async fn locale(&self, tenant: TenantId) -> Result<ServiceLocale, AdminError> {
        Ok(self
            .store
            .configuration(tenant)
            .await?
            .map(|c| c.locale)
            .unwrap_or_default())
    }

    /// Drop cached rejections after the served area changed. Failures are
    /// logged, not returned.
    async fn area_changed(&self, tenant: TenantId) {
        if let Err(err) = self.cache.forget_rejections(tenant).await {
            warn!(tenant = %tenant, error = %err, "failed to drop cached rejections");
        }
    }

    /// Reject blank names and names already used by another active zone.
    async fn check_zone_name(&self, tenant: TenantId, name: &str, own_id: Option<Uuid>) -> Result<(), AdminError> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Err(AdminError::InvalidZone("name must not be blank".to_string()));
        }
        let taken = self
            .store
            .active_zones(tenant)
            .await?
            .iter()
            .any(|z| Some(z.id) != own_id && z.name.trim().to_lowercase() == wanted);
        if taken {
            return Err(AdminError::DuplicateZone(name.trim().to_string()));
        }
        Ok(())
    }

    pub async fn save_configuration(&self, config: DeliveryConfiguration) -> Result<DeliveryConfiguration, AdminError> {
        self.store.save_configuration(config.clone()).await?;
        info!(tenant = %config.tenant_id, mode = %config.mode, "delivery configuration saved");
        self.area_changed(config.tenant_id).await;
        Ok(config)
    }

    pub async fn configuration(&self, tenant: TenantId) -> Result<Option<DeliveryConfiguration>, AdminError> {
        Ok(self.store.configuration(tenant).await?)
    }

    pub async fn list_zones(&self, tenant: TenantId) -> Result<Vec<NeighborhoodZone>, AdminError> {
        Ok(self.store.active_zones(tenant).await?)
    }

    pub async fn list_tiers(&self, tenant: TenantId) -> Result<Vec<RadiusTier>, AdminError> {
        Ok(self.store.active_tiers(tenant).await?)
    }

    pub async fn add_zone(&self, tenant: TenantId, zone: NewZone) -> Result<NeighborhoodZone, AdminError> {
        self.check_zone_name(tenant, &zone.name, None).await?;

        let zone = zone.into_zone(Uuid::new_v4(), &self.locale(tenant).await?);
        self.store.insert_zone(tenant, zone.clone()).await?;
        info!(tenant = %tenant, zone = %zone.name, "neighborhood zone added");
        self.area_changed(tenant).await;
        Ok(zone)
    }

    /// Create each zone independently. Names already registered, or repeated
    /// within the batch, are skipped.
    pub async fn bulk_add_neighborhoods(
        &self,
        tenant: TenantId,
        zones: Vec<NewZone>,
    ) -> Result<Vec<NeighborhoodZone>, AdminError> {
        let locale = self.locale(tenant).await?;
        let mut seen: HashSet<String> = self
            .store
            .active_zones(tenant)
            .await?
            .into_iter()
            .map(|z| z.name.trim().to_lowercase())
            .collect();

        let mut created = Vec::new();
        for zone in zones {
            let key = zone.name.trim().to_lowercase();
            if key.is_empty() || !seen.insert(key) {
                warn!(tenant = %tenant, zone = %zone.name, "skipping duplicate or unnamed zone");
                continue;
            }
            let zone = zone.into_zone(Uuid::new_v4(), &locale);
            self.store.insert_zone(tenant, zone.clone()).await?;
            created.push(zone);
        }
        info!(tenant = %tenant, created = created.len(), "bulk neighborhood import finished");
        if !created.is_empty() {
            self.area_changed(tenant).await;
        }
        Ok(created)
    }

    pub async fn update_zone(&self, tenant: TenantId, zone_id: Uuid, zone: NewZone) -> Result<NeighborhoodZone, AdminError> {
        let current = self
            .store
            .zones(tenant)
            .await?
            .into_iter()
            .find(|z| z.id == zone_id)
            .ok_or(AdminError::ZoneNotFound(zone_id))?;
        self.check_zone_name(tenant, &zone.name, Some(zone_id)).await?;

        let mut updated = zone.into_zone(zone_id, &self.locale(tenant).await?);
        updated.status = current.status;
        self.store.update_zone(tenant, updated.clone()).await?;
        info!(tenant = %tenant, zone = %zone_id, "neighborhood zone updated");
        self.area_changed(tenant).await;
        Ok(updated)
    }

    /// Soft delete.
    pub async fn deactivate_zone(&self, tenant: TenantId, zone_id: Uuid) -> Result<(), AdminError> {
        let mut zone = self
            .store
            .zones(tenant)
            .await?
            .into_iter()
            .find(|z| z.id == zone_id)
            .ok_or(AdminError::ZoneNotFound(zone_id))?;
        zone.status = RecordStatus::Inactive;
        self.store.update_zone(tenant, zone).await?;
        info!(tenant = %tenant, zone = %zone_id, "neighborhood zone deactivated");
        Ok(())
    }

    async fn geocode_center(&self, tenant: TenantId, center_address: &str) -> Result<Coordinates, AdminError> {
        let locale = self.locale(tenant).await?;
        match self.gateway.geocode(center_address, &locale).await {
            Ok(found) => Ok(found.coordinates()),
            Err(GeocodeError::Provider(err)) => Err(err.into()),
            Err(err) => Err(AdminError::CenterNotGeocoded {
                address: center_address.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    pub async fn add_radius_tier(
        &self,
        tenant: TenantId,
        center_address: &str,
        tier: NewRadiusTier,
    ) -> Result<RadiusTier, AdminError> {
        tier.validate()?;
        let center = self.geocode_center(tenant, center_address).await?;
        let tier = tier.into_tier(center_address, center);
        self.store.insert_tier(tenant, tier.clone()).await?;
        info!(tenant = %tenant, km_start = tier.km_start, km_end = tier.km_end, "radius tier added");
        self.area_changed(tenant).await;
        Ok(tier)
    }

    /// Geocode the center once and create every valid tier around it.
    pub async fn bulk_add_radius_tiers(
        &self,
        tenant: TenantId,
        center_address: &str,
        tiers: Vec<NewRadiusTier>,
    ) -> Result<Vec<RadiusTier>, AdminError> {
        let center = self.geocode_center(tenant, center_address).await?;

        let mut created = Vec::new();
        for tier in tiers {
            if let Err(err) = tier.validate() {
                warn!(tenant = %tenant, error = %err, "skipping invalid radius tier");
                continue;
            }
            let tier = tier.into_tier(center_address, center);
            self.store.insert_tier(tenant, tier.clone()).await?;
            created.push(tier);
        }
        info!(tenant = %tenant, created = created.len(), "bulk radius import finished");
        if !created.is_empty() {
            self.area_changed(tenant).await;
        }
        Ok(created)
    }

    pub async fn deactivate_tier(&self, tenant: TenantId, tier_id: Uuid) -> Result<(), AdminError> {
        let mut tier = self
            .store
            .tiers(tenant)
            .await?
            .into_iter()
            .find(|t| t.id == tier_id)
            .ok_or(AdminError::TierNotFound(tier_id))?;
        tier.status = RecordStatus::Inactive;
        self.store.update_tier(tenant, tier).await?;
        info!(tenant = %tenant, tier = %tier_id, "radius tier deactivated");
        Ok(())
    }

    /// Register zones and tiers together and switch the tenant to hybrid mode,
    /// neighborhood first. Other configuration fields are kept.
    pub async fn setup_hybrid(
        &self,
        tenant: TenantId,
        center_address: &str,
        zones: Vec<NewZone>,
        tiers: Vec<NewRadiusTier>,
    ) -> Result<HybridSetup, AdminError> {
        let zones_created = self.bulk_add_neighborhoods(tenant, zones).await?.len();
        let tiers_created = if tiers.is_empty() {
            0
        } else {
            self.bulk_add_radius_tiers(tenant, center_address, tiers).await?.len()
        };

        let mut config = self
            .store
            .configuration(tenant)
            .await?
            .unwrap_or_else(|| DeliveryConfiguration::new(tenant, DeliveryMode::Hybrid));
        config.mode = DeliveryMode::Hybrid;
        config.hybrid_priority = HybridPriority::NeighborhoodFirst;
        self.store.save_configuration(config).await?;
        self.area_changed(tenant).await;

        info!(tenant = %tenant, zones_created, tiers_created, "hybrid delivery set up");
        Ok(HybridSetup {
            zones_created,
            tiers_created,
        })
    }

    pub async fn delivery_overview(&self, tenant: TenantId) -> Result<DeliveryOverview, AdminError> {
        let zones = self.store.active_zones(tenant).await?;
        let config = self.store.configuration(tenant).await?;

        Ok(DeliveryOverview {
            total_neighborhoods: zones.len(),
            deliverable_neighborhoods: zones
                .iter()
                .filter(|z| z.delivery_type != ZoneDeliveryType::Unavailable)
                .count(),
            radius_tiers: self.store.active_tiers(tenant).await?.len(),
            cached_addresses: self.cache.count(tenant).await?,
            mode: config.as_ref().map(|c| c.mode),
            status: if config.is_some() {
                OverviewStatus::Active
            } else {
                OverviewStatus::NotConfigured
            },
        })
    }
}
