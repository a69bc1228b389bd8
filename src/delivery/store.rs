//! Tenant delivery setup: configuration, neighborhood zones and radius tiers.
//!
//! Resolvers only read from here. Mutations come from the admin surface.

use super::types::{DeliveryConfiguration, NeighborhoodZone, RadiusTier, TenantId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Zone,
    Tier,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone => write!(f, "zone"),
            Self::Tier => write!(f, "radius tier"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("tenant store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tenant store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: Uuid },
}

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn configuration(&self, tenant: TenantId) -> Result<Option<DeliveryConfiguration>, StoreError>;

    /// Create on first save, replace afterwards.
    async fn save_configuration(&self, config: DeliveryConfiguration) -> Result<(), StoreError>;

    /// All zones, active or not, in registration order.
    async fn zones(&self, tenant: TenantId) -> Result<Vec<NeighborhoodZone>, StoreError>;

    async fn insert_zone(&self, tenant: TenantId, zone: NeighborhoodZone) -> Result<(), StoreError>;

    /// Replace the zone with the same id.
    async fn update_zone(&self, tenant: TenantId, zone: NeighborhoodZone) -> Result<(), StoreError>;

    /// All tiers, active or not, in registration order.
    async fn tiers(&self, tenant: TenantId) -> Result<Vec<RadiusTier>, StoreError>;

    async fn insert_tier(&self, tenant: TenantId, tier: RadiusTier) -> Result<(), StoreError>;

    async fn update_tier(&self, tenant: TenantId, tier: RadiusTier) -> Result<(), StoreError>;

    async fn active_zones(&self, tenant: TenantId) -> Result<Vec<NeighborhoodZone>, StoreError> {
        Ok(self
            .zones(tenant)
            .await?
            .into_iter()
            .filter(NeighborhoodZone::is_active)
            .collect())
    }

    /// Active tiers ascending by `km_start`. Equal starts keep registration order.
    async fn active_tiers(&self, tenant: TenantId) -> Result<Vec<RadiusTier>, StoreError> {
        let mut tiers: Vec<RadiusTier> = self
            .tiers(tenant)
            .await?
            .into_iter()
            .filter(RadiusTier::is_active)
            .collect();
        tiers.sort_by(|a, b| a.km_start.total_cmp(&b.km_start));
        Ok(tiers)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TenantRecord {
    tenant_id: TenantId,
    #[serde(default)]
    configuration: Option<DeliveryConfiguration>,
    #[serde(default)]
    zones: Vec<NeighborhoodZone>,
    #[serde(default)]
    tiers: Vec<RadiusTier>,
}

type Records = BTreeMap<TenantId, TenantRecord>;

/// Tenant store backed by one JSON file, or by memory only.
pub struct JsonTenantStore {
    path: Option<PathBuf>,
    records: RwLock<Records>,
}

impl JsonTenantStore {
    pub fn load_from(path: PathBuf) -> Self {
        let records = Self::read_file(&path).unwrap_or_default();
        Self {
            path: Some(path),
            records: RwLock::new(records),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".delivery-eligibility")
            .join("tenants.json")
    }

    fn read_file(path: &Path) -> Option<Records> {
        let data = fs::read_to_string(path).ok()?;
        let rows: Vec<TenantRecord> = serde_json::from_str(&data).ok()?;
        Some(rows.into_iter().map(|row| (row.tenant_id, row)).collect())
    }

    async fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rows: Vec<&TenantRecord> = records.values().collect();
        tokio::fs::write(path, serde_json::to_vec_pretty(&rows)?).await?;
        Ok(())
    }

    async fn mutate<F>(&self, tenant: TenantId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut TenantRecord) -> Result<(), StoreError> + Send,
    {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        let record = next.entry(tenant).or_insert_with(|| TenantRecord {
            tenant_id: tenant,
            ..TenantRecord::default()
        });
        apply(record)?;
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn read<T, F>(&self, tenant: TenantId, view: F) -> T
    where
        F: FnOnce(Option<&TenantRecord>) -> T + Send,
    {
        let records = self.records.read().await;
        view(records.get(&tenant))
    }
}

#[async_trait]
impl TenantStore for JsonTenantStore {
    async fn configuration(&self, tenant: TenantId) -> Result<Option<DeliveryConfiguration>, StoreError> {
        Ok(self
            .read(tenant, |record| record.and_then(|r| r.configuration.clone()))
            .await)
    }

    async fn save_configuration(&self, config: DeliveryConfiguration) -> Result<(), StoreError> {
        self.mutate(config.tenant_id, |record| {
            record.configuration = Some(config);
            Ok(())
        })
        .await
    }

    async fn zones(&self, tenant: TenantId) -> Result<Vec<NeighborhoodZone>, StoreError> {
        Ok(self
            .read(tenant, |record| record.map(|r| r.zones.clone()).unwrap_or_default())
            .await)
    }

    async fn insert_zone(&self, tenant: TenantId, zone: NeighborhoodZone) -> Result<(), StoreError> {
        self.mutate(tenant, |record| {
            record.zones.push(zone);
            Ok(())
        })
        .await
    }

    async fn update_zone(&self, tenant: TenantId, zone: NeighborhoodZone) -> Result<(), StoreError> {
        self.mutate(tenant, |record| {
            let slot = record
                .zones
                .iter_mut()
                .find(|z| z.id == zone.id)
                .ok_or(StoreError::NotFound {
                    kind: RecordKind::Zone,
                    id: zone.id,
                })?;
            *slot = zone;
            Ok(())
        })
        .await
    }

    async fn tiers(&self, tenant: TenantId) -> Result<Vec<RadiusTier>, StoreError> {
        Ok(self
            .read(tenant, |record| record.map(|r| r.tiers.clone()).unwrap_or_default())
            .await)
    }

    async fn insert_tier(&self, tenant: TenantId, tier: RadiusTier) -> Result<(), StoreError> {
        self.mutate(tenant, |record| {
            record.tiers.push(tier);
            Ok(())
        })
        .await
    }

    async fn update_tier(&self, tenant: TenantId, tier: RadiusTier) -> Result<(), StoreError> {
        self.mutate(tenant, |record| {
            let slot = record
                .tiers
                .iter_mut()
                .find(|t| t.id == tier.id)
                .ok_or(StoreError::NotFound {
                    kind: RecordKind::Tier,
                    id: tier.id,
                })?;
            *slot = tier;
            Ok(())
        })
        .await
    }
}
