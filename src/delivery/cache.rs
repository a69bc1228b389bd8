//! Address resolution cache.
//!
//! Keys are `(tenant, normalized address)`. Entries expire after a TTL
//! (30 days by default) and are purged when an expired entry is looked up.
//! Non-deliverable outcomes are cached too, so addresses we already know we
//! cannot serve never reach the geocoding provider again.
//!
//! The default store is a JSON file at ~/.delivery-eligibility/address_cache.json.
//! A missing or unreadable file starts an empty cache.

use super::normalize::{first_number_token, log_preview, normalize_address, similarity_ratio};
use super::types::{
    Coordinates, DeliveryQuote, PlaceDetails, Rejection, Resolution, ResolverKind, TenantId,
    ValidationMethod,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// ETA reported for cached hits that predate ETA tracking.
const FALLBACK_ETA_MINUTES: u32 = 60;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One remembered resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResolution {
    pub tenant_id: TenantId,
    pub address_key: String,
    pub normalized_address: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    pub is_deliverable: bool,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default)]
    pub eta_minutes: Option<u32>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub tried_methods: Vec<ResolverKind>,
    pub validated_at: DateTime<Utc>,
}

impl CachedResolution {
    /// Build an entry from a resolver outcome. Clarification requests and
    /// rejections caused by missing tenant setup are not cached.
    pub fn from_resolution(
        tenant_id: TenantId,
        address_key: String,
        resolution: &Resolution,
    ) -> Option<Self> {
        let (is_deliverable, fee, eta_minutes, distance_km, reason, tried_methods) = match resolution {
            Resolution::Deliverable(quote) => (
                true,
                quote.fee,
                Some(quote.eta_minutes),
                quote.distance_km,
                None,
                Vec::new(),
            ),
            Resolution::NotDeliverable(rejection) if rejection.setup_incomplete => return None,
            Resolution::NotDeliverable(rejection) => (
                false,
                Decimal::ZERO,
                None,
                rejection.distance_km,
                Some(rejection.reason.clone()),
                rejection.tried_methods.clone(),
            ),
            Resolution::NeedsClarification { .. } => return None,
        };

        let place = resolution.place().cloned().unwrap_or_default();
        let normalized_address = if place.normalized_address.is_empty() {
            address_key.clone()
        } else {
            place.normalized_address
        };

        Some(Self {
            tenant_id,
            address_key,
            normalized_address,
            coordinates: place.coordinates,
            neighborhood: place.neighborhood,
            city: place.city,
            state: place.state,
            zip: place.zip,
            is_deliverable,
            fee,
            eta_minutes,
            distance_km,
            reason,
            place_id: place.place_id,
            tried_methods,
            validated_at: Utc::now(),
        })
    }

    fn place(&self) -> PlaceDetails {
        PlaceDetails {
            normalized_address: self.normalized_address.clone(),
            coordinates: self.coordinates,
            neighborhood: self.neighborhood.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
            place_id: self.place_id.clone(),
        }
    }

    /// Replay the entry as a resolution tagged `cache`.
    pub fn to_resolution(&self) -> Resolution {
        if self.is_deliverable {
            Resolution::Deliverable(DeliveryQuote {
                fee: self.fee,
                eta_minutes: self.eta_minutes.unwrap_or(FALLBACK_ETA_MINUTES),
                method: ValidationMethod::Cache,
                place: self.place(),
                distance_km: self.distance_km,
            })
        } else {
            let reason = self
                .reason
                .clone()
                .unwrap_or_else(|| "address outside the delivery area".to_string());
            Resolution::NotDeliverable(Rejection {
                place: Some(self.place()),
                distance_km: self.distance_km,
                tried_methods: self.tried_methods.clone(),
                ..Rejection::new(ValidationMethod::Cache, reason)
            })
        }
    }

    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.validated_at <= ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CacheHitKind {
    Exact,
    Fuzzy { score: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub entry: CachedResolution,
    pub kind: CacheHitKind,
}

impl CacheHit {
    pub fn resolution(&self) -> Resolution {
        self.entry.to_resolution()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodCount {
    pub neighborhood: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub total_cached: usize,
    pub deliverable_count: usize,
    pub non_deliverable_count: usize,
    pub top_neighborhoods: Vec<NeighborhoodCount>,
    pub window_days: u32,
    pub estimated_provider_calls_saved: usize,
}

/// Persistence seam for cached resolutions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<CachedResolution>, CacheError>;

    /// Insert or replace the entry at `(entry.tenant_id, entry.address_key)`.
    async fn upsert(&self, entry: CachedResolution) -> Result<(), CacheError>;

    async fn remove(&self, tenant: TenantId, key: &str) -> Result<bool, CacheError>;

    async fn entries(&self, tenant: TenantId) -> Result<Vec<CachedResolution>, CacheError>;

    /// Delete entries validated before `cutoff`, for one tenant or all of them.
    async fn purge_older_than(
        &self,
        tenant: Option<TenantId>,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, CacheError>;
}

type EntryMap = HashMap<(TenantId, String), CachedResolution>;

/// JSON-file cache store. Every mutation rewrites the file.
pub struct FileCacheStore {
    path: Option<PathBuf>,
    entries: RwLock<EntryMap>,
}

impl FileCacheStore {
    pub fn load_from(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        Self {
            path: Some(path),
            entries: RwLock::new(entries),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".delivery-eligibility")
            .join("address_cache.json")
    }

    fn read_file(path: &Path) -> Option<EntryMap> {
        let data = fs::read_to_string(path).ok()?;
        let rows: Vec<CachedResolution> = serde_json::from_str(&data).ok()?;
        Some(
            rows.into_iter()
                .map(|row| ((row.tenant_id, row.address_key.clone()), row))
                .collect(),
        )
    }

    async fn persist(&self, entries: &EntryMap) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rows: Vec<&CachedResolution> = entries.values().collect();
        let json = serde_json::to_vec_pretty(&rows)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, tenant: TenantId, key: &str) -> Result<Option<CachedResolution>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(tenant, key.to_string())).cloned())
    }

    async fn upsert(&self, entry: CachedResolution) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.insert((entry.tenant_id, entry.address_key.clone()), entry);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn remove(&self, tenant: TenantId, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().await;
        let slot = (tenant, key.to_string());
        if !entries.contains_key(&slot) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(&slot);
        self.persist(&next).await?;
        *entries = next;
        Ok(true)
    }

    async fn entries(&self, tenant: TenantId) -> Result<Vec<CachedResolution>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|entry| entry.tenant_id == tenant)
            .cloned()
            .collect())
    }

    async fn purge_older_than(
        &self,
        tenant: Option<TenantId>,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        next.retain(|_, entry| {
            let in_scope = tenant.map_or(true, |t| entry.tenant_id == t);
            !(in_scope && entry.validated_at < cutoff)
        });
        let deleted = entries.len() - next.len();
        if deleted > 0 {
            self.persist(&next).await?;
            *entries = next;
        }
        Ok(deleted)
    }
}

/// Exact and fuzzy lookup over a [`CacheStore`], with TTL handling.
#[derive(Clone)]
pub struct AddressCache {
    store: Arc<dyn CacheStore>,
    ttl_days: u32,
}

impl AddressCache {
    pub const DEFAULT_TTL_DAYS: u32 = 30;
    pub const FUZZY_THRESHOLD: f64 = 0.80;

    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl_days: Self::DEFAULT_TTL_DAYS,
        }
    }

    pub fn with_ttl_days(mut self, ttl_days: u32) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    pub fn ttl_days(&self) -> u32 {
        self.ttl_days
    }

    fn ttl(&self) -> Duration {
        Duration::days(i64::from(self.ttl_days))
    }

    /// Look up an address (raw or already normalized).
    ///
    /// Store read failures are logged and reported as a miss.
    pub async fn lookup(&self, address: &str, tenant: TenantId) -> Option<CacheHit> {
        let key = normalize_address(address);
        let now = Utc::now();

        match self.store.get(tenant, &key).await {
            Ok(Some(entry)) if entry.is_fresh(now, self.ttl()) => {
                info!(tenant = %tenant, address = %log_preview(address), "cache hit (exact)");
                return Some(CacheHit {
                    entry,
                    kind: CacheHitKind::Exact,
                });
            }
            Ok(Some(_)) => {
                if let Err(err) = self.store.remove(tenant, &key).await {
                    warn!(tenant = %tenant, error = %err, "failed to purge expired cache entry");
                } else {
                    debug!(tenant = %tenant, address = %log_preview(address), "cache entry expired and purged");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(tenant = %tenant, error = %err, "cache read failed, treating as miss");
                return None;
            }
        }

        let hit = self.fuzzy_match(&key, tenant, now).await;
        if hit.is_none() {
            info!(tenant = %tenant, address = %log_preview(address), "cache miss");
        }
        hit
    }

    async fn fuzzy_match(&self, key: &str, tenant: TenantId, now: DateTime<Utc>) -> Option<CacheHit> {
        let number = first_number_token(key)?;

        let candidates = match self.store.entries(tenant).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(tenant = %tenant, error = %err, "cache scan failed, treating as miss");
                return None;
            }
        };

        let mut best: Option<(CachedResolution, f64)> = None;
        for candidate in candidates {
            if !candidate.address_key.contains(number) || !candidate.is_fresh(now, self.ttl()) {
                continue;
            }
            let score = similarity_ratio(key, &candidate.address_key);
            if score < Self::FUZZY_THRESHOLD {
                continue;
            }
            if best.as_ref().map_or(true, |(_, top)| score > *top) {
                best = Some((candidate, score));
            }
        }

        best.map(|(entry, score)| {
            info!(tenant = %tenant, score, matched = %entry.address_key, "cache hit (fuzzy)");
            CacheHit {
                entry,
                kind: CacheHitKind::Fuzzy { score },
            }
        })
    }

    /// Upsert the outcome for `raw_address`. Deliverable and non-deliverable
    /// outcomes are both written; clarification requests are skipped.
    pub async fn save(
        &self,
        raw_address: &str,
        tenant: TenantId,
        resolution: &Resolution,
    ) -> Result<(), CacheError> {
        let key = normalize_address(raw_address);
        let Some(entry) = CachedResolution::from_resolution(tenant, key, resolution) else {
            return Ok(());
        };
        self.store.upsert(entry).await?;
        debug!(tenant = %tenant, address = %log_preview(raw_address), "cache saved");
        Ok(())
    }

    /// [`save`](Self::save), logging and swallowing store failures.
    pub async fn remember(&self, raw_address: &str, tenant: TenantId, resolution: &Resolution) {
        if let Err(err) = self.save(raw_address, tenant, resolution).await {
            warn!(
                tenant = %tenant,
                address = %log_preview(raw_address),
                error = %err,
                "cache write failed; returning uncached result"
            );
        }
    }

    pub async fn invalidate(&self, raw_address: &str, tenant: TenantId) -> Result<bool, CacheError> {
        let key = normalize_address(raw_address);
        self.store.remove(tenant, &key).await
    }

    /// Drop every non-deliverable entry of a tenant. Called whenever the
    /// served area grows, since those answers may no longer hold.
    pub async fn forget_rejections(&self, tenant: TenantId) -> Result<usize, CacheError> {
        let mut forgotten = 0;
        for entry in self.store.entries(tenant).await? {
            if !entry.is_deliverable && self.store.remove(tenant, &entry.address_key).await? {
                forgotten += 1;
            }
        }
        if forgotten > 0 {
            info!(tenant = %tenant, forgotten, "dropped cached rejections after delivery area change");
        }
        Ok(forgotten)
    }

    /// Delete entries older than `ttl_days`, for one tenant or globally.
    pub async fn cleanup(&self, tenant: Option<TenantId>, ttl_days: u32) -> Result<usize, CacheError> {
        let cutoff = Utc::now() - Duration::days(i64::from(ttl_days));
        let deleted = self.store.purge_older_than(tenant, cutoff).await?;
        info!(deleted, ttl_days, "cleaned up expired cache entries");
        Ok(deleted)
    }

    pub async fn statistics(&self, tenant: TenantId, window_days: u32) -> Result<CacheStatistics, CacheError> {
        let since = Utc::now() - Duration::days(i64::from(window_days));
        let recent: Vec<CachedResolution> = self
            .store
            .entries(tenant)
            .await?
            .into_iter()
            .filter(|entry| entry.validated_at >= since)
            .collect();

        let total_cached = recent.len();
        let deliverable_count = recent.iter().filter(|e| e.is_deliverable).count();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in recent.iter().filter(|e| e.is_deliverable) {
            if let Some(name) = &entry.neighborhood {
                *counts.entry(name.clone()).or_default() += 1;
            }
        }
        let mut top_neighborhoods: Vec<NeighborhoodCount> = counts
            .into_iter()
            .map(|(neighborhood, count)| NeighborhoodCount { neighborhood, count })
            .collect();
        top_neighborhoods.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.neighborhood.cmp(&b.neighborhood)));
        top_neighborhoods.truncate(10);

        Ok(CacheStatistics {
            total_cached,
            deliverable_count,
            non_deliverable_count: total_cached - deliverable_count,
            top_neighborhoods,
            window_days,
            estimated_provider_calls_saved: total_cached,
        })
    }

    /// Number of entries currently stored for a tenant, fresh or not.
    pub async fn count(&self, tenant: TenantId) -> Result<usize, CacheError> {
        Ok(self.store.entries(tenant).await?.len())
    }
}
