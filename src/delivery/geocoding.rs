//! Geocoding gateway.
//!
//! Calls the provider with the tenant's locale as a component filter first.
//! When that returns nothing the query is retried unfiltered, and the result
//! is only accepted if it lands in the tenant's city. Place names repeat
//! across countries; without the guard "Jardim Europa" can resolve to Europe.

use super::normalize::log_preview;
use super::types::{Coordinates, PlaceDetails, ServiceLocale};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A single provider candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoResult {
    pub formatted_address: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

impl GeoResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }

    pub fn place(&self) -> PlaceDetails {
        PlaceDetails {
            normalized_address: self.formatted_address.clone(),
            coordinates: Some(self.coordinates()),
            neighborhood: self.neighborhood.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip: self.zip.clone(),
            place_id: self.place_id.clone(),
        }
    }
}

/// Component restrictions passed to the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentFilters {
    pub locality: Option<String>,
    pub administrative_area: Option<String>,
    pub country: Option<String>,
}

impl ComponentFilters {
    pub fn is_empty(&self) -> bool {
        self.locality.is_none() && self.administrative_area.is_none() && self.country.is_none()
    }

    /// `locality:X|administrative_area:Y|country:Z`, skipping absent parts.
    pub fn to_query(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("locality", &self.locality),
            ("administrative_area", &self.administrative_area),
            ("country", &self.country),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| format!("{name}:{v}")))
        .collect();

        (!parts.is_empty()).then(|| parts.join("|"))
    }
}

impl From<&ServiceLocale> for ComponentFilters {
    fn from(locale: &ServiceLocale) -> Self {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            locality: present(&locale.city),
            administrative_area: present(&locale.state),
            country: present(&locale.country),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    #[error("provider denied the request ({status}): {message}")]
    Denied { status: String, message: String },
    #[error("geocoding task failed: {0}")]
    Join(String),
}

/// Outcome union of [`GeocodingGateway::geocode`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeocodeError {
    #[error("address not found")]
    NotFound,
    #[error("geocoded city '{found}' does not match the service city '{expected}'")]
    RejectedCityMismatch { expected: String, found: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// External geocoding backend.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        filters: &ComponentFilters,
    ) -> Result<Vec<GeoResult>, ProviderError>;
}

#[derive(Clone)]
pub struct GeocodingGateway {
    provider: Arc<dyn GeocodingProvider>,
}

impl GeocodingGateway {
    pub fn new(provider: Arc<dyn GeocodingProvider>) -> Self {
        Self { provider }
    }

    pub async fn geocode(&self, address: &str, bias: &ServiceLocale) -> Result<GeoResult, GeocodeError> {
        let filters = ComponentFilters::from(bias);
        let preview = log_preview(address);

        if !filters.is_empty() {
            if let Some(found) = self.provider.search(address, &filters).await?.into_iter().next() {
                debug!(address = %preview, "geocoded with locale bias");
                return Ok(found);
            }
            info!(address = %preview, "biased geocode found nothing, retrying unbiased");
        }

        let found = self
            .provider
            .search(address, &ComponentFilters::default())
            .await?
            .into_iter()
            .next()
            .ok_or(GeocodeError::NotFound)?;

        if let Some(expected) = &filters.locality {
            let found_city = found.city.clone().unwrap_or_default();
            if !same_city(expected, &found_city) {
                warn!(
                    address = %preview,
                    expected = %expected,
                    found = %found_city,
                    "rejected unbiased geocode outside the service city"
                );
                return Err(GeocodeError::RejectedCityMismatch {
                    expected: expected.clone(),
                    found: found_city,
                });
            }
        }

        Ok(found)
    }
}

fn same_city(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Per-request memo so that strategies run by one request share a single
/// provider round-trip.
#[derive(Debug, Default)]
pub struct GeocodeSlot {
    cell: OnceCell<Result<GeoResult, GeocodeError>>,
}

impl GeocodeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &self,
        gateway: &GeocodingGateway,
        address: &str,
        bias: &ServiceLocale,
    ) -> Result<GeoResult, GeocodeError> {
        self.cell
            .get_or_init(|| gateway.geocode(address, bias))
            .await
            .clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }
}
