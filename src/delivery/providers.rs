//! Geocoding providers.

use super::geocoding::{ComponentFilters, GeoResult, GeocodingProvider, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

// ─── Google Geocoding API ───────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GoogleResult {
    formatted_address: String,
    geometry: GoogleGeometry,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
    #[serde(default)]
    place_id: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GoogleGeometry {
    location: GoogleLatLng,
}

#[derive(Deserialize, Debug)]
struct GoogleLatLng {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize, Debug)]
struct AddressComponent {
    long_name: String,
    short_name: String,
    #[serde(default)]
    types: Vec<String>,
}

impl AddressComponent {
    fn is(&self, kind: &str) -> bool {
        self.types.iter().any(|t| t == kind)
    }
}

fn to_geo_result(result: GoogleResult) -> GeoResult {
    let find = |kinds: &[&str]| {
        kinds
            .iter()
            .find_map(|kind| result.address_components.iter().find(|c| c.is(kind)))
    };

    let neighborhood = find(&["sublocality", "sublocality_level_1", "neighborhood"]).map(|c| c.long_name.clone());
    let city = find(&["locality", "administrative_area_level_2"]).map(|c| c.long_name.clone());
    let state = find(&["administrative_area_level_1"]).map(|c| c.short_name.clone());
    let zip = find(&["postal_code"]).map(|c| c.long_name.clone());

    GeoResult {
        formatted_address: result.formatted_address,
        lat: result.geometry.location.lat,
        lng: result.geometry.location.lng,
        neighborhood,
        city,
        state,
        zip,
        place_id: result.place_id,
    }
}

fn parse_response(response: GoogleResponse) -> Result<Vec<GeoResult>, ProviderError> {
    match response.status.as_str() {
        "OK" => Ok(response.results.into_iter().map(to_geo_result).collect()),
        "ZERO_RESULTS" => Ok(Vec::new()),
        _ => Err(ProviderError::Denied {
            message: response.error_message.unwrap_or_default(),
            status: response.status,
        }),
    }
}

/// Google Geocoding API client. Requests run on the blocking pool.
pub struct GoogleGeocoder {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleGeocoder {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("delivery-eligibility/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    fn fetch(
        agent: &ureq::Agent,
        url: &str,
        key: &str,
        query: &str,
        components: Option<&str>,
    ) -> Result<Vec<GeoResult>, ProviderError> {
        let mut request = agent
            .get(url)
            .query("address", query)
            .query("language", "pt-BR")
            .query("key", key);
        if let Some(components) = components {
            request = request.query("components", components);
        }

        let response: GoogleResponse = request
            .call()
            .map_err(|e| ProviderError::Network(e.to_string()))?
            .into_json()
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parse_response(response)
    }
}

#[async_trait]
impl GeocodingProvider for GoogleGeocoder {
    async fn search(&self, query: &str, filters: &ComponentFilters) -> Result<Vec<GeoResult>, ProviderError> {
        let Some(key) = self.api_key.clone() else {
            return Err(ProviderError::Denied {
                status: "REQUEST_DENIED".into(),
                message: "no geocoding API key configured".into(),
            });
        };

        let agent = self.agent.clone();
        let url = self.base_url.clone();
        let query = query.to_string();
        let components = filters.to_query();
        debug!(components = ?components, "calling geocoding provider");

        tokio::task::spawn_blocking(move || Self::fetch(&agent, &url, &key, &query, components.as_deref()))
            .await
            .map_err(|e| ProviderError::Join(e.to_string()))?
    }
}
