//! Core types for the delivery subsystem.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type TenantId = Uuid;

/// Which resolver a tenant's addresses go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Neighborhood,
    Radius,
    Hybrid,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Neighborhood => write!(f, "neighborhood"),
            Self::Radius => write!(f, "radius"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Try-order for hybrid resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridPriority {
    #[default]
    NeighborhoodFirst,
    RadiusFirst,
}

/// Where a tenant operates. Used as geocoding bias and as the reference
/// city for rejecting unbiased matches that land somewhere else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLocale {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Per-tenant delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfiguration {
    pub tenant_id: TenantId,
    pub mode: DeliveryMode,
    #[serde(default)]
    pub free_delivery_minimum: Option<Decimal>,
    #[serde(default)]
    pub default_fee: Decimal,
    #[serde(default)]
    pub hybrid_priority: HybridPriority,
    #[serde(default)]
    pub locale: ServiceLocale,
}

impl DeliveryConfiguration {
    pub fn new(tenant_id: TenantId, mode: DeliveryMode) -> Self {
        Self {
            tenant_id,
            mode,
            free_delivery_minimum: None,
            default_fee: Decimal::ZERO,
            hybrid_priority: HybridPriority::default(),
            locale: ServiceLocale::default(),
        }
    }
}

/// Soft-delete marker for zones and tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Active,
    Inactive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneDeliveryType {
    Free,
    #[default]
    Paid,
    Unavailable,
}

/// A named neighborhood the tenant registered for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodZone {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub state: String,
    pub delivery_type: ZoneDeliveryType,
    pub fee: Decimal,
    pub eta_minutes: u32,
    #[serde(default)]
    pub zip_codes: Vec<String>,
    #[serde(default)]
    pub status: RecordStatus,
}

impl NeighborhoodZone {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// Fee charged for this zone. Free zones never charge, whatever fee is stored.
    pub fn quoted_fee(&self) -> Decimal {
        match self.delivery_type {
            ZoneDeliveryType::Free => Decimal::ZERO,
            ZoneDeliveryType::Paid | ZoneDeliveryType::Unavailable => self.fee,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A distance band around a reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusTier {
    pub id: Uuid,
    #[serde(default)]
    pub center_address: Option<String>,
    pub center: Coordinates,
    pub km_start: f64,
    pub km_end: f64,
    pub fee: Decimal,
    pub eta_minutes: u32,
    #[serde(default)]
    pub status: RecordStatus,
}

impl RadiusTier {
    pub fn is_active(&self) -> bool {
        self.status == RecordStatus::Active
    }

    /// Inclusive on both ends.
    pub fn contains(&self, distance_km: f64) -> bool {
        self.km_start <= distance_km && distance_km <= self.km_end
    }
}

/// How a resolution was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    Cache,
    NeighborhoodText,
    NeighborhoodGeocoded,
    Radius,
    HybridNeighborhood,
    HybridRadius,
    Hybrid,
    NotConfigured,
}

impl fmt::Display for ValidationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Cache => "cache",
            Self::NeighborhoodText => "neighborhood_text",
            Self::NeighborhoodGeocoded => "neighborhood_geocoded",
            Self::Radius => "radius",
            Self::HybridNeighborhood => "hybrid_neighborhood",
            Self::HybridRadius => "hybrid_radius",
            Self::Hybrid => "hybrid",
            Self::NotConfigured => "not_configured",
        };
        f.write_str(label)
    }
}

/// The two concrete strategies a hybrid attempt can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverKind {
    Neighborhood,
    Radius,
}

/// What is known about the place an address resolved to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
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
    #[serde(default)]
    pub place_id: Option<String>,
}

impl PlaceDetails {
    pub fn from_text(normalized_address: impl Into<String>) -> Self {
        Self {
            normalized_address: normalized_address.into(),
            ..Self::default()
        }
    }
}

/// A successful resolution: the address is served at this fee and ETA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryQuote {
    pub fee: Decimal,
    pub eta_minutes: u32,
    pub method: ValidationMethod,
    pub place: PlaceDetails,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

/// The address is known but not served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub method: ValidationMethod,
    #[serde(default)]
    pub place: Option<PlaceDetails>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub tried_methods: Vec<ResolverKind>,
    /// The tenant has not registered anything for this strategy yet. Such
    /// answers change as soon as setup happens and are never cached.
    #[serde(default)]
    pub setup_incomplete: bool,
}

impl Rejection {
    pub fn new(method: ValidationMethod, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            method,
            place: None,
            distance_km: None,
            tried_methods: Vec::new(),
            setup_incomplete: false,
        }
    }

    pub fn not_set_up(method: ValidationMethod, reason: impl Into<String>) -> Self {
        Self {
            setup_incomplete: true,
            ..Self::new(method, reason)
        }
    }

    pub fn with_place(mut self, place: PlaceDetails) -> Self {
        self.place = Some(place);
        self
    }
}

/// Terminal answer of a resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Deliverable(DeliveryQuote),
    NotDeliverable(Rejection),
    NeedsClarification { reason: String },
}

impl Resolution {
    pub fn needs_clarification(reason: impl Into<String>) -> Self {
        Self::NeedsClarification {
            reason: reason.into(),
        }
    }

    pub fn is_deliverable(&self) -> bool {
        matches!(self, Self::Deliverable(_))
    }

    pub fn method(&self) -> Option<ValidationMethod> {
        match self {
            Self::Deliverable(quote) => Some(quote.method),
            Self::NotDeliverable(rejection) => Some(rejection.method),
            Self::NeedsClarification { .. } => None,
        }
    }

    pub fn place(&self) -> Option<&PlaceDetails> {
        match self {
            Self::Deliverable(quote) => Some(&quote.place),
            Self::NotDeliverable(rejection) => rejection.place.as_ref(),
            Self::NeedsClarification { .. } => None,
        }
    }

    pub fn fee(&self) -> Option<Decimal> {
        match self {
            Self::Deliverable(quote) => Some(quote.fee),
            _ => None,
        }
    }

    /// Re-tag a deliverable result, e.g. when a hybrid attempt wraps it.
    pub fn retagged(self, method: ValidationMethod) -> Self {
        match self {
            Self::Deliverable(mut quote) => {
                quote.method = method;
                Self::Deliverable(quote)
            }
            other => other,
        }
    }
}

/// The record handed back to callers of `validate_address`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResult {
    pub is_deliverable: bool,
    pub needs_clarification: bool,
    pub delivery_fee: Option<Decimal>,
    pub delivery_time_minutes: Option<u32>,
    pub neighborhood: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub normalized_address: Option<String>,
    pub distance_km: Option<f64>,
    pub message: String,
    pub reason: Option<String>,
    pub validation_method: Option<ValidationMethod>,
    #[serde(default)]
    pub tried_methods: Vec<ResolverKind>,
    #[serde(default)]
    pub free_delivery_applied: bool,
}
