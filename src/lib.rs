//! Delivery eligibility engine.
//!
//! Resolves free-text customer addresses into a deliverable / not deliverable
//! answer with fee and ETA, per tenant, using registered neighborhood zones,
//! distance tiers around a reference point, or both.

pub mod config;
pub mod delivery;
pub mod error;
pub mod server;
pub mod telemetry;
