// crates/runner-core/src/core/offer.rs
// ============================================================================
// Module: Capacity Offers
// Description: Offer property bags, region requests, and market demands.
// Purpose: Describe what negotiation consumes and what it asks the market for.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Offers are ephemeral: they are read once by the negotiator and never
//! stored. Only the declared region properties and the opaque reference are
//! interpreted here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default strict-phase window.
pub const DEFAULT_STRICT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default relax-phase window.
pub const DEFAULT_RELAX_TIMEOUT: Duration = Duration::from_secs(30);
/// Runtime requested in every market demand.
pub const DEMAND_RUNTIME: &str = "docker";
/// Offer property keys that declare a region, in priority order.
pub const REGION_PROPERTY_KEYS: [&str; 3] = ["beacon.region", "region", "geo.region"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Candidate capacity unit advertised by a provider network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Opaque reference used to address the offer's node.
    pub reference: String,
    /// Offer properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Offer {
    /// Creates an offer with no properties.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            properties: Map::new(),
            tags: Vec::new(),
        }
    }

    /// Adds a string property.
    #[must_use]
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Returns the first declared region property as `(key, value)`.
    #[must_use]
    pub fn declared_region(&self) -> Option<(&'static str, &str)> {
        REGION_PROPERTY_KEYS.iter().find_map(|key| {
            self.properties
                .get(*key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(|value| (*key, value))
        })
    }
}

/// Acquisition requirements for one target region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRequest {
    /// Target region code.
    pub region: String,
    /// Minimum vCPU count.
    pub min_vcpu: u32,
    /// Minimum memory in GiB.
    pub min_mem_gib: u32,
    /// Whether outbound network access is required.
    pub network_egress: bool,
    /// Maximum price per minute.
    pub price_per_minute_max: Option<f64>,
    /// Maximum total price.
    pub total_price_cap: Option<f64>,
    /// Strict-phase window.
    pub strict_timeout: Duration,
    /// Relax-phase window.
    pub relax_timeout: Duration,
}

impl RegionRequest {
    /// Creates a request with default resources and windows.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            min_vcpu: 1,
            min_mem_gib: 1,
            network_egress: true,
            price_per_minute_max: None,
            total_price_cap: None,
            strict_timeout: DEFAULT_STRICT_TIMEOUT,
            relax_timeout: DEFAULT_RELAX_TIMEOUT,
        }
    }

    /// Overrides both phase windows.
    #[must_use]
    pub const fn with_windows(mut self, strict: Duration, relax: Duration) -> Self {
        self.strict_timeout = strict;
        self.relax_timeout = relax;
        self
    }
}

/// Hard constraints sent to the capacity market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSpec {
    /// Execution runtime.
    pub runtime: String,
    /// Minimum vCPU count.
    pub min_vcpu: u32,
    /// Minimum memory in GiB.
    pub min_mem_gib: u32,
    /// Whether outbound network access is required.
    pub network_egress: bool,
    /// Maximum price per minute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_minute_max: Option<f64>,
    /// Maximum total price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price_cap: Option<f64>,
    /// Target region, a soft preference for requestor-side filtering.
    pub region: String,
}
