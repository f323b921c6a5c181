// crates/runner-core/src/runtime/probe.rs
// ============================================================================
// Module: Static Probe Backends
// Description: Table-driven IP fetcher and geo resolver.
// Purpose: Exercise preflight probing without network access.
// Dependencies: tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! Lookup tables keyed by offer reference and IP address. Unknown keys fail
//! the way the network backends do; optional delays exercise deadlines.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::Offer;
use crate::interfaces::GeoLocation;
use crate::interfaces::GeoResolver;
use crate::interfaces::IpFetcher;
use crate::interfaces::ProbeError;

// ============================================================================
// SECTION: IP Fetcher
// ============================================================================

/// [`IpFetcher`] that maps offer references to fixed IPs.
#[derive(Debug, Clone, Default)]
pub struct StaticIpFetcher {
    /// IPs by offer reference.
    ips: BTreeMap<String, String>,
    /// Delay before answering.
    delay: Duration,
}

impl StaticIpFetcher {
    /// Creates an empty fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `offer_ref` to `ip`.
    #[must_use]
    pub fn with_ip(mut self, offer_ref: impl Into<String>, ip: impl Into<String>) -> Self {
        self.ips.insert(offer_ref.into(), ip.into());
        self
    }

    /// Delays every answer.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl IpFetcher for StaticIpFetcher {
    async fn fetch_public_ip(&self, offer: &Offer) -> Result<String, ProbeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.ips
            .get(&offer.reference)
            .cloned()
            .ok_or_else(|| ProbeError::IpFetch(format!("no ip for offer {}", offer.reference)))
    }
}

// ============================================================================
// SECTION: Geo Resolver
// ============================================================================

/// [`GeoResolver`] backed by a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoResolver {
    /// Locations by IP.
    locations: BTreeMap<String, GeoLocation>,
}

impl StaticGeoResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `ip` to a country and continent.
    #[must_use]
    pub fn with_location(
        mut self,
        ip: impl Into<String>,
        country: impl Into<String>,
        continent: impl Into<String>,
    ) -> Self {
        self.locations.insert(
            ip.into(),
            GeoLocation {
                country: country.into(),
                continent: continent.into(),
                source: "static".to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl GeoResolver for StaticGeoResolver {
    async fn resolve(&self, ip: &str) -> Result<GeoLocation, ProbeError> {
        self.locations
            .get(ip)
            .cloned()
            .ok_or_else(|| ProbeError::GeoLookup(format!("no location for {ip}")))
    }
}
