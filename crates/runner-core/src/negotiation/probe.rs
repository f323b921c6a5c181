// crates/runner-core/src/negotiation/probe.rs
// ============================================================================
// Module: Preflight Prober
// Description: Egress IP and geolocation probe for offers without usable claims.
// Purpose: Produce a verifiable region bucket and evidence for one offer.
// Dependencies: serde_json, time, crate::interfaces
// ============================================================================

//! ## Overview
//! A probe resolves the offer's public egress IP, geolocates it, and buckets
//! the result. The evidence reference is the content hash of the probe
//! record, so the stored artifact can be checked against the receipt later.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;

use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::Offer;
use crate::core::ProbeEvidence;
use crate::core::clock::format_rfc3339;
use crate::core::hashing::hash_canonical_json;
use crate::interfaces::GeoResolver;
use crate::interfaces::IpFetcher;
use crate::interfaces::ProbeError;

// ============================================================================
// SECTION: Prober
// ============================================================================

/// Preflight prober over pluggable IP and geo backends.
#[derive(Clone)]
pub struct PreflightProber {
    /// Egress IP backend.
    ip_fetcher: Arc<dyn IpFetcher>,
    /// Geolocation backend.
    geo: Arc<dyn GeoResolver>,
}

impl PreflightProber {
    /// Creates a prober.
    #[must_use]
    pub fn new(ip_fetcher: Arc<dyn IpFetcher>, geo: Arc<dyn GeoResolver>) -> Self {
        Self {
            ip_fetcher,
            geo,
        }
    }

    /// Probes `offer` and returns the evidence record.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the IP or the location cannot be resolved.
    pub async fn probe(
        &self,
        offer: &Offer,
        observed_at: OffsetDateTime,
    ) -> Result<ProbeEvidence, ProbeError> {
        let public_ip = self.ip_fetcher.fetch_public_ip(offer).await?;
        let location = self.geo.resolve(&public_ip).await?;
        let bucket = location.bucket();
        let record = json!({
            "offer_ref": offer.reference,
            "public_ip": public_ip,
            "country": location.country,
            "continent": location.continent,
            "geo_source": location.source,
            "bucket": bucket.as_str(),
            "observed_at": format_rfc3339(observed_at),
        });
        let evidence_ref = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &record)
            .map(|digest| digest.prefixed())
            .map_err(|err| ProbeError::GeoLookup(err.to_string()))?;
        Ok(ProbeEvidence {
            public_ip,
            geo_source: location.source,
            country: location.country,
            bucket,
            observed_at,
            evidence_ref,
        })
    }
}
