// crates/runner-core/src/core/region.rs
// ============================================================================
// Module: Runner Regions
// Description: Target region codes and coarse geographic buckets.
// Purpose: Share one bucketing rule between validation and network probes.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Job specs name target regions as short codes (`US`, `EU`, `ASIA`, `APAC`).
//! Network probes produce a [`RegionBucket`] from a country and continent
//! code. `APAC` is accepted as a target alias for the `ASIA` bucket.
//! [`RegionVerification`] records how a target region was confirmed and is
//! carried unchanged from negotiation into execution records and receipts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Region codes accepted in job spec constraints.
pub const SUPPORTED_REGIONS: [&str; 4] = ["US", "EU", "ASIA", "APAC"];

// ============================================================================
// SECTION: Region Bucket
// ============================================================================

/// Coarse geographic classification derived from metadata or a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionBucket {
    /// United States.
    #[serde(rename = "US")]
    Us,
    /// Europe.
    #[serde(rename = "EU")]
    Eu,
    /// Asia and Asia-Pacific.
    #[serde(rename = "ASIA")]
    Asia,
    /// Anything else.
    #[serde(rename = "OTHER")]
    Other,
}

impl RegionBucket {
    /// Buckets a location by ISO country code and continent code.
    ///
    /// Country `US` always maps to [`RegionBucket::Us`]; otherwise continent
    /// `EU` maps to Europe, `AS` to Asia, and everything else to Other.
    #[must_use]
    pub fn from_geo(country: &str, continent: &str) -> Self {
        if country.trim().eq_ignore_ascii_case("US") {
            return Self::Us;
        }
        match continent.trim().to_ascii_uppercase().as_str() {
            "EU" => Self::Eu,
            "AS" => Self::Asia,
            _ => Self::Other,
        }
    }

    /// Resolves a target region code into its bucket.
    #[must_use]
    pub fn from_target(region: &str) -> Option<Self> {
        match region.trim().to_ascii_uppercase().as_str() {
            "US" => Some(Self::Us),
            "EU" => Some(Self::Eu),
            "ASIA" | "APAC" => Some(Self::Asia),
            _ => None,
        }
    }

    /// Returns true when this bucket satisfies the target region code.
    #[must_use]
    pub fn matches_target(self, region: &str) -> bool {
        Self::from_target(region) == Some(self)
    }

    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Eu => "EU",
            Self::Asia => "ASIA",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for RegionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true when `region` is an accepted target region code.
#[must_use]
pub fn is_supported_region(region: &str) -> bool {
    SUPPORTED_REGIONS.contains(&region)
}

// ============================================================================
// SECTION: Region Verification
// ============================================================================

/// How a region claim was verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationMethod {
    /// Offer declared the exact target region.
    #[serde(rename = "declared")]
    Declared,
    /// Offer egress was probed and geolocated.
    #[serde(rename = "preflight-probe")]
    PreflightProbe,
}

impl VerificationMethod {
    /// Returns the stable method label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::PreflightProbe => "preflight-probe",
        }
    }
}

/// Artifact captured by a preflight probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeEvidence {
    /// Public egress IP observed for the offer.
    pub public_ip: String,
    /// Geo resolver source label.
    pub geo_source: String,
    /// ISO country code reported by the resolver.
    pub country: String,
    /// Bucket derived from the resolver result.
    pub bucket: RegionBucket,
    /// Probe time.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    /// Opaque reference to the stored probe artifact.
    pub evidence_ref: String,
}

/// Negotiation result for one target region.
///
/// # Invariants
/// - Immutable once created by the negotiator.
/// - `observed` and `evidence` are set only for probe verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionVerification {
    /// Target region the offer claimed or was matched against.
    pub claimed: String,
    /// Region bucket observed by a network probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<RegionBucket>,
    /// Whether the claim was verified.
    pub verified: bool,
    /// Verification method.
    pub method: VerificationMethod,
    /// Probe artifact when the method is a probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<ProbeEvidence>,
    /// Opaque reference of the acquired offer.
    pub offer_ref: String,
}

impl RegionVerification {
    /// Builds a verification for a declared-region match.
    #[must_use]
    pub fn declared(region: impl Into<String>, offer_ref: impl Into<String>) -> Self {
        Self {
            claimed: region.into(),
            observed: None,
            verified: true,
            method: VerificationMethod::Declared,
            evidence: None,
            offer_ref: offer_ref.into(),
        }
    }

    /// Builds a verification for a probe match.
    #[must_use]
    pub fn probed(
        region: impl Into<String>,
        offer_ref: impl Into<String>,
        evidence: ProbeEvidence,
    ) -> Self {
        Self {
            claimed: region.into(),
            observed: Some(evidence.bucket),
            verified: true,
            method: VerificationMethod::PreflightProbe,
            evidence: Some(evidence),
            offer_ref: offer_ref.into(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
