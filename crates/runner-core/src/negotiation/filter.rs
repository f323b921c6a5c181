// crates/runner-core/src/negotiation/filter.rs
// ============================================================================
// Module: Offer Filter
// Description: Syntactic classification of offers against a target region.
// Purpose: Accept offers whose declared region equals the target exactly.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The filter never interprets free-form tags or fuzzy region names. An
//! offer matches only when one of its region properties equals the target
//! code exactly. `beacon.region` takes precedence over the generic `region`
//! and `geo.region` keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::Offer;
use crate::core::offer::REGION_PROPERTY_KEYS;

// ============================================================================
// SECTION: Types
// ============================================================================

/// How strongly an offer declares the target region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchLevel {
    /// `beacon.region` equals the target.
    Explicit,
    /// `region` or `geo.region` equals the target.
    Generic,
    /// No property equals the target; a probe is required.
    NeedsProbe,
}

impl MatchLevel {
    /// Returns true for declared matches.
    #[must_use]
    pub const fn is_declared(self) -> bool {
        matches!(self, Self::Explicit | Self::Generic)
    }
}

/// Offer classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Match level.
    pub level: MatchLevel,
    /// Property key that matched.
    pub matched_key: Option<&'static str>,
}

/// Region offer filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferFilter;

impl OfferFilter {
    /// Classifies `offer` against `target`.
    #[must_use]
    pub fn classify(self, offer: &Offer, target: &str) -> Classification {
        let target = target.trim();
        if !target.is_empty() {
            for key in REGION_PROPERTY_KEYS {
                if offer.properties.get(key).and_then(Value::as_str) == Some(target) {
                    return Classification {
                        level: level_for_key(key),
                        matched_key: Some(key),
                    };
                }
            }
        }
        Classification {
            level: MatchLevel::NeedsProbe,
            matched_key: None,
        }
    }
}

/// Returns the match level for a region property key.
fn level_for_key(key: &str) -> MatchLevel {
    if key == "beacon.region" { MatchLevel::Explicit } else { MatchLevel::Generic }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
