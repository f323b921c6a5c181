// crates/runner-core/src/core/trust.rs
// ============================================================================
// Module: Trust Records
// Description: Allow-list entry shapes and trust decisions.
// Purpose: Describe signer keys as loaded from an allow-list source.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`AllowListEntry`] is the raw, untrusted form read from a source. The gate
//! validates entries into a snapshot before any of them can produce a
//! [`TrustDecision::Trusted`] result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Allow-list key status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// Key may sign job specs within its validity window.
    Active,
    /// Key is revoked.
    Revoked,
}

impl KeyStatus {
    /// Parses a raw status label; an empty label means active.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "" | "active" => Some(Self::Active),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }
}

/// Raw allow-list entry as stored by a source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListEntry {
    /// Key identifier.
    #[serde(default)]
    pub kid: String,
    /// Base64 Ed25519 public key.
    #[serde(default)]
    pub public_key: String,
    /// Status label (`active`, `revoked`, or empty).
    #[serde(default)]
    pub status: String,
    /// RFC 3339 start of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<String>,
    /// RFC 3339 end of validity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<String>,
}

/// Outcome of evaluating a public key against the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    /// Key is active and inside its validity window.
    Trusted,
    /// Key is revoked.
    Revoked,
    /// Current time is after `not_after`.
    Expired,
    /// Current time is before `not_before`.
    NotYetValid,
    /// Key is absent from the allow-list.
    Unknown,
}

impl TrustDecision {
    /// Returns the stable decision label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TrustDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
