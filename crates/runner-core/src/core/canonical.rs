// crates/runner-core/src/core/canonical.rs
// ============================================================================
// Module: Job Spec Canonicalization
// Description: Deterministic signable bytes for job specifications.
// Purpose: Produce the exact byte string a job spec signature covers.
// Dependencies: serde_json, serde_jcs, thiserror
// ============================================================================

//! ## Overview
//! Canonical bytes are RFC 8785 JSON of the submitted document after
//! normalization: null members and empty objects are removed, arrays keep
//! their order, and an unset `constraints.min_success_rate` of exactly zero is
//! dropped. Two modes exist:
//! - [`CanonicalMode::Current`] removes `id`, `created_at`, `signature`, and
//!   `public_key`.
//! - [`CanonicalMode::Legacy`] keeps those keys but zeroes their values.
//!
//! The mode is chosen from the spec's declared version; `0.x` specs use the
//! legacy mode until it is retired.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::jobspec::DEFAULT_SPEC_VERSION;
use crate::core::jobspec::JobSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fields excluded from the signed structure.
pub const UNSIGNED_FIELDS: [&str; 4] = ["id", "created_at", "signature", "public_key"];
/// Zero timestamp written for `created_at` in legacy mode.
pub const LEGACY_ZERO_TIMESTAMP: &str = "0001-01-01T00:00:00Z";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Canonicalization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalMode {
    /// Unsigned fields are removed.
    Current,
    /// Unsigned fields are zeroed with their keys retained (deprecated).
    Legacy,
}

impl CanonicalMode {
    /// Selects the mode for a declared spec version.
    ///
    /// Versions whose major component is `0` use [`CanonicalMode::Legacy`].
    #[must_use]
    pub fn for_version(version: &str) -> Self {
        let major = version.trim().trim_start_matches(['v', 'V']).split('.').next().unwrap_or("");
        if major == "0" { Self::Legacy } else { Self::Current }
    }

    /// Returns a stable label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Legacy => "legacy",
        }
    }
}

/// Canonical bytes alongside the mode that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBytes {
    /// Mode used.
    pub mode: CanonicalMode,
    /// RFC 8785 bytes.
    pub bytes: Vec<u8>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Canonicalization failures.
#[derive(Debug, Error)]
pub enum CanonicalError {
    /// The document root is not a JSON object.
    #[error("job spec document must be a json object")]
    NotAnObject,
    /// Serialization failed.
    #[error("canonical serialization failed: {0}")]
    Serialization(String),
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Canonicalizes a parsed job spec using the mode its version selects.
///
/// # Errors
///
/// Returns [`CanonicalError`] when serialization fails.
pub fn canonicalize_spec(spec: &JobSpec) -> Result<CanonicalBytes, CanonicalError> {
    let document =
        serde_json::to_value(spec).map_err(|err| CanonicalError::Serialization(err.to_string()))?;
    canonicalize_document(&document)
}

/// Canonicalizes a raw job spec document using the mode its version selects.
///
/// A missing or non-string `version` selects the default spec version.
///
/// # Errors
///
/// Returns [`CanonicalError`] when the document is not an object or cannot
/// be serialized.
pub fn canonicalize_document(document: &Value) -> Result<CanonicalBytes, CanonicalError> {
    let version = document.get("version").and_then(Value::as_str).unwrap_or(DEFAULT_SPEC_VERSION);
    let mode = CanonicalMode::for_version(version);
    let bytes = canonicalize_with_mode(document, mode)?;
    Ok(CanonicalBytes {
        mode,
        bytes,
    })
}

/// Canonicalizes a raw job spec document with an explicit mode.
///
/// # Errors
///
/// Returns [`CanonicalError`] when the document is not an object or cannot
/// be serialized.
pub fn canonicalize_with_mode(
    document: &Value,
    mode: CanonicalMode,
) -> Result<Vec<u8>, CanonicalError> {
    let Value::Object(source) = document else {
        return Err(CanonicalError::NotAnObject);
    };
    let mut object = source.clone();
    match mode {
        CanonicalMode::Current => {
            for field in UNSIGNED_FIELDS {
                object.remove(field);
            }
        }
        CanonicalMode::Legacy => {
            for field in UNSIGNED_FIELDS {
                let zero = if field == "created_at" { LEGACY_ZERO_TIMESTAMP } else { "" };
                object.insert(field.to_string(), Value::String(zero.to_string()));
            }
        }
    }
    drop_unset_success_rate(&mut object);
    prune_object(&mut object);
    serde_jcs::to_vec(&Value::Object(object))
        .map_err(|err| CanonicalError::Serialization(err.to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Removes `constraints.min_success_rate` when it is exactly zero.
fn drop_unset_success_rate(object: &mut Map<String, Value>) {
    let Some(Value::Object(constraints)) = object.get_mut("constraints") else {
        return;
    };
    let is_zero = constraints
        .get("min_success_rate")
        .and_then(Value::as_f64)
        .is_some_and(|rate| rate == 0.0);
    if is_zero {
        constraints.remove("min_success_rate");
    }
}

/// Removes null members and (after recursion) empty-object members.
fn prune_object(object: &mut Map<String, Value>) {
    object.retain(|_, value| !value.is_null());
    for value in object.values_mut() {
        prune_value(value);
    }
    object.retain(|_, value| !matches!(value, Value::Object(inner) if inner.is_empty()));
}

/// Recurses into nested containers; array elements keep their positions.
fn prune_value(value: &mut Value) {
    match value {
        Value::Object(object) => prune_object(object),
        Value::Array(items) => {
            for item in items {
                prune_value(item);
            }
        }
        _ => {}
    }
}
