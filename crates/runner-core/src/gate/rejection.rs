// crates/runner-core/src/gate/rejection.rs
// ============================================================================
// Module: Gate Rejections
// Description: Stable rejection taxonomy for submitted job specs.
// Purpose: Map every gate failure to one error code and one rejection class.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`GateRejection::error_code`] strings are part of the submission API and
//! stay stable across releases. [`RejectionClass`] groups rejections the way
//! callers surface them (bad request, unauthenticated, throttled, protection
//! unavailable).

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::TrustDecision;
use crate::core::ValidationError;
use crate::gate::replay::TimestampError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Protection backed by an external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Nonce recording.
    Replay,
    /// Failure counters.
    RateLimit,
}

impl Protection {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Replay => "replay",
            Self::RateLimit => "rate_limit",
        }
    }
}

/// Coarse rejection class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionClass {
    /// Malformed submission.
    Validation,
    /// Trust, signature, timestamp, or replay failure.
    Unauthenticated,
    /// Too many recent failures.
    RateLimited,
    /// A protection store was unreachable.
    ProtectionUnavailable,
}

/// Gate rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateRejection {
    /// Body is not a job spec document.
    #[error("invalid job spec document: {0}")]
    InvalidDocument(String),
    /// Structural validation failed.
    #[error("invalid job spec: {0}")]
    Validation(ValidationError),
    /// Required field is absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    /// Field has an invalid encoding.
    #[error("invalid encoding for field: {0}")]
    InvalidEncoding(&'static str),
    /// Signer key is not trusted.
    #[error("signer key is not trusted: {0}")]
    TrustViolation(TrustDecision),
    /// Failure counters reached their limit.
    #[error("too many failed verifications")]
    RateLimited,
    /// Timestamp outside the replay window.
    #[error("timestamp rejected: {0}")]
    TimestampInvalid(TimestampError),
    /// Canonical bytes could not be produced.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
    /// Signature does not verify.
    #[error("signature verification failed")]
    SignatureMismatch,
    /// Nonce was already used.
    #[error("replayed submission")]
    ReplayDetected,
    /// A protection store was unreachable.
    #[error("{} protection unavailable: {message}", .protection.as_str())]
    ProtectionUnavailable {
        /// Protection that failed.
        protection: Protection,
        /// Store error detail.
        message: String,
    },
}

impl GateRejection {
    /// Returns the stable error code.
    #[must_use]
    pub fn error_code(&self) -> String {
        match self {
            Self::InvalidDocument(_) => "validation_error:document".to_string(),
            Self::Validation(err) => err.error_code(),
            Self::MissingField(field) => format!("missing_field:{field}"),
            Self::InvalidEncoding(field) => format!("invalid_encoding:{field}"),
            Self::TrustViolation(decision) => format!("trust_violation:{}", decision.as_str()),
            Self::RateLimited => "rate_limit_exceeded".to_string(),
            Self::TimestampInvalid(reason) => format!("timestamp_invalid:{}", reason.as_str()),
            Self::Canonicalization(_) => "canonicalization_error".to_string(),
            Self::SignatureMismatch => "signature_mismatch".to_string(),
            Self::ReplayDetected => "replay_detected".to_string(),
            Self::ProtectionUnavailable {
                protection, ..
            } => format!("protection_unavailable:{}", protection.as_str()),
        }
    }

    /// Returns the rejection class.
    #[must_use]
    pub const fn class(&self) -> RejectionClass {
        match self {
            Self::InvalidDocument(_)
            | Self::Validation(_)
            | Self::MissingField(_)
            | Self::InvalidEncoding(_)
            | Self::Canonicalization(_) => RejectionClass::Validation,
            Self::TrustViolation(_)
            | Self::TimestampInvalid(_)
            | Self::SignatureMismatch
            | Self::ReplayDetected => RejectionClass::Unauthenticated,
            Self::RateLimited => RejectionClass::RateLimited,
            Self::ProtectionUnavailable {
                ..
            } => RejectionClass::ProtectionUnavailable,
        }
    }
}

impl From<ValidationError> for GateRejection {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}
