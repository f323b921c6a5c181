// crates/runner-core/src/gate/mod.rs
// ============================================================================
// Module: Submission Gate
// Description: Trust, replay, rate-limit, and signature checks for job specs.
// Purpose: Group the admission checks every submission passes before storage.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The gate is the only path from an untrusted request body to a stored job.
//! Rejections are terminal and reported synchronously; nothing rejected here
//! reaches negotiation. Store outages are their own rejection class and are
//! never treated as a pass.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod rate_limit;
pub mod rejection;
pub mod replay;
pub mod trust;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use rate_limit::RateLimitConfig;
pub use rate_limit::RateLimiter;
pub use rejection::GateRejection;
pub use rejection::Protection;
pub use rejection::RejectionClass;
pub use replay::ReplayConfig;
pub use replay::ReplayGuard;
pub use replay::TimestampError;
pub use trust::AllowList;
pub use trust::TrustError;
pub use trust::TrustEvaluation;
pub use trust::TrustStore;
pub use verifier::GateConfig;
pub use verifier::SignatureGate;
pub use verifier::Submission;
pub use verifier::SubmissionContext;
pub use verifier::VerifiedSubmission;
