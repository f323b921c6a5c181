// crates/runner-core/src/core/mod.rs
// ============================================================================
// Module: Runner Core Types
// Description: Job specs, canonical encoding, signing, and execution records.
// Purpose: Provide the stable, serializable types shared by every component.
// Dependencies: serde, serde_json, serde_jcs, sha2, ed25519-dalek, time
// ============================================================================

//! ## Overview
//! Core types are the source of truth for the submission API, the stores,
//! and receipts. They carry no I/O; behavior that talks to collaborators
//! lives in [`crate::gate`], [`crate::negotiation`], and [`crate::execution`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod canonical;
pub mod clock;
pub mod execution;
pub mod hashing;
pub mod identifiers;
pub mod jobspec;
pub mod offer;
pub mod receipt;
pub mod region;
pub mod signing;
pub mod trust;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use canonical::CanonicalBytes;
pub use canonical::CanonicalError;
pub use canonical::CanonicalMode;
pub use execution::AggregateError;
pub use execution::AttemptOutput;
pub use execution::AttemptStatus;
pub use execution::CrossRegionExecution;
pub use execution::CrossRegionStatus;
pub use execution::ExecutionAttempt;
pub use execution::ExecutionFailure;
pub use execution::FailureKind;
pub use execution::TaskResult;
pub use execution::TransitionError;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::JobSpecId;
pub use identifiers::KeyId;
pub use identifiers::ProviderId;
pub use identifiers::ReceiptId;
pub use jobspec::Benchmark;
pub use jobspec::ContainerSpec;
pub use jobspec::ExecutionConstraints;
pub use jobspec::InferenceTask;
pub use jobspec::InputSpec;
pub use jobspec::JobSpec;
pub use jobspec::ProviderFilter;
pub use jobspec::ResourceSpec;
pub use jobspec::ScoringSpec;
pub use jobspec::ValidationError;
pub use offer::DemandSpec;
pub use offer::Offer;
pub use offer::RegionRequest;
pub use receipt::Receipt;
pub use receipt::ReceiptError;
pub use region::ProbeEvidence;
pub use region::RegionBucket;
pub use region::RegionVerification;
pub use region::VerificationMethod;
pub use signing::SignatureError;
pub use trust::AllowListEntry;
pub use trust::KeyStatus;
pub use trust::TrustDecision;
