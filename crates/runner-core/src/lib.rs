// crates/runner-core/src/lib.rs
// ============================================================================
// Module: Runner Core
// Description: Signed benchmark-job admission, region negotiation, execution.
// Purpose: Backend-agnostic pipeline logic shared by the runner server and CLI.
// Dependencies: ed25519-dalek, serde, serde_jcs, sha2, time, tokio
// ============================================================================

//! ## Overview
//! Runner core turns a signed job spec into signed per-region receipts:
//! the [`gate`] authenticates and admits submissions, [`negotiation`]
//! acquires region-verified capacity, and [`execution`] runs every acquired
//! region independently under one aggregate decision rule.
//! Invariants:
//! - Canonical bytes are identical for signing and verification.
//! - Protection backends fail closed: an unreachable store rejects requests.
//! - Only the execution coordinator mutates a [`core::CrossRegionExecution`].
//!
//! I/O lives behind the traits in [`interfaces`]; [`runtime`] provides
//! in-process implementations.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod execution;
pub mod gate;
pub mod interfaces;
pub mod negotiation;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::NoopAuditSink;
pub use core::CrossRegionExecution;
pub use core::CrossRegionStatus;
pub use core::JobSpec;
pub use core::JobSpecId;
pub use core::Receipt;
pub use execution::CrossRegionExecutor;
pub use execution::ExecutionReport;
pub use gate::GateRejection;
pub use gate::SignatureGate;
pub use gate::TrustStore;
pub use negotiation::RegionNegotiation;
