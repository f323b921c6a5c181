// crates/runner-core/src/negotiation/mod.rs
// ============================================================================
// Module: Region Negotiation
// Description: Offer filtering, preflight probing, and region acquisition.
// Purpose: Acquire verified capacity per target region.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Negotiation failures are per region: a region that cannot be acquired is
//! excluded from execution and counted as failed by the aggregate, but it
//! never aborts the job on its own.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod demand;
pub mod filter;
pub mod negotiator;
pub mod probe;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use demand::DemandBuilder;
pub use demand::DemandError;
pub use filter::Classification;
pub use filter::MatchLevel;
pub use filter::OfferFilter;
pub use negotiator::Acquisition;
pub use negotiator::NegotiationError;
pub use negotiator::Negotiator;
pub use negotiator::RegionAcquisition;
pub use negotiator::RegionNegotiation;
pub use probe::PreflightProber;
pub use telemetry::NegotiationOutcome;
pub use telemetry::NegotiationTelemetry;
pub use telemetry::TelemetrySnapshot;
