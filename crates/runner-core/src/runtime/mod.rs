// crates/runner-core/src/runtime/mod.rs
// ============================================================================
// Module: Runner Runtime Adapters
// Description: In-process implementations of the runner interfaces.
// Purpose: Run the pipeline without external services.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory stores, scripted offer markets and probes, scripted providers,
//! and capturing sinks.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod fast_store;
pub mod job_store;
pub mod market;
pub mod probe;
pub mod providers;
pub mod sinks;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fast_store::InMemoryFastStore;
pub use job_store::InMemoryJobStore;
pub use market::RegionScript;
pub use market::ScriptedOffer;
pub use market::StaticOfferMarket;
pub use market::StaticOfferSource;
pub use probe::StaticGeoResolver;
pub use probe::StaticIpFetcher;
pub use providers::ObservedCall;
pub use providers::ScriptedCall;
pub use providers::ScriptedSingleRegionExecutor;
pub use providers::StaticProviderDiscovery;
pub use sinks::MemoryAuditSink;
pub use sinks::MemoryReceiptSink;
pub use sinks::StaticAllowListSource;
