// crates/runner-core/src/execution/mod.rs
// ============================================================================
// Module: Cross-Region Execution
// Description: Provider selection, retries, and parallel region execution.
// Purpose: Run acquired regions independently and aggregate their outcomes.
// Dependencies: crate::core, crate::interfaces, crate::negotiation
// ============================================================================

//! ## Overview
//! Region tasks run independently and report into one aggregate owner.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod executor;
pub mod retry;
pub mod selection;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use executor::CrossRegionExecutor;
pub use executor::ExecutionError;
pub use executor::ExecutionHandle;
pub use executor::ExecutionReport;
pub use executor::SinkFailure;
pub use retry::RetryPolicy;
pub use selection::pick_provider;
pub use selection::region_matches;
pub use selection::select_providers;
