// crates/runner-server/src/lib.rs
// ============================================================================
// Module: Runner Server
// Description: HTTP submission service for signed benchmark jobs.
// Purpose: Wire runner-core to axum, reqwest collaborators, and local stores.
// Dependencies: axum, reqwest, runner-config, runner-core, runner-store-sqlite
// ============================================================================

//! ## Overview
//! [`RunnerServer`] exposes the job API and owns the background tasks that
//! reload the allow-list and purge expired fast-store keys. Each admitted
//! job runs through [`JobPipeline`]: negotiation for every target region,
//! then cross-region execution with signed receipts persisted to the store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod http;
pub mod keys;
pub mod pipeline;
pub mod server;
pub mod sources;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::StderrAuditSink;
pub use audit::build_audit_sink;
pub use http::HttpGeoResolver;
pub use http::HttpIpFetcher;
pub use http::HttpSingleRegionExecutor;
pub use http::InferenceSettings;
pub use pipeline::JobPipeline;
pub use pipeline::PipelineError;
pub use pipeline::SubmitError;
pub use pipeline::SubmitOutcome;
pub use server::RunnerServer;
pub use server::ServerError;
pub use sources::CatalogOfferMarket;
pub use sources::FileAllowListSource;
pub use sources::StoreReceiptSink;
