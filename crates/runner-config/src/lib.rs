// crates/runner-config/src/lib.rs
// ============================================================================
// Module: Runner Config
// Description: Canonical configuration model for the runner service.
// Purpose: Load, validate, and translate `runner.toml` into core settings.
// Dependencies: runner-core, serde, toml, url
// ============================================================================

//! ## Overview
//! [`RunnerConfig`] is loaded from `runner.toml` (or the path named by
//! `RUNNER_CONFIG`), validated fail-closed, and converted into the gate,
//! negotiation, and retry settings consumed by `runner-core`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::ConfigError;
pub use config::ExecutionConfig;
pub use config::GeoConfig;
pub use config::NegotiationConfig;
pub use config::OfferEntry;
pub use config::OffersConfig;
pub use config::ProviderEntry;
pub use config::ProvidersConfig;
pub use config::RateLimitConfig;
pub use config::ReceiptsConfig;
pub use config::ReplayConfig;
pub use config::RunnerConfig;
pub use config::ServerConfig;
pub use config::StoreBackend;
pub use config::StoreConfig;
pub use config::TrustConfig;
