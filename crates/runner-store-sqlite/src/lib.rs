// crates/runner-store-sqlite/src/lib.rs
// ============================================================================
// Module: Runner SQLite Store
// Description: SQLite-backed job persistence and fast key-value store.
// Purpose: Provide durable JobStore and FastStore implementations.
// Dependencies: runner-core, rusqlite, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`SqliteRunnerStore`] keeps jobs, idempotency bindings, execution
//! aggregates, receipts, replay nonces, and rate-limit counters in one
//! `SQLite` database. Payloads are stored as canonical JSON with a SHA-256
//! hash that is verified on every load.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteRunnerStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
