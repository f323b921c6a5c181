// crates/runner-core/src/interfaces/mod.rs
// ============================================================================
// Module: Runner Interfaces
// Description: Backend-agnostic collaborator traits for the job pipeline.
// Purpose: Define the seams between the core pipeline and its I/O backends.
// Dependencies: async-trait, crate::core, tokio
// ============================================================================

//! ## Overview
//! Every collaborator the gate, negotiator, and executor depend on is a
//! trait here with a narrow surface: stores, the allow-list source, the
//! offer market, probing backends, provider discovery, single-region
//! execution, and receipt sinks. Implementations must fail closed: an
//! unreachable backend surfaces as an error, never as a permissive default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::core::AllowListEntry;
use crate::core::CrossRegionExecution;
use crate::core::DemandSpec;
use crate::core::FailureKind;
use crate::core::InferenceTask;
use crate::core::JobSpec;
use crate::core::JobSpecId;
use crate::core::Offer;
use crate::core::ProviderId;
use crate::core::Receipt;
use crate::core::RegionBucket;

// ============================================================================
// SECTION: Fast Store
// ============================================================================

/// Fast key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FastStoreError {
    /// Store is unreachable or failed the operation.
    #[error("fast store unavailable: {0}")]
    Unavailable(String),
    /// Stored data is invalid.
    #[error("fast store invalid data: {0}")]
    Invalid(String),
}

/// Atomic key-value operations backing replay and rate-limit protection.
///
/// # Invariants
/// - `set_if_absent` and `increment` are atomic with respect to concurrent
///   callers on the same key.
/// - Expired keys behave as absent.
#[async_trait]
pub trait FastStore: Send + Sync {
    /// Stores `key` with `ttl` when absent; returns true when stored.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the store is unavailable.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, FastStoreError>;

    /// Increments a counter and returns the new value.
    ///
    /// The TTL starts when the counter is created and is not extended by
    /// later increments.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the store is unavailable.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, FastStoreError>;

    /// Returns the current counter value (0 when absent or expired).
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the store is unavailable.
    async fn counter(&self, key: &str) -> Result<u64, FastStoreError>;
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

/// Persisted job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting for the pipeline.
    Enqueued,
    /// Negotiation or execution is in progress.
    Running,
    /// Execution met its success threshold.
    Completed,
    /// Execution could not meet its success threshold.
    Failed,
}

impl JobStatus {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "enqueued" => Some(Self::Enqueued),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Stored job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job spec identifier.
    pub id: JobSpecId,
    /// Verified job spec with defaults applied.
    pub spec: JobSpec,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Idempotency key supplied at submission.
    pub idempotency_key: Option<String>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last status change.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Result of creating a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateJobOutcome {
    /// A new job record was written.
    Created(JobSpecId),
    /// The idempotency key already maps to this job.
    Existing(JobSpecId),
}

/// Job store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("job store io error: {0}")]
    Io(String),
    /// Store data is corrupt.
    #[error("job store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("job store version mismatch: {0}")]
    VersionMismatch(String),
    /// Record conflicts with an existing one.
    #[error("job store conflict: {0}")]
    Conflict(String),
    /// Store rejected invalid data.
    #[error("job store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("job store error: {0}")]
    Store(String),
}

/// Relational persistence for jobs, executions, and receipts.
///
/// # Invariants
/// - `create_job` binds an idempotency key to exactly one job atomically.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a job, or returns the job already bound to the idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the job id exists under a
    /// different key, and other [`StoreError`] variants on store failure.
    async fn create_job(
        &self,
        spec: &JobSpec,
        idempotency_key: Option<&str>,
    ) -> Result<CreateJobOutcome, StoreError>;

    /// Looks up the job bound to an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<JobSpecId>, StoreError>;

    /// Loads a job record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure or corrupt data.
    async fn load_job(&self, id: &JobSpecId) -> Result<Option<JobRecord>, StoreError>;

    /// Updates a job's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the job is unknown or the store fails.
    async fn update_job_status(&self, id: &JobSpecId, status: JobStatus)
    -> Result<(), StoreError>;

    /// Writes the latest aggregate for a job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure.
    async fn save_execution(&self, execution: &CrossRegionExecution) -> Result<(), StoreError>;

    /// Loads the latest aggregate for a job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure or corrupt data.
    async fn load_execution(
        &self,
        id: &JobSpecId,
    ) -> Result<Option<CrossRegionExecution>, StoreError>;

    /// Persists a signed receipt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure.
    async fn save_receipt(&self, receipt: &Receipt) -> Result<(), StoreError>;

    /// Lists receipts for a job in creation order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on store failure or corrupt data.
    async fn list_receipts(&self, id: &JobSpecId) -> Result<Vec<Receipt>, StoreError>;
}

// ============================================================================
// SECTION: Allow-List Source
// ============================================================================

/// Allow-list source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllowListSourceError {
    /// Source could not be read.
    #[error("allow-list source unavailable: {0}")]
    Unavailable(String),
    /// Source content is malformed.
    #[error("allow-list source invalid: {0}")]
    Invalid(String),
}

/// Supplier of raw allow-list entries.
#[async_trait]
pub trait AllowListSource: Send + Sync {
    /// Loads every entry.
    ///
    /// # Errors
    ///
    /// Returns [`AllowListSourceError`] when the source cannot be read.
    async fn load(&self) -> Result<Vec<AllowListEntry>, AllowListSourceError>;
}

// ============================================================================
// SECTION: Offer Market
// ============================================================================

/// Offer source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OfferSourceError {
    /// Market is unreachable.
    #[error("offer source unavailable: {0}")]
    Unavailable(String),
    /// Offer payload could not be read.
    #[error("offer source invalid offer: {0}")]
    InvalidOffer(String),
}

/// Stream of candidate offers for one demand.
#[async_trait]
pub trait OfferSource: Send + Sync {
    /// Returns the next offer, or `None` once the source is exhausted.
    ///
    /// Implementations should return no later than `deadline`; callers also
    /// bound the call themselves.
    ///
    /// # Errors
    ///
    /// Returns [`OfferSourceError`] for transient read failures.
    async fn next_offer(&self, deadline: Instant) -> Result<Option<Offer>, OfferSourceError>;
}

/// Capacity market that opens an offer stream per demand.
#[async_trait]
pub trait OfferMarket: Send + Sync {
    /// Publishes a demand and returns its offer stream.
    ///
    /// # Errors
    ///
    /// Returns [`OfferSourceError`] when the demand cannot be published.
    async fn subscribe(&self, demand: &DemandSpec) -> Result<Box<dyn OfferSource>, OfferSourceError>;
}

// ============================================================================
// SECTION: Probing
// ============================================================================

/// Preflight probe collaborator errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// Egress IP could not be determined.
    #[error("failed to fetch egress ip: {0}")]
    IpFetch(String),
    /// Geo lookup failed.
    #[error("geoip lookup failed: {0}")]
    GeoLookup(String),
}

/// Geo resolver result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// ISO 3166 country code.
    pub country: String,
    /// Two-letter continent code.
    pub continent: String,
    /// Resolver source label (database or service name).
    pub source: String,
}

impl GeoLocation {
    /// Returns the region bucket for this location.
    #[must_use]
    pub fn bucket(&self) -> RegionBucket {
        RegionBucket::from_geo(&self.country, &self.continent)
    }
}

/// Resolves the public egress IP of an offer's node.
#[async_trait]
pub trait IpFetcher: Send + Sync {
    /// Returns the public IP the offer's node egresses from.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::IpFetch`] when the IP cannot be determined.
    async fn fetch_public_ip(&self, offer: &Offer) -> Result<String, ProbeError>;
}

/// Resolves an IP address to a location.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Resolves `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::GeoLookup`] when resolution fails.
    async fn resolve(&self, ip: &str) -> Result<GeoLocation, ProbeError>;
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// Inference provider as reported by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider identifier.
    pub id: ProviderId,
    /// Provider inference endpoint.
    pub endpoint: String,
    /// Provider region label.
    pub region: String,
    /// Health flag.
    pub healthy: bool,
    /// Historical success rate in `[0, 1]`.
    #[serde(default)]
    pub success_rate: f64,
    /// Average latency in milliseconds.
    #[serde(default)]
    pub avg_latency_ms: u64,
    /// Cost per second of execution.
    #[serde(default)]
    pub cost_per_second: f64,
}

/// Discovery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// Discovery backend is unreachable.
    #[error("provider discovery unavailable: {0}")]
    Unavailable(String),
}

/// Region-aware provider listing.
#[async_trait]
pub trait ProviderDiscovery: Send + Sync {
    /// Lists providers that serve `region`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError`] when discovery is unavailable.
    async fn providers_in_region(&self, region: &str) -> Result<Vec<ProviderInfo>, DiscoveryError>;
}

/// Provider output for one successful call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Output payload.
    pub data: Value,
    /// Provider-supplied metadata (latency, provider_used, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Single provider call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderCallError {
    /// Call exceeded its deadline.
    #[error("provider timeout: {0}")]
    Timeout(String),
    /// Retryable failure.
    #[error("transient provider failure: {0}")]
    Transient(String),
    /// Non-retryable failure.
    #[error("provider failure: {0}")]
    Permanent(String),
}

impl ProviderCallError {
    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Transient(_) => FailureKind::Transient,
            Self::Permanent(_) => FailureKind::Permanent,
        }
    }

    /// Returns true when the call may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }
}

/// Executes one model and question pair of a job against one provider in
/// one region.
#[async_trait]
pub trait SingleRegionExecutor: Send + Sync {
    /// Runs `task` for the job.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderCallError`] classified as timeout, transient, or
    /// permanent.
    async fn execute(
        &self,
        spec: &JobSpec,
        task: &InferenceTask,
        provider: &ProviderInfo,
        region: &str,
    ) -> Result<ProviderResponse, ProviderCallError>;
}

// ============================================================================
// SECTION: Receipt Sinks
// ============================================================================

/// Receipt sink errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiptSinkError {
    /// Sink is unreachable.
    #[error("receipt sink unavailable: {0}")]
    Unavailable(String),
    /// Sink refused the receipt.
    #[error("receipt rejected: {0}")]
    Rejected(String),
}

/// Downstream consumer of signed receipts (bundling, transparency log).
#[async_trait]
pub trait ReceiptSink: Send + Sync {
    /// Returns a stable sink label for logs.
    fn name(&self) -> &'static str;

    /// Hands a signed receipt to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptSinkError`] when the sink refuses the receipt.
    async fn submit(&self, receipt: &Receipt) -> Result<(), ReceiptSinkError>;
}
