// crates/runner-core/src/core/receipt.rs
// ============================================================================
// Module: Execution Receipts
// Description: Signed, schema-versioned records of terminal region attempts.
// Purpose: Bind a job spec to one region's output and provenance.
// Dependencies: ed25519-dalek, serde, serde_json, serde_jcs, time
// ============================================================================

//! ## Overview
//! One [`Receipt`] is issued per terminal [`ExecutionAttempt`], failed or
//! completed. Receipts are signed with the runner's Ed25519 key over RFC 8785
//! JSON of the receipt with `signature` and `public_key` set to empty
//! strings. Receipts are handed to external bundling and transparency sinks.
//! The output section carries every model and question pair the region ran,
//! so the signature covers each pair's output hash.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ed25519_dalek::SigningKey;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::clock::duration_millis;
use crate::core::clock::elapsed_between;
use crate::core::clock::unix_millis;
use crate::core::execution::AttemptStatus;
use crate::core::execution::ExecutionAttempt;
use crate::core::execution::TaskResult;
use crate::core::hashing::DEFAULT_HASH_ALGORITHM;
use crate::core::hashing::HashDigest;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::JobSpecId;
use crate::core::identifiers::ProviderId;
use crate::core::identifiers::ReceiptId;
use crate::core::jobspec::JobSpec;
use crate::core::region::RegionVerification;
use crate::core::signing::SignatureError;
use crate::core::signing::decode_public_key;
use crate::core::signing::encode_public_key;
use crate::core::signing::sign_message;
use crate::core::signing::verify_message;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Receipt schema version.
pub const RECEIPT_SCHEMA_VERSION: &str = "v0.1.0";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Signed execution receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Receipt schema version.
    pub schema_version: String,
    /// Receipt identifier.
    pub id: ReceiptId,
    /// Job spec identifier.
    pub jobspec_id: JobSpecId,
    /// Execution details.
    pub execution_details: ExecutionDetails,
    /// Output payload.
    pub output: ReceiptOutput,
    /// Provenance data.
    pub provenance: Provenance,
    /// Region verification from negotiation.
    pub region_verification: RegionVerification,
    /// Receipt creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Attempt completion time.
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    /// Base64 Ed25519 signature.
    #[serde(default)]
    pub signature: String,
    /// Base64 Ed25519 public key of the runner.
    #[serde(default)]
    pub public_key: String,
}

/// Execution details section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionDetails {
    /// Task identifier (`<jobspec>:<region>`).
    pub task_id: String,
    /// Provider that ran the final try.
    pub provider_id: Option<ProviderId>,
    /// Region executed.
    pub region: String,
    /// Dispatch time.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Terminal time.
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Terminal status.
    pub status: AttemptStatus,
    /// Provider calls made including retries.
    pub tries: u32,
    /// Failure message for failed attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Receipt output section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptOutput {
    /// Output data (`null` for failed attempts).
    pub data: Value,
    /// Output hash when output exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashDigest>,
    /// Output metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Per-pair results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskResult>,
}

/// Receipt provenance section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Canonical hash of the benchmark descriptor.
    pub benchmark_hash: HashDigest,
    /// Provider information.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_info: Map<String, Value>,
    /// Execution environment.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub execution_env: Map<String, Value>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Receipt construction and verification failures.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Attempt is not terminal or lacks timestamps.
    #[error("attempt is not receipt-ready: {0}")]
    NotTerminal(String),
    /// Hashing or serialization failed.
    #[error("receipt serialization failed: {0}")]
    Serialization(String),
    /// Signature codec or verification failure.
    #[error("receipt signature error: {0}")]
    Signature(#[from] SignatureError),
}

// ============================================================================
// SECTION: Construction
// ============================================================================

impl Receipt {
    /// Builds an unsigned receipt for a terminal attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError`] when the attempt is not terminal or hashing
    /// fails.
    pub fn for_attempt(
        spec: &JobSpec,
        attempt: &ExecutionAttempt,
        now: OffsetDateTime,
    ) -> Result<Self, ReceiptError> {
        if !attempt.status.is_terminal() {
            return Err(ReceiptError::NotTerminal(attempt.region.clone()));
        }
        let started_at = attempt
            .started_at
            .ok_or_else(|| ReceiptError::NotTerminal("missing started_at".to_string()))?;
        let completed_at = attempt
            .completed_at
            .ok_or_else(|| ReceiptError::NotTerminal("missing completed_at".to_string()))?;
        let benchmark_hash = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &spec.benchmark)
            .map_err(|err| ReceiptError::Serialization(err.to_string()))?;
        let (data, hash, metadata) = attempt.output.as_ref().map_or_else(
            || (Value::Null, None, Map::new()),
            |output| (output.data.clone(), Some(output.hash.clone()), output.metadata.clone()),
        );
        let mut provider_info = Map::new();
        if let Some(provider) = &attempt.provider_id {
            provider_info.insert("provider_id".to_string(), Value::String(provider.to_string()));
        }
        provider_info.insert("region".to_string(), Value::String(attempt.region.clone()));
        let mut execution_env = Map::new();
        execution_env.insert(
            "image".to_string(),
            Value::String(spec.benchmark.container.image.clone()),
        );
        if let Some(tag) = &spec.benchmark.container.tag {
            execution_env.insert("tag".to_string(), Value::String(tag.clone()));
        }
        let models = spec.models().into_iter().map(Value::String).collect();
        execution_env.insert("models".to_string(), Value::Array(models));
        Ok(Self {
            schema_version: RECEIPT_SCHEMA_VERSION.to_string(),
            id: ReceiptId::for_attempt(&spec.id, &attempt.region, unix_millis(completed_at)),
            jobspec_id: spec.id.clone(),
            execution_details: ExecutionDetails {
                task_id: format!("{}:{}", spec.id, attempt.region),
                provider_id: attempt.provider_id.clone(),
                region: attempt.region.clone(),
                started_at,
                completed_at,
                duration_ms: duration_millis(elapsed_between(started_at, completed_at)),
                status: attempt.status,
                tries: attempt.tries,
                error: attempt.error.as_ref().map(|failure| failure.message.clone()),
            },
            output: ReceiptOutput {
                data,
                hash,
                metadata,
                tasks: attempt.tasks.clone(),
            },
            provenance: Provenance {
                benchmark_hash,
                provider_info,
                execution_env,
            },
            region_verification: attempt.verification.clone(),
            created_at: now,
            completed_at,
            signature: String::new(),
            public_key: String::new(),
        })
    }

    /// Returns the bytes the receipt signature covers.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::Serialization`] when serialization fails.
    pub fn signable_bytes(&self) -> Result<Vec<u8>, ReceiptError> {
        let mut unsigned = self.clone();
        unsigned.signature.clear();
        unsigned.public_key.clear();
        canonical_json_bytes(&unsigned).map_err(|err| ReceiptError::Serialization(err.to_string()))
    }

    /// Signs the receipt in place.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::Serialization`] when serialization fails.
    pub fn sign(&mut self, key: &SigningKey) -> Result<(), ReceiptError> {
        let message = self.signable_bytes()?;
        self.public_key = encode_public_key(&key.verifying_key());
        self.signature = sign_message(key, &message);
        Ok(())
    }

    /// Verifies the receipt signature against its embedded public key.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError`] when the receipt is unsigned, malformed, or
    /// the signature does not verify.
    pub fn verify(&self) -> Result<(), ReceiptError> {
        let key = decode_public_key(&self.public_key)?;
        let message = self.signable_bytes()?;
        verify_message(&key, &message, &self.signature)?;
        Ok(())
    }
}
