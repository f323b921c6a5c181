// crates/runner-core/src/core/jobspec.rs
// ============================================================================
// Module: Job Specification
// Description: Signed benchmark job specification and structural validation.
// Purpose: Define the submitted job shape and its defaulting rules.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! A [`JobSpec`] describes a benchmark container, its input, and the
//! cross-region execution constraints. Specs are signed by the submitter;
//! [`JobSpec::validate`] runs before any cryptographic work and fills in
//! execution defaults on the parsed copy. Optional fields serialize only when
//! set so the struct form canonicalizes the same way a minimal client
//! document does; explicit numeric zeros survive the round trip.
//!
//! Each region runs every model and question pair the spec names; see
//! [`JobSpec::inference_tasks`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::hashing::is_content_hash;
use crate::core::identifiers::JobSpecId;
use crate::core::region::is_supported_region;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Version applied when a spec omits `version`.
pub const DEFAULT_SPEC_VERSION: &str = "1.0";
/// Success rate applied when `min_success_rate` is unset (zero).
pub const DEFAULT_MIN_SUCCESS_RATE: f64 = 0.67;
/// Overall job timeout applied when unset.
pub const DEFAULT_JOB_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
/// Per-provider timeout applied when unset.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 5 * 60 * 1_000;
/// Model used when metadata does not name one.
pub const DEFAULT_MODEL: &str = "llama3.2-1b";
/// Maximum number of target regions in one spec.
pub const MAX_TARGET_REGIONS: usize = 16;
/// Maximum model and question pairs executed per region.
pub const MAX_INFERENCE_TASKS: usize = 64;
/// Minimum successful regions applied when unset.
pub const DEFAULT_MIN_REGIONS: u32 = 1;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Signed benchmark job specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Submitter-assigned identifier.
    #[serde(default)]
    pub id: JobSpecId,
    /// Spec format version; selects the canonicalization mode.
    #[serde(default = "default_version")]
    pub version: String,
    /// Benchmark descriptor.
    pub benchmark: Benchmark,
    /// Cross-region execution constraints.
    pub constraints: ExecutionConstraints,
    /// Prompts evaluated by the benchmark.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    /// Free-form metadata; carries `timestamp` and `nonce` under trust enforcement.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Creation timestamp set by the submitter.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
    /// Base64 Ed25519 signature over the canonical bytes.
    #[serde(default)]
    pub signature: String,
    /// Base64 Ed25519 public key of the signer.
    #[serde(default)]
    pub public_key: String,
}

/// Benchmark descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    /// Benchmark name.
    #[serde(default)]
    pub name: String,
    /// Benchmark version label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Container to execute.
    pub container: ContainerSpec,
    /// Input payload and its content hash.
    pub input: InputSpec,
    /// Scoring method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringSpec>,
    /// Benchmark metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Container image descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Image tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Entry command override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Resource requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceSpec>,
}

/// Container resource requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU request (e.g. `"1000m"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory request (e.g. `"2Gi"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    /// GPU request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
}

/// Benchmark input payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Input kind label (`prompt`, `dataset`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Inline input data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    /// SHA-256 content hash of the input.
    #[serde(default)]
    pub hash: String,
}

/// Scoring method descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSpec {
    /// Scoring method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,
}

/// Cross-region execution constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConstraints {
    /// Target regions.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Minimum distinct regions that must succeed (0 = unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_regions: Option<u32>,
    /// Minimum fraction of target regions that must succeed (0 = unset).
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub min_success_rate: f64,
    /// Overall job timeout in milliseconds (0 = unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Per-provider attempt timeout in milliseconds (0 = unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_timeout_ms: Option<u64>,
    /// Optional spending cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    /// Per-region provider filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderFilter>,
}

/// Provider selection filter, optionally scoped to one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFilter {
    /// Region the filter applies to; `None` applies everywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Minimum provider success rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
    /// Maximum cost per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    /// Allowed provider identifiers (empty = any).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whitelist: Vec<String>,
    /// Denied provider identifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
}

/// One model and question pair executed in a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceTask {
    /// Model identifier.
    pub model: String,
    /// Question sent as the prompt; `None` falls back to the input prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structural validation failure.
///
/// # Invariants
/// - `field` is a stable dotted path used in the error code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable detail.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the stable error code (`validation_error:<field>`).
    #[must_use]
    pub fn error_code(&self) -> String {
        format!("validation_error:{}", self.field)
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl JobSpec {
    /// Validates structure and applies execution defaults in place.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for the first structural violation.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::new("id", "job spec id is required"));
        }
        if self.version.trim().is_empty() {
            self.version = DEFAULT_SPEC_VERSION.to_string();
        }
        self.benchmark.validate()?;
        self.constraints.validate()?;
        self.validate_tasks()
    }

    /// Checks the model list and bounds the per-region fan-out.
    fn validate_tasks(&self) -> Result<(), ValidationError> {
        if let Some(models) = self.metadata.get("models") {
            let valid = models.as_array().is_some_and(|models| {
                models.iter().all(|model| model.as_str().is_some_and(|m| !m.trim().is_empty()))
            });
            if !valid {
                return Err(ValidationError::new(
                    "metadata.models",
                    "models must be an array of non-empty strings",
                ));
            }
        }
        if self.questions.iter().any(|question| question.trim().is_empty()) {
            return Err(ValidationError::new("questions", "questions must be non-empty"));
        }
        let tasks = self.models().len().saturating_mul(self.questions.len().max(1));
        if tasks > MAX_INFERENCE_TASKS {
            return Err(ValidationError::new(
                "questions",
                format!("{tasks} model and question pairs exceed the limit of {MAX_INFERENCE_TASKS}"),
            ));
        }
        Ok(())
    }

    /// Returns a string metadata value when present and non-empty.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Returns the prompt sent to inference providers for `task`.
    #[must_use]
    pub fn prompt_for<'a>(&'a self, task: &'a InferenceTask) -> Option<&'a str> {
        task.question
            .as_deref()
            .or_else(|| self.benchmark.input.data.get("prompt").and_then(Value::as_str))
    }

    /// Returns the models to run, deduplicated in declaration order.
    ///
    /// `metadata.models` wins over `metadata.model`; with neither set the
    /// default model runs.
    #[must_use]
    pub fn models(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let listed: Vec<String> = self
            .metadata
            .get("models")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|model| !model.is_empty() && seen.insert(*model))
            .map(ToString::to_string)
            .collect();
        if listed.is_empty() {
            vec![self.metadata_str("model").unwrap_or(DEFAULT_MODEL).to_string()]
        } else {
            listed
        }
    }

    /// Returns every model and question pair, models outermost.
    ///
    /// A spec without questions yields one task per model that uses the
    /// benchmark input prompt.
    #[must_use]
    pub fn inference_tasks(&self) -> Vec<InferenceTask> {
        let questions: Vec<Option<String>> = if self.questions.is_empty() {
            vec![None]
        } else {
            self.questions.iter().cloned().map(Some).collect()
        };
        self.models()
            .into_iter()
            .flat_map(|model| {
                questions.iter().map(move |question| InferenceTask {
                    model: model.clone(),
                    question: question.clone(),
                })
            })
            .collect()
    }
}

impl Benchmark {
    /// Validates the benchmark descriptor.
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("benchmark.name", "benchmark name is required"));
        }
        if self.container.image.trim().is_empty() {
            return Err(ValidationError::new(
                "benchmark.container.image",
                "container image is required",
            ));
        }
        if self.input.hash.trim().is_empty() {
            return Err(ValidationError::new("benchmark.input.hash", "input hash is required"));
        }
        if !is_content_hash(&self.input.hash) {
            return Err(ValidationError::new(
                "benchmark.input.hash",
                "input hash must be 64 hex characters with optional sha256: prefix",
            ));
        }
        Ok(())
    }
}

impl ExecutionConstraints {
    /// Validates constraints and applies defaults.
    fn validate(&mut self) -> Result<(), ValidationError> {
        if self.regions.is_empty() {
            return Err(ValidationError::new(
                "constraints.regions",
                "at least one region is required",
            ));
        }
        if self.regions.len() > MAX_TARGET_REGIONS {
            return Err(ValidationError::new("constraints.regions", "too many target regions"));
        }
        let mut seen = BTreeSet::new();
        for region in &self.regions {
            if !is_supported_region(region) {
                return Err(ValidationError::new(
                    "constraints.regions",
                    format!("unsupported region: {region}"),
                ));
            }
            if !seen.insert(region.as_str()) {
                return Err(ValidationError::new(
                    "constraints.regions",
                    format!("duplicate region: {region}"),
                ));
            }
        }
        let min_regions = set_or(self.min_regions, DEFAULT_MIN_REGIONS);
        self.min_regions = Some(min_regions);
        if usize::try_from(min_regions).unwrap_or(usize::MAX) > self.regions.len() {
            return Err(ValidationError::new(
                "constraints.min_regions",
                "min_regions exceeds the number of target regions",
            ));
        }
        if !self.min_success_rate.is_finite() || !(0.0 ..= 1.0).contains(&self.min_success_rate) {
            return Err(ValidationError::new(
                "constraints.min_success_rate",
                "min_success_rate must be between 0 and 1",
            ));
        }
        if self.min_success_rate == 0.0 {
            self.min_success_rate = DEFAULT_MIN_SUCCESS_RATE;
        }
        let timeout_ms = set_or(self.timeout_ms, DEFAULT_JOB_TIMEOUT_MS);
        let provider_timeout_ms =
            set_or(self.provider_timeout_ms, DEFAULT_PROVIDER_TIMEOUT_MS.min(timeout_ms));
        self.timeout_ms = Some(timeout_ms);
        self.provider_timeout_ms = Some(provider_timeout_ms);
        if provider_timeout_ms > timeout_ms {
            return Err(ValidationError::new(
                "constraints.provider_timeout_ms",
                "provider timeout exceeds job timeout",
            ));
        }
        if let Some(max_cost) = self.max_cost
            && (!max_cost.is_finite() || max_cost < 0.0)
        {
            return Err(ValidationError::new(
                "constraints.max_cost",
                "max_cost must be a non-negative number",
            ));
        }
        Ok(())
    }

    /// Returns the minimum number of successful regions.
    #[must_use]
    pub fn min_regions(&self) -> u32 {
        set_or(self.min_regions, DEFAULT_MIN_REGIONS)
    }

    /// Returns the overall job timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(set_or(self.timeout_ms, DEFAULT_JOB_TIMEOUT_MS))
    }

    /// Returns the per-provider attempt timeout.
    #[must_use]
    pub fn provider_timeout(&self) -> Duration {
        let job = set_or(self.timeout_ms, DEFAULT_JOB_TIMEOUT_MS);
        Duration::from_millis(set_or(self.provider_timeout_ms, DEFAULT_PROVIDER_TIMEOUT_MS.min(job)))
    }

    /// Returns the filters that apply to `region`.
    pub fn filters_for<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a ProviderFilter> {
        self.providers.iter().filter(move |filter| {
            filter.region.as_deref().is_none_or(|scope| scope.eq_ignore_ascii_case(region))
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the default spec version.
fn default_version() -> String {
    DEFAULT_SPEC_VERSION.to_string()
}

/// Returns `value` unless it is absent or zero.
fn set_or<T: Copy + PartialEq + Default>(value: Option<T>, default: T) -> T {
    value.filter(|value| *value != T::default()).unwrap_or(default)
}

/// Serde helper for omitting an unset success rate.
#[allow(clippy::trivially_copy_pass_by_ref, reason = "Serde skip_serializing_if takes a reference.")]
#[allow(clippy::float_cmp, reason = "Exact zero is the documented unset sentinel.")]
fn is_zero_f64(value: &f64) -> bool {
    *value == 0.0
}
