// crates/runner-core/src/core/execution.rs
// ============================================================================
// Module: Execution Records
// Description: Per-region execution attempts and the job-level aggregate.
// Purpose: Encode attempt state transitions and the success-threshold rule.
// Dependencies: serde, serde_json, thiserror, time
// ============================================================================

//! ## Overview
//! An [`ExecutionAttempt`] moves exactly once through
//! `pending -> running -> completed | failed`. A [`CrossRegionExecution`]
//! collects terminal attempts through [`CrossRegionExecution::record`], its
//! single update path, and decides the job outcome as soon as the success
//! threshold is either guaranteed or unreachable. Attempts recorded after the
//! decision still update counts and history but never change the decision.
//!
//! Success rates are compared at whole-percent precision, so two of three
//! regions (67%) satisfy a `0.67` minimum.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::JobSpecId;
use crate::core::identifiers::ProviderId;
use crate::core::identifiers::ReceiptId;
use crate::core::jobspec::InferenceTask;
use crate::core::jobspec::JobSpec;
use crate::core::region::RegionVerification;

// ============================================================================
// SECTION: Attempt Types
// ============================================================================

/// Execution attempt status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Created, not yet dispatched.
    Pending,
    /// Dispatched to a provider.
    Running,
    /// Finished with output.
    Completed,
    /// Finished without output.
    Failed,
}

impl AttemptStatus {
    /// Returns true for completed or failed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Failure classification for a region attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Attempt exceeded its deadline.
    Timeout,
    /// Provider reported a retryable failure.
    Transient,
    /// Provider reported a non-retryable failure.
    Permanent,
    /// No eligible provider was available in the region.
    NoProvider,
}

/// Terminal failure detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Provider or executor message.
    pub message: String,
}

/// Output payload of a completed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptOutput {
    /// Provider output data.
    pub data: Value,
    /// Canonical hash of `data`.
    pub hash: HashDigest,
    /// Provider-supplied metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Outcome of one model and question pair inside a region attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Model and question executed.
    #[serde(flatten)]
    pub task: InferenceTask,
    /// Terminal status (`completed` or `failed`).
    pub status: AttemptStatus,
    /// Provider that produced the terminal result, if any.
    pub provider_id: Option<ProviderId>,
    /// Output for completed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AttemptOutput>,
    /// Failure detail for failed tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionFailure>,
    /// Provider calls made for this task.
    pub tries: u32,
}

impl TaskResult {
    /// Builds a completed task result.
    #[must_use]
    pub const fn completed(
        task: InferenceTask,
        provider_id: ProviderId,
        output: AttemptOutput,
        tries: u32,
    ) -> Self {
        Self {
            task,
            status: AttemptStatus::Completed,
            provider_id: Some(provider_id),
            output: Some(output),
            error: None,
            tries,
        }
    }

    /// Builds a failed task result.
    #[must_use]
    pub const fn failed(
        task: InferenceTask,
        provider_id: Option<ProviderId>,
        failure: ExecutionFailure,
        tries: u32,
    ) -> Self {
        Self {
            task,
            status: AttemptStatus::Failed,
            provider_id,
            output: None,
            error: Some(failure),
            tries,
        }
    }
}

/// One region's execution outcome.
///
/// A region runs every model and question pair of its job; `tasks` records
/// each pair. The region completes when at least one pair completes, and its
/// `output` is the first completed pair's output.
///
/// # Invariants
/// - Status changes only through [`ExecutionAttempt::start`],
///   [`ExecutionAttempt::complete`], and [`ExecutionAttempt::fail`].
/// - Terminal attempts are never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    /// Target region.
    pub region: String,
    /// Provider that produced the terminal result, if any.
    pub provider_id: Option<ProviderId>,
    /// Current status.
    pub status: AttemptStatus,
    /// Dispatch time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Terminal time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Output for completed attempts.
    pub output: Option<AttemptOutput>,
    /// Failure detail for failed attempts.
    pub error: Option<ExecutionFailure>,
    /// Number of provider calls made, including retries.
    pub tries: u32,
    /// Per-pair results in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskResult>,
    /// Region verification from negotiation.
    pub verification: RegionVerification,
    /// Receipt issued for this attempt.
    pub receipt_id: Option<ReceiptId>,
}

/// Invalid attempt state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid attempt transition from {from} to {to}")]
pub struct TransitionError {
    /// Status before the transition.
    pub from: &'static str,
    /// Requested status.
    pub to: &'static str,
}

impl ExecutionAttempt {
    /// Creates a pending attempt for an acquired region.
    #[must_use]
    pub fn new(region: impl Into<String>, verification: RegionVerification) -> Self {
        Self {
            region: region.into(),
            provider_id: None,
            status: AttemptStatus::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            tries: 0,
            tasks: Vec::new(),
            verification,
            receipt_id: None,
        }
    }

    /// Transitions `pending -> running`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the attempt is not pending.
    pub fn start(&mut self, now: OffsetDateTime) -> Result<(), TransitionError> {
        self.transition(AttemptStatus::Pending, AttemptStatus::Running)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// Transitions `running -> completed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the attempt is not running.
    pub fn complete(
        &mut self,
        provider_id: ProviderId,
        output: AttemptOutput,
        now: OffsetDateTime,
    ) -> Result<(), TransitionError> {
        self.transition(AttemptStatus::Running, AttemptStatus::Completed)?;
        self.provider_id = Some(provider_id);
        self.output = Some(output);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Transitions `running -> failed`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the attempt is not running.
    pub fn fail(
        &mut self,
        provider_id: Option<ProviderId>,
        failure: ExecutionFailure,
        now: OffsetDateTime,
    ) -> Result<(), TransitionError> {
        self.transition(AttemptStatus::Running, AttemptStatus::Failed)?;
        self.provider_id = provider_id;
        self.error = Some(failure);
        self.completed_at = Some(now);
        Ok(())
    }

    /// Records a finished pair while the attempt is running.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the attempt is not running.
    pub fn record_task(&mut self, result: TaskResult) -> Result<(), TransitionError> {
        if self.status != AttemptStatus::Running {
            return Err(TransitionError {
                from: self.status.as_str(),
                to: "task_recorded",
            });
        }
        self.tries = self.tries.saturating_add(result.tries);
        self.tasks.push(result);
        Ok(())
    }

    /// Completes or fails the attempt from its recorded pairs.
    ///
    /// The first completed pair supplies the output. With no completed pair
    /// the last failure is reported.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the attempt is not running or no
    /// pair was recorded.
    pub fn finish_from_tasks(&mut self, now: OffsetDateTime) -> Result<(), TransitionError> {
        let completed = self.tasks.iter().find(|task| task.status == AttemptStatus::Completed);
        if let Some(task) = completed {
            let provider_id = task.provider_id.clone();
            let output = task.output.clone();
            if let (Some(provider_id), Some(output)) = (provider_id, output) {
                return self.complete(provider_id, output, now);
            }
        }
        let Some(last) = self.tasks.last() else {
            return Err(TransitionError {
                from: self.status.as_str(),
                to: "finished_without_tasks",
            });
        };
        let provider_id = last.provider_id.clone();
        let failure = last.error.clone().unwrap_or_else(|| ExecutionFailure {
            kind: FailureKind::Permanent,
            message: "every model and question pair failed".to_string(),
        });
        self.fail(provider_id, failure, now)
    }

    /// Applies a checked status change.
    fn transition(
        &mut self,
        expected: AttemptStatus,
        next: AttemptStatus,
    ) -> Result<(), TransitionError> {
        if self.status != expected {
            return Err(TransitionError {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

// ============================================================================
// SECTION: Aggregate Types
// ============================================================================

/// Job-level rollup status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossRegionStatus {
    /// No failures recorded and the outcome is undecided.
    Running,
    /// At least one region failed but success is still reachable.
    PartiallyFailed,
    /// Success threshold met.
    Completed,
    /// Success threshold unreachable.
    Failed,
}

impl CrossRegionStatus {
    /// Returns true for completed or failed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::PartiallyFailed => "partially_failed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Aggregate recording failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// The attempt is not terminal.
    #[error("attempt for region {0} is not terminal")]
    NotTerminal(String),
    /// The region was already recorded.
    #[error("region {0} already recorded")]
    Duplicate(String),
    /// The region is not a target of this job.
    #[error("region {0} is not a target region")]
    UnknownRegion(String),
}

/// Job-level aggregate of per-region attempts.
///
/// # Invariants
/// - Each target region is recorded at most once, as an attempt or as
///   unacquired.
/// - `status` becomes terminal exactly once; `decided_after` notes how many
///   regions had resolved at that point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossRegionExecution {
    /// Job spec identifier.
    pub jobspec_id: JobSpecId,
    /// Target regions from the spec.
    pub target_regions: Vec<String>,
    /// Number of target regions.
    pub total_regions: usize,
    /// Minimum regions that must succeed.
    pub min_regions: u32,
    /// Minimum success rate over all target regions.
    pub min_success_rate: f64,
    /// Terminal attempts in completion order.
    pub attempts: Vec<ExecutionAttempt>,
    /// Target regions negotiation could not acquire.
    pub unacquired_regions: Vec<String>,
    /// Rollup status.
    pub status: CrossRegionStatus,
    /// Completed attempts.
    pub success_count: usize,
    /// Failed attempts plus unacquired regions.
    pub failure_count: usize,
    /// Resolved region count when the terminal status was decided.
    pub decided_after: Option<usize>,
    /// Aggregate creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Decision time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub decided_at: Option<OffsetDateTime>,
    /// Time the last region resolved.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl CrossRegionExecution {
    /// Creates the aggregate from a validated spec's constraints.
    #[must_use]
    pub fn new(spec: &JobSpec, now: OffsetDateTime) -> Self {
        Self {
            jobspec_id: spec.id.clone(),
            target_regions: spec.constraints.regions.clone(),
            total_regions: spec.constraints.regions.len(),
            min_regions: spec.constraints.min_regions(),
            min_success_rate: spec.constraints.min_success_rate,
            attempts: Vec::new(),
            unacquired_regions: Vec::new(),
            status: CrossRegionStatus::Running,
            success_count: 0,
            failure_count: 0,
            decided_after: None,
            started_at: now,
            decided_at: None,
            completed_at: None,
        }
    }

    /// Records a target region that negotiation failed to acquire.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError`] for unknown or already recorded regions.
    pub fn record_unacquired(
        &mut self,
        region: &str,
        now: OffsetDateTime,
    ) -> Result<(), AggregateError> {
        self.ensure_unrecorded(region)?;
        self.unacquired_regions.push(region.to_string());
        self.failure_count += 1;
        self.evaluate(now);
        Ok(())
    }

    /// Records a terminal attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError`] when the attempt is not terminal or its
    /// region is unknown or already recorded.
    pub fn record(
        &mut self,
        attempt: ExecutionAttempt,
        now: OffsetDateTime,
    ) -> Result<(), AggregateError> {
        if !attempt.status.is_terminal() {
            return Err(AggregateError::NotTerminal(attempt.region));
        }
        self.ensure_unrecorded(&attempt.region)?;
        if attempt.status == AttemptStatus::Completed {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.attempts.push(attempt);
        self.evaluate(now);
        Ok(())
    }

    /// Returns the number of regions not yet resolved.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.total_regions.saturating_sub(self.success_count + self.failure_count)
    }

    /// Returns target regions not yet recorded, in target order.
    #[must_use]
    pub fn unresolved_regions(&self) -> Vec<String> {
        self.target_regions
            .iter()
            .filter(|region| self.ensure_unrecorded(region).is_ok())
            .cloned()
            .collect()
    }

    /// Returns true once every target region resolved.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.pending() == 0
    }

    /// Returns the success rate over all target regions.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_regions == 0 {
            return 0.0;
        }
        ratio(self.success_count, self.total_regions)
    }

    /// Returns true when `successes` meets both thresholds.
    fn meets_threshold(&self, successes: usize) -> bool {
        let min_regions = usize::try_from(self.min_regions).unwrap_or(usize::MAX);
        successes >= min_regions
            && whole_percent(successes, self.total_regions)
                >= (self.min_success_rate * 100.0).round()
    }

    /// Updates the rollup status after a region resolves.
    fn evaluate(&mut self, now: OffsetDateTime) {
        if self.is_finished() {
            self.completed_at = Some(now);
        }
        if self.status.is_terminal() {
            return;
        }
        let decided = if self.meets_threshold(self.success_count) {
            Some(CrossRegionStatus::Completed)
        } else if !self.meets_threshold(self.success_count + self.pending()) {
            Some(CrossRegionStatus::Failed)
        } else {
            None
        };
        match decided {
            Some(status) => {
                self.status = status;
                self.decided_after = Some(self.success_count + self.failure_count);
                self.decided_at = Some(now);
            }
            None if self.failure_count > 0 => self.status = CrossRegionStatus::PartiallyFailed,
            None => {}
        }
    }

    /// Ensures the region is a target and not yet recorded.
    fn ensure_unrecorded(&self, region: &str) -> Result<(), AggregateError> {
        if !self.target_regions.iter().any(|target| target == region) {
            return Err(AggregateError::UnknownRegion(region.to_string()));
        }
        let recorded = self.attempts.iter().any(|attempt| attempt.region == region)
            || self.unacquired_regions.iter().any(|entry| entry == region);
        if recorded {
            return Err(AggregateError::Duplicate(region.to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns `part / whole` as a float.
fn ratio(part: usize, whole: usize) -> f64 {
    let part = u32::try_from(part).unwrap_or(u32::MAX);
    let whole = u32::try_from(whole).unwrap_or(u32::MAX);
    f64::from(part) / f64::from(whole)
}

/// Returns `part / whole` as a whole percentage, rounded half up.
fn whole_percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let rounded = (part.saturating_mul(200) + whole) / whole.saturating_mul(2);
    f64::from(u32::try_from(rounded).unwrap_or(u32::MAX))
}
