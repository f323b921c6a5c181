// crates/runner-server/src/pipeline.rs
// ============================================================================
// Module: Job Pipeline
// Description: Submission admission and background job runs.
// Purpose: Connect the gate, job store, negotiation, and executor.
// Dependencies: runner-config, runner-core, tokio
// ============================================================================

//! ## Overview
//! [`JobPipeline::submit`] resolves idempotency keys, runs the gate, and
//! persists admitted specs; each newly created job is then negotiated and
//! executed on its own task.
//! Invariants:
//! - A known idempotency key short-circuits before the body is parsed.
//! - Job status follows the aggregate: `running` while regions are pending,
//!   the decided outcome as soon as it is known, and the final outcome once
//!   every region has resolved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use runner_config::NegotiationConfig;
use runner_core::AuditSink;
use runner_core::CrossRegionExecutor;
use runner_core::CrossRegionStatus;
use runner_core::GateRejection;
use runner_core::JobSpec;
use runner_core::JobSpecId;
use runner_core::RegionNegotiation;
use runner_core::SignatureGate;
use runner_core::audit::JobAuditEvent;
use runner_core::audit::JobAuditEventParams;
use runner_core::audit::JobEventKind;
use runner_core::execution::ExecutionError;
use runner_core::gate::Submission;
use runner_core::gate::SubmissionContext;
use runner_core::interfaces::CreateJobOutcome;
use runner_core::interfaces::JobStatus;
use runner_core::interfaces::JobStore;
use runner_core::interfaces::StoreError;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum idempotency key length.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Newly enqueued job.
    Enqueued(JobSpecId),
    /// Job already bound to the idempotency key.
    Idempotent(JobSpecId),
}

/// Submission failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Gate rejected the spec.
    #[error(transparent)]
    Rejected(#[from] GateRejection),
    /// Idempotency key is malformed.
    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(&'static str),
    /// Job id is already taken.
    #[error("{0}")]
    JobExists(String),
    /// Store failed.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl SubmitError {
    /// Returns the stable error code.
    #[must_use]
    pub fn error_code(&self) -> String {
        match self {
            Self::Rejected(rejection) => rejection.error_code(),
            Self::InvalidIdempotencyKey(_) => "invalid_idempotency_key".to_string(),
            Self::JobExists(_) => "job_exists".to_string(),
            Self::Store(_) => "store_error".to_string(),
        }
    }
}

/// Background run failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// Executor failed.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Submission and run orchestration.
pub struct JobPipeline {
    /// Signature and trust gate.
    gate: SignatureGate,
    /// Job records.
    jobs: Arc<dyn JobStore>,
    /// Region negotiation.
    negotiation: RegionNegotiation,
    /// Cross-region executor.
    executor: CrossRegionExecutor,
    /// Per-region negotiation settings.
    negotiation_config: NegotiationConfig,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl JobPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        gate: SignatureGate,
        jobs: Arc<dyn JobStore>,
        negotiation: RegionNegotiation,
        executor: CrossRegionExecutor,
        negotiation_config: NegotiationConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            gate,
            jobs,
            negotiation,
            executor,
            negotiation_config,
            audit,
        }
    }

    /// Returns the job store.
    #[must_use]
    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Admits a submission and starts its run when the job is new.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when the key is malformed, the gate rejects
    /// the spec, or the store fails.
    pub async fn submit(
        self: &Arc<Self>,
        body: &[u8],
        idempotency_key: Option<&str>,
        context: &SubmissionContext,
    ) -> Result<SubmitOutcome, SubmitError> {
        let key = normalize_idempotency_key(idempotency_key)?;
        if let Some(key) = key
            && let Some(id) = self.jobs.find_by_idempotency_key(key).await.map_err(SubmitError::Store)?
        {
            return Ok(SubmitOutcome::Idempotent(id));
        }
        let submission = Submission::parse(body)?;
        let verified = self.gate.verify(submission, context).await?;
        let outcome = self.jobs.create_job(&verified.spec, key).await.map_err(|err| match err {
            StoreError::Conflict(message) => SubmitError::JobExists(message),
            other => SubmitError::Store(other),
        })?;
        match outcome {
            CreateJobOutcome::Existing(id) => Ok(SubmitOutcome::Idempotent(id)),
            CreateJobOutcome::Created(id) => {
                self.record(JobEventKind::Submitted, &id, None, Some("enqueued"), None);
                self.spawn_run(verified.spec);
                Ok(SubmitOutcome::Enqueued(id))
            }
        }
    }

    /// Runs a stored job on a background task.
    fn spawn_run(self: &Arc<Self>, spec: JobSpec) {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let id = spec.id.clone();
            if let Err(err) = pipeline.run_job(spec).await {
                pipeline.record(
                    JobEventKind::ExecutionFinished,
                    &id,
                    None,
                    Some("error"),
                    Some(err.to_string()),
                );
                if let Err(err) = pipeline.jobs.update_job_status(&id, JobStatus::Failed).await {
                    pipeline.record(
                        JobEventKind::ExecutionFinished,
                        &id,
                        None,
                        Some("status_update_failed"),
                        Some(err.to_string()),
                    );
                }
            }
        });
    }

    /// Negotiates every target region, executes, and persists the result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the store or the executor fails.
    pub async fn run_job(&self, spec: JobSpec) -> Result<CrossRegionStatus, PipelineError> {
        let id = spec.id.clone();
        self.jobs.update_job_status(&id, JobStatus::Running).await?;

        let requests = spec
            .constraints
            .regions
            .iter()
            .map(|region| self.negotiation_config.request(region))
            .collect();
        let acquisitions = self.negotiation.acquire_all(requests).await;
        for acquisition in &acquisitions {
            match &acquisition.result {
                Ok(acquired) => self.record(
                    JobEventKind::NegotiationFinished,
                    &id,
                    Some(&acquisition.region),
                    Some(acquired.outcome.as_str()),
                    Some(acquired.offer.reference.clone()),
                ),
                Err(err) => self.record(
                    JobEventKind::NegotiationFinished,
                    &id,
                    Some(&acquisition.region),
                    Some("failed"),
                    Some(err.to_string()),
                ),
            }
        }

        let mut handle = self.executor.start(spec, acquisitions);
        let decided = handle.decided().await;
        if let Some(status) = job_status(decided) {
            self.jobs.update_job_status(&id, status).await?;
        }
        let report = handle.finish().await?;
        self.jobs.save_execution(&report.execution).await?;
        let final_status = job_status(report.execution.status).unwrap_or(JobStatus::Failed);
        self.jobs.update_job_status(&id, final_status).await?;
        Ok(report.execution.status)
    }

    /// Emits one job audit event.
    fn record(
        &self,
        kind: JobEventKind,
        id: &JobSpecId,
        region: Option<&str>,
        outcome: Option<&str>,
        message: Option<String>,
    ) {
        self.audit.record_job(&JobAuditEvent::new(JobAuditEventParams {
            kind,
            job_id: id.to_string(),
            region: region.map(ToString::to_string),
            outcome: outcome.map(ToString::to_string),
            message,
        }));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a decided aggregate status to a job status.
const fn job_status(status: CrossRegionStatus) -> Option<JobStatus> {
    match status {
        CrossRegionStatus::Completed => Some(JobStatus::Completed),
        CrossRegionStatus::Failed => Some(JobStatus::Failed),
        CrossRegionStatus::Running | CrossRegionStatus::PartiallyFailed => None,
    }
}

/// Trims the header value; blank keys count as absent.
fn normalize_idempotency_key(raw: Option<&str>) -> Result<Option<&str>, SubmitError> {
    let Some(key) = raw.map(str::trim).filter(|key| !key.is_empty()) else {
        return Ok(None);
    };
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(SubmitError::InvalidIdempotencyKey("too long"));
    }
    if !key.bytes().all(|byte| byte.is_ascii_graphic()) {
        return Err(SubmitError::InvalidIdempotencyKey("expected visible ascii"));
    }
    Ok(Some(key))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
