// crates/runner-core/src/execution/executor.rs
// ============================================================================
// Module: Cross-Region Executor
// Description: Parallel per-region execution with a single aggregate update path.
// Purpose: Run a verified job in every acquired region and decide its outcome.
// Dependencies: ed25519-dalek, tokio, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The coordinator spawns one task per acquired region. Each task discovers
//! its providers once, then runs every model and question pair of the job in
//! order. Every provider call is bounded by the per-provider timeout and the
//! job deadline, and retryable failures are retried per pair. The task then
//! issues and distributes one signed receipt covering all pairs and sends
//! exactly one terminal attempt over a channel. Only the coordinator touches
//! the [`CrossRegionExecution`] aggregate.
//!
//! Region tasks share no cancellation signal: a failure or timeout in one
//! region never interrupts another. The job-level status is published on a
//! watch channel as soon as the aggregate decides it; remaining regions still
//! run to completion and are recorded.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::audit::AuditSink;
use crate::audit::JobAuditEvent;
use crate::audit::JobAuditEventParams;
use crate::audit::JobEventKind;
use crate::audit::NoopAuditSink;
use crate::core::AggregateError;
use crate::core::AttemptOutput;
use crate::core::CrossRegionExecution;
use crate::core::CrossRegionStatus;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::ExecutionAttempt;
use crate::core::ExecutionFailure;
use crate::core::FailureKind;
use crate::core::InferenceTask;
use crate::core::JobSpec;
use crate::core::ProviderId;
use crate::core::Receipt;
use crate::core::ReceiptId;
use crate::core::RegionVerification;
use crate::core::TaskResult;
use crate::core::TransitionError;
use crate::core::clock::duration_millis;
use crate::core::clock::now_utc;
use crate::core::hashing::hash_canonical_json;
use crate::execution::retry::RetryPolicy;
use crate::execution::selection::pick_provider;
use crate::execution::selection::select_providers;
use crate::interfaces::ProviderCallError;
use crate::interfaces::ProviderDiscovery;
use crate::interfaces::ProviderInfo;
use crate::interfaces::ProviderResponse;
use crate::interfaces::ReceiptSink;
use crate::interfaces::SingleRegionExecutor;
use crate::negotiation::RegionAcquisition;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Receipt that could not be issued or delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkFailure {
    /// Sink label (`signer` when the receipt could not be issued).
    pub sink: &'static str,
    /// Region of the attempt.
    pub region: String,
    /// Receipt identifier when one was issued.
    pub receipt_id: Option<ReceiptId>,
    /// Failure detail.
    pub message: String,
}

/// Final result of a cross-region run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Final aggregate.
    pub execution: CrossRegionExecution,
    /// Signed receipts in arrival order.
    pub receipts: Vec<Receipt>,
    /// Receipt issuance and delivery failures.
    pub sink_failures: Vec<SinkFailure>,
}

/// Executor failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Aggregate rejected a record.
    #[error("aggregate error: {0}")]
    Aggregate(#[from] AggregateError),
    /// Attempt state machine rejected a transition.
    #[error("attempt error: {0}")]
    Transition(#[from] TransitionError),
    /// Coordinator task failed.
    #[error("execution task failed: {0}")]
    Task(String),
}

/// Terminal result sent by a region task.
struct RegionOutcome {
    /// Terminal attempt.
    attempt: ExecutionAttempt,
    /// Signed receipt.
    receipt: Option<Receipt>,
    /// Issuance and delivery failures.
    sink_failures: Vec<SinkFailure>,
}

/// Handle to a running cross-region execution.
pub struct ExecutionHandle {
    /// Job-level status updates.
    status: watch::Receiver<CrossRegionStatus>,
    /// Coordinator task.
    task: JoinHandle<Result<ExecutionReport, ExecutionError>>,
}

impl ExecutionHandle {
    /// Returns the latest published status.
    #[must_use]
    pub fn status(&self) -> CrossRegionStatus {
        *self.status.borrow()
    }

    /// Returns a status receiver.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CrossRegionStatus> {
        self.status.clone()
    }

    /// Waits until the job-level outcome is decided and returns it.
    ///
    /// Returns the last published status if the coordinator stops first.
    pub async fn decided(&mut self) -> CrossRegionStatus {
        let decided =
            self.status.wait_for(|status| status.is_terminal()).await.map(|status| *status);
        match decided {
            Ok(status) => status,
            Err(_) => *self.status.borrow(),
        }
    }

    /// Waits for every region to finish and returns the report.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the coordinator fails.
    pub async fn finish(self) -> Result<ExecutionReport, ExecutionError> {
        self.task.await.map_err(|err| ExecutionError::Task(err.to_string()))?
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Cross-region executor.
#[derive(Clone)]
pub struct CrossRegionExecutor {
    /// Provider discovery.
    discovery: Arc<dyn ProviderDiscovery>,
    /// Single-region executor.
    single: Arc<dyn SingleRegionExecutor>,
    /// Receipt sinks.
    sinks: Vec<Arc<dyn ReceiptSink>>,
    /// Receipt signing key.
    signing_key: Arc<SigningKey>,
    /// Retry policy.
    retry: RetryPolicy,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl CrossRegionExecutor {
    /// Creates an executor with the default retry policy and no sinks.
    #[must_use]
    pub fn new(
        discovery: Arc<dyn ProviderDiscovery>,
        single: Arc<dyn SingleRegionExecutor>,
        signing_key: Arc<SigningKey>,
    ) -> Self {
        Self {
            discovery,
            single,
            sinks: Vec::new(),
            signing_key,
            retry: RetryPolicy::default(),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Adds a receipt sink.
    #[must_use]
    pub fn with_receipt_sink(mut self, sink: Arc<dyn ReceiptSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Starts execution and returns a handle immediately.
    #[must_use]
    pub fn start(&self, spec: JobSpec, acquisitions: Vec<RegionAcquisition>) -> ExecutionHandle {
        let (status_tx, status_rx) = watch::channel(CrossRegionStatus::Running);
        let executor = self.clone();
        let task =
            tokio::spawn(async move { executor.coordinate(spec, acquisitions, status_tx).await });
        ExecutionHandle {
            status: status_rx,
            task,
        }
    }

    /// Runs execution to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when acquisitions do not match the targets
    /// or the coordinator fails.
    pub async fn execute(
        &self,
        spec: JobSpec,
        acquisitions: Vec<RegionAcquisition>,
    ) -> Result<ExecutionReport, ExecutionError> {
        self.start(spec, acquisitions).finish().await
    }

    /// Dispatches region tasks and folds their results into the aggregate.
    async fn coordinate(
        self,
        spec: JobSpec,
        acquisitions: Vec<RegionAcquisition>,
        status: watch::Sender<CrossRegionStatus>,
    ) -> Result<ExecutionReport, ExecutionError> {
        let spec = Arc::new(spec);
        let mut aggregate = CrossRegionExecution::new(&spec, now_utc());
        check_acquisitions(&aggregate, &acquisitions)?;
        let job_deadline = Instant::now() + spec.constraints.timeout();
        let (tx, mut rx) = mpsc::channel::<RegionOutcome>(acquisitions.len().max(1));
        let mut in_flight: BTreeMap<String, RegionVerification> = BTreeMap::new();

        for acquisition in acquisitions {
            match acquisition.result {
                Ok(acquired) => {
                    in_flight.insert(acquisition.region.clone(), acquired.verification.clone());
                    let task = RegionTask {
                        executor: self.clone(),
                        spec: Arc::clone(&spec),
                        region: acquisition.region,
                        verification: acquired.verification,
                        deadline: job_deadline,
                    };
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let outcome = task.run().await;
                        let _ = tx.send(outcome).await;
                    });
                }
                Err(_) => {
                    aggregate.record_unacquired(&acquisition.region, now_utc())?;
                    status.send_replace(aggregate.status);
                }
            }
        }
        drop(tx);

        let mut receipts = Vec::new();
        let mut sink_failures = Vec::new();
        while let Some(outcome) = rx.recv().await {
            in_flight.remove(&outcome.attempt.region);
            receipts.extend(outcome.receipt);
            sink_failures.extend(outcome.sink_failures);
            aggregate.record(outcome.attempt, now_utc())?;
            status.send_replace(aggregate.status);
        }

        for (region, verification) in in_flight {
            let now = now_utc();
            let mut attempt = ExecutionAttempt::new(region, verification);
            attempt.start(now)?;
            attempt.fail(
                None,
                ExecutionFailure {
                    kind: FailureKind::Permanent,
                    message: "region task ended without a result".to_string(),
                },
                now,
            )?;
            aggregate.record(attempt, now)?;
        }
        for region in aggregate.unresolved_regions() {
            aggregate.record_unacquired(&region, now_utc())?;
        }
        status.send_replace(aggregate.status);

        self.audit.record_job(&JobAuditEvent::new(JobAuditEventParams {
            kind: JobEventKind::ExecutionFinished,
            job_id: spec.id.to_string(),
            region: None,
            outcome: Some(aggregate.status.as_str().to_string()),
            message: Some(format!(
                "{} of {} regions succeeded",
                aggregate.success_count, aggregate.total_regions
            )),
        }));
        Ok(ExecutionReport {
            execution: aggregate,
            receipts,
            sink_failures,
        })
    }
}

/// Rejects acquisitions for unknown or repeated regions before dispatch.
fn check_acquisitions(
    aggregate: &CrossRegionExecution,
    acquisitions: &[RegionAcquisition],
) -> Result<(), AggregateError> {
    let mut seen = BTreeSet::new();
    for acquisition in acquisitions {
        if !aggregate.target_regions.contains(&acquisition.region) {
            return Err(AggregateError::UnknownRegion(acquisition.region.clone()));
        }
        if !seen.insert(acquisition.region.as_str()) {
            return Err(AggregateError::Duplicate(acquisition.region.clone()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Region Task
// ============================================================================

/// Failure with the provider that produced it.
type RegionFailure = (Option<ProviderId>, ExecutionFailure);

/// One region's execution task.
struct RegionTask {
    /// Executor dependencies.
    executor: CrossRegionExecutor,
    /// Shared spec.
    spec: Arc<JobSpec>,
    /// Target region.
    region: String,
    /// Negotiation verification.
    verification: RegionVerification,
    /// Job deadline.
    deadline: Instant,
}

impl RegionTask {
    /// Runs every model and question pair and issues the region receipt.
    async fn run(self) -> RegionOutcome {
        let mut attempt = ExecutionAttempt::new(&self.region, self.verification.clone());
        // A fresh attempt accepts start, task records, and one terminal transition.
        let _ = attempt.start(now_utc());
        let _ = match self.discover().await {
            Ok(candidates) => {
                for task in self.spec.inference_tasks() {
                    let result = self.run_task(&candidates, task).await;
                    let _ = attempt.record_task(result);
                }
                attempt.finish_from_tasks(now_utc())
            }
            Err(failure) => attempt.fail(None, failure, now_utc()),
        };
        let (receipt, sink_failures) = self.issue_receipt(&mut attempt).await;
        RegionOutcome {
            attempt,
            receipt,
            sink_failures,
        }
    }

    /// Returns the ranked candidates for the region.
    async fn discover(&self) -> Result<Vec<ProviderInfo>, ExecutionFailure> {
        let discovery = tokio::time::timeout_at(
            self.deadline,
            self.executor.discovery.providers_in_region(&self.region),
        )
        .await;
        let providers = match discovery {
            Ok(Ok(providers)) => providers,
            Ok(Err(err)) => return Err(failure(FailureKind::NoProvider, err.to_string())),
            Err(_) => {
                return Err(failure(
                    FailureKind::Timeout,
                    "provider discovery exceeded the job deadline",
                ));
            }
        };
        let candidates = select_providers(&providers, &self.region, &self.spec.constraints);
        if candidates.is_empty() {
            return Err(failure(
                FailureKind::NoProvider,
                format!("no eligible provider in region {}", self.region),
            ));
        }
        Ok(candidates)
    }

    /// Calls providers for one pair until success, a permanent failure, an
    /// exhausted try budget, or the job deadline.
    async fn run_task(&self, candidates: &[ProviderInfo], task: InferenceTask) -> TaskResult {
        let retry = self.executor.retry;
        let tries = retry.tries();
        let mut made = 0;
        let mut failed = BTreeSet::new();
        let mut last: RegionFailure =
            (None, failure(FailureKind::Timeout, "job deadline reached before dispatch"));
        for try_number in 1 ..= tries {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(provider) = pick_provider(candidates, &failed) else {
                break;
            };
            made += 1;
            let call_timeout = self.spec.constraints.provider_timeout().min(remaining);
            let call = tokio::time::timeout(
                call_timeout,
                self.executor.single.execute(&self.spec, &task, provider, &self.region),
            )
            .await;
            let error = match call {
                Ok(Ok(response)) => {
                    return match build_output(response) {
                        Ok(output) => TaskResult::completed(task, provider.id.clone(), output, made),
                        Err(err) => TaskResult::failed(task, Some(provider.id.clone()), err, made),
                    };
                }
                Ok(Err(err)) => err,
                Err(_) => ProviderCallError::Timeout(format!(
                    "provider call exceeded {} ms",
                    duration_millis(call_timeout)
                )),
            };
            let detail = failure(error.kind(), error.to_string());
            if !error.is_retryable() {
                return TaskResult::failed(task, Some(provider.id.clone()), detail, made);
            }
            failed.insert(provider.id.clone());
            last = (Some(provider.id.clone()), detail);
            if try_number < tries {
                let remaining = self.deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(retry.backoff_after(try_number).min(remaining)).await;
            }
        }
        let (provider_id, detail) = last;
        TaskResult::failed(task, provider_id, detail, made)
    }

    /// Builds, signs, and distributes the receipt for a terminal attempt.
    async fn issue_receipt(
        &self,
        attempt: &mut ExecutionAttempt,
    ) -> (Option<Receipt>, Vec<SinkFailure>) {
        let mut failures = Vec::new();
        let signed = Receipt::for_attempt(&self.spec, attempt, now_utc())
            .and_then(|mut receipt| receipt.sign(&self.executor.signing_key).map(|()| receipt));
        let receipt = match signed {
            Ok(receipt) => receipt,
            Err(err) => {
                failures.push(SinkFailure {
                    sink: "signer",
                    region: self.region.clone(),
                    receipt_id: None,
                    message: err.to_string(),
                });
                return (None, failures);
            }
        };
        attempt.receipt_id = Some(receipt.id.clone());
        for sink in &self.executor.sinks {
            if let Err(err) = sink.submit(&receipt).await {
                self.executor.audit.record_job(&JobAuditEvent::new(JobAuditEventParams {
                    kind: JobEventKind::ReceiptSinkFailed,
                    job_id: self.spec.id.to_string(),
                    region: Some(self.region.clone()),
                    outcome: Some(sink.name().to_string()),
                    message: Some(err.to_string()),
                }));
                failures.push(SinkFailure {
                    sink: sink.name(),
                    region: self.region.clone(),
                    receipt_id: Some(receipt.id.clone()),
                    message: err.to_string(),
                });
            }
        }
        (Some(receipt), failures)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an execution failure.
fn failure(kind: FailureKind, message: impl Into<String>) -> ExecutionFailure {
    ExecutionFailure {
        kind,
        message: message.into(),
    }
}

/// Hashes a provider response into attempt output.
fn build_output(response: ProviderResponse) -> Result<AttemptOutput, ExecutionFailure> {
    let hash = hash_canonical_json(DEFAULT_HASH_ALGORITHM, &response.data)
        .map_err(|err| failure(FailureKind::Permanent, err.to_string()))?;
    Ok(AttemptOutput {
        data: response.data,
        hash,
        metadata: response.metadata,
    })
}
