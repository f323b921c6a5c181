// crates/runner-core/src/runtime/job_store.rs
// ============================================================================
// Module: In-Memory Job Store
// Description: Process-local job, execution, and receipt persistence.
// Purpose: Provide a JobStore for tests and single-process deployments.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryJobStore`] keeps jobs, executions, and receipts behind one
//! mutex. Idempotency keys bind to the first job created under them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::core::CrossRegionExecution;
use crate::core::JobSpec;
use crate::core::JobSpecId;
use crate::core::Receipt;
use crate::core::clock::now_utc;
use crate::interfaces::CreateJobOutcome;
use crate::interfaces::JobRecord;
use crate::interfaces::JobStatus;
use crate::interfaces::JobStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Store contents.
#[derive(Debug, Default)]
struct JobStoreState {
    /// Jobs by id.
    jobs: BTreeMap<JobSpecId, JobRecord>,
    /// Idempotency key bindings.
    keys: BTreeMap<String, JobSpecId>,
    /// Latest aggregate per job.
    executions: BTreeMap<JobSpecId, CrossRegionExecution>,
    /// Receipts per job in insertion order.
    receipts: BTreeMap<JobSpecId, Vec<Receipt>>,
}

/// In-memory [`JobStore`].
#[derive(Debug)]
pub struct InMemoryJobStore {
    /// Guarded state.
    state: Mutex<JobStoreState>,
    /// Availability switch.
    online: AtomicBool,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    /// Creates an empty, online store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(JobStoreState::default()),
            online: AtomicBool::new(true),
        }
    }

    /// Marks the store reachable or unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Locks the state.
    fn lock(&self) -> Result<MutexGuard<'_, JobStoreState>, StoreError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(StoreError::Store("job store offline".to_string()));
        }
        self.state.lock().map_err(|_| StoreError::Store("job store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(
        &self,
        spec: &JobSpec,
        idempotency_key: Option<&str>,
    ) -> Result<CreateJobOutcome, StoreError> {
        let mut state = self.lock()?;
        if let Some(existing) = idempotency_key.and_then(|key| state.keys.get(key)) {
            return Ok(CreateJobOutcome::Existing(existing.clone()));
        }
        if state.jobs.contains_key(&spec.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", spec.id)));
        }
        let now = now_utc();
        state.jobs.insert(
            spec.id.clone(),
            JobRecord {
                id: spec.id.clone(),
                spec: spec.clone(),
                status: JobStatus::Enqueued,
                idempotency_key: idempotency_key.map(str::to_string),
                created_at: now,
                updated_at: now,
            },
        );
        if let Some(key) = idempotency_key {
            state.keys.insert(key.to_string(), spec.id.clone());
        }
        Ok(CreateJobOutcome::Created(spec.id.clone()))
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<JobSpecId>, StoreError> {
        Ok(self.lock()?.keys.get(key).cloned())
    }

    async fn load_job(&self, id: &JobSpecId) -> Result<Option<JobRecord>, StoreError> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    async fn update_job_status(
        &self,
        id: &JobSpecId,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let record = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::Invalid(format!("unknown job {id}")))?;
        record.status = status;
        record.updated_at = now_utc();
        Ok(())
    }

    async fn save_execution(&self, execution: &CrossRegionExecution) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.jobs.contains_key(&execution.jobspec_id) {
            return Err(StoreError::Invalid(format!("unknown job {}", execution.jobspec_id)));
        }
        state.executions.insert(execution.jobspec_id.clone(), execution.clone());
        Ok(())
    }

    async fn load_execution(
        &self,
        id: &JobSpecId,
    ) -> Result<Option<CrossRegionExecution>, StoreError> {
        Ok(self.lock()?.executions.get(id).cloned())
    }

    async fn save_receipt(&self, receipt: &Receipt) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let receipts = state.receipts.entry(receipt.jobspec_id.clone()).or_default();
        if receipts.iter().any(|existing| existing.id == receipt.id) {
            return Err(StoreError::Conflict(format!("receipt {} already stored", receipt.id)));
        }
        receipts.push(receipt.clone());
        Ok(())
    }

    async fn list_receipts(&self, id: &JobSpecId) -> Result<Vec<Receipt>, StoreError> {
        Ok(self.lock()?.receipts.get(id).cloned().unwrap_or_default())
    }
}
