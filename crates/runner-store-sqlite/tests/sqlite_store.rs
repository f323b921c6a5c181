// crates/runner-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Job persistence, idempotency, integrity checks, fast keys.
// ============================================================================
//! ## Overview
//! Exercises the `SQLite` store against temporary databases.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use runner_core::core::AttemptOutput;
use runner_core::core::CrossRegionExecution;
use runner_core::core::CrossRegionStatus;
use runner_core::core::ExecutionAttempt;
use runner_core::core::JobSpec;
use runner_core::core::JobSpecId;
use runner_core::core::ProviderId;
use runner_core::core::Receipt;
use runner_core::core::RegionVerification;
use runner_core::core::clock::now_utc;
use runner_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use runner_core::core::hashing::hash_canonical_json;
use runner_core::interfaces::CreateJobOutcome;
use runner_core::interfaces::FastStore;
use runner_core::interfaces::JobStatus;
use runner_core::interfaces::JobStore;
use runner_core::interfaces::StoreError;
use runner_store_sqlite::SqliteRunnerStore;
use runner_store_sqlite::SqliteStoreConfig;
use runner_store_sqlite::SqliteStoreError;
use serde_json::json;
use tempfile::TempDir;

fn open(dir: &TempDir) -> SqliteRunnerStore {
    SqliteRunnerStore::open(&SqliteStoreConfig::new(dir.path().join("runner.db"))).unwrap()
}

fn raw(dir: &TempDir) -> rusqlite::Connection {
    rusqlite::Connection::open(dir.path().join("runner.db")).unwrap()
}

fn spec(id: &str, regions: &[&str]) -> JobSpec {
    let mut spec: JobSpec = serde_json::from_value(json!({
        "id": id,
        "benchmark": {
            "name": "geo-bias",
            "container": {"image": "ghcr.io/example/bench"},
            "input": {
                "type": "prompt",
                "data": {"prompt": "Who won?"},
                "hash": "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"
            }
        },
        "constraints": {"regions": regions, "min_regions": 1},
        "questions": ["Who won?"]
    }))
    .unwrap();
    spec.validate().unwrap();
    spec
}

fn completed(region: &str) -> ExecutionAttempt {
    let now = now_utc();
    let data = json!({"answer": region});
    let mut attempt =
        ExecutionAttempt::new(region, RegionVerification::declared(region, format!("{region}-o")));
    attempt.start(now).unwrap();
    attempt
        .complete(
            ProviderId::new(format!("{region}-provider")),
            AttemptOutput {
                hash: hash_canonical_json(DEFAULT_HASH_ALGORITHM, &data).unwrap(),
                data,
                metadata: serde_json::Map::new(),
            },
            now,
        )
        .unwrap();
    attempt
}

#[tokio::test]
async fn created_jobs_load_with_their_key() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let job = spec("job-1", &["US", "EU"]);

    let outcome = store.create_job(&job, Some("key-1")).await.unwrap();
    assert_eq!(outcome, CreateJobOutcome::Created(job.id.clone()));

    let record = store.load_job(&job.id).await.unwrap().unwrap();
    assert_eq!(record.spec, job);
    assert_eq!(record.status, JobStatus::Enqueued);
    assert_eq!(record.idempotency_key.as_deref(), Some("key-1"));
    assert_eq!(store.find_by_idempotency_key("key-1").await.unwrap(), Some(job.id.clone()));
    assert_eq!(store.find_by_idempotency_key("key-2").await.unwrap(), None);
    assert!(store.load_job(&JobSpecId::new("missing")).await.unwrap().is_none());
}

#[tokio::test]
async fn known_idempotency_key_returns_the_existing_job() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.create_job(&spec("job-1", &["US"]), Some("key-1")).await.unwrap();

    let outcome = store.create_job(&spec("job-2", &["EU"]), Some("key-1")).await.unwrap();

    assert_eq!(outcome, CreateJobOutcome::Existing(JobSpecId::new("job-1")));
    assert!(store.load_job(&JobSpecId::new("job-2")).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_job_id_conflicts() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.create_job(&spec("job-1", &["US"]), None).await.unwrap();

    let err = store.create_job(&spec("job-1", &["US"]), Some("other")).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(store.find_by_idempotency_key("other").await.unwrap(), None);
}

#[tokio::test]
async fn concurrent_creates_bind_a_key_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));
    let mut handles = Vec::new();
    for index in 0 .. 8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.create_job(&spec(&format!("job-{index}"), &["US"]), Some("shared")).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        if matches!(handle.await.unwrap().unwrap(), CreateJobOutcome::Created(_)) {
            created += 1;
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn status_updates_require_a_known_job() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let job = spec("job-1", &["US"]);
    store.create_job(&job, None).await.unwrap();

    store.update_job_status(&job.id, JobStatus::Running).await.unwrap();
    let record = store.load_job(&job.id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Running);
    assert!(record.updated_at >= record.created_at);

    let err = store.update_job_status(&JobSpecId::new("nope"), JobStatus::Failed).await;
    assert!(matches!(err, Err(StoreError::Invalid(_))));
}

#[tokio::test]
async fn latest_execution_replaces_the_previous_one() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let job = spec("job-1", &["US", "EU"]);
    store.create_job(&job, None).await.unwrap();

    let mut execution = CrossRegionExecution::new(&job, now_utc());
    store.save_execution(&execution).await.unwrap();
    execution.record(completed("US"), now_utc()).unwrap();
    execution.record(completed("EU"), now_utc()).unwrap();
    store.save_execution(&execution).await.unwrap();

    let loaded = store.load_execution(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, CrossRegionStatus::Completed);
    assert_eq!(loaded, execution);
}

#[tokio::test]
async fn executions_for_unknown_jobs_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let execution = CrossRegionExecution::new(&spec("ghost", &["US"]), now_utc());

    let err = store.save_execution(&execution).await.unwrap_err();

    assert!(matches!(err, StoreError::Invalid(_)));
    assert!(store.load_execution(&JobSpecId::new("ghost")).await.unwrap().is_none());
}

#[tokio::test]
async fn receipts_list_in_insertion_order_and_reject_duplicates() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let job = spec("job-1", &["US", "EU"]);
    store.create_job(&job, None).await.unwrap();
    let first = Receipt::for_attempt(&job, &completed("US"), now_utc()).unwrap();
    let second = Receipt::for_attempt(&job, &completed("EU"), now_utc()).unwrap();

    store.save_receipt(&first).await.unwrap();
    store.save_receipt(&second).await.unwrap();
    let err = store.save_receipt(&first).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(store.list_receipts(&job.id).await.unwrap(), vec![first, second]);
    assert!(store.list_receipts(&JobSpecId::new("other")).await.unwrap().is_empty());
}

#[tokio::test]
async fn state_survives_reopening() {
    let dir = TempDir::new().unwrap();
    let job = spec("job-1", &["US"]);
    {
        let store = open(&dir);
        store.create_job(&job, Some("key-1")).await.unwrap();
        assert!(store.set_if_absent("nonce:abc", Duration::from_secs(600)).await.unwrap());
    }

    let store = open(&dir);

    assert_eq!(store.find_by_idempotency_key("key-1").await.unwrap(), Some(job.id.clone()));
    assert!(!store.set_if_absent("nonce:abc", Duration::from_secs(600)).await.unwrap());
}

#[tokio::test]
async fn tampered_payloads_fail_closed() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let job = spec("job-1", &["US"]);
    store.create_job(&job, None).await.unwrap();

    raw(&dir)
        .execute("UPDATE jobs SET spec_json = CAST('{}' AS BLOB) WHERE id = 'job-1'", [])
        .unwrap();

    let err = store.load_job(&job.id).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[tokio::test]
async fn unknown_schema_versions_are_rejected() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));
    raw(&dir).execute("UPDATE store_meta SET version = 99", []).unwrap();

    let result = SqliteRunnerStore::open(&SqliteStoreConfig::new(dir.path().join("runner.db")));

    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[test]
fn directory_paths_are_rejected() {
    let dir = TempDir::new().unwrap();
    let result = SqliteRunnerStore::open(&SqliteStoreConfig::new(dir.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[tokio::test]
async fn set_if_absent_reserves_a_key_until_it_expires() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    assert!(store.set_if_absent("nonce:1", Duration::from_secs(60)).await.unwrap());
    assert!(!store.set_if_absent("nonce:1", Duration::from_secs(60)).await.unwrap());

    assert!(store.set_if_absent("nonce:2", Duration::ZERO).await.unwrap());
    assert!(store.set_if_absent("nonce:2", Duration::ZERO).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_admit_one_caller() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));
    let mut handles = Vec::new();
    for _ in 0 .. 16 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.set_if_absent("nonce:race", Duration::from_secs(60)).await.unwrap()
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}

#[tokio::test]
async fn counters_increment_and_reset_after_expiry() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    assert_eq!(store.counter("ip:1").await.unwrap(), 0);
    assert_eq!(store.increment("ip:1", Duration::from_secs(60)).await.unwrap(), 1);
    assert_eq!(store.increment("ip:1", Duration::from_secs(60)).await.unwrap(), 2);
    assert_eq!(store.counter("ip:1").await.unwrap(), 2);

    assert_eq!(store.increment("kid:1", Duration::ZERO).await.unwrap(), 1);
    assert_eq!(store.increment("kid:1", Duration::ZERO).await.unwrap(), 1);
}

#[tokio::test]
async fn purge_removes_only_expired_keys() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.set_if_absent("live", Duration::from_secs(60)).await.unwrap();
    store.set_if_absent("dead", Duration::ZERO).await.unwrap();

    assert_eq!(store.purge_expired().await.unwrap(), 1);
    assert!(!store.set_if_absent("live", Duration::from_secs(60)).await.unwrap());
}
