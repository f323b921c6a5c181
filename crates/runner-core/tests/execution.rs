// crates/runner-core/tests/execution.rs
// ============================================================================
// Module: Cross-Region Execution Tests
// Description: Aggregate decision rule, retries, deadlines, and receipts.
// ============================================================================
//! ## Overview
//! Covers the job-level aggregate directly and the executor end to end over
//! scripted providers on a paused clock.

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

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::signing_key;
use common::validated_spec;
use runner_core::core::AggregateError;
use runner_core::core::AttemptOutput;
use runner_core::core::AttemptStatus;
use runner_core::core::CrossRegionExecution;
use runner_core::core::CrossRegionStatus;
use runner_core::core::DEFAULT_HASH_ALGORITHM;
use runner_core::core::ExecutionAttempt;
use runner_core::core::ExecutionFailure;
use runner_core::core::FailureKind;
use runner_core::core::JobSpec;
use runner_core::core::Offer;
use runner_core::core::ProviderFilter;
use runner_core::core::ProviderId;
use runner_core::core::RegionVerification;
use runner_core::core::clock::now_utc;
use runner_core::core::hashing::hash_canonical_json;
use runner_core::execution::CrossRegionExecutor;
use runner_core::execution::ExecutionError;
use runner_core::execution::RetryPolicy;
use runner_core::execution::region_matches;
use runner_core::execution::select_providers;
use runner_core::interfaces::ProviderCallError;
use runner_core::interfaces::ProviderInfo;
use runner_core::negotiation::Acquisition;
use runner_core::negotiation::NegotiationError;
use runner_core::negotiation::NegotiationOutcome;
use runner_core::negotiation::RegionAcquisition;
use runner_core::runtime::MemoryAuditSink;
use runner_core::runtime::MemoryReceiptSink;
use runner_core::runtime::ScriptedCall;
use runner_core::runtime::ScriptedSingleRegionExecutor;
use runner_core::runtime::StaticProviderDiscovery;
use serde_json::json;
use tokio::time::Instant;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

fn spec(regions: &[&str], min_regions: u32) -> JobSpec {
    let mut spec = validated_spec("job-1", regions);
    spec.constraints.min_regions = Some(min_regions);
    spec
}

fn verification(region: &str) -> RegionVerification {
    RegionVerification::declared(region, format!("offer-{region}"))
}

fn acquired(region: &str) -> RegionAcquisition {
    RegionAcquisition {
        region: region.to_string(),
        result: Ok(Acquisition {
            region: region.to_string(),
            offer: Offer::new(format!("offer-{region}")).with_property("region", region),
            verification: verification(region),
            outcome: NegotiationOutcome::StrictMatch,
        }),
    }
}

fn unacquired(region: &str) -> RegionAcquisition {
    RegionAcquisition {
        region: region.to_string(),
        result: Err(NegotiationError::NoMatch {
            region: region.to_string(),
        }),
    }
}

fn provider(id: &str, region: &str, success_rate: f64) -> ProviderInfo {
    ProviderInfo {
        id: ProviderId::new(id),
        endpoint: format!("http://{id}.invalid/v1/inference"),
        region: region.to_string(),
        healthy: true,
        success_rate,
        avg_latency_ms: 100,
        cost_per_second: 0.01,
    }
}

fn fleet() -> Vec<ProviderInfo> {
    vec![
        provider("us-1", "us-east", 0.99),
        provider("us-2", "us-west", 0.90),
        provider("eu-1", "eu-central", 0.95),
        provider("asia-1", "asia-tokyo", 0.93),
    ]
}

fn executor(single: Arc<ScriptedSingleRegionExecutor>) -> CrossRegionExecutor {
    CrossRegionExecutor::new(
        Arc::new(StaticProviderDiscovery::new(fleet())),
        single,
        Arc::new(signing_key(9)),
    )
}

fn completed(region: &str) -> ExecutionAttempt {
    let now = now_utc();
    let data = json!({"answer": region});
    let mut attempt = ExecutionAttempt::new(region, verification(region));
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

fn failed(region: &str, kind: FailureKind) -> ExecutionAttempt {
    let now = now_utc();
    let mut attempt = ExecutionAttempt::new(region, verification(region));
    attempt.start(now).unwrap();
    attempt
        .fail(
            None,
            ExecutionFailure {
                kind,
                message: "provider failure".to_string(),
            },
            now,
        )
        .unwrap();
    attempt
}

fn attempt_for<'a>(execution: &'a CrossRegionExecution, region: &str) -> &'a ExecutionAttempt {
    execution.attempts.iter().find(|attempt| attempt.region == region).unwrap()
}

// ============================================================================
// SECTION: Aggregate
// ============================================================================

#[test]
fn two_of_three_meets_the_default_threshold() {
    let spec = spec(&["US", "EU", "ASIA"], 2);
    let mut execution = CrossRegionExecution::new(&spec, now_utc());

    execution.record(completed("US"), now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::Running);
    execution.record(failed("EU", FailureKind::Transient), now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::PartiallyFailed);
    execution.record(completed("ASIA"), now_utc()).unwrap();

    assert_eq!(execution.status, CrossRegionStatus::Completed);
    assert_eq!(execution.decided_after, Some(3));
    assert_eq!(execution.success_count, 2);
    assert_eq!(execution.failure_count, 1);
    assert!(execution.completed_at.is_some());
    assert!((execution.success_rate() - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn failure_is_decided_as_soon_as_success_is_unreachable() {
    let spec = spec(&["US", "EU", "ASIA"], 2);
    let mut execution = CrossRegionExecution::new(&spec, now_utc());

    execution.record(failed("US", FailureKind::Timeout), now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::PartiallyFailed);
    execution.record(failed("EU", FailureKind::Permanent), now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::Failed);
    assert_eq!(execution.decided_after, Some(2));
    assert!(execution.completed_at.is_none());

    execution.record(completed("ASIA"), now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::Failed);
    assert_eq!(execution.decided_after, Some(2));
    assert_eq!(execution.success_count, 1);
    assert!(execution.is_finished());
}

#[test]
fn lenient_threshold_completes_on_the_first_success() {
    let mut spec = spec(&["US", "EU", "ASIA"], 1);
    spec.constraints.min_success_rate = 0.3;
    let mut execution = CrossRegionExecution::new(&spec, now_utc());

    execution.record(completed("EU"), now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::Completed);
    assert_eq!(execution.decided_after, Some(1));

    execution.record(failed("US", FailureKind::Transient), now_utc()).unwrap();
    execution.record_unacquired("ASIA", now_utc()).unwrap();
    assert_eq!(execution.status, CrossRegionStatus::Completed);
    assert_eq!(execution.failure_count, 2);
}

#[test]
fn unacquired_regions_count_as_failures() {
    let spec = spec(&["US", "EU"], 2);
    let mut execution = CrossRegionExecution::new(&spec, now_utc());

    execution.record_unacquired("EU", now_utc()).unwrap();

    assert_eq!(execution.status, CrossRegionStatus::Failed);
    assert_eq!(execution.unacquired_regions, vec!["EU".to_string()]);
    assert_eq!(execution.unresolved_regions(), vec!["US".to_string()]);
}

#[test]
fn each_region_is_recorded_once() {
    let spec = spec(&["US", "EU"], 1);
    let mut execution = CrossRegionExecution::new(&spec, now_utc());
    execution.record(completed("US"), now_utc()).unwrap();

    assert_eq!(
        execution.record(completed("US"), now_utc()),
        Err(AggregateError::Duplicate("US".to_string()))
    );
    assert_eq!(
        execution.record_unacquired("US", now_utc()),
        Err(AggregateError::Duplicate("US".to_string()))
    );
    assert_eq!(
        execution.record(completed("APAC"), now_utc()),
        Err(AggregateError::UnknownRegion("APAC".to_string()))
    );
    let pending = ExecutionAttempt::new("EU", verification("EU"));
    assert_eq!(
        execution.record(pending, now_utc()),
        Err(AggregateError::NotTerminal("EU".to_string()))
    );
}

#[test]
fn attempts_reject_transitions_out_of_terminal_states() {
    let mut attempt = completed("US");
    assert!(attempt.start(now_utc()).is_err());
    assert!(
        attempt
            .fail(
                None,
                ExecutionFailure {
                    kind: FailureKind::Permanent,
                    message: "late".to_string(),
                },
                now_utc(),
            )
            .is_err()
    );
    assert_eq!(attempt.status, AttemptStatus::Completed);
}

// ============================================================================
// SECTION: Provider Selection
// ============================================================================

#[test]
fn selection_filters_and_ranks_by_success_rate() {
    let mut spec = spec(&["US"], 1);
    let unhealthy = ProviderInfo {
        healthy: false,
        ..provider("us-3", "us-central", 1.0)
    };
    let mut providers = fleet();
    providers.push(unhealthy);

    let ranked = select_providers(&providers, "US", &spec.constraints);
    let ids: Vec<&str> = ranked.iter().map(|provider| provider.id.as_str()).collect();
    assert_eq!(ids, vec!["us-1", "us-2"]);

    spec.constraints.providers.push(ProviderFilter {
        region: Some("us".to_string()),
        min_score: None,
        max_price: None,
        whitelist: Vec::new(),
        blacklist: vec!["us-1".to_string()],
    });
    let filtered = select_providers(&providers, "US", &spec.constraints);
    let ids: Vec<&str> = filtered.iter().map(|provider| provider.id.as_str()).collect();
    assert_eq!(ids, vec!["us-2"]);
}

#[test]
fn regions_match_on_the_leading_token_only() {
    assert!(region_matches("us-east", "US"));
    assert!(region_matches("US", "us"));
    assert!(region_matches("eu_central", "EU"));
    assert!(region_matches("asia-tokyo", "APAC"));
    assert!(region_matches("apac-sydney", "ASIA"));

    assert!(!region_matches("australia-southeast1", "US"));
    assert!(!region_matches("asia-neutral", "EU"));
    assert!(!region_matches("neu-west", "EU"));
    assert!(!region_matches("-us", "US"));
    assert!(!region_matches("us-east", " "));

    let providers =
        vec![provider("au-1", "australia-southeast1", 0.99), provider("us-1", "us-east", 0.5)];
    let ranked = select_providers(&providers, "US", &spec(&["US"], 1).constraints);
    let ids: Vec<&str> = ranked.iter().map(|provider| provider.id.as_str()).collect();
    assert_eq!(ids, vec!["us-1"]);
}

// ============================================================================
// SECTION: Executor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn every_region_completes_with_a_verifiable_receipt() {
    let single = Arc::new(ScriptedSingleRegionExecutor::new());
    let sink = Arc::new(MemoryReceiptSink::new());
    let executor = executor(single.clone()).with_receipt_sink(sink.clone());

    let report = executor
        .execute(spec(&["US", "EU"], 2), vec![acquired("US"), acquired("EU")])
        .await
        .unwrap();

    assert_eq!(report.execution.status, CrossRegionStatus::Completed);
    assert_eq!(report.receipts.len(), 2);
    assert!(report.sink_failures.is_empty());
    for receipt in &report.receipts {
        receipt.verify().unwrap();
        let attempt = attempt_for(&report.execution, &receipt.execution_details.region);
        assert_eq!(attempt.receipt_id.as_ref(), Some(&receipt.id));
        assert_eq!(receipt.output.hash.as_ref(), attempt.output.as_ref().map(|out| &out.hash));
        assert_eq!(receipt.region_verification, attempt.verification);
    }
    assert_eq!(sink.receipts().len(), 2);
    let us = attempt_for(&report.execution, "US");
    assert_eq!(us.provider_id, Some(ProviderId::new("us-1")));
    assert_eq!(us.output.as_ref().unwrap().data["region"], json!("US"));
}

#[tokio::test(start_paused = true)]
async fn every_model_and_question_runs_in_each_region() {
    let mut spec = spec(&["US"], 1);
    spec.questions = vec!["q1".to_string(), "q2".to_string(), "q3".to_string()];
    spec.metadata.insert("models".to_string(), json!(["llama", "mistral"]));
    let single = Arc::new(ScriptedSingleRegionExecutor::new());
    let executor = executor(single.clone());

    let report = executor.execute(spec, vec![acquired("US")]).await.unwrap();

    let sent: Vec<(String, Option<String>)> =
        single.calls().into_iter().map(|call| (call.model, call.prompt)).collect();
    assert_eq!(sent.len(), 6);
    assert_eq!(sent[0], ("llama".to_string(), Some("q1".to_string())));
    assert_eq!(sent[2], ("llama".to_string(), Some("q3".to_string())));
    assert_eq!(sent[5], ("mistral".to_string(), Some("q3".to_string())));

    let us = attempt_for(&report.execution, "US");
    assert_eq!(us.status, AttemptStatus::Completed);
    assert_eq!(us.tasks.len(), 6);
    assert!(us.tasks.iter().all(|task| task.status == AttemptStatus::Completed));
    assert_eq!(us.tries, 6);

    assert_eq!(report.receipts.len(), 1);
    let receipt = &report.receipts[0];
    receipt.verify().unwrap();
    assert_eq!(receipt.output.tasks, us.tasks);
    assert_eq!(receipt.provenance.execution_env["models"], json!(["llama", "mistral"]));
}

#[tokio::test(start_paused = true)]
async fn region_completes_when_any_pair_completes() {
    let mut spec = spec(&["EU"], 1);
    spec.questions = vec!["q1".to_string(), "q2".to_string()];
    let single = Arc::new(ScriptedSingleRegionExecutor::new().with_script(
        "eu-1",
        vec![ScriptedCall::err(
            Duration::ZERO,
            ProviderCallError::Permanent("prompt rejected".to_string()),
        )],
    ));
    let executor = executor(single);

    let report = executor.execute(spec, vec![acquired("EU")]).await.unwrap();

    let eu = attempt_for(&report.execution, "EU");
    assert_eq!(eu.status, AttemptStatus::Completed);
    assert_eq!(eu.tasks[0].status, AttemptStatus::Failed);
    assert_eq!(eu.tasks[0].error.as_ref().unwrap().kind, FailureKind::Permanent);
    assert_eq!(eu.tasks[1].status, AttemptStatus::Completed);
    assert_eq!(eu.output.as_ref().unwrap().data["question"], json!("q2"));
    assert_eq!(report.execution.status, CrossRegionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn tampered_receipt_fails_verification() {
    let executor = executor(Arc::new(ScriptedSingleRegionExecutor::new()));
    let report = executor.execute(spec(&["US"], 1), vec![acquired("US")]).await.unwrap();

    let mut receipt = report.receipts[0].clone();
    receipt.execution_details.tries += 1;

    assert!(receipt.verify().is_err());
}

#[tokio::test(start_paused = true)]
async fn status_is_published_before_a_slow_region_finishes() {
    let single = Arc::new(
        ScriptedSingleRegionExecutor::new()
            .with_script("asia-1", vec![ScriptedCall::ok(Duration::from_secs(8), json!("late"))]),
    );
    let executor = executor(single);
    let started = Instant::now();

    let mut handle = executor.start(
        spec(&["US", "EU", "ASIA"], 2),
        vec![acquired("US"), acquired("EU"), acquired("ASIA")],
    );
    let decided = handle.decided().await;

    assert_eq!(decided, CrossRegionStatus::Completed);
    assert!(started.elapsed() < Duration::from_secs(8));

    let report = handle.finish().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(8));
    assert_eq!(report.execution.decided_after, Some(2));
    assert_eq!(report.execution.success_count, 3);
    assert_eq!(attempt_for(&report.execution, "ASIA").status, AttemptStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn timed_out_region_does_not_abort_its_sibling() {
    let mut spec = spec(&["US", "EU"], 1);
    spec.constraints.min_success_rate = 0.3;
    spec.constraints.provider_timeout_ms = Some(1_000);
    let single = Arc::new(
        ScriptedSingleRegionExecutor::new()
            .with_script("us-1", vec![ScriptedCall::ok(Duration::from_secs(60), json!("stuck"))])
            .with_script("eu-1", vec![ScriptedCall::ok(Duration::from_millis(900), json!("eu"))]),
    );
    let executor = executor(single).with_retry(RetryPolicy::no_retry());
    let handle = executor.start(spec, vec![acquired("US"), acquired("EU")]);
    let mut status = handle.subscribe();

    status.wait_for(|status| *status == CrossRegionStatus::Completed).await.unwrap();
    let report = handle.finish().await.unwrap();

    let us = attempt_for(&report.execution, "US");
    let eu = attempt_for(&report.execution, "EU");
    assert_eq!(us.status, AttemptStatus::Failed);
    assert_eq!(us.error.as_ref().unwrap().kind, FailureKind::Timeout);
    assert_eq!(eu.status, AttemptStatus::Completed);
    assert_eq!(eu.output.as_ref().unwrap().data, json!("eu"));
    assert_eq!(report.receipts.len(), 2);
    assert_eq!(report.execution.success_count, 1);
    assert_eq!(report.execution.failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_on_the_next_provider() {
    let single = Arc::new(ScriptedSingleRegionExecutor::new().with_script(
        "us-1",
        vec![ScriptedCall::err(
            Duration::ZERO,
            ProviderCallError::Transient("503 from provider".to_string()),
        )],
    ));
    let executor = executor(single.clone());

    let report = executor.execute(spec(&["US"], 1), vec![acquired("US")]).await.unwrap();

    let us = attempt_for(&report.execution, "US");
    assert_eq!(us.status, AttemptStatus::Completed);
    assert_eq!(us.tries, 2);
    assert_eq!(us.provider_id, Some(ProviderId::new("us-2")));
    let called: Vec<String> = single.calls().iter().map(|call| call.provider_id.to_string()).collect();
    assert_eq!(called, vec!["us-1".to_string(), "us-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn permanent_failures_are_not_retried() {
    let single = Arc::new(ScriptedSingleRegionExecutor::new().with_script(
        "eu-1",
        vec![ScriptedCall::err(
            Duration::ZERO,
            ProviderCallError::Permanent("model not found".to_string()),
        )],
    ));
    let executor = executor(single.clone());

    let report = executor.execute(spec(&["EU"], 1), vec![acquired("EU")]).await.unwrap();

    let eu = attempt_for(&report.execution, "EU");
    assert_eq!(eu.status, AttemptStatus::Failed);
    assert_eq!(eu.tries, 1);
    assert_eq!(eu.error.as_ref().unwrap().kind, FailureKind::Permanent);
    assert_eq!(single.calls().len(), 1);
    assert_eq!(report.execution.status, CrossRegionStatus::Failed);
    assert_eq!(report.receipts[0].execution_details.status, AttemptStatus::Failed);
    report.receipts[0].verify().unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_provider_call_times_out() {
    let mut spec = spec(&["US"], 1);
    spec.constraints.provider_timeout_ms = Some(1_000);
    let single = Arc::new(
        ScriptedSingleRegionExecutor::new()
            .with_script("us-1", vec![ScriptedCall::ok(Duration::from_secs(5), json!("late"))]),
    );
    let executor = executor(single).with_retry(RetryPolicy::no_retry());
    let started = Instant::now();

    let report = executor.execute(spec, vec![acquired("US")]).await.unwrap();

    let us = attempt_for(&report.execution, "US");
    assert_eq!(us.error.as_ref().unwrap().kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn job_deadline_caps_retries() {
    let mut spec = spec(&["US"], 1);
    spec.constraints.timeout_ms = Some(1_000);
    spec.constraints.provider_timeout_ms = Some(1_000);
    let single = Arc::new(
        ScriptedSingleRegionExecutor::new()
            .with_script("us-1", vec![ScriptedCall::ok(Duration::from_secs(30), json!("late"))]),
    );
    let executor = executor(single.clone());
    let started = Instant::now();

    let report = executor.execute(spec, vec![acquired("US")]).await.unwrap();

    let us = attempt_for(&report.execution, "US");
    assert_eq!(us.status, AttemptStatus::Failed);
    assert_eq!(us.tries, 1);
    assert_eq!(us.error.as_ref().unwrap().kind, FailureKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(single.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn regions_without_providers_fail_with_no_provider() {
    let executor = CrossRegionExecutor::new(
        Arc::new(StaticProviderDiscovery::new(vec![provider("us-1", "us-east", 0.99)])),
        Arc::new(ScriptedSingleRegionExecutor::new()),
        Arc::new(signing_key(9)),
    );

    let report = executor
        .execute(spec(&["US", "ASIA"], 1), vec![acquired("US"), acquired("ASIA")])
        .await
        .unwrap();

    let asia = attempt_for(&report.execution, "ASIA");
    assert_eq!(asia.error.as_ref().unwrap().kind, FailureKind::NoProvider);
    assert_eq!(asia.tries, 0);
    assert_eq!(report.execution.success_count, 1);
}

#[tokio::test(start_paused = true)]
async fn discovery_outage_fails_the_region() {
    let executor = CrossRegionExecutor::new(
        Arc::new(StaticProviderDiscovery::unavailable("registry down")),
        Arc::new(ScriptedSingleRegionExecutor::new()),
        Arc::new(signing_key(9)),
    );

    let report = executor.execute(spec(&["EU"], 1), vec![acquired("EU")]).await.unwrap();

    let eu = attempt_for(&report.execution, "EU");
    assert_eq!(eu.error.as_ref().unwrap().kind, FailureKind::NoProvider);
    assert!(eu.error.as_ref().unwrap().message.contains("registry down"));
}

#[tokio::test(start_paused = true)]
async fn refused_receipts_are_reported_without_failing_the_job() {
    let audit = Arc::new(MemoryAuditSink::new());
    let executor = executor(Arc::new(ScriptedSingleRegionExecutor::new()))
        .with_receipt_sink(Arc::new(MemoryReceiptSink::refusing("disk full")))
        .with_audit(audit.clone());

    let report = executor
        .execute(spec(&["US", "EU"], 2), vec![acquired("US"), acquired("EU")])
        .await
        .unwrap();

    assert_eq!(report.execution.status, CrossRegionStatus::Completed);
    assert_eq!(report.receipts.len(), 2);
    assert_eq!(report.sink_failures.len(), 2);
    assert!(report.sink_failures.iter().all(|failure| failure.sink == "memory"));
    assert!(report.sink_failures.iter().all(|failure| failure.receipt_id.is_some()));
    let events: Vec<&str> = audit.job_events().iter().map(|event| event.event).collect();
    assert_eq!(
        events.iter().filter(|event| **event == "receipt_sink_failed").count(),
        2
    );
    assert_eq!(events.last(), Some(&"execution_finished"));
}

#[tokio::test(start_paused = true)]
async fn unacquired_and_missing_regions_are_recorded() {
    let executor = executor(Arc::new(ScriptedSingleRegionExecutor::new()));

    let report = executor
        .execute(spec(&["US", "EU", "ASIA"], 1), vec![acquired("US"), unacquired("EU")])
        .await
        .unwrap();

    let execution = report.execution;
    assert_eq!(execution.unacquired_regions, vec!["EU".to_string(), "ASIA".to_string()]);
    assert_eq!(execution.failure_count, 2);
    assert_eq!(execution.success_count, 1);
    assert_eq!(execution.status, CrossRegionStatus::Failed);
    assert_eq!(report.receipts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn acquisitions_outside_the_targets_are_rejected() {
    let executor = executor(Arc::new(ScriptedSingleRegionExecutor::new()));

    let unknown = executor.execute(spec(&["US"], 1), vec![acquired("EU")]).await;
    let repeated =
        executor.execute(spec(&["US"], 1), vec![acquired("US"), acquired("US")]).await;

    assert_eq!(
        unknown.unwrap_err(),
        ExecutionError::Aggregate(AggregateError::UnknownRegion("EU".to_string()))
    );
    assert_eq!(
        repeated.unwrap_err(),
        ExecutionError::Aggregate(AggregateError::Duplicate("US".to_string()))
    );
}
