// crates/runner-server/tests/submit_api.rs
// ============================================================================
// Module: Submission API Tests
// Description: HTTP admission, idempotency, rejections, and full job runs.
// ============================================================================
//! ## Overview
//! Drives an in-process runner over HTTP: accepted jobs run to a stored
//! execution with receipts, idempotency keys short-circuit, and every gate
//! rejection class maps to its status code.

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

use std::time::Duration;

use common::RunnerFixture;
use common::allow_entry;
use common::signed_body;
use common::signing_key;
use common::spawn_runner;
use common::spec_document;
use runner_core::core::Offer;
use runner_core::interfaces::ProviderCallError;
use runner_core::runtime::ScriptedCall;
use runner_core::runtime::ScriptedSingleRegionExecutor;
use serde_json::Value;
use serde_json::json;

fn job_event_names(runner: &common::TestRunner) -> Vec<&'static str> {
    runner.audit.job_events().iter().map(|event| event.event).collect()
}

#[tokio::test]
async fn health_reports_ok() {
    let runner = spawn_runner(RunnerFixture::trusting(Vec::new())).await;
    let response =
        runner.client.get(format!("{}/health", runner.base_url)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn accepted_job_runs_to_completion_with_receipts() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;

    let body = signed_body(spec_document("job-1", &["US", "EU"], "nonce-1"), &key);
    let (status, response) = runner.submit(body, None).await;
    assert_eq!(status, 202, "{response}");
    assert_eq!(response, json!({"id": "job-1", "status": "enqueued"}));

    let stored = runner.wait_for_job("job-1", "completed").await;
    let execution = &stored["execution"];
    assert_eq!(execution["status"], "completed");
    assert_eq!(execution["success_count"], 2);
    assert_eq!(execution["failure_count"], 0);
    assert_eq!(stored["receipts"].as_array().unwrap().len(), 2);

    let events = job_event_names(&runner);
    assert_eq!(events.first(), Some(&"job_submitted"));
    assert_eq!(events.iter().filter(|name| **name == "negotiation_finished").count(), 2);
    assert!(events.contains(&"execution_finished"));
    let gate_events: Vec<_> = runner.audit.gate_events().iter().map(|event| event.event).collect();
    assert_eq!(gate_events, vec!["gate_accepted"]);
}

#[tokio::test]
async fn known_idempotency_key_returns_the_existing_job() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;

    let body = signed_body(spec_document("job-2", &["US"], "nonce-2"), &key);
    let (status, _) = runner.submit(body, Some("client-key-1")).await;
    assert_eq!(status, 202);

    let (status, response) = runner.submit(b"not even json".to_vec(), Some("client-key-1")).await;
    assert_eq!(status, 200);
    assert_eq!(response, json!({"id": "job-2", "idempotent": true}));
    assert_eq!(runner.audit.gate_events().len(), 1);
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;
    let body = signed_body(spec_document("job-3", &["US"], "nonce-3"), &key);

    let (status, response) = runner.submit(body, Some(&"k".repeat(300))).await;

    assert_eq!(status, 400);
    assert_eq!(response["error_code"], "invalid_idempotency_key");
}

#[tokio::test]
async fn validation_failures_return_bad_request() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;

    let (status, response) = runner.submit(b"{not json".to_vec(), None).await;
    assert_eq!(status, 400);
    assert_eq!(response["error_code"], "validation_error:document");

    let unsigned = serde_json::to_vec(&spec_document("job-4", &["US"], "nonce-4")).unwrap();
    let (status, response) = runner.submit(unsigned, None).await;
    assert_eq!(status, 400);
    assert_eq!(response["error_code"], "missing_field:signature");
    assert!(response["error"].as_str().unwrap().contains("signature"));
}

#[tokio::test]
async fn trust_and_signature_failures_return_unauthorized() {
    let trusted = signing_key(7);
    let stranger = signing_key(8);
    let runner =
        spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &trusted)])).await;

    let body = signed_body(spec_document("job-5", &["US"], "nonce-5"), &stranger);
    let (status, response) = runner.submit(body, None).await;
    assert_eq!(status, 401);
    assert_eq!(response["error_code"], "trust_violation:unknown");

    let mut document: Value =
        serde_json::from_slice(&signed_body(spec_document("job-6", &["US"], "nonce-6"), &trusted))
            .unwrap();
    document["benchmark"]["name"] = json!("tampered");
    let (status, response) = runner.submit(serde_json::to_vec(&document).unwrap(), None).await;
    assert_eq!(status, 401);
    assert_eq!(response["error_code"], "signature_mismatch");
}

#[tokio::test]
async fn replayed_nonce_is_rejected() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;
    let body = signed_body(spec_document("job-7", &["US"], "nonce-7"), &key);

    let (status, _) = runner.submit(body.clone(), None).await;
    assert_eq!(status, 202);
    let (status, response) = runner.submit(body, None).await;

    assert_eq!(status, 401);
    assert_eq!(response["error_code"], "replay_detected");
}

#[tokio::test]
async fn reused_job_id_conflicts() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;

    let first = signed_body(spec_document("job-8", &["US"], "nonce-8a"), &key);
    let (status, _) = runner.submit(first, None).await;
    assert_eq!(status, 202);
    let second = signed_body(spec_document("job-8", &["US"], "nonce-8b"), &key);
    let (status, response) = runner.submit(second, None).await;

    assert_eq!(status, 409);
    assert_eq!(response["error_code"], "job_exists");
}

#[tokio::test]
async fn unreachable_fast_store_returns_service_unavailable() {
    let key = signing_key(7);
    let runner = spawn_runner(RunnerFixture::trusting(vec![allow_entry("ops-1", &key)])).await;
    runner.fast_store.set_online(false);

    let body = signed_body(spec_document("job-9", &["US"], "nonce-9"), &key);
    let (status, response) = runner.submit(body, None).await;

    assert_eq!(status, 503);
    assert!(
        response["error_code"].as_str().unwrap().starts_with("protection_unavailable:"),
        "{response}"
    );
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let mut fixture = RunnerFixture::trusting(Vec::new());
    fixture.max_body_bytes = 128;
    let runner = spawn_runner(fixture).await;

    let (status, _) = runner.submit(vec![b' '; 4096], None).await;

    assert_eq!(status, 413);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let runner = spawn_runner(RunnerFixture::trusting(Vec::new())).await;
    let (status, response) = runner.get_job("missing").await;
    assert_eq!(status, 404);
    assert_eq!(response["error_code"], "not_found");
}

#[tokio::test]
async fn unacquired_region_fails_a_job_that_needs_every_region() {
    let key = signing_key(7);
    let mut fixture = RunnerFixture::trusting(vec![allow_entry("ops-1", &key)]);
    fixture.catalog = vec![Offer::new("offer-us").with_property("region", "US")];
    let runner = spawn_runner(fixture).await;

    let mut document = spec_document("job-10", &["US", "EU"], "nonce-10");
    document["constraints"]["min_regions"] = json!(2);
    let (status, _) = runner.submit(signed_body(document, &key), None).await;
    assert_eq!(status, 202);

    let stored = runner.wait_for_job("job-10", "failed").await;
    assert_eq!(stored["execution"]["status"], "failed");
    assert_eq!(stored["execution"]["unacquired_regions"], json!(["EU"]));
    let negotiation: Vec<_> = runner
        .audit
        .job_events()
        .into_iter()
        .filter(|event| event.event == "negotiation_finished")
        .map(|event| (event.region.unwrap_or_default(), event.outcome.unwrap_or_default()))
        .collect();
    assert!(negotiation.contains(&("EU".to_string(), "failed".to_string())));
    assert!(negotiation.contains(&("US".to_string(), "strict_match".to_string())));
}

#[tokio::test]
async fn partial_provider_failure_still_meets_the_threshold() {
    let key = signing_key(7);
    let mut fixture = RunnerFixture::trusting(vec![allow_entry("ops-1", &key)]);
    fixture.executor = ScriptedSingleRegionExecutor::new().with_script(
        "p-eu",
        vec![ScriptedCall::err(
            Duration::ZERO,
            ProviderCallError::Permanent("model unavailable".to_string()),
        )],
    );
    let runner = spawn_runner(fixture).await;

    let mut document = spec_document("job-11", &["US", "EU"], "nonce-11");
    document["constraints"]["min_success_rate"] = json!(0.5);
    let (status, _) = runner.submit(signed_body(document, &key), None).await;
    assert_eq!(status, 202);

    let stored = runner.wait_for_job("job-11", "completed").await;
    assert_eq!(stored["execution"]["success_count"], 1);
    assert_eq!(stored["execution"]["failure_count"], 1);
    assert_eq!(stored["receipts"].as_array().unwrap().len(), 2);
    assert!(runner.executor.calls().iter().any(|call| call.region == "EU"));
}

#[tokio::test]
async fn unrecordable_failure_status_is_audited() {
    let key = signing_key(7);
    let mut fixture = RunnerFixture::trusting(vec![allow_entry("ops-1", &key)]);
    fixture.executor = ScriptedSingleRegionExecutor::new().with_script(
        "p-us",
        vec![ScriptedCall::ok(Duration::from_millis(300), json!({"answer": "late"}))],
    );
    let runner = spawn_runner(fixture).await;

    let body = signed_body(spec_document("job-12", &["US"], "nonce-12"), &key);
    let (status, _) = runner.submit(body, None).await;
    assert_eq!(status, 202);
    runner.jobs.set_online(false);

    let mut audited = None;
    for _ in 0 .. 100 {
        audited = runner
            .audit
            .job_events()
            .into_iter()
            .find(|event| event.outcome.as_deref() == Some("status_update_failed"));
        if audited.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let audited = audited.expect("failed status update was never audited");
    assert_eq!(audited.event, "execution_finished");
    assert_eq!(audited.job_id, "job-12");
    assert!(audited.message.unwrap_or_default().contains("offline"));
}
