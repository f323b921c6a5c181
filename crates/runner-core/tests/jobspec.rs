// crates/runner-core/tests/jobspec.rs
// ============================================================================
// Module: Job Spec Validation Tests
// Description: Structural validation, defaults, and error field paths.
// ============================================================================
//! ## Overview
//! Validation applies documented defaults and reports the offending field as
//! a stable dotted path.

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

use common::spec_document;
use runner_core::core::InferenceTask;
use runner_core::core::JobSpec;
use runner_core::core::jobspec::DEFAULT_JOB_TIMEOUT_MS;
use runner_core::core::jobspec::DEFAULT_MIN_SUCCESS_RATE;
use runner_core::core::jobspec::DEFAULT_MODEL;
use runner_core::core::jobspec::DEFAULT_PROVIDER_TIMEOUT_MS;
use serde_json::Value;
use serde_json::json;

fn parse(document: Value) -> JobSpec {
    serde_json::from_value(document).unwrap()
}

fn field_error(document: Value) -> String {
    parse(document).validate().unwrap_err().field
}

#[test]
fn defaults_are_applied_to_unset_constraints() {
    let mut document = spec_document("job-1", &["US", "EU"]);
    document["version"] = json!("");
    let constraints = document["constraints"].as_object_mut().unwrap();
    constraints.remove("min_regions");
    constraints.remove("timeout_ms");
    constraints.remove("provider_timeout_ms");

    let mut spec = parse(document);
    spec.validate().unwrap();

    assert_eq!(spec.version, "1.0");
    assert_eq!(spec.constraints.min_regions, Some(1));
    assert!((spec.constraints.min_success_rate - DEFAULT_MIN_SUCCESS_RATE).abs() < f64::EPSILON);
    assert_eq!(spec.constraints.timeout_ms, Some(DEFAULT_JOB_TIMEOUT_MS));
    assert_eq!(spec.constraints.provider_timeout_ms, Some(DEFAULT_PROVIDER_TIMEOUT_MS));
    assert_eq!(spec.constraints.timeout(), Duration::from_secs(600));
}

#[test]
fn provider_timeout_default_never_exceeds_the_job_timeout() {
    let mut document = spec_document("job-1", &["US"]);
    document["constraints"]["timeout_ms"] = json!(30_000);
    document["constraints"].as_object_mut().unwrap().remove("provider_timeout_ms");

    let mut spec = parse(document);
    spec.validate().unwrap();

    assert_eq!(spec.constraints.provider_timeout_ms, Some(30_000));
}

#[test]
fn explicit_zero_constraints_default_but_stay_distinct_from_absent() {
    let mut document = spec_document("job-1", &["US"]);
    document["constraints"]["min_regions"] = json!(0);
    document["constraints"]["timeout_ms"] = json!(0);

    let spec = parse(document);
    assert_eq!(spec.constraints.min_regions, Some(0));
    assert_eq!(spec.constraints.min_regions(), 1);
    assert_eq!(spec.constraints.timeout(), Duration::from_millis(DEFAULT_JOB_TIMEOUT_MS));

    let serialized = serde_json::to_value(&spec).unwrap();
    assert_eq!(serialized["constraints"]["min_regions"], json!(0));
    assert_eq!(serialized["constraints"]["timeout_ms"], json!(0));
}

#[test]
fn structural_errors_name_the_offending_field() {
    let cases: [(&str, fn(&mut Value)); 15] = [
        ("id", |doc: &mut Value| doc["id"] = json!(" ")),
        ("benchmark.name", |doc: &mut Value| doc["benchmark"]["name"] = json!("")),
        (
            "benchmark.container.image",
            |doc: &mut Value| doc["benchmark"]["container"]["image"] = json!(""),
        ),
        ("benchmark.input.hash", |doc: &mut Value| doc["benchmark"]["input"]["hash"] = json!("")),
        (
            "benchmark.input.hash",
            |doc: &mut Value| doc["benchmark"]["input"]["hash"] = json!("sha256:abc"),
        ),
        ("constraints.regions", |doc: &mut Value| doc["constraints"]["regions"] = json!([])),
        ("constraints.regions", |doc: &mut Value| doc["constraints"]["regions"] = json!(["MARS"])),
        (
            "constraints.regions",
            |doc: &mut Value| doc["constraints"]["regions"] = json!(["US", "US"]),
        ),
        ("constraints.min_regions", |doc: &mut Value| doc["constraints"]["min_regions"] = json!(3)),
        (
            "constraints.min_success_rate",
            |doc: &mut Value| doc["constraints"]["min_success_rate"] = json!(1.5),
        ),
        (
            "constraints.provider_timeout_ms",
            |doc: &mut Value| doc["constraints"]["provider_timeout_ms"] = json!(120_000),
        ),
        ("constraints.max_cost", |doc: &mut Value| doc["constraints"]["max_cost"] = json!(-1)),
        ("metadata.models", |doc: &mut Value| doc["metadata"] = json!({"models": "llama"})),
        ("questions", |doc: &mut Value| doc["questions"] = json!(["Who won?", " "])),
        (
            "questions",
            |doc: &mut Value| {
                doc["questions"] = json!((0 .. 33).map(|n| format!("q{n}")).collect::<Vec<_>>());
                doc["metadata"] = json!({"models": ["a", "b"]});
            },
        ),
    ];

    for (expected, mutate) in cases {
        let mut document = spec_document("job-1", &["US", "EU"]);
        mutate(&mut document);
        assert_eq!(field_error(document), expected);
    }
}

#[test]
fn error_code_uses_the_field_path() {
    let mut document = spec_document("job-1", &["US"]);
    document["constraints"]["regions"] = json!([]);

    let err = parse(document).validate().unwrap_err();

    assert_eq!(err.error_code(), "validation_error:constraints.regions");
}

#[test]
fn bare_hex_input_hash_is_accepted() {
    let mut document = spec_document("job-1", &["US"]);
    document["benchmark"]["input"]["hash"] =
        json!("2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae");

    parse(document).validate().unwrap();
}

#[test]
fn prompt_and_model_fall_back_sensibly() {
    let mut document = spec_document("job-1", &["US"]);
    document["questions"] = json!([]);

    let spec = parse(document.clone());
    let tasks = spec.inference_tasks();
    assert_eq!(
        tasks,
        vec![InferenceTask {
            model: DEFAULT_MODEL.to_string(),
            question: None,
        }]
    );
    assert_eq!(spec.prompt_for(&tasks[0]), Some("Who won?"));

    document["metadata"] = json!({"model": "mistral-7b"});
    assert_eq!(parse(document).models(), vec!["mistral-7b".to_string()]);
}

#[test]
fn every_model_runs_every_question() {
    let mut document = spec_document("job-1", &["US"]);
    document["questions"] = json!(["q1", "q2"]);
    document["metadata"] = json!({"model": "ignored", "models": ["llama", "mistral", "llama"]});

    let spec = parse(document);
    let pairs: Vec<(String, Option<String>)> = spec
        .inference_tasks()
        .into_iter()
        .map(|task| (task.model, task.question))
        .collect();

    assert_eq!(
        pairs,
        vec![
            ("llama".to_string(), Some("q1".to_string())),
            ("llama".to_string(), Some("q2".to_string())),
            ("mistral".to_string(), Some("q1".to_string())),
            ("mistral".to_string(), Some("q2".to_string())),
        ]
    );
}
