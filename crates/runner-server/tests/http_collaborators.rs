// crates/runner-server/tests/http_collaborators.rs
// ============================================================================
// Module: HTTP Collaborator Tests
// Description: IP echo, geo lookup, and provider router clients.
// ============================================================================
//! ## Overview
//! Serves canned responses from an in-process axum app and checks how the
//! reqwest-backed collaborators parse and classify them.

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

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use common::provider;
use common::spec_document;
use runner_core::JobSpec;
use runner_core::core::InferenceTask;
use runner_core::core::Offer;
use runner_core::interfaces::GeoResolver;
use runner_core::interfaces::IpFetcher;
use runner_core::interfaces::ProbeError;
use runner_core::interfaces::ProviderCallError;
use runner_core::interfaces::ProviderInfo;
use runner_core::interfaces::SingleRegionExecutor;
use runner_server::HttpGeoResolver;
use runner_server::HttpIpFetcher;
use runner_server::HttpSingleRegionExecutor;
use runner_server::InferenceSettings;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: Mock Services
// ============================================================================

#[derive(Clone, Default)]
struct MockState {
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn geo_lookup(Path(ip): Path<String>) -> impl IntoResponse {
    match ip.as_str() {
        "198.51.100.10" => Json(json!({"country_code": "us", "continent_code": "na"})),
        "203.0.113.5" => Json(json!({"error": true, "reason": "Reserved IP Address"})),
        _ => Json(json!({"continent_code": "EU"})),
    }
}

async fn inference(
    State(state): State<MockState>,
    Path(mode): Path<String>,
    Json(body): Json<Value>,
) -> axum::response::Response {
    state.requests.lock().unwrap().push(body);
    match mode.as_str() {
        "ok" => Json(json!({
            "success": true,
            "response": "Paris",
            "provider_used": "modal-us",
            "inference_time": 1.25,
            "metadata": {"gpu": "a10g"}
        }))
        .into_response(),
        "quiet" => Json(json!({"success": true, "response": "Paris"})).into_response(),
        "refused" => Json(json!({"success": false, "error": "model not loaded"})).into_response(),
        "busy" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        "slow" => StatusCode::GATEWAY_TIMEOUT.into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn spawn_mock() -> (String, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/ip", get(|| async { "198.51.100.10\n" }))
        .route("/ip/provider", get(|| async { "2001:db8::1" }))
        .route("/ip/garbage", get(|| async { "<html>hello</html>" }))
        .route("/geo/{ip}/json", get(geo_lookup))
        .route("/{mode}/inference", post(inference))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn job() -> JobSpec {
    let mut document = spec_document("job-http", &["US"], "nonce-http");
    document["metadata"]["model"] = json!("qwen2.5-1.5b");
    let mut spec: JobSpec = serde_json::from_value(document).unwrap();
    spec.validate().unwrap();
    spec
}

fn first_task(spec: &JobSpec) -> InferenceTask {
    spec.inference_tasks().remove(0)
}

fn endpoint(base: &str, mode: &str) -> ProviderInfo {
    ProviderInfo {
        endpoint: format!("{base}/{mode}"),
        ..provider("p-us", "US")
    }
}

fn executor() -> HttpSingleRegionExecutor {
    HttpSingleRegionExecutor::new(
        Duration::from_secs(5),
        InferenceSettings {
            temperature: 0.1,
            max_tokens: 256,
        },
    )
    .unwrap()
}

// ============================================================================
// SECTION: IP Fetcher
// ============================================================================

#[tokio::test]
async fn ip_fetcher_reads_the_echo_service() {
    let (base, _) = spawn_mock().await;
    let fetcher = HttpIpFetcher::new(&format!("{base}/ip"), Duration::from_secs(5)).unwrap();

    let ip = fetcher.fetch_public_ip(&Offer::new("offer-1")).await.unwrap();
    assert_eq!(ip, "198.51.100.10");

    let scoped = Offer::new("offer-2").with_property("probe.url", &format!("{base}/ip/provider"));
    assert_eq!(fetcher.fetch_public_ip(&scoped).await.unwrap(), "2001:db8::1");
}

#[tokio::test]
async fn ip_fetcher_rejects_non_addresses() {
    let (base, _) = spawn_mock().await;
    let fetcher = HttpIpFetcher::new(&format!("{base}/ip/garbage"), Duration::from_secs(5)).unwrap();

    let result = fetcher.fetch_public_ip(&Offer::new("offer-1")).await;
    assert!(matches!(result, Err(ProbeError::IpFetch(_))));

    let missing = HttpIpFetcher::new(&format!("{base}/nowhere"), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        missing.fetch_public_ip(&Offer::new("offer-1")).await,
        Err(ProbeError::IpFetch(_))
    ));
}

// ============================================================================
// SECTION: Geo Resolver
// ============================================================================

#[tokio::test]
async fn geo_resolver_normalizes_codes() {
    let (base, _) = spawn_mock().await;
    let resolver = HttpGeoResolver::new(&format!("{base}/geo/"), Duration::from_secs(5)).unwrap();

    let location = resolver.resolve("198.51.100.10").await.unwrap();

    assert_eq!(location.country, "US");
    assert_eq!(location.continent, "NA");
    assert_eq!(location.source, "127.0.0.1");
}

#[tokio::test]
async fn geo_resolver_surfaces_service_errors() {
    let (base, _) = spawn_mock().await;
    let resolver = HttpGeoResolver::new(&format!("{base}/geo"), Duration::from_secs(5)).unwrap();

    let reserved = resolver.resolve("203.0.113.5").await.unwrap_err();
    assert!(reserved.to_string().contains("Reserved IP Address"));
    assert!(matches!(
        resolver.resolve("192.0.2.1").await,
        Err(ProbeError::GeoLookup(_))
    ));
    assert!(matches!(resolver.resolve("not-an-ip").await, Err(ProbeError::GeoLookup(_))));
}

// ============================================================================
// SECTION: Provider Router
// ============================================================================

#[tokio::test]
async fn inference_call_sends_the_job_and_returns_the_answer() {
    let (base, state) = spawn_mock().await;
    let spec = job();
    let task = first_task(&spec);

    let response = executor().execute(&spec, &task, &endpoint(&base, "ok"), "US").await.unwrap();

    assert_eq!(response.data["response"], "Paris");
    assert_eq!(response.data["provider_used"], "modal-us");
    assert_eq!(response.data["inference_time"], 1.25);
    assert_eq!(response.metadata.get("gpu"), Some(&json!("a10g")));
    let requests = state.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["model"], "qwen2.5-1.5b");
    assert_eq!(requests[0]["prompt"], "Who won?");
    assert_eq!(requests[0]["region_preference"], "US");
    assert_eq!(requests[0]["max_tokens"], 256);
}

#[tokio::test]
async fn inference_call_sends_the_task_model_and_question() {
    let (base, state) = spawn_mock().await;
    let spec = job();
    let task = InferenceTask {
        model: "mistral-7b".to_string(),
        question: Some("Who lost?".to_string()),
    };

    let response = executor().execute(&spec, &task, &endpoint(&base, "ok"), "US").await.unwrap();

    assert_eq!(response.data["model"], "mistral-7b");
    let requests = state.requests.lock().unwrap().clone();
    assert_eq!(requests[0]["model"], "mistral-7b");
    assert_eq!(requests[0]["prompt"], "Who lost?");
}

#[tokio::test]
async fn inference_without_provider_label_uses_the_provider_id() {
    let (base, _) = spawn_mock().await;
    let spec = job();
    let task = first_task(&spec);
    let response = executor().execute(&spec, &task, &endpoint(&base, "quiet"), "US").await.unwrap();
    assert_eq!(response.data["provider_used"], "p-us");
}

#[tokio::test]
async fn inference_failures_are_classified() {
    let (base, _) = spawn_mock().await;
    let spec = job();
    let task = first_task(&spec);
    let client = executor();

    let busy = client.execute(&spec, &task, &endpoint(&base, "busy"), "US").await.unwrap_err();
    assert!(matches!(busy, ProviderCallError::Transient(_)));
    assert!(busy.is_retryable());

    let slow = client.execute(&spec, &task, &endpoint(&base, "slow"), "US").await.unwrap_err();
    assert!(matches!(slow, ProviderCallError::Timeout(_)));

    let bad = client.execute(&spec, &task, &endpoint(&base, "bad"), "US").await.unwrap_err();
    assert!(matches!(bad, ProviderCallError::Permanent(_)));
    assert!(!bad.is_retryable());

    let refused = client.execute(&spec, &task, &endpoint(&base, "refused"), "US").await.unwrap_err();
    assert_eq!(refused, ProviderCallError::Permanent("model not loaded".to_string()));
}

#[tokio::test]
async fn unreachable_provider_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let provider = ProviderInfo {
        endpoint: format!("http://{addr}"),
        ..provider("p-us", "US")
    };

    let spec = job();
    let err = executor().execute(&spec, &first_task(&spec), &provider, "US").await.unwrap_err();

    assert!(err.is_retryable(), "{err:?}");
}
