// crates/runner-server/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Signed submissions and in-process runner servers.
// Purpose: Build a wired pipeline over in-memory stores and serve it on an
//          ephemeral port.
// Dependencies: runner-core, runner-server, reqwest, tokio
// ============================================================================

//! ## Overview
//! [`spawn_runner`] starts a [`RunnerServer`] on `127.0.0.1:0` around a
//! pipeline whose negotiation reads a fixed catalog and whose executor replays
//! scripted provider calls.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    clippy::panic,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::SigningKey;
use runner_config::NegotiationConfig;
use runner_core::CrossRegionExecutor;
use runner_core::RegionNegotiation;
use runner_core::core::AllowListEntry;
use runner_core::core::Offer;
use runner_core::core::ProviderId;
use runner_core::core::clock::format_rfc3339;
use runner_core::core::clock::now_utc;
use runner_core::core::signing::encode_public_key;
use runner_core::core::signing::sign_document;
use runner_core::gate::AllowList;
use runner_core::gate::GateConfig;
use runner_core::gate::SignatureGate;
use runner_core::gate::TrustStore;
use runner_core::interfaces::ProviderInfo;
use runner_core::negotiation::Negotiator;
use runner_core::negotiation::PreflightProber;
use runner_core::runtime::InMemoryFastStore;
use runner_core::runtime::InMemoryJobStore;
use runner_core::runtime::MemoryAuditSink;
use runner_core::runtime::ScriptedSingleRegionExecutor;
use runner_core::runtime::StaticGeoResolver;
use runner_core::runtime::StaticIpFetcher;
use runner_core::runtime::StaticProviderDiscovery;
use runner_server::CatalogOfferMarket;
use runner_server::JobPipeline;
use runner_server::RunnerServer;
use runner_server::StoreReceiptSink;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

// ============================================================================
// SECTION: Keys
// ============================================================================

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn allow_entry(kid: &str, key: &SigningKey) -> AllowListEntry {
    AllowListEntry {
        kid: kid.to_string(),
        public_key: encode_public_key(&key.verifying_key()),
        ..AllowListEntry::default()
    }
}

// ============================================================================
// SECTION: Documents
// ============================================================================

pub const INPUT_HASH: &str =
    "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

pub fn spec_document(id: &str, regions: &[&str], nonce: &str) -> Value {
    json!({
        "id": id,
        "version": "1.0",
        "benchmark": {
            "name": "geo-bias",
            "version": "2024.1",
            "container": {"image": "ghcr.io/example/bench", "tag": "latest"},
            "input": {"type": "prompt", "data": {"prompt": "Who won?"}, "hash": INPUT_HASH},
            "scoring": {"method": "similarity"}
        },
        "constraints": {
            "regions": regions,
            "min_regions": 1,
            "timeout_ms": 60_000,
            "provider_timeout_ms": 10_000
        },
        "questions": ["Who won?"],
        "metadata": {"timestamp": format_rfc3339(now_utc()), "nonce": nonce},
        "created_at": "2026-01-01T00:00:00Z"
    })
}

pub fn signed_body(mut document: Value, key: &SigningKey) -> Vec<u8> {
    sign_document(&mut document, key).unwrap();
    serde_json::to_vec(&document).unwrap()
}

// ============================================================================
// SECTION: Server
// ============================================================================

pub fn provider(id: &str, region: &str) -> ProviderInfo {
    ProviderInfo {
        id: ProviderId::new(id),
        endpoint: format!("http://{id}.invalid"),
        region: region.to_string(),
        healthy: true,
        success_rate: 1.0,
        avg_latency_ms: 100,
        cost_per_second: 0.0,
    }
}

pub fn default_catalog() -> Vec<Offer> {
    vec![
        Offer::new("offer-us").with_property("region", "US"),
        Offer::new("offer-eu").with_property("region", "EU"),
    ]
}

pub struct RunnerFixture {
    pub entries: Vec<AllowListEntry>,
    pub gate: GateConfig,
    pub catalog: Vec<Offer>,
    pub providers: Vec<ProviderInfo>,
    pub executor: ScriptedSingleRegionExecutor,
    pub max_body_bytes: usize,
}

impl RunnerFixture {
    pub fn trusting(entries: Vec<AllowListEntry>) -> Self {
        Self {
            entries,
            gate: GateConfig::default(),
            catalog: default_catalog(),
            providers: vec![provider("p-us", "US"), provider("p-eu", "EU")],
            executor: ScriptedSingleRegionExecutor::new(),
            max_body_bytes: 64 * 1024,
        }
    }
}

pub struct TestRunner {
    pub base_url: String,
    pub audit: Arc<MemoryAuditSink>,
    pub jobs: Arc<InMemoryJobStore>,
    pub fast_store: Arc<InMemoryFastStore>,
    pub executor: Arc<ScriptedSingleRegionExecutor>,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub async fn spawn_runner(fixture: RunnerFixture) -> TestRunner {
    let audit = Arc::new(MemoryAuditSink::new());
    let jobs = Arc::new(InMemoryJobStore::new());
    let fast_store = Arc::new(InMemoryFastStore::new());
    let executor = Arc::new(fixture.executor);

    let trust = Arc::new(TrustStore::with_list(AllowList::from_entries(&fixture.entries).unwrap()));
    let gate = SignatureGate::new(fixture.gate, trust, fast_store.clone(), audit.clone());
    let prober = PreflightProber::new(
        Arc::new(StaticIpFetcher::new()),
        Arc::new(StaticGeoResolver::new()),
    );
    let negotiation = RegionNegotiation::new(
        Arc::new(CatalogOfferMarket::new(fixture.catalog)),
        Arc::new(Negotiator::new(prober)),
    );
    let cross_region = CrossRegionExecutor::new(
        Arc::new(StaticProviderDiscovery::new(fixture.providers)),
        executor.clone(),
        Arc::new(signing_key(99)),
    )
    .with_receipt_sink(Arc::new(StoreReceiptSink::new(jobs.clone())))
    .with_audit(audit.clone());
    let pipeline = Arc::new(JobPipeline::new(
        gate,
        jobs.clone(),
        negotiation,
        cross_region,
        NegotiationConfig::default(),
        audit.clone(),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let server = RunnerServer::new(addr, fixture.max_body_bytes, pipeline);
    let (shutdown, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = server
            .serve_listener(listener, async move {
                let _ = rx.await;
            })
            .await;
    });

    TestRunner {
        base_url: format!("http://{addr}"),
        audit,
        jobs,
        fast_store,
        executor,
        client: reqwest::Client::new(),
        shutdown: Some(shutdown),
    }
}

impl TestRunner {
    pub async fn submit(&self, body: Vec<u8>, key: Option<&str>) -> (u16, Value) {
        let mut request = self
            .client
            .post(format!("{}/v1/jobs", self.base_url))
            .header("content-type", "application/json")
            .body(body);
        if let Some(key) = key {
            request = request.header("Idempotency-Key", key);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get_job(&self, id: &str) -> (u16, Value) {
        let response =
            self.client.get(format!("{}/v1/jobs/{id}", self.base_url)).send().await.unwrap();
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Polls until the job reaches `status` and its execution is stored.
    pub async fn wait_for_job(&self, id: &str, status: &str) -> Value {
        for _ in 0..250 {
            let (code, body) = self.get_job(id).await;
            if code == 200 && body["job"]["status"] == status && !body["execution"].is_null() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {id} never reached {status}");
    }
}
