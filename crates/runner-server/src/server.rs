// crates/runner-server/src/server.rs
// ============================================================================
// Module: Runner Server
// Description: axum submission service and component wiring.
// Purpose: Serve the job API over HTTP and assemble the pipeline from config.
// Dependencies: axum, runner-config, runner-core, runner-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! Routes:
//! - `POST /v1/jobs` admits a signed job spec.
//! - `GET /v1/jobs/{id}` returns the job record, latest execution, and receipts.
//! - `GET /health` reports liveness.
//!
//! [`RunnerServer::from_config`] builds every collaborator from
//! [`RunnerConfig`]; [`RunnerServer::new`] accepts a prebuilt pipeline.
//! Invariants:
//! - Startup fails when trust enforcement is on and the allow-list cannot be
//!   loaded.
//! - Request bodies above `server.max_body_bytes` are rejected with 413.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use runner_config::RunnerConfig;
use runner_config::StoreBackend;
use runner_core::CrossRegionExecutor;
use runner_core::JobSpecId;
use runner_core::RegionNegotiation;
use runner_core::SignatureGate;
use runner_core::TrustStore;
use runner_core::core::clock::now_utc;
use runner_core::gate::RejectionClass;
use runner_core::gate::SubmissionContext;
use runner_core::interfaces::AllowListSource;
use runner_core::interfaces::FastStore;
use runner_core::interfaces::JobStore;
use runner_core::negotiation::Negotiator;
use runner_core::negotiation::PreflightProber;
use runner_core::runtime::InMemoryFastStore;
use runner_core::runtime::InMemoryJobStore;
use runner_core::runtime::StaticProviderDiscovery;
use runner_store_sqlite::SqliteRunnerStore;
use runner_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::audit::build_audit_sink;
use crate::http::HttpGeoResolver;
use crate::http::HttpIpFetcher;
use crate::http::HttpSingleRegionExecutor;
use crate::http::InferenceSettings;
use crate::keys::receipt_signing_key;
use crate::pipeline::JobPipeline;
use crate::pipeline::SubmitError;
use crate::pipeline::SubmitOutcome;
use crate::sources::CatalogOfferMarket;
use crate::sources::FileAllowListSource;
use crate::sources::StoreReceiptSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the client idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Interval between expired fast-store key purges.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server startup and transport errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration is unusable.
    #[error("config error: {0}")]
    Config(String),
    /// A component failed to initialize.
    #[error("init error: {0}")]
    Init(String),
    /// The listener failed.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Shared handler state.
struct ServerState {
    /// Job pipeline.
    pipeline: Arc<JobPipeline>,
}

/// HTTP submission service.
pub struct RunnerServer {
    /// Listen address.
    bind: SocketAddr,
    /// Request body cap.
    max_body_bytes: usize,
    /// Job pipeline.
    pipeline: Arc<JobPipeline>,
    /// Reloader and purge tasks stopped with the server.
    background: Vec<JoinHandle<()>>,
}

impl RunnerServer {
    /// Creates a server around a prebuilt pipeline.
    #[must_use]
    pub const fn new(bind: SocketAddr, max_body_bytes: usize, pipeline: Arc<JobPipeline>) -> Self {
        Self {
            bind,
            max_body_bytes,
            pipeline,
            background: Vec::new(),
        }
    }

    /// Validates `config` and assembles every collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when validation fails, a store cannot be
    /// opened, or the allow-list cannot be loaded.
    pub async fn from_config(config: RunnerConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let bind = config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let audit = build_audit_sink(&config.audit)?;
        let mut background = Vec::new();

        let jobs: Arc<dyn JobStore>;
        let fast_store: Arc<dyn FastStore>;
        match config.store.backend {
            StoreBackend::Memory => {
                jobs = Arc::new(InMemoryJobStore::new());
                fast_store = Arc::new(InMemoryFastStore::new());
            }
            StoreBackend::Sqlite => {
                let store_config = SqliteStoreConfig::new(config.store.path.clone())
                    .with_busy_timeout_ms(config.store.busy_timeout_ms);
                let store = SqliteRunnerStore::open(&store_config)
                    .map_err(|err| ServerError::Init(format!("sqlite store: {err}")))?;
                background.push(spawn_purger(store.clone()));
                jobs = Arc::new(store.clone());
                fast_store = Arc::new(store);
            }
        }

        let trust = Arc::new(TrustStore::new());
        if config.trust.enforce {
            let path = config.trust.allow_list_path.clone().ok_or_else(|| {
                ServerError::Config("trust.enforce requires trust.allow_list_path".to_string())
            })?;
            let source: Arc<dyn AllowListSource> = Arc::new(FileAllowListSource::new(path));
            trust
                .reload(source.as_ref(), audit.as_ref())
                .await
                .map_err(|err| ServerError::Init(format!("allow-list load failed: {err}")))?;
            if let Some(interval) = config.trust.reload_interval() {
                background.push(Arc::clone(&trust).spawn_reloader(
                    source,
                    Arc::clone(&audit),
                    interval,
                ));
            }
        }
        let gate =
            SignatureGate::new(config.gate_config(), trust, Arc::clone(&fast_store), Arc::clone(&audit));

        let ip_fetcher = HttpIpFetcher::new(&config.geo.ip_service_url, config.geo.timeout())?;
        let geo = HttpGeoResolver::new(&config.geo.geo_service_url, config.geo.timeout())?;
        let negotiator = Negotiator::new(PreflightProber::new(Arc::new(ip_fetcher), Arc::new(geo)));
        let market = CatalogOfferMarket::new(config.offers.offers());
        let negotiation = RegionNegotiation::new(Arc::new(market), Arc::new(negotiator));

        let single = HttpSingleRegionExecutor::new(
            config.providers.request_timeout(),
            InferenceSettings {
                temperature: config.providers.temperature,
                max_tokens: config.providers.max_tokens,
            },
        )?;
        let discovery = StaticProviderDiscovery::new(config.providers.provider_infos());
        let signing_key = receipt_signing_key(&config.receipts)?;
        let mut executor =
            CrossRegionExecutor::new(Arc::new(discovery), Arc::new(single), Arc::new(signing_key))
                .with_retry(config.execution.retry_policy())
                .with_audit(Arc::clone(&audit));
        if config.receipts.persist {
            executor = executor.with_receipt_sink(Arc::new(StoreReceiptSink::new(Arc::clone(&jobs))));
        }

        let pipeline = Arc::new(JobPipeline::new(
            gate,
            jobs,
            negotiation,
            executor,
            config.negotiation.clone(),
            audit,
        ));
        Ok(Self {
            bind,
            max_body_bytes: config.server.max_body_bytes,
            pipeline,
            background,
        })
    }

    /// Returns the configured listen address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = Arc::new(ServerState {
            pipeline: Arc::clone(&self.pipeline),
        });
        Router::new()
            .route("/health", get(handle_health))
            .route("/v1/jobs", post(handle_submit))
            .route("/v1/jobs/{id}", get(handle_get_job))
            .layer(DefaultBodyLimit::max(self.max_body_bytes))
            .with_state(state)
    }

    /// Binds the configured address and serves until the process stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|err| ServerError::Transport(format!("bind {}: {err}", self.bind)))?;
        self.serve_listener(listener, std::future::pending()).await
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when serving fails.
    pub async fn serve_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|err| ServerError::Transport(err.to_string()));
        for task in &self.background {
            task.abort();
        }
        result
    }
}

/// Periodically drops expired nonce and counter keys.
fn spawn_purger(store: SqliteRunnerStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let _ = store.purge_expired().await;
        }
    })
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness probe.
async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Admits a job spec.
async fn handle_submit(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let key = match headers.get(IDEMPOTENCY_KEY_HEADER).map(|value| value.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid idempotency key: expected visible ascii",
                "invalid_idempotency_key",
            );
        }
    };
    let context = SubmissionContext {
        peer_ip: Some(peer.ip()),
        received_at: now_utc(),
    };
    match state.pipeline.submit(&body, key, &context).await {
        Ok(SubmitOutcome::Enqueued(id)) => (
            StatusCode::ACCEPTED,
            Json(json!({"id": id.as_str(), "status": "enqueued"})),
        )
            .into_response(),
        Ok(SubmitOutcome::Idempotent(id)) => {
            (StatusCode::OK, Json(json!({"id": id.as_str(), "idempotent": true}))).into_response()
        }
        Err(err) => error_response(submit_status(&err), &err.to_string(), &err.error_code()),
    }
}

/// Returns a job record with its latest execution and receipts.
async fn handle_get_job(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Response {
    let id = JobSpecId::new(id);
    let jobs = state.pipeline.jobs();
    let job = match jobs.load_job(&id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "job not found", "not_found");
        }
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &err.to_string(),
                "store_error",
            );
        }
    };
    let execution = match jobs.load_execution(&id).await {
        Ok(execution) => execution,
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &err.to_string(),
                "store_error",
            );
        }
    };
    let receipts = match jobs.list_receipts(&id).await {
        Ok(receipts) => receipts,
        Err(err) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &err.to_string(),
                "store_error",
            );
        }
    };
    (StatusCode::OK, Json(json!({"job": job, "execution": execution, "receipts": receipts})))
        .into_response()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a submission failure to an HTTP status.
const fn submit_status(err: &SubmitError) -> StatusCode {
    match err {
        SubmitError::Rejected(rejection) => match rejection.class() {
            RejectionClass::Validation => StatusCode::BAD_REQUEST,
            RejectionClass::Unauthenticated => StatusCode::UNAUTHORIZED,
            RejectionClass::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RejectionClass::ProtectionUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        },
        SubmitError::InvalidIdempotencyKey(_) => StatusCode::BAD_REQUEST,
        SubmitError::JobExists(_) => StatusCode::CONFLICT,
        SubmitError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the JSON error body.
fn error_response(status: StatusCode, message: &str, code: &str) -> Response {
    (status, Json(json!({"error": message, "error_code": code}))).into_response()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use runner_core::GateRejection;
    use runner_core::gate::Protection;
    use runner_core::interfaces::StoreError;

    use super::SubmitError;
    use super::submit_status;

    #[test]
    fn rejection_classes_map_to_statuses() {
        let cases = [
            (SubmitError::Rejected(GateRejection::MissingField("signature")), StatusCode::BAD_REQUEST),
            (SubmitError::Rejected(GateRejection::SignatureMismatch), StatusCode::UNAUTHORIZED),
            (SubmitError::Rejected(GateRejection::ReplayDetected), StatusCode::UNAUTHORIZED),
            (SubmitError::Rejected(GateRejection::RateLimited), StatusCode::TOO_MANY_REQUESTS),
            (
                SubmitError::Rejected(GateRejection::ProtectionUnavailable {
                    protection: Protection::Replay,
                    message: "offline".to_string(),
                }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (SubmitError::JobExists("job-1".to_string()), StatusCode::CONFLICT),
            (
                SubmitError::Store(StoreError::Io("disk".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(submit_status(&err), expected, "{err}");
        }
    }
}
