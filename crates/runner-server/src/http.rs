// crates/runner-server/src/http.rs
// ============================================================================
// Module: HTTP Collaborators
// Description: reqwest-backed IP fetcher, geo resolver, and provider client.
// Purpose: Connect negotiation probing and region execution to real services.
// Dependencies: reqwest, runner-core, serde, url
// ============================================================================

//! ## Overview
//! [`HttpIpFetcher`] asks an IP echo service for the egress address seen by
//! an offer, [`HttpGeoResolver`] maps that address to a country and
//! continent, and [`HttpSingleRegionExecutor`] posts one inference request
//! to a provider router.
//! Invariants:
//! - Redirects are rejected.
//! - Response bodies are capped at [`MAX_RESPONSE_BYTES`].
//! - Provider failures map to timeout, transient, or permanent so the
//!   executor retries only what can succeed on another attempt.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::redirect::Policy;
use runner_core::JobSpec;
use runner_core::core::InferenceTask;
use runner_core::core::Offer;
use runner_core::interfaces::GeoLocation;
use runner_core::interfaces::GeoResolver;
use runner_core::interfaces::IpFetcher;
use runner_core::interfaces::ProbeError;
use runner_core::interfaces::ProviderCallError;
use runner_core::interfaces::ProviderInfo;
use runner_core::interfaces::ProviderResponse;
use runner_core::interfaces::SingleRegionExecutor;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use url::Url;

use crate::server::ServerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted response body size.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Offer property naming a per-offer IP echo endpoint.
pub const PROBE_URL_PROPERTY: &str = "probe.url";

/// Path appended to a provider endpoint for inference calls.
const INFERENCE_PATH: &str = "inference";

/// Connect timeout applied to every client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a client with the shared connect timeout and no redirects.
fn build_client(timeout: Duration) -> Result<Client, ServerError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout)
        .redirect(Policy::none())
        .build()
        .map_err(|err| ServerError::Init(format!("http client build failed: {err}")))
}

/// Reads a body while enforcing [`MAX_RESPONSE_BYTES`].
async fn read_capped(response: Response) -> Result<Vec<u8>, String> {
    if let Some(length) = response.content_length()
        && length > MAX_RESPONSE_BYTES as u64
    {
        return Err(format!("response body too large: {length} bytes"));
    }
    let bytes = response.bytes().await.map_err(|err| err.to_string())?;
    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(format!("response body too large: {} bytes", bytes.len()));
    }
    Ok(bytes.to_vec())
}

/// Parses a configured base URL.
fn parse_base(label: &str, raw: &str) -> Result<Url, ServerError> {
    Url::parse(raw).map_err(|err| ServerError::Config(format!("{label} is not a url: {err}")))
}

// ============================================================================
// SECTION: IP Fetcher
// ============================================================================

/// Fetches the public IP through an echo service.
///
/// Offers may carry a `probe.url` property pointing at a provider-scoped echo
/// endpoint; otherwise the configured service is used.
#[derive(Clone)]
pub struct HttpIpFetcher {
    /// HTTP client.
    client: Client,
    /// Default echo service.
    service: Url,
}

impl HttpIpFetcher {
    /// Creates a fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the URL is invalid or the client cannot
    /// be built.
    pub fn new(service_url: &str, timeout: Duration) -> Result<Self, ServerError> {
        Ok(Self {
            client: build_client(timeout)?,
            service: parse_base("geo.ip_service_url", service_url)?,
        })
    }

    /// Returns the echo URL for an offer.
    fn target(&self, offer: &Offer) -> Result<Url, ProbeError> {
        match offer.properties.get(PROBE_URL_PROPERTY).and_then(Value::as_str) {
            Some(raw) => Url::parse(raw)
                .map_err(|err| ProbeError::IpFetch(format!("invalid probe url: {err}"))),
            None => Ok(self.service.clone()),
        }
    }
}

#[async_trait]
impl IpFetcher for HttpIpFetcher {
    async fn fetch_public_ip(&self, offer: &Offer) -> Result<String, ProbeError> {
        let url = self.target(offer)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ProbeError::IpFetch(format!("ip request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::IpFetch(format!("ip service bad status: {status}")));
        }
        let body = read_capped(response).await.map_err(ProbeError::IpFetch)?;
        let text = String::from_utf8(body)
            .map_err(|_| ProbeError::IpFetch("ip response is not utf-8".to_string()))?;
        let ip: IpAddr = text
            .trim()
            .parse()
            .map_err(|_| ProbeError::IpFetch(format!("ip service returned {:?}", text.trim())))?;
        Ok(ip.to_string())
    }
}

// ============================================================================
// SECTION: Geo Resolver
// ============================================================================

/// Geo lookup response fields.
#[derive(Debug, Deserialize)]
struct GeoLookupResponse {
    /// ISO country code.
    #[serde(default)]
    country_code: Option<String>,
    /// Continent code.
    #[serde(default)]
    continent_code: Option<String>,
    /// Service error flag.
    #[serde(default)]
    error: bool,
    /// Service error reason.
    #[serde(default)]
    reason: Option<String>,
}

/// Resolves IPs through a JSON lookup service at `{base}/{ip}/json`.
#[derive(Clone)]
pub struct HttpGeoResolver {
    /// HTTP client.
    client: Client,
    /// Service base URL.
    base: Url,
    /// Source label recorded in evidence.
    source: String,
}

impl HttpGeoResolver {
    /// Creates a resolver.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the URL is invalid or the client cannot
    /// be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServerError> {
        let base = parse_base("geo.geo_service_url", base_url)?;
        let source = base.host_str().unwrap_or("geo-service").to_string();
        Ok(Self {
            client: build_client(timeout)?,
            base,
            source,
        })
    }

    /// Builds the lookup URL for an address.
    fn lookup_url(&self, ip: IpAddr) -> Result<Url, ProbeError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ProbeError::GeoLookup("geo service url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&ip.to_string())
            .push("json");
        Ok(url)
    }
}

#[async_trait]
impl GeoResolver for HttpGeoResolver {
    async fn resolve(&self, ip: &str) -> Result<GeoLocation, ProbeError> {
        let parsed: IpAddr =
            ip.trim().parse().map_err(|_| ProbeError::GeoLookup(format!("invalid ip: {ip:?}")))?;
        let response = self
            .client
            .get(self.lookup_url(parsed)?)
            .send()
            .await
            .map_err(|err| ProbeError::GeoLookup(format!("geo request failed: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::GeoLookup(format!("geo service bad status: {status}")));
        }
        let body = read_capped(response).await.map_err(ProbeError::GeoLookup)?;
        let lookup: GeoLookupResponse = serde_json::from_slice(&body)
            .map_err(|err| ProbeError::GeoLookup(format!("geo response invalid: {err}")))?;
        if lookup.error {
            let reason = lookup.reason.unwrap_or_else(|| "unknown".to_string());
            return Err(ProbeError::GeoLookup(format!("geo service error: {reason}")));
        }
        let country = lookup
            .country_code
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ProbeError::GeoLookup("geo response missing country".to_string()))?;
        Ok(GeoLocation {
            country: country.trim().to_ascii_uppercase(),
            continent: lookup.continent_code.unwrap_or_default().trim().to_ascii_uppercase(),
            source: self.source.clone(),
        })
    }
}

// ============================================================================
// SECTION: Single-Region Executor
// ============================================================================

/// Inference request body.
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    /// Model identifier.
    model: &'a str,
    /// Prompt text.
    prompt: &'a str,
    /// Sampling temperature.
    temperature: f64,
    /// Generation cap.
    max_tokens: u32,
    /// Region the router should serve from.
    region_preference: &'a str,
}

/// Inference response fields.
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    /// Router success flag.
    #[serde(default)]
    success: bool,
    /// Generated text.
    #[serde(default)]
    response: String,
    /// Router error message.
    #[serde(default)]
    error: String,
    /// Provider that served the call.
    #[serde(default)]
    provider_used: String,
    /// Inference time in seconds.
    #[serde(default)]
    inference_time: f64,
    /// Router metadata.
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// Generation settings sent with every inference call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceSettings {
    /// Sampling temperature.
    pub temperature: f64,
    /// Generation cap.
    pub max_tokens: u32,
}

/// Posts inference calls to `{provider.endpoint}/inference`.
#[derive(Clone)]
pub struct HttpSingleRegionExecutor {
    /// HTTP client.
    client: Client,
    /// Generation settings.
    settings: InferenceSettings,
}

impl HttpSingleRegionExecutor {
    /// Creates a provider client.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Init`] when the client cannot be built.
    pub fn new(timeout: Duration, settings: InferenceSettings) -> Result<Self, ServerError> {
        Ok(Self {
            client: build_client(timeout)?,
            settings,
        })
    }
}

/// Builds the inference URL for a provider endpoint.
fn inference_url(endpoint: &str) -> Result<Url, ProviderCallError> {
    let mut url = Url::parse(endpoint)
        .map_err(|err| ProviderCallError::Permanent(format!("invalid provider endpoint: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| ProviderCallError::Permanent("provider endpoint cannot be a base".to_string()))?
        .pop_if_empty()
        .push(INFERENCE_PATH);
    Ok(url)
}

/// Maps a non-success status to a call error.
fn status_error(status: StatusCode) -> ProviderCallError {
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        ProviderCallError::Timeout(format!("provider status {status}"))
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderCallError::Transient(format!("provider status {status}"))
    } else {
        ProviderCallError::Permanent(format!("provider status {status}"))
    }
}

/// Maps a transport error to a call error.
fn transport_error(err: &reqwest::Error) -> ProviderCallError {
    if err.is_timeout() {
        ProviderCallError::Timeout(err.to_string())
    } else {
        ProviderCallError::Transient(err.to_string())
    }
}

#[async_trait]
impl SingleRegionExecutor for HttpSingleRegionExecutor {
    async fn execute(
        &self,
        spec: &JobSpec,
        task: &InferenceTask,
        provider: &ProviderInfo,
        region: &str,
    ) -> Result<ProviderResponse, ProviderCallError> {
        let prompt = spec
            .prompt_for(task)
            .ok_or_else(|| ProviderCallError::Permanent("job spec has no prompt".to_string()))?;
        let body = InferenceRequest {
            model: &task.model,
            prompt,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            region_preference: region,
        };
        let response = self
            .client
            .post(inference_url(&provider.endpoint)?)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(&err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        let bytes = read_capped(response).await.map_err(ProviderCallError::Transient)?;
        let parsed: InferenceResponse = serde_json::from_slice(&bytes).map_err(|err| {
            ProviderCallError::Permanent(format!("provider response invalid: {err}"))
        })?;
        if !parsed.success {
            let message =
                if parsed.error.is_empty() { "unsuccessful".to_string() } else { parsed.error };
            return Err(ProviderCallError::Permanent(message));
        }
        let provider_used =
            if parsed.provider_used.is_empty() { provider.id.to_string() } else { parsed.provider_used };
        Ok(ProviderResponse {
            data: json!({
                "response": parsed.response,
                "provider_used": provider_used,
                "inference_time": parsed.inference_time,
                "model": task.model,
            }),
            metadata: parsed.metadata,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
