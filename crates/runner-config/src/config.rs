// crates/runner-config/src/config.rs
// ============================================================================
// Module: Runner Configuration
// Description: `runner.toml` model, loader, and fail-closed validation.
// Purpose: Give every runner component one validated source of settings.
// Dependencies: runner-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Every section is optional and falls back to documented defaults. Loading
//! enforces path and size limits, requires UTF-8, rejects unknown keys, and
//! runs [`RunnerConfig::validate`] before returning.
//!
//! Section helpers translate settings into `runner-core` types so the
//! server never re-interprets raw numbers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use runner_core::core::Offer;
use runner_core::core::ProviderId;
use runner_core::core::RegionRequest;
use runner_core::execution::RetryPolicy;
use runner_core::gate;
use runner_core::interfaces::ProviderInfo;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default config filename.
const DEFAULT_CONFIG_NAME: &str = "runner.toml";
/// Environment variable override for the config path.
const CONFIG_ENV_VAR: &str = "RUNNER_CONFIG";
/// Maximum allowed config file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length for config-related paths.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Largest accepted request body limit.
const MAX_BODY_BYTES_LIMIT: usize = 8 * 1024 * 1024;
/// Longest accepted replay window or reload interval, in seconds.
const MAX_WINDOW_SECS: u64 = 24 * 60 * 60;
/// Largest accepted provider try budget.
const MAX_TRIES_LIMIT: u32 = 10;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("config io error: {0}")]
    Io(String),
    /// Parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration.
    #[error("config invalid: {0}")]
    Invalid(String),
}

/// Builds an [`ConfigError::Invalid`].
fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

// ============================================================================
// SECTION: Root
// ============================================================================

/// Runner configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// HTTP submission surface.
    pub server: ServerConfig,
    /// Audit sink selection.
    pub audit: AuditConfig,
    /// Allow-list trust settings.
    pub trust: TrustConfig,
    /// Timestamp window for replay protection.
    pub replay: ReplayConfig,
    /// Failure rate limits.
    pub rate_limit: RateLimitConfig,
    /// Region negotiation windows and demand defaults.
    pub negotiation: NegotiationConfig,
    /// Provider retry policy.
    pub execution: ExecutionConfig,
    /// Job and fast store backend.
    pub store: StoreConfig,
    /// Receipt signing.
    pub receipts: ReceiptsConfig,
    /// Inference provider registry.
    pub providers: ProvidersConfig,
    /// Capacity offer catalog.
    pub offers: OffersConfig,
    /// Preflight probe services.
    pub geo: GeoConfig,
}

impl RunnerConfig {
    /// Loads configuration from `path`, `RUNNER_CONFIG`, or `runner.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path("config", &resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(invalid("config file exceeds size limit"));
        }
        let content =
            std::str::from_utf8(&bytes).map_err(|_| invalid("config file must be utf-8"))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.audit.validate()?;
        self.trust.validate()?;
        self.replay.validate()?;
        self.rate_limit.validate()?;
        self.negotiation.validate()?;
        self.execution.validate()?;
        self.store.validate()?;
        self.receipts.validate()?;
        self.providers.validate()?;
        self.offers.validate()?;
        self.geo.validate()
    }

    /// Returns the signature gate settings.
    #[must_use]
    pub const fn gate_config(&self) -> gate::GateConfig {
        gate::GateConfig {
            enforce_trust: self.trust.enforce,
            replay: self.replay.to_core(),
            rate_limit: self.rate_limit.to_core(),
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP submission surface settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8090".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Returns the parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.trim().parse().map_err(|_| invalid("server.bind must be a socket address"))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(invalid("server.max_body_bytes must be between 1 and 8388608"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    #[serde(rename = "none")]
    Disabled,
}

/// Audit settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink kind.
    pub sink: AuditSinkKind,
    /// Log file for the `file` sink.
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path("audit.path", path)?;
        }
        if self.sink == AuditSinkKind::File && self.path.is_none() {
            return Err(invalid("audit.sink = \"file\" requires audit.path"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Trust
// ============================================================================

/// Allow-list trust settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustConfig {
    /// Enforce allow-list trust, timestamps, and nonces.
    pub enforce: bool,
    /// JSON allow-list file.
    pub allow_list_path: Option<PathBuf>,
    /// Reload interval in seconds; `0` disables reloading.
    pub reload_interval_secs: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            allow_list_path: None,
            reload_interval_secs: 60,
        }
    }
}

impl TrustConfig {
    /// Returns the reload interval, if reloading is enabled.
    #[must_use]
    pub const fn reload_interval(&self) -> Option<Duration> {
        if self.reload_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.reload_interval_secs))
        }
    }

    /// Validates trust settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.allow_list_path {
            validate_path("trust.allow_list_path", path)?;
        }
        if self.enforce && self.allow_list_path.is_none() {
            return Err(invalid("trust.enforce requires trust.allow_list_path"));
        }
        if self.reload_interval_secs > MAX_WINDOW_SECS {
            return Err(invalid("trust.reload_interval_secs exceeds 86400"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// Timestamp window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplayConfig {
    /// Oldest accepted timestamp age in seconds.
    pub max_age_secs: u64,
    /// Furthest accepted future skew in seconds.
    pub max_skew_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 600,
            max_skew_secs: 300,
        }
    }
}

impl ReplayConfig {
    /// Converts to the gate's replay settings.
    #[must_use]
    pub const fn to_core(&self) -> gate::ReplayConfig {
        gate::ReplayConfig {
            max_age: Duration::from_secs(self.max_age_secs),
            max_skew: Duration::from_secs(self.max_skew_secs),
        }
    }

    /// Validates the window.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age_secs == 0 || self.max_age_secs > MAX_WINDOW_SECS {
            return Err(invalid("replay.max_age_secs must be between 1 and 86400"));
        }
        if self.max_skew_secs == 0 || self.max_skew_secs > MAX_WINDOW_SECS {
            return Err(invalid("replay.max_skew_secs must be between 1 and 86400"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Rate Limit
// ============================================================================

/// Failure rate-limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether limiting is enabled.
    pub enabled: bool,
    /// Failures allowed per client IP within the window.
    pub ip_limit: u64,
    /// Failures allowed per signer within the window.
    pub kid_limit: u64,
    /// Counter window in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_limit: gate::rate_limit::DEFAULT_IP_LIMIT,
            kid_limit: gate::rate_limit::DEFAULT_KID_LIMIT,
            window_secs: gate::rate_limit::DEFAULT_WINDOW.as_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Converts to the gate's rate-limit settings.
    #[must_use]
    pub const fn to_core(&self) -> gate::RateLimitConfig {
        gate::RateLimitConfig {
            enabled: self.enabled,
            ip_limit: self.ip_limit,
            kid_limit: self.kid_limit,
            window: Duration::from_secs(self.window_secs),
        }
    }

    /// Validates limits when enabled.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.ip_limit == 0 || self.kid_limit == 0 {
            return Err(invalid("rate_limit limits must be greater than zero"));
        }
        if self.window_secs == 0 || self.window_secs > MAX_WINDOW_SECS {
            return Err(invalid("rate_limit.window_secs must be between 1 and 86400"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Negotiation
// ============================================================================

/// Negotiation windows and demand defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NegotiationConfig {
    /// Strict phase window in milliseconds.
    pub strict_timeout_ms: u64,
    /// Relax phase window in milliseconds.
    pub relax_timeout_ms: u64,
    /// Minimum vCPUs per demand.
    pub min_vcpu: u32,
    /// Minimum memory per demand in GiB.
    pub min_mem_gib: u32,
    /// Require outbound network access.
    pub network_egress: bool,
    /// Price cap per minute.
    pub price_per_minute_max: Option<f64>,
    /// Total price cap.
    pub total_price_cap: Option<f64>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        let request = RegionRequest::new("");
        Self {
            strict_timeout_ms: duration_ms(request.strict_timeout),
            relax_timeout_ms: duration_ms(request.relax_timeout),
            min_vcpu: request.min_vcpu,
            min_mem_gib: request.min_mem_gib,
            network_egress: request.network_egress,
            price_per_minute_max: None,
            total_price_cap: None,
        }
    }
}

impl NegotiationConfig {
    /// Builds the request for one target region.
    #[must_use]
    pub fn request(&self, region: &str) -> RegionRequest {
        let mut request = RegionRequest::new(region).with_windows(
            Duration::from_millis(self.strict_timeout_ms),
            Duration::from_millis(self.relax_timeout_ms),
        );
        request.min_vcpu = self.min_vcpu;
        request.min_mem_gib = self.min_mem_gib;
        request.network_egress = self.network_egress;
        request.price_per_minute_max = self.price_per_minute_max;
        request.total_price_cap = self.total_price_cap;
        request
    }

    /// Validates windows and demand limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.strict_timeout_ms == 0 || self.relax_timeout_ms == 0 {
            return Err(invalid("negotiation timeouts must be greater than zero"));
        }
        if self.min_vcpu == 0 || self.min_mem_gib == 0 {
            return Err(invalid("negotiation resource minimums must be greater than zero"));
        }
        for cap in [self.price_per_minute_max, self.total_price_cap].into_iter().flatten() {
            if !cap.is_finite() || cap < 0.0 {
                return Err(invalid("negotiation price caps must be non-negative"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Provider retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Provider calls per region, including the first.
    pub max_tries: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff ceiling in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_tries: policy.max_tries,
            initial_backoff_ms: duration_ms(policy.initial_backoff),
            max_backoff_ms: duration_ms(policy.max_backoff),
        }
    }
}

impl ExecutionConfig {
    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_tries: self.max_tries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Validates the retry policy.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tries == 0 || self.max_tries > MAX_TRIES_LIMIT {
            return Err(invalid("execution.max_tries must be between 1 and 10"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(invalid("execution.initial_backoff_ms exceeds max_backoff_ms"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process stores; state is lost on restart.
    Memory,
    /// SQLite database file.
    #[default]
    Sqlite,
}

/// Store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Backend kind.
    pub backend: StoreBackend,
    /// SQLite database path.
    pub path: PathBuf,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: PathBuf::from("runner.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Validates store settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StoreBackend::Sqlite {
            if self.path.as_os_str().is_empty() {
                return Err(invalid("store.path is required for the sqlite backend"));
            }
            validate_path("store.path", &self.path)?;
            if self.busy_timeout_ms == 0 {
                return Err(invalid("store.busy_timeout_ms must be greater than zero"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Receipts
// ============================================================================

/// Receipt signing settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiptsConfig {
    /// File holding the base64 Ed25519 signing key seed. An ephemeral key
    /// is generated when unset.
    pub signing_key_path: Option<PathBuf>,
    /// Persist receipts to the job store.
    pub persist: bool,
}

impl Default for ReceiptsConfig {
    fn default() -> Self {
        Self {
            signing_key_path: None,
            persist: true,
        }
    }
}

impl ReceiptsConfig {
    /// Validates receipt settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.signing_key_path {
            validate_path("receipts.signing_key_path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Providers
// ============================================================================

/// One inference provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Provider identifier.
    pub id: String,
    /// Inference endpoint URL.
    pub endpoint: String,
    /// Region label.
    pub region: String,
    /// Health flag.
    #[serde(default = "default_true")]
    pub healthy: bool,
    /// Historical success rate in `[0, 1]`.
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,
    /// Average latency in milliseconds.
    #[serde(default)]
    pub avg_latency_ms: u64,
    /// Cost per second.
    #[serde(default)]
    pub cost_per_second: f64,
}

impl ProviderEntry {
    /// Converts to the discovery record.
    #[must_use]
    pub fn provider_info(&self) -> ProviderInfo {
        ProviderInfo {
            id: ProviderId::new(self.id.trim()),
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            healthy: self.healthy,
            success_rate: self.success_rate,
            avg_latency_ms: self.avg_latency_ms,
            cost_per_second: self.cost_per_second,
        }
    }
}

/// Inference provider registry and request settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvidersConfig {
    /// HTTP request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Sampling temperature sent to providers.
    pub temperature: f64,
    /// Token limit sent to providers.
    pub max_tokens: u32,
    /// Registered providers.
    pub entries: Vec<ProviderEntry>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 120_000,
            temperature: 0.1,
            max_tokens: 500,
            entries: Vec::new(),
        }
    }
}

impl ProvidersConfig {
    /// Returns the HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns discovery records for every entry.
    #[must_use]
    pub fn provider_infos(&self) -> Vec<ProviderInfo> {
        self.entries.iter().map(ProviderEntry::provider_info).collect()
    }

    /// Validates request settings and entries.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(invalid("providers.request_timeout_ms must be greater than zero"));
        }
        if !self.temperature.is_finite() || !(0.0 ..= 2.0).contains(&self.temperature) {
            return Err(invalid("providers.temperature must be between 0 and 2"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("providers.max_tokens must be greater than zero"));
        }
        let mut ids = BTreeSet::new();
        for entry in &self.entries {
            let id = entry.id.trim();
            if id.is_empty() {
                return Err(invalid("provider id is required"));
            }
            if !ids.insert(id) {
                return Err(invalid(format!("duplicate provider id: {id}")));
            }
            validate_http_url(&format!("provider {id} endpoint"), &entry.endpoint)?;
            if entry.region.trim().is_empty() {
                return Err(invalid(format!("provider {id} region is required")));
            }
            if !entry.success_rate.is_finite() || !(0.0 ..= 1.0).contains(&entry.success_rate) {
                return Err(invalid(format!("provider {id} success_rate must be between 0 and 1")));
            }
            if !entry.cost_per_second.is_finite() || entry.cost_per_second < 0.0 {
                return Err(invalid(format!("provider {id} cost_per_second must be non-negative")));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Offers
// ============================================================================

/// One catalog offer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfferEntry {
    /// Opaque offer reference.
    pub reference: String,
    /// Offer properties (`region`, `beacon.region`, `probe.url`, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl OfferEntry {
    /// Converts to a core offer.
    #[must_use]
    pub fn offer(&self) -> Offer {
        self.properties
            .iter()
            .fold(Offer::new(self.reference.trim()), |offer, (key, value)| {
                offer.with_property(key, value)
            })
    }
}

/// Capacity offer catalog served to every demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OffersConfig {
    /// Catalog entries in arrival order.
    pub entries: Vec<OfferEntry>,
}

impl OffersConfig {
    /// Returns the catalog as core offers.
    #[must_use]
    pub fn offers(&self) -> Vec<Offer> {
        self.entries.iter().map(OfferEntry::offer).collect()
    }

    /// Validates offer references.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut references = BTreeSet::new();
        for entry in &self.entries {
            let reference = entry.reference.trim();
            if reference.is_empty() {
                return Err(invalid("offer reference is required"));
            }
            if !references.insert(reference) {
                return Err(invalid(format!("duplicate offer reference: {reference}")));
            }
            if let Some(probe) = entry.properties.get("probe.url") {
                validate_http_url(&format!("offer {reference} probe.url"), probe)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Geo
// ============================================================================

/// Preflight probe service settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeoConfig {
    /// Plain-text public IP echo service.
    pub ip_service_url: String,
    /// JSON geolocation service; the IP is appended as a path segment.
    pub geo_service_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            ip_service_url: "https://api.ipify.org".to_string(),
            geo_service_url: "https://ipapi.co".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl GeoConfig {
    /// Returns the per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validates service URLs and the timeout.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_http_url("geo.ip_service_url", &self.ip_service_url)?;
        validate_http_url("geo.geo_service_url", &self.geo_service_url)?;
        if self.timeout_ms == 0 {
            return Err(invalid("geo.timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serde default for boolean flags that start enabled.
const fn default_true() -> bool {
    true
}

/// Serde default for provider success rates.
const fn default_success_rate() -> f64 {
    1.0
}

/// Converts a duration to whole milliseconds.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Resolves the config path from explicit input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(invalid("config path exceeds max length"));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates a path's total length and component lengths.
fn validate_path(label: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid(format!("{label} path exceeds max length")));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(invalid(format!("{label} path component too long")));
        }
    }
    Ok(())
}

/// Requires an absolute `http` or `https` URL.
fn validate_http_url(label: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value.trim()).map_err(|_| invalid(format!("{label} must be a url")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(invalid(format!("{label} must use http or https"))),
    }
}
