// crates/runner-core/src/gate/rate_limit.rs
// ============================================================================
// Module: Failure Rate Limiting
// Description: Per-IP and per-signer counters of failed verifications.
// Purpose: Throttle clients that keep submitting bad signatures.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Failed signature and canonicalization checks increment two windowed
//! counters, `rate_limit:ip:{ip}` and `rate_limit:kid:{kid}`. Submissions are
//! checked against both counters before signature verification runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::interfaces::FastStore;
use crate::interfaces::FastStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default failure limit per client IP.
pub const DEFAULT_IP_LIMIT: u64 = 10;
/// Default failure limit per signer.
pub const DEFAULT_KID_LIMIT: u64 = 5;
/// Default counter window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Rate limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether limiting is enabled.
    pub enabled: bool,
    /// Failures allowed per client IP within the window.
    pub ip_limit: u64,
    /// Failures allowed per signer within the window.
    pub kid_limit: u64,
    /// Counter window.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ip_limit: DEFAULT_IP_LIMIT,
            kid_limit: DEFAULT_KID_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Rate limit check failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// A counter reached its limit.
    #[error("rate limit exceeded for {scope}")]
    Exceeded {
        /// Counter scope (`ip` or `kid`).
        scope: &'static str,
    },
    /// Counters could not be read.
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
}

/// Windowed failure counters.
#[derive(Clone)]
pub struct RateLimiter {
    /// Backing store.
    store: Arc<dyn FastStore>,
    /// Limit settings.
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Creates a limiter over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn FastStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Fails when either counter has reached its limit.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError`] when limited or when the store fails.
    pub async fn check(&self, ip: Option<&str>, kid: &str) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }
        if let Some(ip) = ip {
            let failures = self
                .store
                .counter(&ip_key(ip))
                .await
                .map_err(|err| RateLimitError::Unavailable(err.to_string()))?;
            if failures >= self.config.ip_limit {
                return Err(RateLimitError::Exceeded {
                    scope: "ip",
                });
            }
        }
        let failures = self
            .store
            .counter(&kid_key(kid))
            .await
            .map_err(|err| RateLimitError::Unavailable(err.to_string()))?;
        if failures >= self.config.kid_limit {
            return Err(RateLimitError::Exceeded {
                scope: "kid",
            });
        }
        Ok(())
    }

    /// Increments both counters after a failed verification.
    ///
    /// # Errors
    ///
    /// Returns [`FastStoreError`] when the store fails.
    pub async fn record_failure(&self, ip: Option<&str>, kid: &str) -> Result<(), FastStoreError> {
        if !self.config.enabled {
            return Ok(());
        }
        if let Some(ip) = ip {
            self.store.increment(&ip_key(ip), self.config.window).await?;
        }
        self.store.increment(&kid_key(kid), self.config.window).await?;
        Ok(())
    }
}

/// Returns the counter key for a client IP.
#[must_use]
pub fn ip_key(ip: &str) -> String {
    format!("rate_limit:ip:{ip}")
}

/// Returns the counter key for a signer.
#[must_use]
pub fn kid_key(kid: &str) -> String {
    format!("rate_limit:kid:{kid}")
}
