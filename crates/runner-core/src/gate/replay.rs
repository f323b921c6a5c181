// crates/runner-core/src/gate/replay.rs
// ============================================================================
// Module: Replay Guard
// Description: Timestamp freshness checks and single-use nonce recording.
// Purpose: Refuse stale, future-dated, and replayed submissions.
// Dependencies: time, crate::interfaces
// ============================================================================

//! ## Overview
//! A submission's `metadata.timestamp` must fall inside
//! `[now - max_age, now + max_skew]`. Its `metadata.nonce` is recorded under
//! `nonce:{kid}:{nonce}` with set-if-absent semantics. The TTL runs until the
//! timestamp itself ages out (`timestamp + max_age - now`, at least one
//! second), so a future-dated spec keeps its nonce for as long as a replay
//! could still pass the timestamp check. An unreachable store refuses the
//! submission.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;

use crate::core::clock::parse_rfc3339;
use crate::interfaces::FastStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum timestamp age.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);
/// Default maximum clock skew into the future.
pub const DEFAULT_MAX_SKEW: Duration = Duration::from_secs(5 * 60);
/// Shortest nonce TTL.
pub const MIN_NONCE_TTL: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Replay window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Oldest accepted timestamp age.
    pub max_age: Duration,
    /// Furthest accepted future skew.
    pub max_skew: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            max_skew: DEFAULT_MAX_SKEW,
        }
    }
}

/// Timestamp window violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Timestamp is older than `max_age`.
    #[error("timestamp is too old")]
    TooOld,
    /// Timestamp is further ahead than `max_skew`.
    #[error("timestamp is too far in the future")]
    TooFarInFuture,
    /// Timestamp is not RFC 3339.
    #[error("timestamp is not rfc3339")]
    FormatInvalid,
}

impl TimestampError {
    /// Returns the stable reason label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TooOld => "too_old",
            Self::TooFarInFuture => "too_far_in_future",
            Self::FormatInvalid => "format_invalid",
        }
    }
}

/// Nonce recording failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// Nonce was already recorded for this signer.
    #[error("nonce already used")]
    Replayed,
    /// Store could not record the nonce.
    #[error("replay store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: Timestamp Window
// ============================================================================

/// Checks `raw` against the replay window at `now`.
///
/// # Errors
///
/// Returns [`TimestampError`] when the value is unparsable or outside the
/// window.
pub fn check_timestamp(
    raw: &str,
    now: OffsetDateTime,
    config: &ReplayConfig,
) -> Result<OffsetDateTime, TimestampError> {
    let timestamp = parse_rfc3339(raw).map_err(|_| TimestampError::FormatInvalid)?;
    if timestamp < now - config.max_age {
        return Err(TimestampError::TooOld);
    }
    if timestamp > now + config.max_skew {
        return Err(TimestampError::TooFarInFuture);
    }
    Ok(timestamp)
}

// ============================================================================
// SECTION: Replay Guard
// ============================================================================

/// Records nonces in the fast store.
#[derive(Clone)]
pub struct ReplayGuard {
    /// Backing store.
    store: Arc<dyn FastStore>,
    /// Window settings.
    config: ReplayConfig,
}

impl ReplayGuard {
    /// Creates a guard over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn FastStore>, config: ReplayConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Returns the window settings.
    #[must_use]
    pub const fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Returns how long a nonce stamped `timestamp` must be held at `now`.
    #[must_use]
    pub fn nonce_ttl(&self, timestamp: OffsetDateTime, now: OffsetDateTime) -> Duration {
        let remaining = timestamp + self.config.max_age - now;
        Duration::try_from(remaining).unwrap_or(Duration::ZERO).max(MIN_NONCE_TTL)
    }

    /// Records a nonce for `kid` stamped `timestamp`, received at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Replayed`] when the nonce was seen inside the
    /// window and [`ReplayError::Unavailable`] when the store fails.
    pub async fn record_nonce(
        &self,
        kid: &str,
        nonce: &str,
        timestamp: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<(), ReplayError> {
        let key = nonce_key(kid, nonce);
        let stored = self
            .store
            .set_if_absent(&key, self.nonce_ttl(timestamp, now))
            .await
            .map_err(|err| ReplayError::Unavailable(err.to_string()))?;
        if stored { Ok(()) } else { Err(ReplayError::Replayed) }
    }
}

/// Returns the fast-store key for a signer nonce.
#[must_use]
pub fn nonce_key(kid: &str, nonce: &str) -> String {
    format!("nonce:{kid}:{nonce}")
}
