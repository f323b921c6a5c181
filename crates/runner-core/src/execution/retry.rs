// crates/runner-core/src/execution/retry.rs
// ============================================================================
// Module: Retry Policy
// Description: Bounded exponential backoff for retryable provider failures.
// Purpose: Decide how many provider calls a region attempt may make.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`RetryPolicy`] bounds the provider calls made for one model and question
//! pair and doubles the delay between them up to a cap.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default provider calls per region attempt, including the first call.
pub const DEFAULT_MAX_TRIES: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Default backoff ceiling.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Exponential backoff policy.
///
/// # Invariants
/// - `max_tries` is at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Provider calls per attempt, including the first.
    pub max_tries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Delay ceiling.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Returns a policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_tries: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Returns the delay after the `completed_tries`-th failed call.
    ///
    /// The delay doubles per retry and is capped at `max_backoff`.
    #[must_use]
    pub fn backoff_after(&self, completed_tries: u32) -> Duration {
        let exponent = completed_tries.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1_u32 << exponent).min(self.max_backoff)
    }

    /// Returns the effective try budget.
    #[must_use]
    pub const fn tries(&self) -> u32 {
        if self.max_tries == 0 { 1 } else { self.max_tries }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
