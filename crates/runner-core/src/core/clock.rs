// crates/runner-core/src/core/clock.rs
// ============================================================================
// Module: Runner Clock Helpers
// Description: RFC 3339 parsing/formatting and unix-millisecond conversions.
// Purpose: Keep every wall-clock conversion in one place.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Wall-clock values cross the API boundary as RFC 3339 strings and are
//! stored as unix milliseconds. Monotonic deadlines use `tokio::time` and
//! never pass through this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current UTC time.
#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parses an RFC 3339 timestamp.
///
/// # Errors
///
/// Returns [`time::error::Parse`] when the value is not RFC 3339.
pub fn parse_rfc3339(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(value.trim(), &Rfc3339)
}

/// Formats a timestamp as RFC 3339.
///
/// Falls back to the unix-seconds rendering for dates RFC 3339 cannot
/// express.
#[must_use]
pub fn format_rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.unix_timestamp().to_string())
}

/// Returns the unix epoch milliseconds for a timestamp.
#[must_use]
pub fn unix_millis(value: OffsetDateTime) -> i128 {
    value.unix_timestamp_nanos() / 1_000_000
}

/// Returns the elapsed wall-clock time between two timestamps, saturating at zero.
#[must_use]
pub fn elapsed_between(start: OffsetDateTime, end: OffsetDateTime) -> Duration {
    let delta = end - start;
    Duration::try_from(delta).unwrap_or_default()
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[must_use]
pub fn duration_millis(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}
