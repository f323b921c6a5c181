// crates/runner-core/src/negotiation/telemetry.rs
// ============================================================================
// Module: Negotiation Telemetry
// Description: Lock-free counters for offer classification and probes.
// Purpose: Expose negotiation behavior without a metrics backend dependency.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Counters are shared by every region task of a negotiator and read as a
//! point-in-time [`TelemetrySnapshot`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Terminal negotiation outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationOutcome {
    /// Declared region matched during the strict phase.
    StrictMatch,
    /// Probe verified the region during the relax phase.
    ProbeVerified,
    /// Neither phase acquired the region.
    NoMatch,
}

impl NegotiationOutcome {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrictMatch => "strict_match",
            Self::ProbeVerified => "probe_verified",
            Self::NoMatch => "no_match",
        }
    }
}

// ============================================================================
// SECTION: Counters
// ============================================================================

/// Negotiation counters.
#[derive(Debug, Default)]
pub struct NegotiationTelemetry {
    /// Offers read from any source.
    offers_seen: AtomicU64,
    /// Offers with a declared match.
    strict_matches: AtomicU64,
    /// Offers that required a probe.
    offers_needing_probe: AtomicU64,
    /// Probes whose bucket matched the target.
    probes_passed: AtomicU64,
    /// Probes that errored or mismatched.
    probes_failed: AtomicU64,
    /// Outcomes labelled `strict_match`.
    outcome_strict_match: AtomicU64,
    /// Outcomes labelled `probe_verified`.
    outcome_probe_verified: AtomicU64,
    /// Outcomes labelled `no_match`.
    outcome_no_match: AtomicU64,
}

/// Point-in-time counter values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    /// Offers read from any source.
    pub offers_seen: u64,
    /// Offers with a declared match.
    pub strict_matches: u64,
    /// Offers that required a probe.
    pub offers_needing_probe: u64,
    /// Probes whose bucket matched the target.
    pub probes_passed: u64,
    /// Probes that errored or mismatched.
    pub probes_failed: u64,
    /// Outcomes labelled `strict_match`.
    pub outcome_strict_match: u64,
    /// Outcomes labelled `probe_verified`.
    pub outcome_probe_verified: u64,
    /// Outcomes labelled `no_match`.
    pub outcome_no_match: u64,
}

impl NegotiationTelemetry {
    /// Counts an offer read.
    pub fn offer_seen(&self) {
        self.offers_seen.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a declared match.
    pub fn strict_match(&self) {
        self.strict_matches.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an offer routed to the prober.
    pub fn needs_probe(&self) {
        self.offers_needing_probe.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a passing probe.
    pub fn probe_passed(&self) {
        self.probes_passed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a failed or mismatched probe.
    pub fn probe_failed(&self) {
        self.probes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a terminal outcome.
    pub fn outcome(&self, outcome: NegotiationOutcome) {
        let counter = match outcome {
            NegotiationOutcome::StrictMatch => &self.outcome_strict_match,
            NegotiationOutcome::ProbeVerified => &self.outcome_probe_verified,
            NegotiationOutcome::NoMatch => &self.outcome_no_match,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns current values.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            offers_seen: self.offers_seen.load(Ordering::Relaxed),
            strict_matches: self.strict_matches.load(Ordering::Relaxed),
            offers_needing_probe: self.offers_needing_probe.load(Ordering::Relaxed),
            probes_passed: self.probes_passed.load(Ordering::Relaxed),
            probes_failed: self.probes_failed.load(Ordering::Relaxed),
            outcome_strict_match: self.outcome_strict_match.load(Ordering::Relaxed),
            outcome_probe_verified: self.outcome_probe_verified.load(Ordering::Relaxed),
            outcome_no_match: self.outcome_no_match.load(Ordering::Relaxed),
        }
    }
}
