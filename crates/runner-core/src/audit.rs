// crates/runner-core/src/audit.rs
// ============================================================================
// Module: Runner Audit Events
// Description: Structured audit payloads for the gate, trust, and job pipeline.
// Purpose: Emit redacted JSON-line audit logs through pluggable sinks.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Audit events are plain serializable structs with an `event` name and a
//! `timestamp_ms` stamp. Keys and nonces never appear raw; callers pass
//! fingerprints produced by [`crate::core::hashing::fingerprint`]. Sinks that
//! write to stderr or files live in the server crate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Gate audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEventKind {
    /// Submission passed every gate check.
    Accepted,
    /// Submission was rejected.
    Rejected,
    /// Submission was verified with the deprecated legacy canonicalization.
    LegacyCanonicalization,
}

impl GateEventKind {
    /// Returns the stable event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "gate_accepted",
            Self::Rejected => "gate_rejected",
            Self::LegacyCanonicalization => "legacy_canonicalization",
        }
    }
}

/// Job pipeline audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEventKind {
    /// Job was persisted and enqueued.
    Submitted,
    /// One region's negotiation finished.
    NegotiationFinished,
    /// Cross-region execution finished.
    ExecutionFinished,
    /// A receipt sink refused a receipt.
    ReceiptSinkFailed,
}

impl JobEventKind {
    /// Returns the stable event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "job_submitted",
            Self::NegotiationFinished => "negotiation_finished",
            Self::ExecutionFinished => "execution_finished",
            Self::ReceiptSinkFailed => "receipt_sink_failed",
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Gate audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Job spec identifier as submitted.
    pub job_id: String,
    /// Peer IP address when known.
    pub peer_ip: Option<String>,
    /// Allow-list key identifier when resolved.
    pub kid: Option<String>,
    /// Fingerprint of the submitted public key.
    pub key_fingerprint: Option<String>,
    /// Stable rejection code.
    pub error_code: Option<String>,
    /// Canonicalization mode label when computed.
    pub canonical_mode: Option<&'static str>,
}

/// Inputs required to construct a gate audit event.
pub struct GateAuditEventParams {
    /// Event kind.
    pub kind: GateEventKind,
    /// Job spec identifier as submitted.
    pub job_id: String,
    /// Peer IP address when known.
    pub peer_ip: Option<String>,
    /// Allow-list key identifier when resolved.
    pub kid: Option<String>,
    /// Fingerprint of the submitted public key.
    pub key_fingerprint: Option<String>,
    /// Stable rejection code.
    pub error_code: Option<String>,
    /// Canonicalization mode label when computed.
    pub canonical_mode: Option<&'static str>,
}

/// Allow-list audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Entry count of the active snapshot after the attempt.
    pub entries: usize,
    /// Failure detail for failed reloads.
    pub message: Option<String>,
}

/// Job pipeline audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Job spec identifier.
    pub job_id: String,
    /// Region when the event is region-scoped.
    pub region: Option<String>,
    /// Outcome label.
    pub outcome: Option<String>,
    /// Detail message.
    pub message: Option<String>,
}

/// Inputs required to construct a job audit event.
pub struct JobAuditEventParams {
    /// Event kind.
    pub kind: JobEventKind,
    /// Job spec identifier.
    pub job_id: String,
    /// Region when the event is region-scoped.
    pub region: Option<String>,
    /// Outcome label.
    pub outcome: Option<String>,
    /// Detail message.
    pub message: Option<String>,
}

impl GateAuditEvent {
    /// Creates a new gate audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: GateAuditEventParams) -> Self {
        Self {
            event: params.kind.as_str(),
            timestamp_ms: now_millis(),
            job_id: params.job_id,
            peer_ip: params.peer_ip,
            kid: params.kid,
            key_fingerprint: params.key_fingerprint,
            error_code: params.error_code,
            canonical_mode: params.canonical_mode,
        }
    }
}

impl TrustAuditEvent {
    /// Creates an event for a successful allow-list load.
    #[must_use]
    pub fn reloaded(entries: usize) -> Self {
        Self {
            event: "allow_list_reloaded",
            timestamp_ms: now_millis(),
            entries,
            message: None,
        }
    }

    /// Creates an event for a failed allow-list load.
    #[must_use]
    pub fn reload_failed(entries: usize, message: impl Into<String>) -> Self {
        Self {
            event: "allow_list_reload_failed",
            timestamp_ms: now_millis(),
            entries,
            message: Some(message.into()),
        }
    }
}

impl JobAuditEvent {
    /// Creates a new job audit event with a consistent timestamp.
    #[must_use]
    pub fn new(params: JobAuditEventParams) -> Self {
        Self {
            event: params.kind.as_str(),
            timestamp_ms: now_millis(),
            job_id: params.job_id,
            region: params.region,
            outcome: params.outcome,
            message: params.message,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for runner events.
pub trait AuditSink: Send + Sync {
    /// Records a gate event.
    fn record_gate(&self, event: &GateAuditEvent);

    /// Records an allow-list event.
    fn record_trust(&self, _event: &TrustAuditEvent) {}

    /// Records a job pipeline event.
    fn record_job(&self, _event: &JobAuditEvent) {}
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_gate(&self, _event: &GateAuditEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the current wall-clock time in epoch milliseconds.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
