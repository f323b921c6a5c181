// crates/runner-core/src/runtime/sinks.rs
// ============================================================================
// Module: Memory Sinks
// Description: Capturing audit and receipt sinks plus a fixed allow-list source.
// Purpose: Observe pipeline side effects in tests and embedded runs.
// Dependencies: crate::audit, crate::interfaces
// ============================================================================

//! ## Overview
//! [`MemoryAuditSink`] and [`MemoryReceiptSink`] keep everything they are
//! handed so tests can assert on side effects; a refusing receipt sink fails
//! every submit. [`StaticAllowListSource`] returns replaceable entries or a
//! scripted load failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use async_trait::async_trait;

use crate::audit::AuditSink;
use crate::audit::GateAuditEvent;
use crate::audit::JobAuditEvent;
use crate::audit::TrustAuditEvent;
use crate::core::AllowListEntry;
use crate::core::Receipt;
use crate::interfaces::AllowListSource;
use crate::interfaces::AllowListSourceError;
use crate::interfaces::ReceiptSink;
use crate::interfaces::ReceiptSinkError;

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    /// Gate events.
    gate: Mutex<Vec<GateAuditEvent>>,
    /// Allow-list events.
    trust: Mutex<Vec<TrustAuditEvent>>,
    /// Job events.
    job: Mutex<Vec<JobAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns captured gate events.
    #[must_use]
    pub fn gate_events(&self) -> Vec<GateAuditEvent> {
        self.gate.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns captured allow-list events.
    #[must_use]
    pub fn trust_events(&self) -> Vec<TrustAuditEvent> {
        self.trust.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns captured job events.
    #[must_use]
    pub fn job_events(&self) -> Vec<JobAuditEvent> {
        self.job.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record_gate(&self, event: &GateAuditEvent) {
        if let Ok(mut guard) = self.gate.lock() {
            guard.push(event.clone());
        }
    }

    fn record_trust(&self, event: &TrustAuditEvent) {
        if let Ok(mut guard) = self.trust.lock() {
            guard.push(event.clone());
        }
    }

    fn record_job(&self, event: &JobAuditEvent) {
        if let Ok(mut guard) = self.job.lock() {
            guard.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Receipts
// ============================================================================

/// Receipt sink that stores receipts, optionally refusing them.
#[derive(Debug, Default)]
pub struct MemoryReceiptSink {
    /// Accepted receipts.
    receipts: Mutex<Vec<Receipt>>,
    /// Refuse every receipt with this message.
    refuse: Option<String>,
}

impl MemoryReceiptSink {
    /// Creates an accepting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that refuses every receipt.
    #[must_use]
    pub fn refusing(message: impl Into<String>) -> Self {
        Self {
            receipts: Mutex::new(Vec::new()),
            refuse: Some(message.into()),
        }
    }

    /// Returns accepted receipts.
    #[must_use]
    pub fn receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ReceiptSink for MemoryReceiptSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn submit(&self, receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        if let Some(message) = &self.refuse {
            return Err(ReceiptSinkError::Rejected(message.clone()));
        }
        self.receipts
            .lock()
            .map_err(|_| ReceiptSinkError::Unavailable("receipt sink mutex poisoned".to_string()))?
            .push(receipt.clone());
        Ok(())
    }
}

// ============================================================================
// SECTION: Allow-List Source
// ============================================================================

/// Allow-list source holding replaceable entries.
#[derive(Debug)]
pub struct StaticAllowListSource {
    /// Entries, or a load failure.
    entries: Mutex<Result<Vec<AllowListEntry>, String>>,
}

impl Default for StaticAllowListSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl StaticAllowListSource {
    /// Creates a source returning `entries`.
    #[must_use]
    pub const fn new(entries: Vec<AllowListEntry>) -> Self {
        Self {
            entries: Mutex::new(Ok(entries)),
        }
    }

    /// Replaces the entries returned by later loads.
    pub fn set_entries(&self, entries: Vec<AllowListEntry>) {
        if let Ok(mut guard) = self.entries.lock() {
            *guard = Ok(entries);
        }
    }

    /// Makes later loads fail.
    pub fn set_unavailable(&self, message: impl Into<String>) {
        if let Ok(mut guard) = self.entries.lock() {
            *guard = Err(message.into());
        }
    }
}

#[async_trait]
impl AllowListSource for StaticAllowListSource {
    async fn load(&self) -> Result<Vec<AllowListEntry>, AllowListSourceError> {
        let guard = self.entries.lock().map_err(|_| {
            AllowListSourceError::Unavailable("allow-list source mutex poisoned".to_string())
        })?;
        guard.clone().map_err(AllowListSourceError::Unavailable)
    }
}
