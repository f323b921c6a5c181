// crates/runner-server/src/audit.rs
// ============================================================================
// Module: Audit Sinks
// Description: JSON-line audit sinks for stderr and append-only files.
// Purpose: Persist gate, allow-list, and job pipeline events.
// Dependencies: runner-config, runner-core, serde_json
// ============================================================================

//! ## Overview
//! Each event is serialized to one JSON line. Write failures are dropped so
//! auditing never blocks the request path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use runner_config::AuditConfig;
use runner_config::AuditSinkKind;
use runner_core::AuditSink;
use runner_core::NoopAuditSink;
use runner_core::audit::GateAuditEvent;
use runner_core::audit::JobAuditEvent;
use runner_core::audit::TrustAuditEvent;
use serde::Serialize;

use crate::server::ServerError;

// ============================================================================
// SECTION: Stderr Sink
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one event line.
    fn write<T: Serialize>(event: &T) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_gate(&self, event: &GateAuditEvent) {
        Self::write(event);
    }

    fn record_trust(&self, event: &TrustAuditEvent) {
        Self::write(event);
    }

    fn record_job(&self, event: &JobAuditEvent) {
        Self::write(event);
    }
}

// ============================================================================
// SECTION: File Sink
// ============================================================================

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one event line.
    fn write<T: Serialize>(&self, event: &T) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_gate(&self, event: &GateAuditEvent) {
        self.write(event);
    }

    fn record_trust(&self, event: &TrustAuditEvent) {
        self.write(event);
    }

    fn record_job(&self, event: &JobAuditEvent) {
        self.write(event);
    }
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds the configured audit sink.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the audit file cannot be opened.
pub fn build_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    match config.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::Disabled => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| ServerError::Config("audit.path required".to_string()))?;
            let sink = FileAuditSink::new(path)
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
    }
}
