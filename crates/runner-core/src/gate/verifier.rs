// crates/runner-core/src/gate/verifier.rs
// ============================================================================
// Module: Signature Gate
// Description: Ordered, fail-closed verification of submitted job specs.
// Purpose: Admit only well-formed, trusted, fresh, and correctly signed specs.
// Dependencies: serde_json, time, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`SignatureGate::verify`] runs its checks in a fixed order: structure,
//! field encodings, trust, failure rate limits, timestamp window, canonical
//! bytes and signature, then nonce recording. Nonces are recorded last so an
//! unauthenticated request can never consume a legitimate signer's nonce.
//! Every outcome emits one gate audit event.
//!
//! Canonical bytes are computed from the document exactly as submitted;
//! defaults from validation only apply to the returned spec.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;

use crate::audit::AuditSink;
use crate::audit::GateAuditEvent;
use crate::audit::GateAuditEventParams;
use crate::audit::GateEventKind;
use crate::core::CanonicalMode;
use crate::core::JobSpec;
use crate::core::KeyId;
use crate::core::TrustDecision;
use crate::core::canonical::canonicalize_document;
use crate::core::hashing::fingerprint;
use crate::core::signing::SignatureError;
use crate::core::signing::decode_public_key;
use crate::core::signing::decode_signature;
use crate::core::signing::verify_message;
use crate::gate::rate_limit::RateLimitConfig;
use crate::gate::rate_limit::RateLimitError;
use crate::gate::rate_limit::RateLimiter;
use crate::gate::rejection::GateRejection;
use crate::gate::rejection::Protection;
use crate::gate::replay::ReplayConfig;
use crate::gate::replay::ReplayError;
use crate::gate::replay::ReplayGuard;
use crate::gate::replay::check_timestamp;
use crate::gate::trust::TrustStore;
use crate::interfaces::FastStore;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Gate settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Enforce allow-list trust, timestamps, and nonces.
    pub enforce_trust: bool,
    /// Replay window.
    pub replay: ReplayConfig,
    /// Failure rate limits.
    pub rate_limit: RateLimitConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enforce_trust: true,
            replay: ReplayConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Submitted job spec in raw and parsed form.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Document as submitted.
    pub document: Value,
    /// Parsed spec.
    pub spec: JobSpec,
}

impl Submission {
    /// Parses a request body.
    ///
    /// # Errors
    ///
    /// Returns [`GateRejection::InvalidDocument`] when the body is not a
    /// JSON object shaped like a job spec.
    pub fn parse(body: &[u8]) -> Result<Self, GateRejection> {
        let document: Value = serde_json::from_slice(body)
            .map_err(|err| GateRejection::InvalidDocument(err.to_string()))?;
        Self::from_document(document)
    }

    /// Parses an already decoded document.
    ///
    /// # Errors
    ///
    /// Returns [`GateRejection::InvalidDocument`] when the document is not
    /// shaped like a job spec.
    pub fn from_document(document: Value) -> Result<Self, GateRejection> {
        if !document.is_object() {
            return Err(GateRejection::InvalidDocument("expected a json object".to_string()));
        }
        let spec: JobSpec = serde_json::from_value(document.clone())
            .map_err(|err| GateRejection::InvalidDocument(err.to_string()))?;
        Ok(Self {
            document,
            spec,
        })
    }
}

/// Request context for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionContext {
    /// Client IP when known.
    pub peer_ip: Option<IpAddr>,
    /// Receive time used for trust windows and timestamp checks.
    pub received_at: OffsetDateTime,
}

/// Spec admitted by the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedSubmission {
    /// Validated spec with defaults applied.
    pub spec: JobSpec,
    /// Canonicalization mode the signature verified under.
    pub mode: CanonicalMode,
    /// Allow-list key identifier under trust enforcement.
    pub kid: Option<KeyId>,
    /// Fingerprint of the signer key.
    pub key_fingerprint: String,
}

/// Audit details collected while the checks run.
#[derive(Default)]
struct GateTrace {
    /// Resolved key identifier.
    kid: Option<KeyId>,
    /// Signer key fingerprint.
    key_fingerprint: Option<String>,
    /// Canonical mode once computed.
    mode: Option<CanonicalMode>,
}

// ============================================================================
// SECTION: Signature Gate
// ============================================================================

/// Verifies submitted job specs.
#[derive(Clone)]
pub struct SignatureGate {
    /// Gate settings.
    config: GateConfig,
    /// Allow-list snapshot holder.
    trust: Arc<TrustStore>,
    /// Nonce recorder.
    replay: ReplayGuard,
    /// Failure counters.
    limiter: RateLimiter,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
}

impl SignatureGate {
    /// Creates a gate.
    #[must_use]
    pub fn new(
        config: GateConfig,
        trust: Arc<TrustStore>,
        fast_store: Arc<dyn FastStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            replay: ReplayGuard::new(Arc::clone(&fast_store), config.replay),
            limiter: RateLimiter::new(fast_store, config.rate_limit),
            config,
            trust,
            audit,
        }
    }

    /// Returns the gate settings.
    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Runs every gate check and emits one audit event.
    ///
    /// # Errors
    ///
    /// Returns the first [`GateRejection`] encountered.
    pub async fn verify(
        &self,
        submission: Submission,
        context: &SubmissionContext,
    ) -> Result<VerifiedSubmission, GateRejection> {
        let job_id = submission.spec.id.to_string();
        let mut trace = GateTrace::default();
        let result = self.run_checks(submission, context, &mut trace).await;
        let kind = if result.is_ok() { GateEventKind::Accepted } else { GateEventKind::Rejected };
        let error_code = result.as_ref().err().map(GateRejection::error_code);
        let peer_ip = context.peer_ip.map(|ip| ip.to_string());
        self.audit.record_gate(&GateAuditEvent::new(GateAuditEventParams {
            kind,
            job_id: job_id.clone(),
            peer_ip: peer_ip.clone(),
            kid: trace.kid.as_ref().map(ToString::to_string),
            key_fingerprint: trace.key_fingerprint.clone(),
            error_code,
            canonical_mode: trace.mode.map(CanonicalMode::label),
        }));
        if result.is_ok() && trace.mode == Some(CanonicalMode::Legacy) {
            self.audit.record_gate(&GateAuditEvent::new(GateAuditEventParams {
                kind: GateEventKind::LegacyCanonicalization,
                job_id,
                peer_ip,
                kid: trace.kid.as_ref().map(ToString::to_string),
                key_fingerprint: trace.key_fingerprint,
                error_code: None,
                canonical_mode: Some(CanonicalMode::Legacy.label()),
            }));
        }
        result
    }

    /// Runs the ordered checks.
    async fn run_checks(
        &self,
        submission: Submission,
        context: &SubmissionContext,
        trace: &mut GateTrace,
    ) -> Result<VerifiedSubmission, GateRejection> {
        let Submission {
            document,
            mut spec,
        } = submission;
        spec.validate()?;

        let signature = spec.signature.trim().to_string();
        let public_key = spec.public_key.trim().to_string();
        if signature.is_empty() {
            return Err(GateRejection::MissingField("signature"));
        }
        if public_key.is_empty() {
            return Err(GateRejection::MissingField("public_key"));
        }
        let verifying_key = decode_public_key(&public_key)
            .map_err(|_| GateRejection::InvalidEncoding("public_key"))?;
        decode_signature(&signature).map_err(|_| GateRejection::InvalidEncoding("signature"))?;
        let key_fingerprint = fingerprint(&public_key);
        trace.key_fingerprint = Some(key_fingerprint.clone());

        let enforce = self.config.enforce_trust;
        if enforce {
            let evaluation = self.trust.evaluate(&public_key, context.received_at);
            trace.kid.clone_from(&evaluation.kid);
            if evaluation.decision != TrustDecision::Trusted {
                return Err(GateRejection::TrustViolation(evaluation.decision));
            }
        }
        let signer = trace.kid.as_ref().map_or_else(|| key_fingerprint.clone(), ToString::to_string);
        let peer_ip = context.peer_ip.map(|ip| ip.to_string());

        self.limiter.check(peer_ip.as_deref(), &signer).await.map_err(|err| match err {
            RateLimitError::Exceeded {
                ..
            } => GateRejection::RateLimited,
            RateLimitError::Unavailable(message) => GateRejection::ProtectionUnavailable {
                protection: Protection::RateLimit,
                message,
            },
        })?;

        let nonce = if enforce {
            if spec.metadata.is_empty() {
                return Err(GateRejection::MissingField("metadata"));
            }
            let timestamp =
                spec.metadata_str("timestamp").ok_or(GateRejection::MissingField("timestamp"))?;
            let nonce = spec.metadata_str("nonce").ok_or(GateRejection::MissingField("nonce"))?;
            let stamped = check_timestamp(timestamp, context.received_at, self.replay.config())
                .map_err(GateRejection::TimestampInvalid)?;
            Some((nonce.to_string(), stamped))
        } else {
            None
        };

        let canonical = match canonicalize_document(&document) {
            Ok(canonical) => canonical,
            Err(err) => {
                let rejection = GateRejection::Canonicalization(err.to_string());
                return Err(self.count_failure(peer_ip.as_deref(), &signer, rejection).await);
            }
        };
        trace.mode = Some(canonical.mode);
        if let Err(err) = verify_message(&verifying_key, &canonical.bytes, &signature) {
            let rejection = match err {
                SignatureError::InvalidSignature(_) => GateRejection::InvalidEncoding("signature"),
                _ => GateRejection::SignatureMismatch,
            };
            return Err(self.count_failure(peer_ip.as_deref(), &signer, rejection).await);
        }

        if let Some((nonce, stamped)) = nonce {
            let recorded =
                self.replay.record_nonce(&signer, &nonce, stamped, context.received_at).await;
            recorded.map_err(|err| match err {
                ReplayError::Replayed => GateRejection::ReplayDetected,
                ReplayError::Unavailable(message) => GateRejection::ProtectionUnavailable {
                    protection: Protection::Replay,
                    message,
                },
            })?;
        }

        Ok(VerifiedSubmission {
            spec,
            mode: canonical.mode,
            kid: trace.kid.clone(),
            key_fingerprint,
        })
    }

    /// Counts a failed verification, surfacing counter store failures.
    async fn count_failure(
        &self,
        peer_ip: Option<&str>,
        signer: &str,
        rejection: GateRejection,
    ) -> GateRejection {
        match self.limiter.record_failure(peer_ip, signer).await {
            Ok(()) => rejection,
            Err(err) => GateRejection::ProtectionUnavailable {
                protection: Protection::RateLimit,
                message: format!("{err} (after {})", rejection.error_code()),
            },
        }
    }
}
