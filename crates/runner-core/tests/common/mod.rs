// crates/runner-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared job spec, key, and gate fixtures for runner-core tests.
// Purpose: Build signed submissions and wired gates deterministically.
// Dependencies: runner-core, ed25519-dalek, serde_json
// ============================================================================

//! ## Overview
//! Fixtures produce job spec documents that pass structural validation, sign
//! them with seeded keys, and wire a [`SignatureGate`] over in-memory stores.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use runner_core::core::AllowListEntry;
use runner_core::core::JobSpec;
use runner_core::core::clock::format_rfc3339;
use runner_core::core::clock::now_utc;
use runner_core::core::signing::encode_public_key;
use runner_core::core::signing::sign_document;
use runner_core::gate::AllowList;
use runner_core::gate::GateConfig;
use runner_core::gate::SignatureGate;
use runner_core::gate::Submission;
use runner_core::gate::SubmissionContext;
use runner_core::gate::TrustStore;
use runner_core::runtime::InMemoryFastStore;
use runner_core::runtime::MemoryAuditSink;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Keys
// ============================================================================

pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

pub fn public_key_b64(key: &SigningKey) -> String {
    encode_public_key(&key.verifying_key())
}

pub fn allow_entry(kid: &str, key: &SigningKey) -> AllowListEntry {
    AllowListEntry {
        kid: kid.to_string(),
        public_key: public_key_b64(key),
        ..AllowListEntry::default()
    }
}

// ============================================================================
// SECTION: Documents
// ============================================================================

pub const INPUT_HASH: &str =
    "sha256:2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae";

pub fn spec_document(id: &str, regions: &[&str]) -> Value {
    json!({
        "id": id,
        "version": "1.0",
        "benchmark": {
            "name": "geo-bias",
            "version": "2024.1",
            "container": {"image": "ghcr.io/example/bench", "tag": "latest"},
            "input": {"type": "prompt", "data": {"prompt": "Who won?"}, "hash": INPUT_HASH},
            "scoring": {"method": "similarity"}
        },
        "constraints": {
            "regions": regions,
            "min_regions": 1,
            "timeout_ms": 60_000,
            "provider_timeout_ms": 10_000
        },
        "questions": ["Who won?"],
        "created_at": "2026-01-01T00:00:00Z"
    })
}

pub fn stamp(document: &mut Value, timestamp: &str, nonce: &str) {
    document["metadata"] = json!({"timestamp": timestamp, "nonce": nonce});
}

pub fn fresh_document(id: &str, nonce: &str) -> Value {
    let mut document = spec_document(id, &["US", "EU"]);
    stamp(&mut document, &format_rfc3339(now_utc()), nonce);
    document
}

pub fn signed(mut document: Value, key: &SigningKey) -> Submission {
    sign_document(&mut document, key).unwrap();
    Submission::from_document(document).unwrap()
}

pub fn validated_spec(id: &str, regions: &[&str]) -> JobSpec {
    let mut spec: JobSpec = serde_json::from_value(spec_document(id, regions)).unwrap();
    spec.validate().unwrap();
    spec
}

// ============================================================================
// SECTION: Gate
// ============================================================================

pub struct GateFixture {
    pub gate: SignatureGate,
    pub store: Arc<InMemoryFastStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub trust: Arc<TrustStore>,
}

pub fn gate_with(config: GateConfig, entries: &[AllowListEntry]) -> GateFixture {
    let trust = Arc::new(TrustStore::with_list(AllowList::from_entries(entries).unwrap()));
    let store = Arc::new(InMemoryFastStore::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = SignatureGate::new(config, Arc::clone(&trust), store.clone(), audit.clone());
    GateFixture {
        gate,
        store,
        audit,
        trust,
    }
}

pub fn context() -> SubmissionContext {
    context_at(now_utc())
}

pub fn context_at(received_at: OffsetDateTime) -> SubmissionContext {
    SubmissionContext {
        peer_ip: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7))),
        received_at,
    }
}
