// crates/runner-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and input guards.
// Purpose: Ensure bounded reads and bind checks fail closed.
// Dependencies: runner-cli main helpers
// ============================================================================

//! ## Overview
//! Covers argument parsing, the loopback guard, bounded reads, and the
//! verification pass rule.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::net::SocketAddr;

use clap::Parser;
use runner_core::core::CanonicalMode;
use runner_core::core::TrustDecision;
use tempfile::TempDir;

use super::Cli;
use super::Commands;
use super::ModeArg;
use super::ReadLimitError;
use super::VerifyReport;
use super::enforce_loopback;
use super::read_bytes_with_limit;
use super::read_document;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn report(signature_valid: bool, trust: Option<TrustDecision>) -> VerifyReport {
    VerifyReport {
        signature_valid,
        canonical_mode: CanonicalMode::Current,
        key_fingerprint: "0123456789abcdef".to_string(),
        error: None,
        trust,
        kid: None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn canonicalize_accepts_a_mode_override() {
    let cli =
        Cli::try_parse_from(["runner", "canonicalize", "--input", "spec.json", "--mode", "legacy"])
            .unwrap();
    let Commands::Canonicalize(command) = cli.command else {
        panic!("expected canonicalize");
    };
    assert_eq!(command.mode, Some(ModeArg::Legacy));
    assert_eq!(CanonicalMode::from(ModeArg::Legacy), CanonicalMode::Legacy);
}

#[test]
fn sign_requires_a_key() {
    assert!(Cli::try_parse_from(["runner", "sign", "--input", "spec.json"]).is_err());
}

#[test]
fn loopback_binds_are_allowed() {
    let loopback: SocketAddr = "127.0.0.1:8090".parse().unwrap();
    let v6: SocketAddr = "[::1]:8090".parse().unwrap();
    assert!(enforce_loopback(loopback, false).is_ok());
    assert!(enforce_loopback(v6, false).is_ok());
}

#[test]
fn non_loopback_binds_need_the_flag() {
    let exposed: SocketAddr = "0.0.0.0:8090".parse().unwrap();
    let err = enforce_loopback(exposed, false).unwrap_err();
    assert!(err.to_string().contains("--allow-non-loopback"));
    assert!(enforce_loopback(exposed, true).is_ok());
}

#[test]
fn bounded_reads_reject_oversized_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.json");
    fs::write(&path, vec![b'x'; 65]).unwrap();

    assert_eq!(read_bytes_with_limit(&path, 65).unwrap().len(), 65);
    match read_bytes_with_limit(&path, 64) {
        Err(ReadLimitError::TooLarge {
            size,
            limit,
        }) => {
            assert_eq!(size, 65);
            assert_eq!(limit, 64);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        read_bytes_with_limit(&dir.path().join("missing.json"), 64),
        Err(ReadLimitError::Io(_))
    ));
}

#[test]
fn documents_must_be_json_objects() {
    let dir = TempDir::new().unwrap();
    let array = dir.path().join("array.json");
    fs::write(&array, b"[1, 2]").unwrap();
    let broken = dir.path().join("broken.json");
    fs::write(&broken, b"{\"id\": ").unwrap();

    assert!(read_document(&array).unwrap_err().to_string().contains("json object"));
    assert!(read_document(&broken).unwrap_err().to_string().contains("not valid json"));
}

#[test]
fn verification_passes_only_for_valid_trusted_signatures() {
    assert!(report(true, None).passed());
    assert!(report(true, Some(TrustDecision::Trusted)).passed());
    assert!(!report(true, Some(TrustDecision::Revoked)).passed());
    assert!(!report(true, Some(TrustDecision::Unknown)).passed());
    assert!(!report(false, None).passed());
}
