// crates/runner-core/src/core/signing.rs
// ============================================================================
// Module: Ed25519 Signing Helpers
// Description: Base64 key/signature codecs and job spec signing.
// Purpose: Centralize every Ed25519 operation behind fail-closed helpers.
// Dependencies: base64, ed25519-dalek, serde_json
// ============================================================================

//! ## Overview
//! Keys and signatures travel as standard base64. Verification always uses
//! `verify_strict`, which rejects small-order keys and malleable signatures.
//! Signing helpers write `public_key` before computing canonical bytes; both
//! unsigned fields are excluded from those bytes in every canonical mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use serde_json::Value;
use thiserror::Error;

use crate::core::canonical::CanonicalMode;
use crate::core::canonical::canonicalize_document;
use crate::core::canonical::canonicalize_spec;
use crate::core::jobspec::JobSpec;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Signature codec and verification failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Public key is not base64 of a valid 32-byte Ed25519 key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    /// Signature is not base64 of 64 bytes.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
    /// Secret key material is malformed.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),
    /// Canonical bytes could not be produced.
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),
    /// Signature does not verify.
    #[error("signature verification failed")]
    Mismatch,
}

// ============================================================================
// SECTION: Codecs
// ============================================================================

/// Decodes a base64 Ed25519 public key.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidPublicKey`] for bad base64, length, or
/// curve point.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|_| SignatureError::InvalidPublicKey("not base64".to_string()))?;
    let key_bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidPublicKey("expected 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| SignatureError::InvalidPublicKey("not an ed25519 point".to_string()))
}

/// Decodes a base64 Ed25519 signature.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidSignature`] for bad base64 or length.
pub fn decode_signature(encoded: &str) -> Result<Signature, SignatureError> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|_| SignatureError::InvalidSignature("not base64".to_string()))?;
    Signature::try_from(bytes.as_slice())
        .map_err(|_| SignatureError::InvalidSignature("expected 64 bytes".to_string()))
}

/// Encodes a public key as base64.
#[must_use]
pub fn encode_public_key(key: &VerifyingKey) -> String {
    Base64.encode(key.as_bytes())
}

/// Decodes a base64 32-byte Ed25519 seed into a signing key.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidSigningKey`] for bad base64 or length.
pub fn decode_signing_key(encoded: &str) -> Result<SigningKey, SignatureError> {
    let bytes = Base64
        .decode(encoded.trim())
        .map_err(|_| SignatureError::InvalidSigningKey("not base64".to_string()))?;
    let seed: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidSigningKey("expected 32-byte seed".to_string()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Encodes a signing key seed as base64.
#[must_use]
pub fn encode_signing_key(key: &SigningKey) -> String {
    Base64.encode(key.to_bytes())
}

// ============================================================================
// SECTION: Sign / Verify
// ============================================================================

/// Verifies a base64 signature over `message` with `key`.
///
/// # Errors
///
/// Returns [`SignatureError`] when the signature is malformed or does not verify.
pub fn verify_message(
    key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<(), SignatureError> {
    let signature = decode_signature(signature_b64)?;
    key.verify_strict(message, &signature).map_err(|_| SignatureError::Mismatch)
}

/// Signs `message` and returns the base64 signature.
#[must_use]
pub fn sign_message(key: &SigningKey, message: &[u8]) -> String {
    Base64.encode(key.sign(message).to_bytes())
}

/// Signs a parsed job spec in place.
///
/// # Errors
///
/// Returns [`SignatureError::Canonicalization`] when canonical bytes cannot
/// be produced.
pub fn sign_job_spec(spec: &mut JobSpec, key: &SigningKey) -> Result<CanonicalMode, SignatureError> {
    spec.public_key = encode_public_key(&key.verifying_key());
    let canonical =
        canonicalize_spec(spec).map_err(|err| SignatureError::Canonicalization(err.to_string()))?;
    spec.signature = sign_message(key, &canonical.bytes);
    Ok(canonical.mode)
}

/// Signs a raw job spec document in place.
///
/// # Errors
///
/// Returns [`SignatureError::Canonicalization`] when the document is not an
/// object or cannot be canonicalized.
pub fn sign_document(document: &mut Value, key: &SigningKey) -> Result<CanonicalMode, SignatureError> {
    let canonical = canonicalize_document(document)
        .map_err(|err| SignatureError::Canonicalization(err.to_string()))?;
    let signature = sign_message(key, &canonical.bytes);
    let Value::Object(object) = document else {
        return Err(SignatureError::Canonicalization("document must be an object".to_string()));
    };
    object.insert("public_key".to_string(), Value::String(encode_public_key(&key.verifying_key())));
    object.insert("signature".to_string(), Value::String(signature));
    Ok(canonical.mode)
}
