// crates/runner-server/src/keys.rs
// ============================================================================
// Module: Receipt Keys
// Description: Ed25519 key generation and seed file loading.
// Purpose: Provide the receipt signing key for the executor.
// Dependencies: ed25519-dalek, rand, runner-core
// ============================================================================

//! ## Overview
//! Key files hold the base64 32-byte seed on one line. Without a configured
//! file the server signs receipts with a process-lifetime key.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::RngCore;
use rand::rngs::OsRng;
use runner_config::ReceiptsConfig;
use runner_core::core::signing::decode_signing_key;

use crate::server::ServerError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum key file size.
const MAX_KEY_FILE_BYTES: u64 = 4096;

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Generates a signing key from the OS RNG.
#[must_use]
pub fn generate_signing_key() -> SigningKey {
    let mut seed = [0_u8; 32];
    OsRng.fill_bytes(&mut seed);
    SigningKey::from_bytes(&seed)
}

/// Loads a base64 seed file.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the file cannot be read or decoded.
pub fn load_signing_key(path: &Path) -> Result<SigningKey, ServerError> {
    let display = path.display();
    let metadata = std::fs::metadata(path)
        .map_err(|err| ServerError::Init(format!("signing key {display}: {err}")))?;
    if metadata.len() > MAX_KEY_FILE_BYTES {
        return Err(ServerError::Init(format!("signing key {display}: file too large")));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|err| ServerError::Init(format!("signing key {display}: {err}")))?;
    decode_signing_key(&content)
        .map_err(|err| ServerError::Init(format!("signing key {display}: {err}")))
}

/// Returns the configured receipt key, or a fresh one when none is set.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the configured file is unusable.
pub fn receipt_signing_key(config: &ReceiptsConfig) -> Result<SigningKey, ServerError> {
    config.signing_key_path.as_deref().map_or_else(|| Ok(generate_signing_key()), load_signing_key)
}
