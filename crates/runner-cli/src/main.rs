// crates/runner-cli/src/main.rs
// ============================================================================
// Module: Runner CLI Entry Point
// Description: Command dispatcher for serving and offline job spec tooling.
// Purpose: Run the submission server and sign, verify, or canonicalize specs.
// Dependencies: clap, runner-config, runner-core, runner-server, serde, tokio.
// ============================================================================

//! ## Overview
//! The `runner` binary starts the job submission server and provides the
//! offline tooling operators use around it: canonical bytes, signing with a
//! seed file, signature and allow-list checks, and key generation. Inputs are
//! untrusted and read with size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use ed25519_dalek::SigningKey;
use runner_config::RunnerConfig;
use runner_core::core::AllowListEntry;
use runner_core::core::CanonicalMode;
use runner_core::core::TrustDecision;
use runner_core::core::canonical::canonicalize_document;
use runner_core::core::canonical::canonicalize_with_mode;
use runner_core::core::clock::now_utc;
use runner_core::core::hashing::fingerprint;
use runner_core::core::signing::decode_public_key;
use runner_core::core::signing::encode_public_key;
use runner_core::core::signing::encode_signing_key;
use runner_core::core::signing::sign_document;
use runner_core::core::signing::verify_message;
use runner_core::gate::AllowList;
use runner_core::interfaces::AllowListSource;
use runner_server::FileAllowListSource;
use runner_server::RunnerServer;
use runner_server::keys::generate_signing_key;
use runner_server::keys::load_signing_key;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a job spec document input.
const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "runner", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the job submission server.
    Serve(ServeCommand),
    /// Print the canonical signable bytes of a job spec.
    Canonicalize(CanonicalizeCommand),
    /// Sign a job spec with an Ed25519 seed file.
    Sign(SignCommand),
    /// Verify a signed job spec offline.
    Verify(VerifyCommand),
    /// Generate an Ed25519 signing key seed file.
    Keygen(KeygenCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to runner.toml or `RUNNER_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Allow binding to non-loopback addresses.
    #[arg(long, action = ArgAction::SetTrue)]
    allow_non_loopback: bool,
}

/// Canonicalization mode override.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    /// Unsigned fields removed.
    Current,
    /// Unsigned fields zeroed (deprecated).
    Legacy,
}

impl From<ModeArg> for CanonicalMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Current => Self::Current,
            ModeArg::Legacy => Self::Legacy,
        }
    }
}

/// Arguments for the `canonicalize` command.
#[derive(Args, Debug)]
struct CanonicalizeCommand {
    /// Job spec JSON document.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Override the mode selected by the spec version.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
}

/// Arguments for the `sign` command.
#[derive(Args, Debug)]
struct SignCommand {
    /// Job spec JSON document.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// File holding the base64 Ed25519 seed.
    #[arg(long, value_name = "PATH")]
    key: PathBuf,
    /// Write the signed document here instead of stdout.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// Arguments for the `verify` command.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Signed job spec JSON document.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Allow-list file to evaluate the signer against.
    #[arg(long, value_name = "PATH")]
    allow_list: Option<PathBuf>,
}

/// Arguments for the `keygen` command.
#[derive(Args, Debug)]
struct KeygenCommand {
    /// Destination for the base64 seed.
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    /// Key identifier for the printed allow-list entry.
    #[arg(long, value_name = "KID")]
    kid: Option<String>,
    /// Overwrite an existing file.
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Bounded read failures.
#[derive(Debug)]
enum ReadLimitError {
    /// I/O failure.
    Io(std::io::Error),
    /// Input exceeds the limit.
    TooLarge {
        /// Observed size.
        size: u64,
        /// Allowed size.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Canonicalize(command) => command_canonicalize(&command),
        Commands::Sign(command) => command_sign(&command),
        Commands::Verify(command) => command_verify(&command).await,
        Commands::Keygen(command) => command_keygen(&command),
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = RunnerConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    let bind = config
        .server
        .bind_addr()
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    enforce_loopback(bind, command.allow_non_loopback)?;

    let server = RunnerServer::from_config(config)
        .await
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    let listener = TcpListener::bind(server.bind_addr())
        .await
        .map_err(|err| CliError::new(format!("bind {bind} failed: {err}")))?;
    let local = listener.local_addr().map_err(|err| CliError::new(format!("bind failed: {err}")))?;
    write_stderr_line(&format!("runner listening on {local}"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server
        .serve_listener(listener, shutdown_signal())
        .await
        .map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Refuses non-loopback binds unless explicitly allowed.
fn enforce_loopback(bind: SocketAddr, allow_non_loopback: bool) -> CliResult<()> {
    if bind.ip().is_loopback() {
        return Ok(());
    }
    if !allow_non_loopback {
        return Err(CliError::new(format!(
            "refusing to bind non-loopback address {bind}; pass --allow-non-loopback"
        )));
    }
    write_stderr_line(&format!("warning: submission endpoint exposed on {bind}"))
        .map_err(|err| CliError::new(output_error("stderr", &err)))
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// ============================================================================
// SECTION: Document Commands
// ============================================================================

/// Executes the `canonicalize` command.
fn command_canonicalize(command: &CanonicalizeCommand) -> CliResult<ExitCode> {
    let document = read_document(&command.input)?;
    let (mode, mut bytes) = match command.mode {
        Some(mode) => {
            let mode = CanonicalMode::from(mode);
            let bytes = canonicalize_with_mode(&document, mode)
                .map_err(|err| CliError::new(format!("canonicalization failed: {err}")))?;
            (mode, bytes)
        }
        None => {
            let canonical = canonicalize_document(&document)
                .map_err(|err| CliError::new(format!("canonicalization failed: {err}")))?;
            (canonical.mode, canonical.bytes)
        }
    };
    warn_legacy(mode)?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `sign` command.
fn command_sign(command: &SignCommand) -> CliResult<ExitCode> {
    let mut document = read_document(&command.input)?;
    let key = read_signing_key(&command.key)?;
    let mode = sign_document(&mut document, &key)
        .map_err(|err| CliError::new(format!("signing failed: {err}")))?;
    warn_legacy(mode)?;
    let mut bytes = serde_json::to_vec_pretty(&document)
        .map_err(|err| CliError::new(format!("serialize signed spec failed: {err}")))?;
    bytes.push(b'\n');
    match &command.output {
        Some(path) => fs::write(path, &bytes).map_err(|err| {
            CliError::new(format!("write {} failed: {err}", path.display()))
        })?,
        None => {
            write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Result of an offline verification.
#[derive(Debug, Serialize)]
struct VerifyReport {
    /// Signature verifies over the canonical bytes.
    signature_valid: bool,
    /// Canonicalization mode used.
    canonical_mode: CanonicalMode,
    /// Fingerprint of the embedded public key.
    key_fingerprint: String,
    /// Verification failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    /// Allow-list decision when an allow-list was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    trust: Option<TrustDecision>,
    /// Matched key identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl VerifyReport {
    /// Returns true when the signature verifies and any trust check passed.
    fn passed(&self) -> bool {
        self.signature_valid && self.trust.is_none_or(|decision| decision == TrustDecision::Trusted)
    }
}

/// Executes the `verify` command.
async fn command_verify(command: &VerifyCommand) -> CliResult<ExitCode> {
    let document = read_document(&command.input)?;
    let public_key = required_str(&document, "public_key")?;
    let signature = required_str(&document, "signature")?;
    let canonical = canonicalize_document(&document)
        .map_err(|err| CliError::new(format!("canonicalization failed: {err}")))?;
    let outcome = decode_public_key(public_key)
        .and_then(|key| verify_message(&key, &canonical.bytes, signature));

    let mut report = VerifyReport {
        signature_valid: outcome.is_ok(),
        canonical_mode: canonical.mode,
        key_fingerprint: fingerprint(public_key),
        error: outcome.err().map(|err| err.to_string()),
        trust: None,
        kid: None,
    };
    if let Some(path) = &command.allow_list {
        let entries = FileAllowListSource::new(path)
            .load()
            .await
            .map_err(|err| CliError::new(format!("allow-list load failed: {err}")))?;
        let list = AllowList::from_entries(&entries)
            .map_err(|err| CliError::new(format!("allow-list invalid: {err}")))?;
        let evaluation = list.evaluate(public_key, now_utc());
        report.trust = Some(evaluation.decision);
        report.kid = evaluation.kid.map(|kid| kid.to_string());
    }

    write_json(&report)?;
    Ok(if report.passed() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Prints a deprecation notice for legacy canonicalization.
fn warn_legacy(mode: CanonicalMode) -> CliResult<()> {
    if mode != CanonicalMode::Legacy {
        return Ok(());
    }
    write_stderr_line("warning: legacy canonicalization (spec version 0.x) is deprecated")
        .map_err(|err| CliError::new(output_error("stderr", &err)))
}

// ============================================================================
// SECTION: Keygen Command
// ============================================================================

/// Printed result of key generation.
#[derive(Debug, Serialize)]
struct KeygenOutput {
    /// Seed file path.
    path: String,
    /// Fingerprint of the public key.
    key_fingerprint: String,
    /// Allow-list entry for the new key.
    entry: AllowListEntry,
}

/// Executes the `keygen` command.
fn command_keygen(command: &KeygenCommand) -> CliResult<ExitCode> {
    let key = generate_signing_key();
    write_seed_file(&command.output, &key, command.force)?;
    let public_key = encode_public_key(&key.verifying_key());
    let output = KeygenOutput {
        path: command.output.display().to_string(),
        key_fingerprint: fingerprint(&public_key),
        entry: AllowListEntry {
            kid: command.kid.clone().unwrap_or_default(),
            public_key,
            status: "active".to_string(),
            ..AllowListEntry::default()
        },
    };
    write_json(&output)?;
    Ok(ExitCode::SUCCESS)
}

/// Writes the base64 seed with owner-only permissions.
fn write_seed_file(path: &Path, key: &SigningKey, force: bool) -> CliResult<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .map_err(|err| CliError::new(format!("create {} failed: {err}", path.display())))?;
    writeln!(file, "{}", encode_signing_key(key))
        .map_err(|err| CliError::new(format!("write {} failed: {err}", path.display())))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file, failing when it exceeds `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads and parses a job spec JSON document.
fn read_document(path: &Path) -> CliResult<Value> {
    let bytes = read_bytes_with_limit(path, MAX_DOCUMENT_BYTES).map_err(|err| match err {
        ReadLimitError::Io(err) => {
            CliError::new(format!("read {} failed: {err}", path.display()))
        }
        ReadLimitError::TooLarge {
            size,
            limit,
        } => CliError::new(format!(
            "{} is too large ({size} bytes, limit {limit})",
            path.display()
        )),
    })?;
    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("{} is not valid json: {err}", path.display())))?;
    if !document.is_object() {
        return Err(CliError::new(format!("{} must contain a json object", path.display())));
    }
    Ok(document)
}

/// Loads a signing key seed file.
fn read_signing_key(path: &Path) -> CliResult<SigningKey> {
    load_signing_key(path).map_err(|err| CliError::new(err.to_string()))
}

/// Returns a required non-empty string field.
fn required_str<'a>(document: &'a Value, field: &str) -> CliResult<&'a str> {
    document
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| CliError::new(format!("document has no {field}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a JSON value to stdout followed by a newline.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|err| CliError::new(format!("serialize output failed: {err}")))?;
    bytes.push(b'\n');
    write_stdout_bytes(&bytes).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes raw bytes to stdout.
fn write_stdout_bytes(bytes: &[u8]) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(bytes)
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
