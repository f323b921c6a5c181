// crates/runner-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Runner Store
// Description: Durable JobStore and FastStore backed by SQLite.
// Purpose: Persist jobs, executions, receipts, nonces, and counters.
// Dependencies: runner-core, rusqlite, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! One `SQLite` connection serves both the relational job store and the fast
//! key-value store. Every operation runs on `spawn_blocking` under the
//! connection mutex inside an immediate transaction, which makes
//! idempotency binding and nonce reservation atomic across callers.
//!
//! Payloads are canonical JSON stored next to their SHA-256 digest. Loads
//! recompute the digest and fail closed on mismatch.
//! Security posture: database contents are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use runner_core::core::CrossRegionExecution;
use runner_core::core::JobSpec;
use runner_core::core::JobSpecId;
use runner_core::core::Receipt;
use runner_core::core::clock::format_rfc3339;
use runner_core::core::clock::now_utc;
use runner_core::core::clock::parse_rfc3339;
use runner_core::core::hashing::DEFAULT_HASH_ALGORITHM;
use runner_core::core::hashing::canonical_json_bytes;
use runner_core::core::hashing::hash_bytes;
use runner_core::interfaces::CreateJobOutcome;
use runner_core::interfaces::FastStore;
use runner_core::interfaces::FastStoreError;
use runner_core::interfaces::JobRecord;
use runner_core::interfaces::JobStatus;
use runner_core::interfaces::JobStore;
use runner_core::interfaces::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum stored payload size.
pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteJournalMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Journal mode.
    pub journal_mode: SqliteJournalMode,
    /// Sync mode.
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Overrides the busy timeout.
    #[must_use]
    pub const fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Record conflicts with an existing one.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "payload exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

impl From<SqliteStoreError> for FastStoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Corrupt(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Maps a `rusqlite` error to a store error.
fn db_error(error: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(error.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed [`JobStore`] and [`FastStore`].
///
/// # Invariants
/// - Payload loads verify stored hashes before deserialization.
/// - Connection access is serialized through a mutex.
#[derive(Clone)]
pub struct SqliteRunnerStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRunnerStore {
    /// Opens (creating if needed) the store at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// its schema version is unsupported.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Deletes expired fast-store keys and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the delete fails.
    pub async fn purge_expired(&self) -> Result<usize, SqliteStoreError> {
        let now = now_millis();
        self.run(move |tx| {
            tx.execute("DELETE FROM fast_keys WHERE expires_at_ms <= ?1", params![now])
                .map_err(|err| db_error(&err))
        })
        .await
    }

    /// Runs `op` in an immediate transaction on a blocking thread.
    async fn run<T, F>(&self, op: F) -> Result<T, SqliteStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))?;
            let tx = guard
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| db_error(&err))?;
            let value = op(&tx)?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok(value)
        })
        .await
        .map_err(|err| SqliteStoreError::Io(format!("sqlite task failed: {err}")))?
    }
}

// ============================================================================
// SECTION: Job Store
// ============================================================================

#[async_trait]
impl JobStore for SqliteRunnerStore {
    async fn create_job(
        &self,
        spec: &JobSpec,
        idempotency_key: Option<&str>,
    ) -> Result<CreateJobOutcome, StoreError> {
        let (spec_json, spec_hash) = encode_payload(spec)?;
        let id = spec.id.clone();
        let key = idempotency_key.map(str::to_string);
        let now = format_rfc3339(now_utc());
        let outcome = self
            .run(move |tx| {
                if let Some(key) = &key {
                    let existing: Option<String> = tx
                        .query_row(
                            "SELECT id FROM jobs WHERE idempotency_key = ?1",
                            params![key],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(|err| db_error(&err))?;
                    if let Some(existing) = existing {
                        return Ok(CreateJobOutcome::Existing(JobSpecId::new(existing)));
                    }
                }
                if job_exists(tx, id.as_str())? {
                    return Err(SqliteStoreError::Conflict(format!("job {id} already exists")));
                }
                tx.execute(
                    "INSERT INTO jobs (id, spec_json, spec_hash, status, idempotency_key, \
                     created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                    params![
                        id.as_str(),
                        spec_json,
                        spec_hash,
                        JobStatus::Enqueued.as_str(),
                        key,
                        now
                    ],
                )
                .map_err(|err| db_error(&err))?;
                Ok(CreateJobOutcome::Created(id))
            })
            .await?;
        Ok(outcome)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<JobSpecId>, StoreError> {
        let key = key.to_string();
        let found = self
            .run(move |tx| {
                tx.query_row("SELECT id FROM jobs WHERE idempotency_key = ?1", params![key], |row| {
                    row.get::<_, String>(0)
                })
                .optional()
                .map_err(|err| db_error(&err))
            })
            .await?;
        Ok(found.map(JobSpecId::new))
    }

    async fn load_job(&self, id: &JobSpecId) -> Result<Option<JobRecord>, StoreError> {
        let id = id.clone();
        let record = self
            .run(move |tx| {
                let row = tx
                    .query_row(
                        "SELECT spec_json, spec_hash, status, idempotency_key, created_at, \
                         updated_at FROM jobs WHERE id = ?1",
                        params![id.as_str()],
                        |row| {
                            Ok(StoredJob {
                                spec_json: row.get(0)?,
                                spec_hash: row.get(1)?,
                                status: row.get(2)?,
                                idempotency_key: row.get(3)?,
                                created_at: row.get(4)?,
                                updated_at: row.get(5)?,
                            })
                        },
                    )
                    .optional()
                    .map_err(|err| db_error(&err))?;
                row.map(|stored| stored.into_record(id)).transpose()
            })
            .await?;
        Ok(record)
    }

    async fn update_job_status(
        &self,
        id: &JobSpecId,
        status: JobStatus,
    ) -> Result<(), StoreError> {
        let id = id.clone();
        let now = format_rfc3339(now_utc());
        self.run(move |tx| {
            let changed = tx
                .execute(
                    "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), now, id.as_str()],
                )
                .map_err(|err| db_error(&err))?;
            if changed == 0 {
                return Err(SqliteStoreError::Invalid(format!("unknown job {id}")));
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn save_execution(&self, execution: &CrossRegionExecution) -> Result<(), StoreError> {
        let (execution_json, execution_hash) = encode_payload(execution)?;
        let id = execution.jobspec_id.clone();
        let now = now_millis();
        self.run(move |tx| {
            if !job_exists(tx, id.as_str())? {
                return Err(SqliteStoreError::Invalid(format!("unknown job {id}")));
            }
            tx.execute(
                "INSERT INTO executions (job_id, execution_json, execution_hash, saved_at_ms) \
                 VALUES (?1, ?2, ?3, ?4) ON CONFLICT(job_id) DO UPDATE SET execution_json = \
                 excluded.execution_json, execution_hash = excluded.execution_hash, saved_at_ms \
                 = excluded.saved_at_ms",
                params![id.as_str(), execution_json, execution_hash, now],
            )
            .map_err(|err| db_error(&err))?;
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn load_execution(
        &self,
        id: &JobSpecId,
    ) -> Result<Option<CrossRegionExecution>, StoreError> {
        let id = id.clone();
        let execution = self
            .run(move |tx| {
                let row: Option<(Vec<u8>, String)> = tx
                    .query_row(
                        "SELECT execution_json, execution_hash FROM executions WHERE job_id = ?1",
                        params![id.as_str()],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()
                    .map_err(|err| db_error(&err))?;
                row.map(|(bytes, hash)| decode_payload("execution", &bytes, &hash)).transpose()
            })
            .await?;
        Ok(execution)
    }

    async fn save_receipt(&self, receipt: &Receipt) -> Result<(), StoreError> {
        let (receipt_json, receipt_hash) = encode_payload(receipt)?;
        let job_id = receipt.jobspec_id.clone();
        let receipt_id = receipt.id.to_string();
        self.run(move |tx| {
            let inserted = tx.execute(
                "INSERT INTO receipts (job_id, receipt_id, receipt_json, receipt_hash) VALUES \
                 (?1, ?2, ?3, ?4)",
                params![job_id.as_str(), receipt_id, receipt_json, receipt_hash],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.code == ErrorCode::ConstraintViolation =>
                {
                    Err(SqliteStoreError::Conflict(format!("receipt {receipt_id} already stored")))
                }
                Err(err) => Err(db_error(&err)),
            }
        })
        .await?;
        Ok(())
    }

    async fn list_receipts(&self, id: &JobSpecId) -> Result<Vec<Receipt>, StoreError> {
        let id = id.clone();
        let receipts = self
            .run(move |tx| {
                let mut statement = tx
                    .prepare(
                        "SELECT receipt_json, receipt_hash FROM receipts WHERE job_id = ?1 ORDER \
                         BY seq ASC",
                    )
                    .map_err(|err| db_error(&err))?;
                let rows = statement
                    .query_map(params![id.as_str()], |row| {
                        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(|err| db_error(&err))?;
                let mut receipts = Vec::new();
                for row in rows {
                    let (bytes, hash) = row.map_err(|err| db_error(&err))?;
                    receipts.push(decode_payload("receipt", &bytes, &hash)?);
                }
                Ok(receipts)
            })
            .await?;
        Ok(receipts)
    }
}

/// Raw job row.
struct StoredJob {
    /// Canonical spec JSON.
    spec_json: Vec<u8>,
    /// Stored spec digest.
    spec_hash: String,
    /// Status label.
    status: String,
    /// Idempotency key.
    idempotency_key: Option<String>,
    /// RFC 3339 creation time.
    created_at: String,
    /// RFC 3339 update time.
    updated_at: String,
}

impl StoredJob {
    /// Verifies and decodes the row.
    fn into_record(self, id: JobSpecId) -> Result<JobRecord, SqliteStoreError> {
        let spec: JobSpec = decode_payload("job spec", &self.spec_json, &self.spec_hash)?;
        if spec.id != id {
            return Err(SqliteStoreError::Corrupt(format!("job {id} holds spec {}", spec.id)));
        }
        let status = JobStatus::parse(&self.status)
            .ok_or_else(|| SqliteStoreError::Corrupt(format!("unknown job status {}", self.status)))?;
        let created_at = parse_rfc3339(&self.created_at)
            .map_err(|_| SqliteStoreError::Corrupt("invalid created_at".to_string()))?;
        let updated_at = parse_rfc3339(&self.updated_at)
            .map_err(|_| SqliteStoreError::Corrupt("invalid updated_at".to_string()))?;
        Ok(JobRecord {
            id,
            spec,
            status,
            idempotency_key: self.idempotency_key,
            created_at,
            updated_at,
        })
    }
}

// ============================================================================
// SECTION: Fast Store
// ============================================================================

#[async_trait]
impl FastStore for SqliteRunnerStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, FastStoreError> {
        let key = key.to_string();
        let now = now_millis();
        let expires_at = now.saturating_add(ttl_millis(ttl));
        let stored = self
            .run(move |tx| {
                purge_key(tx, &key, now)?;
                let inserted = tx
                    .execute(
                        "INSERT INTO fast_keys (key, value, expires_at_ms) VALUES (?1, 1, ?2) ON \
                         CONFLICT(key) DO NOTHING",
                        params![key, expires_at],
                    )
                    .map_err(|err| db_error(&err))?;
                Ok(inserted == 1)
            })
            .await?;
        Ok(stored)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, FastStoreError> {
        let key = key.to_string();
        let now = now_millis();
        let expires_at = now.saturating_add(ttl_millis(ttl));
        let value = self
            .run(move |tx| {
                purge_key(tx, &key, now)?;
                tx.execute(
                    "INSERT INTO fast_keys (key, value, expires_at_ms) VALUES (?1, 1, ?2) ON \
                     CONFLICT(key) DO UPDATE SET value = value + 1",
                    params![key, expires_at],
                )
                .map_err(|err| db_error(&err))?;
                read_counter(tx, &key)
            })
            .await?;
        Ok(value)
    }

    async fn counter(&self, key: &str) -> Result<u64, FastStoreError> {
        let key = key.to_string();
        let now = now_millis();
        let value = self
            .run(move |tx| {
                purge_key(tx, &key, now)?;
                read_counter(tx, &key)
            })
            .await?;
        Ok(value)
    }
}

/// Deletes `key` when it has expired.
fn purge_key(tx: &Transaction<'_>, key: &str, now: i64) -> Result<(), SqliteStoreError> {
    tx.execute("DELETE FROM fast_keys WHERE key = ?1 AND expires_at_ms <= ?2", params![key, now])
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Reads a live counter value (0 when absent).
fn read_counter(tx: &Transaction<'_>, key: &str) -> Result<u64, SqliteStoreError> {
    let value: Option<i64> = tx
        .query_row("SELECT value FROM fast_keys WHERE key = ?1", params![key], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    value.map_or(Ok(0), |value| {
        u64::try_from(value).map_err(|_| SqliteStoreError::Corrupt("negative counter".to_string()))
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns whether a job row exists.
fn job_exists(tx: &Transaction<'_>, id: &str) -> Result<bool, SqliteStoreError> {
    tx.query_row("SELECT 1 FROM jobs WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|row| row.is_some())
        .map_err(|err| db_error(&err))
}

/// Encodes a payload as canonical JSON with its prefixed digest.
fn encode_payload<T: Serialize>(value: &T) -> Result<(Vec<u8>, String), SqliteStoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_PAYLOAD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let hash = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes).prefixed();
    Ok((bytes, hash))
}

/// Verifies a stored digest, then decodes the payload.
fn decode_payload<T: DeserializeOwned>(
    label: &str,
    bytes: &[u8],
    stored_hash: &str,
) -> Result<T, SqliteStoreError> {
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_PAYLOAD_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let actual = hash_bytes(DEFAULT_HASH_ALGORITHM, bytes).prefixed();
    if actual != stored_hash {
        return Err(SqliteStoreError::Corrupt(format!("{label} hash mismatch")));
    }
    serde_json::from_slice(bytes)
        .map_err(|err| SqliteStoreError::Corrupt(format!("{label} decode failed: {err}")))
}

/// Returns the wall-clock time in unix milliseconds.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

/// Converts a TTL to milliseconds, saturating.
fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    spec_json BLOB NOT NULL,
                    spec_hash TEXT NOT NULL,
                    status TEXT NOT NULL,
                    idempotency_key TEXT UNIQUE,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS executions (
                    job_id TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
                    execution_json BLOB NOT NULL,
                    execution_hash TEXT NOT NULL,
                    saved_at_ms INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS receipts (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id TEXT NOT NULL,
                    receipt_id TEXT NOT NULL UNIQUE,
                    receipt_json BLOB NOT NULL,
                    receipt_hash TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_receipts_job_id ON receipts (job_id, seq);
                CREATE TABLE IF NOT EXISTS fast_keys (
                    key TEXT PRIMARY KEY,
                    value INTEGER NOT NULL,
                    expires_at_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_fast_keys_expiry ON fast_keys (expires_at_ms);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}
