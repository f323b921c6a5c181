// crates/runner-core/src/gate/trust.rs
// ============================================================================
// Module: Trust Evaluation
// Description: Validated allow-list snapshots and atomic snapshot swaps.
// Purpose: Decide whether a signer key is currently trusted.
// Dependencies: base64, ed25519-dalek, time, tokio
// ============================================================================

//! ## Overview
//! An [`AllowList`] is built from raw entries in one pass and is rejected as
//! a whole when any entry is malformed. [`TrustStore`] holds the active
//! snapshot behind an `Arc` that readers clone; reloads build a new snapshot
//! and swap it in, so evaluation never observes a partially loaded list.
//! A store that has never loaded evaluates every key as unknown.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::audit::AuditSink;
use crate::audit::TrustAuditEvent;
use crate::core::AllowListEntry;
use crate::core::KeyId;
use crate::core::KeyStatus;
use crate::core::TrustDecision;
use crate::core::clock::parse_rfc3339;
use crate::core::signing::decode_public_key;
use crate::interfaces::AllowListSource;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default interval between allow-list reloads.
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Allow-list validation and loading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrustError {
    /// Entry is missing its key identifier.
    #[error("allow-list entry {index} is missing kid")]
    MissingKid {
        /// Entry position.
        index: usize,
    },
    /// Entry is missing its public key.
    #[error("allow-list entry {kid} is missing public_key")]
    MissingKey {
        /// Key identifier.
        kid: String,
    },
    /// Public key is not a valid base64 Ed25519 key.
    #[error("allow-list entry {kid} has an invalid public_key")]
    InvalidKey {
        /// Key identifier.
        kid: String,
    },
    /// Key identifier appears more than once.
    #[error("duplicate allow-list kid: {kid}")]
    DuplicateKid {
        /// Key identifier.
        kid: String,
    },
    /// Key material appears under more than one kid.
    #[error("allow-list entry {kid} duplicates key material")]
    DuplicateKey {
        /// Key identifier.
        kid: String,
    },
    /// Status label is not recognized.
    #[error("allow-list entry {kid} has invalid status: {status}")]
    InvalidStatus {
        /// Key identifier.
        kid: String,
        /// Raw status value.
        status: String,
    },
    /// Validity timestamp is not RFC 3339.
    #[error("allow-list entry {kid} has invalid {field}")]
    InvalidTime {
        /// Key identifier.
        kid: String,
        /// Field name.
        field: &'static str,
    },
    /// `not_before` is after `not_after`.
    #[error("allow-list entry {kid} has not_before after not_after")]
    InvertedWindow {
        /// Key identifier.
        kid: String,
    },
    /// Source could not be read.
    #[error("allow-list source error: {0}")]
    Source(String),
}

// ============================================================================
// SECTION: Allow-List Snapshot
// ============================================================================

/// Validated allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedKey {
    /// Key identifier.
    pub kid: KeyId,
    /// Key status.
    pub status: KeyStatus,
    /// Start of validity.
    pub not_before: Option<OffsetDateTime>,
    /// End of validity.
    pub not_after: Option<OffsetDateTime>,
}

/// Immutable, validated allow-list keyed by public key bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    /// Entries by decoded key bytes.
    keys: BTreeMap<[u8; 32], TrustedKey>,
}

impl AllowList {
    /// Returns an empty allow-list.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates raw entries into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first [`TrustError`] found; no partial list is produced.
    pub fn from_entries(entries: &[AllowListEntry]) -> Result<Self, TrustError> {
        let mut keys = BTreeMap::new();
        let mut kids = BTreeSet::new();
        for (index, entry) in entries.iter().enumerate() {
            let kid = entry.kid.trim();
            if kid.is_empty() {
                return Err(TrustError::MissingKid {
                    index,
                });
            }
            if entry.public_key.trim().is_empty() {
                return Err(TrustError::MissingKey {
                    kid: kid.to_string(),
                });
            }
            let verifying_key = decode_public_key(&entry.public_key).map_err(|_| {
                TrustError::InvalidKey {
                    kid: kid.to_string(),
                }
            })?;
            let status =
                KeyStatus::parse(&entry.status).ok_or_else(|| TrustError::InvalidStatus {
                    kid: kid.to_string(),
                    status: entry.status.clone(),
                })?;
            let not_before = parse_window_bound(kid, "not_before", entry.not_before.as_deref())?;
            let not_after = parse_window_bound(kid, "not_after", entry.not_after.as_deref())?;
            if let (Some(start), Some(end)) = (not_before, not_after)
                && start > end
            {
                return Err(TrustError::InvertedWindow {
                    kid: kid.to_string(),
                });
            }
            if !kids.insert(kid.to_string()) {
                return Err(TrustError::DuplicateKid {
                    kid: kid.to_string(),
                });
            }
            let trusted = TrustedKey {
                kid: KeyId::new(kid),
                status,
                not_before,
                not_after,
            };
            if keys.insert(verifying_key.to_bytes(), trusted).is_some() {
                return Err(TrustError::DuplicateKey {
                    kid: kid.to_string(),
                });
            }
        }
        Ok(Self {
            keys,
        })
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true when the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the entry for a base64 public key.
    #[must_use]
    pub fn lookup(&self, public_key_b64: &str) -> Option<&TrustedKey> {
        let key = decode_public_key(public_key_b64).ok()?;
        self.keys.get(key.as_bytes())
    }

    /// Evaluates a base64 public key at `now`.
    ///
    /// Order: unknown, revoked, not yet valid, expired, trusted.
    #[must_use]
    pub fn evaluate(&self, public_key_b64: &str, now: OffsetDateTime) -> TrustEvaluation {
        let Some(entry) = self.lookup(public_key_b64) else {
            return TrustEvaluation {
                decision: TrustDecision::Unknown,
                kid: None,
            };
        };
        let decision = if entry.status == KeyStatus::Revoked {
            TrustDecision::Revoked
        } else if entry.not_before.is_some_and(|start| now < start) {
            TrustDecision::NotYetValid
        } else if entry.not_after.is_some_and(|end| now > end) {
            TrustDecision::Expired
        } else {
            TrustDecision::Trusted
        };
        TrustEvaluation {
            decision,
            kid: Some(entry.kid.clone()),
        }
    }
}

/// Trust decision with the matched key identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustEvaluation {
    /// Decision.
    pub decision: TrustDecision,
    /// Matched key identifier; `None` for unknown keys.
    pub kid: Option<KeyId>,
}

// ============================================================================
// SECTION: Trust Store
// ============================================================================

/// Holder of the active allow-list snapshot.
///
/// # Invariants
/// - Snapshots are immutable; replacement is a single pointer swap.
#[derive(Debug, Default)]
pub struct TrustStore {
    /// Active snapshot.
    snapshot: RwLock<Arc<AllowList>>,
}

impl TrustStore {
    /// Creates a store holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `list`.
    #[must_use]
    pub fn with_list(list: AllowList) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(list)),
        }
    }

    /// Returns the active snapshot.
    ///
    /// A poisoned lock yields an empty snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<AllowList> {
        self.snapshot
            .read()
            .map_or_else(|_| Arc::new(AllowList::empty()), |guard| Arc::clone(&*guard))
    }

    /// Swaps in a new snapshot.
    pub fn replace(&self, list: AllowList) {
        let next = Arc::new(list);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Evaluates a key against the active snapshot.
    #[must_use]
    pub fn evaluate(&self, public_key_b64: &str, now: OffsetDateTime) -> TrustEvaluation {
        self.snapshot().evaluate(public_key_b64, now)
    }

    /// Loads `source` and swaps in the result.
    ///
    /// A failed load leaves the active snapshot untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TrustError`] when the source fails or an entry is invalid.
    pub async fn reload(
        &self,
        source: &dyn AllowListSource,
        audit: &dyn AuditSink,
    ) -> Result<usize, TrustError> {
        let result = match source.load().await {
            Ok(entries) => AllowList::from_entries(&entries),
            Err(err) => Err(TrustError::Source(err.to_string())),
        };
        match result {
            Ok(list) => {
                let count = list.len();
                self.replace(list);
                audit.record_trust(&TrustAuditEvent::reloaded(count));
                Ok(count)
            }
            Err(err) => {
                audit.record_trust(&TrustAuditEvent::reload_failed(
                    self.snapshot().len(),
                    err.to_string(),
                ));
                Err(err)
            }
        }
    }

    /// Spawns a task that reloads `source` every `interval`.
    ///
    /// The first load happens immediately.
    pub fn spawn_reloader(
        self: Arc<Self>,
        source: Arc<dyn AllowListSource>,
        audit: Arc<dyn AuditSink>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = self.reload(source.as_ref(), audit.as_ref()).await;
            }
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses an optional RFC 3339 validity bound.
fn parse_window_bound(
    kid: &str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<OffsetDateTime>, TrustError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => parse_rfc3339(value).map(Some).map_err(|_| TrustError::InvalidTime {
            kid: kid.to_string(),
            field,
        }),
    }
}
