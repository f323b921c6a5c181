// crates/runner-core/src/runtime/fast_store.rs
// ============================================================================
// Module: In-Memory Fast Store
// Description: TTL-aware counters and set-if-absent keys held in process.
// Purpose: Back replay and rate-limit protection without an external store.
// Dependencies: tokio, crate::interfaces
// ============================================================================

//! ## Overview
//! Expiry uses the tokio clock so paused-time tests can advance past TTLs.
//! The store can be switched offline to exercise fail-closed behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::interfaces::FastStore;
use crate::interfaces::FastStoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Stored value with its expiry.
#[derive(Debug, Clone, Copy)]
struct Entry {
    /// Counter value (1 for set-if-absent keys).
    value: u64,
    /// Expiry instant.
    expires_at: Instant,
}

/// In-memory [`FastStore`].
#[derive(Debug)]
pub struct InMemoryFastStore {
    /// Live entries.
    entries: Mutex<BTreeMap<String, Entry>>,
    /// Availability switch.
    online: AtomicBool,
}

impl Default for InMemoryFastStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFastStore {
    /// Creates an empty, online store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Marks the store reachable or unreachable.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Runs `op` over live entries, purging the key if it expired.
    fn with_entries<T>(
        &self,
        key: &str,
        op: impl FnOnce(&mut BTreeMap<String, Entry>, Instant) -> T,
    ) -> Result<T, FastStoreError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(FastStoreError::Unavailable("fast store offline".to_string()));
        }
        let now = Instant::now();
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| FastStoreError::Unavailable("fast store mutex poisoned".to_string()))?;
        if guard.get(key).is_some_and(|entry| entry.expires_at <= now) {
            guard.remove(key);
        }
        Ok(op(&mut guard, now))
    }
}

#[async_trait]
impl FastStore for InMemoryFastStore {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, FastStoreError> {
        self.with_entries(key, |entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: 1,
                    expires_at: now + ttl,
                },
            );
            true
        })
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, FastStoreError> {
        self.with_entries(key, |entries, now| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: 0,
                expires_at: now + ttl,
            });
            entry.value = entry.value.saturating_add(1);
            entry.value
        })
    }

    async fn counter(&self, key: &str) -> Result<u64, FastStoreError> {
        self.with_entries(key, |entries, _| entries.get(key).map_or(0, |entry| entry.value))
    }
}
