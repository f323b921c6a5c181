// crates/runner-server/src/sources.rs
// ============================================================================
// Module: Server Sources
// Description: File allow-list source, store receipt sink, catalog offer market.
// Purpose: Back core collaborator traits with configured local resources.
// Dependencies: runner-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`FileAllowListSource`] reads a JSON allow-list on every reload,
//! [`StoreReceiptSink`] persists signed receipts through a [`JobStore`], and
//! [`CatalogOfferMarket`] replays the configured offer catalog once per
//! negotiation phase.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use runner_core::Receipt;
use runner_core::core::AllowListEntry;
use runner_core::core::DemandSpec;
use runner_core::core::Offer;
use runner_core::interfaces::AllowListSource;
use runner_core::interfaces::AllowListSourceError;
use runner_core::interfaces::JobStore;
use runner_core::interfaces::OfferMarket;
use runner_core::interfaces::OfferSource;
use runner_core::interfaces::OfferSourceError;
use runner_core::interfaces::ReceiptSink;
use runner_core::interfaces::ReceiptSinkError;
use runner_core::interfaces::StoreError;
use serde::Deserialize;
use tokio::time::Instant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum allow-list file size.
pub const MAX_ALLOW_LIST_BYTES: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Allow-List File
// ============================================================================

/// Accepted allow-list file layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum AllowListFile {
    /// Bare array of entries.
    Entries(Vec<AllowListEntry>),
    /// Object wrapping the entries under `keys`.
    Wrapped {
        /// Entries.
        keys: Vec<AllowListEntry>,
    },
}

/// Allow-list stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileAllowListSource {
    /// File path.
    path: PathBuf,
}

impl FileAllowListSource {
    /// Creates a source for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }
}

#[async_trait]
impl AllowListSource for FileAllowListSource {
    async fn load(&self) -> Result<Vec<AllowListEntry>, AllowListSourceError> {
        let display = self.path.display();
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|err| AllowListSourceError::Unavailable(format!("{display}: {err}")))?;
        if metadata.len() > MAX_ALLOW_LIST_BYTES {
            return Err(AllowListSourceError::Invalid(format!(
                "{display}: allow-list exceeds {MAX_ALLOW_LIST_BYTES} bytes"
            )));
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|err| AllowListSourceError::Unavailable(format!("{display}: {err}")))?;
        let file: AllowListFile = serde_json::from_slice(&bytes)
            .map_err(|err| AllowListSourceError::Invalid(format!("{display}: {err}")))?;
        Ok(match file {
            AllowListFile::Entries(entries)
            | AllowListFile::Wrapped {
                keys: entries,
            } => entries,
        })
    }
}

// ============================================================================
// SECTION: Store Receipt Sink
// ============================================================================

/// Receipt sink that writes to the job store.
#[derive(Clone)]
pub struct StoreReceiptSink {
    /// Backing store.
    store: Arc<dyn JobStore>,
}

impl StoreReceiptSink {
    /// Creates a sink over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
        }
    }
}

#[async_trait]
impl ReceiptSink for StoreReceiptSink {
    fn name(&self) -> &'static str {
        "job_store"
    }

    async fn submit(&self, receipt: &Receipt) -> Result<(), ReceiptSinkError> {
        self.store.save_receipt(receipt).await.map_err(|err| match err {
            StoreError::Conflict(message) | StoreError::Invalid(message) => {
                ReceiptSinkError::Rejected(message)
            }
            other => ReceiptSinkError::Unavailable(other.to_string()),
        })
    }
}

// ============================================================================
// SECTION: Catalog Offer Market
// ============================================================================

/// Offer market backed by a fixed catalog.
///
/// Negotiation applies its own region and resource filters, so every
/// subscription sees the whole catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogOfferMarket {
    /// Catalog offers.
    offers: Arc<Vec<Offer>>,
}

impl CatalogOfferMarket {
    /// Creates a market over `offers`.
    #[must_use]
    pub fn new(offers: Vec<Offer>) -> Self {
        Self {
            offers: Arc::new(offers),
        }
    }
}

#[async_trait]
impl OfferMarket for CatalogOfferMarket {
    async fn subscribe(
        &self,
        _demand: &DemandSpec,
    ) -> Result<Box<dyn OfferSource>, OfferSourceError> {
        Ok(Box::new(CatalogOfferSource {
            offers: Arc::clone(&self.offers),
            cursor: Mutex::new(CatalogCursor::default()),
        }))
    }
}

/// Read position within one deadline window.
#[derive(Debug, Default)]
struct CatalogCursor {
    /// Deadline of the current window.
    window: Option<Instant>,
    /// Next catalog index.
    next: usize,
}

/// Catalog subscription.
///
/// Each distinct read deadline starts a new pass over the catalog, so the
/// relaxed phase sees the offers the strict phase passed over.
#[derive(Debug)]
struct CatalogOfferSource {
    /// Catalog offers.
    offers: Arc<Vec<Offer>>,
    /// Read position.
    cursor: Mutex<CatalogCursor>,
}

#[async_trait]
impl OfferSource for CatalogOfferSource {
    async fn next_offer(&self, deadline: Instant) -> Result<Option<Offer>, OfferSourceError> {
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| OfferSourceError::Unavailable("catalog cursor poisoned".to_string()))?;
        if cursor.window != Some(deadline) {
            cursor.window = Some(deadline);
            cursor.next = 0;
        }
        let offer = self.offers.get(cursor.next).cloned();
        if offer.is_some() {
            cursor.next += 1;
        }
        Ok(offer)
    }
}
