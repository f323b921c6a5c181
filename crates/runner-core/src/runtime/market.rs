// crates/runner-core/src/runtime/market.rs
// ============================================================================
// Module: Static Offer Market
// Description: Scripted offer streams keyed by target region.
// Purpose: Drive negotiation from fixed offers in tests and local runs.
// Dependencies: tokio, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Each scripted item carries an arrival offset measured from subscription.
//! An item that would arrive after the caller's deadline stays queued, so a
//! later phase with a longer deadline can still receive it. A source marked
//! `hold_open` waits out the deadline once drained instead of reporting
//! exhaustion, which models a live market that stops producing offers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::core::DemandSpec;
use crate::core::Offer;
use crate::interfaces::OfferMarket;
use crate::interfaces::OfferSource;
use crate::interfaces::OfferSourceError;

// ============================================================================
// SECTION: Scripts
// ============================================================================

/// One scripted stream item.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedOffer {
    /// Arrival offset from subscription.
    pub at: Duration,
    /// Offer or read error.
    pub item: Result<Offer, OfferSourceError>,
}

impl ScriptedOffer {
    /// Offer arriving at `at`.
    #[must_use]
    pub const fn offer(at: Duration, offer: Offer) -> Self {
        Self {
            at,
            item: Ok(offer),
        }
    }

    /// Read error arriving at `at`.
    #[must_use]
    pub fn error(at: Duration, message: impl Into<String>) -> Self {
        Self {
            at,
            item: Err(OfferSourceError::InvalidOffer(message.into())),
        }
    }
}

/// Script and behavior for one region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionScript {
    /// Items in arrival order.
    pub items: Vec<ScriptedOffer>,
    /// Wait for the deadline once drained.
    pub hold_open: bool,
    /// Reject subscription with this message.
    pub subscribe_error: Option<String>,
}

// ============================================================================
// SECTION: Market
// ============================================================================

/// [`OfferMarket`] serving scripted streams per demand region.
#[derive(Debug, Default)]
pub struct StaticOfferMarket {
    /// Scripts by region.
    scripts: BTreeMap<String, RegionScript>,
    /// Demands received, in subscription order.
    demands: Mutex<Vec<DemandSpec>>,
}

impl StaticOfferMarket {
    /// Creates an empty market; unknown regions get an exhausted stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the script for `region`.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>, script: RegionScript) -> Self {
        self.scripts.insert(region.into(), script);
        self
    }

    /// Returns the demands published so far.
    #[must_use]
    pub fn demands(&self) -> Vec<DemandSpec> {
        self.demands.lock().map(|guard| guard.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl OfferMarket for StaticOfferMarket {
    async fn subscribe(&self, demand: &DemandSpec) -> Result<Box<dyn OfferSource>, OfferSourceError> {
        if let Ok(mut guard) = self.demands.lock() {
            guard.push(demand.clone());
        }
        let script = self.scripts.get(&demand.region).cloned().unwrap_or_default();
        if let Some(message) = script.subscribe_error {
            return Err(OfferSourceError::Unavailable(message));
        }
        Ok(Box::new(StaticOfferSource::new(script.items, script.hold_open)))
    }
}

// ============================================================================
// SECTION: Source
// ============================================================================

/// Scripted [`OfferSource`].
#[derive(Debug)]
pub struct StaticOfferSource {
    /// Subscription instant.
    opened_at: Instant,
    /// Remaining items.
    items: Mutex<VecDeque<ScriptedOffer>>,
    /// Wait for the deadline once drained.
    hold_open: bool,
}

impl StaticOfferSource {
    /// Opens a source whose offsets count from now.
    #[must_use]
    pub fn new(items: Vec<ScriptedOffer>, hold_open: bool) -> Self {
        Self {
            opened_at: Instant::now(),
            items: Mutex::new(items.into()),
            hold_open,
        }
    }

    /// Returns the arrival instant of the next item.
    fn next_arrival(&self) -> Result<Option<Instant>, OfferSourceError> {
        let guard = self
            .items
            .lock()
            .map_err(|_| OfferSourceError::Unavailable("offer source mutex poisoned".to_string()))?;
        Ok(guard.front().map(|item| self.opened_at + item.at))
    }

    /// Pops the next item.
    fn pop(&self) -> Result<Option<ScriptedOffer>, OfferSourceError> {
        let mut guard = self
            .items
            .lock()
            .map_err(|_| OfferSourceError::Unavailable("offer source mutex poisoned".to_string()))?;
        Ok(guard.pop_front())
    }
}

#[async_trait]
impl OfferSource for StaticOfferSource {
    async fn next_offer(&self, deadline: Instant) -> Result<Option<Offer>, OfferSourceError> {
        let Some(arrival) = self.next_arrival()? else {
            if self.hold_open {
                tokio::time::sleep_until(deadline).await;
            }
            return Ok(None);
        };
        if arrival > deadline {
            tokio::time::sleep_until(deadline).await;
            return Ok(None);
        }
        tokio::time::sleep_until(arrival).await;
        match self.pop()? {
            Some(scripted) => scripted.item.map(Some),
            None => Ok(None),
        }
    }
}
