// crates/runner-core/src/negotiation/negotiator.rs
// ============================================================================
// Module: Region Negotiator
// Description: Strict-then-relax acquisition of one verified region.
// Purpose: Combine the offer filter and preflight prober under phase deadlines.
// Dependencies: tokio, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Each target region moves through `Strict -> Relax -> Acquired | Failed`.
//! The strict phase accepts only declared matches. The relax phase starts
//! when the strict phase ends without a match and probes every offer it
//! reads. Each phase ends at its deadline or when the source reports
//! exhaustion; source errors are retried after a short pause until the
//! deadline. Deadlines use the tokio clock.
//!
//! [`RegionNegotiation::acquire_all`] runs one independent task per region.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::core::Offer;
use crate::core::RegionBucket;
use crate::core::RegionRequest;
use crate::core::RegionVerification;
use crate::core::clock::now_utc;
use crate::interfaces::OfferMarket;
use crate::interfaces::OfferSource;
use crate::negotiation::demand::DemandBuilder;
use crate::negotiation::demand::DemandError;
use crate::negotiation::filter::OfferFilter;
use crate::negotiation::probe::PreflightProber;
use crate::negotiation::telemetry::NegotiationOutcome;
use crate::negotiation::telemetry::NegotiationTelemetry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pause after an offer source error before reading again.
pub const SOURCE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Acquired region.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    /// Target region.
    pub region: String,
    /// Accepted offer.
    pub offer: Offer,
    /// Verification record.
    pub verification: RegionVerification,
    /// Outcome label.
    pub outcome: NegotiationOutcome,
}

/// Region negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// Both phases ended without a verified offer.
    #[error("no matching offers for region {region} within the negotiation window")]
    NoMatch {
        /// Target region.
        region: String,
    },
    /// Market subscription failed.
    #[error("offer market error for region {region}: {message}")]
    Market {
        /// Target region.
        region: String,
        /// Market error detail.
        message: String,
    },
    /// Request could not be turned into a demand.
    #[error("invalid demand for region {region}: {source}")]
    Demand {
        /// Target region.
        region: String,
        /// Demand error.
        source: DemandError,
    },
}

// ============================================================================
// SECTION: Negotiator
// ============================================================================

/// Single-region negotiator.
pub struct Negotiator {
    /// Declared-region filter.
    filter: OfferFilter,
    /// Relax-phase prober.
    prober: PreflightProber,
    /// Shared counters.
    telemetry: Arc<NegotiationTelemetry>,
}

impl Negotiator {
    /// Creates a negotiator.
    #[must_use]
    pub fn new(prober: PreflightProber) -> Self {
        Self {
            filter: OfferFilter,
            prober,
            telemetry: Arc::new(NegotiationTelemetry::default()),
        }
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn telemetry(&self) -> Arc<NegotiationTelemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Acquires one verified offer for `request` from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::NoMatch`] when both phases end without a
    /// verified offer.
    pub async fn acquire(
        &self,
        request: &RegionRequest,
        source: &dyn OfferSource,
    ) -> Result<Acquisition, NegotiationError> {
        let strict_deadline = Instant::now() + request.strict_timeout;
        if let Some(acquisition) = self.strict_phase(request, source, strict_deadline).await {
            self.telemetry.outcome(NegotiationOutcome::StrictMatch);
            return Ok(acquisition);
        }
        let relax_deadline = Instant::now() + request.relax_timeout;
        if let Some(acquisition) = self.relax_phase(request, source, relax_deadline).await {
            self.telemetry.outcome(NegotiationOutcome::ProbeVerified);
            return Ok(acquisition);
        }
        self.telemetry.outcome(NegotiationOutcome::NoMatch);
        Err(NegotiationError::NoMatch {
            region: request.region.clone(),
        })
    }

    /// Reads offers until a declared match or the deadline.
    async fn strict_phase(
        &self,
        request: &RegionRequest,
        source: &dyn OfferSource,
        deadline: Instant,
    ) -> Option<Acquisition> {
        while let Some(offer) = read_offer(source, deadline).await {
            self.telemetry.offer_seen();
            let classification = self.filter.classify(&offer, &request.region);
            if classification.level.is_declared() {
                self.telemetry.strict_match();
                let verification = RegionVerification::declared(&request.region, &offer.reference);
                return Some(Acquisition {
                    region: request.region.clone(),
                    offer,
                    verification,
                    outcome: NegotiationOutcome::StrictMatch,
                });
            }
        }
        None
    }

    /// Probes offers until one resolves to the target bucket or the deadline.
    async fn relax_phase(
        &self,
        request: &RegionRequest,
        source: &dyn OfferSource,
        deadline: Instant,
    ) -> Option<Acquisition> {
        let target = RegionBucket::from_target(&request.region)?;
        while let Some(offer) = read_offer(source, deadline).await {
            self.telemetry.offer_seen();
            self.telemetry.needs_probe();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let probe = tokio::time::timeout(remaining, self.prober.probe(&offer, now_utc())).await;
            match probe {
                Ok(Ok(evidence)) if evidence.bucket == target => {
                    self.telemetry.probe_passed();
                    let verification =
                        RegionVerification::probed(&request.region, &offer.reference, evidence);
                    return Some(Acquisition {
                        region: request.region.clone(),
                        offer,
                        verification,
                        outcome: NegotiationOutcome::ProbeVerified,
                    });
                }
                Ok(_) => self.telemetry.probe_failed(),
                Err(_) => {
                    self.telemetry.probe_failed();
                    return None;
                }
            }
        }
        None
    }
}

/// Reads the next offer before `deadline`.
///
/// Returns `None` at the deadline or when the source is exhausted.
async fn read_offer(source: &dyn OfferSource, deadline: Instant) -> Option<Offer> {
    loop {
        if Instant::now() >= deadline {
            return None;
        }
        match tokio::time::timeout_at(deadline, source.next_offer(deadline)).await {
            Err(_) | Ok(Ok(None)) => return None,
            Ok(Ok(Some(offer))) => return Some(offer),
            Ok(Err(_)) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::time::sleep(SOURCE_ERROR_BACKOFF.min(remaining)).await;
            }
        }
    }
}

// ============================================================================
// SECTION: Multi-Region Negotiation
// ============================================================================

/// Negotiation result for one target region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAcquisition {
    /// Target region.
    pub region: String,
    /// Acquisition or failure.
    pub result: Result<Acquisition, NegotiationError>,
}

/// Runs negotiation for every target region concurrently.
#[derive(Clone)]
pub struct RegionNegotiation {
    /// Capacity market.
    market: Arc<dyn OfferMarket>,
    /// Shared negotiator.
    negotiator: Arc<Negotiator>,
    /// Demand builder.
    demand: DemandBuilder,
}

impl RegionNegotiation {
    /// Creates the multi-region negotiation service.
    #[must_use]
    pub fn new(market: Arc<dyn OfferMarket>, negotiator: Arc<Negotiator>) -> Self {
        Self {
            market,
            negotiator,
            demand: DemandBuilder,
        }
    }

    /// Returns the negotiator counters.
    #[must_use]
    pub fn telemetry(&self) -> Arc<NegotiationTelemetry> {
        self.negotiator.telemetry()
    }

    /// Negotiates every request in its own task and returns results in
    /// request order.
    pub async fn acquire_all(&self, requests: Vec<RegionRequest>) -> Vec<RegionAcquisition> {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let region = request.region.clone();
                let market = Arc::clone(&self.market);
                let negotiator = Arc::clone(&self.negotiator);
                let demand = self.demand;
                let handle = tokio::spawn(async move {
                    acquire_region(market.as_ref(), &negotiator, demand, &request).await
                });
                (region, handle)
            })
            .collect();
        let mut results = Vec::with_capacity(handles.len());
        for (region, handle) in handles {
            let result = handle.await.unwrap_or_else(|err| {
                Err(NegotiationError::Market {
                    region: region.clone(),
                    message: format!("negotiation task failed: {err}"),
                })
            });
            results.push(RegionAcquisition {
                region,
                result,
            });
        }
        results
    }
}

/// Publishes the demand for one region and negotiates on its offer stream.
async fn acquire_region(
    market: &dyn OfferMarket,
    negotiator: &Negotiator,
    demand: DemandBuilder,
    request: &RegionRequest,
) -> Result<Acquisition, NegotiationError> {
    let spec = demand.build(request).map_err(|source| NegotiationError::Demand {
        region: request.region.clone(),
        source,
    })?;
    let source = market.subscribe(&spec).await.map_err(|err| NegotiationError::Market {
        region: request.region.clone(),
        message: err.to_string(),
    })?;
    negotiator.acquire(request, source.as_ref()).await
}
