// crates/runner-core/src/negotiation/demand.rs
// ============================================================================
// Module: Demand Builder
// Description: Translation of region requests into market demands.
// Purpose: Keep hard resource constraints separate from the soft region hint.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Resource and price limits are hard constraints the market enforces. The
//! region is only a hint; it is verified locally by the negotiator.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::DemandSpec;
use crate::core::RegionRequest;
use crate::core::offer::DEMAND_RUNTIME;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Demand construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DemandError {
    /// Request field is out of range.
    #[error("invalid region request: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds market demands from region requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemandBuilder;

impl DemandBuilder {
    /// Builds the demand for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`DemandError`] for empty regions, zero resources, or
    /// negative price caps.
    pub fn build(self, request: &RegionRequest) -> Result<DemandSpec, DemandError> {
        if request.region.trim().is_empty() {
            return Err(DemandError::Invalid("region is empty".to_string()));
        }
        if request.min_vcpu == 0 || request.min_mem_gib == 0 {
            return Err(DemandError::Invalid("resource minimums must be positive".to_string()));
        }
        for cap in [request.price_per_minute_max, request.total_price_cap].into_iter().flatten() {
            if !cap.is_finite() || cap < 0.0 {
                return Err(DemandError::Invalid("price caps must be non-negative".to_string()));
            }
        }
        Ok(DemandSpec {
            runtime: DEMAND_RUNTIME.to_string(),
            min_vcpu: request.min_vcpu,
            min_mem_gib: request.min_mem_gib,
            network_egress: request.network_egress,
            price_per_minute_max: request.price_per_minute_max,
            total_price_cap: request.total_price_cap,
            region: request.region.clone(),
        })
    }
}
