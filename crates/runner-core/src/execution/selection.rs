// crates/runner-core/src/execution/selection.rs
// ============================================================================
// Module: Provider Selection
// Description: Region matching, filter application, and provider ranking.
// Purpose: Choose which discovered providers may run a region attempt.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! A provider serves a target region when the leading token of its region
//! label (split on `-` or `_`) names the target, ignoring case: `US` matches
//! `us-east` but never `australia-southeast1`. Tokens resolve through the
//! region buckets, so `APAC` targets match `asia-*` providers and `ASIA`
//! targets match `apac-*`. Spec filters scoped to the region (or unscoped)
//! then apply whitelist, blacklist, minimum score, and price limits.
//! Candidates are ranked by success rate, then latency, then identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::core::ExecutionConstraints;
use crate::core::ProviderFilter;
use crate::core::ProviderId;
use crate::core::RegionBucket;
use crate::interfaces::ProviderInfo;

// ============================================================================
// SECTION: Selection
// ============================================================================

/// Returns true when `provider_region` serves `target`.
#[must_use]
pub fn region_matches(provider_region: &str, target: &str) -> bool {
    let target = target.trim();
    let Some(token) = provider_region.trim().split(['-', '_']).next() else {
        return false;
    };
    if target.is_empty() || token.is_empty() {
        return false;
    }
    if token.eq_ignore_ascii_case(target) {
        return true;
    }
    match (RegionBucket::from_target(token), RegionBucket::from_target(target)) {
        (Some(provider), Some(target)) => provider == target,
        _ => false,
    }
}

/// Returns healthy, filtered, ranked candidates for `region`.
#[must_use]
pub fn select_providers(
    providers: &[ProviderInfo],
    region: &str,
    constraints: &ExecutionConstraints,
) -> Vec<ProviderInfo> {
    let filters: Vec<&ProviderFilter> = constraints.filters_for(region).collect();
    let mut candidates: Vec<ProviderInfo> = providers
        .iter()
        .filter(|provider| provider.healthy && region_matches(&provider.region, region))
        .filter(|provider| filters.iter().all(|filter| passes_filter(provider, filter)))
        .cloned()
        .collect();
    candidates.sort_by(rank);
    candidates
}

/// Picks the best candidate that has not failed, falling back to the best
/// candidate overall.
#[must_use]
pub fn pick_provider<'a>(
    candidates: &'a [ProviderInfo],
    failed: &BTreeSet<ProviderId>,
) -> Option<&'a ProviderInfo> {
    candidates
        .iter()
        .find(|provider| !failed.contains(&provider.id))
        .or_else(|| candidates.first())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Applies one filter to a provider.
fn passes_filter(provider: &ProviderInfo, filter: &ProviderFilter) -> bool {
    let id = provider.id.as_str();
    if !filter.whitelist.is_empty() && !filter.whitelist.iter().any(|allowed| allowed == id) {
        return false;
    }
    if filter.blacklist.iter().any(|denied| denied == id) {
        return false;
    }
    if filter.min_score.is_some_and(|min| provider.success_rate < min) {
        return false;
    }
    if filter.max_price.is_some_and(|max| provider.cost_per_second > max) {
        return false;
    }
    true
}

/// Orders by success rate (desc), latency (asc), then identifier.
fn rank(left: &ProviderInfo, right: &ProviderInfo) -> Ordering {
    right
        .success_rate
        .total_cmp(&left.success_rate)
        .then_with(|| left.avg_latency_ms.cmp(&right.avg_latency_ms))
        .then_with(|| left.id.as_str().cmp(right.id.as_str()))
}
