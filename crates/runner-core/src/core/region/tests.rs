// crates/runner-core/src/core/region/tests.rs
// ============================================================================
// Module: Region Bucket Tests
// Description: Unit tests for geo bucketing and target resolution.
// Dependencies: runner-core
// ============================================================================

//! ## Overview
//! Country `US` wins over continent; APAC targets share the Asia bucket.

use super::RegionBucket;
use super::is_supported_region;

#[test]
fn geo_locations_map_to_buckets() {
    assert_eq!(RegionBucket::from_geo("US", "NA"), RegionBucket::Us);
    assert_eq!(RegionBucket::from_geo("us", "EU"), RegionBucket::Us);
    assert_eq!(RegionBucket::from_geo("DE", "EU"), RegionBucket::Eu);
    assert_eq!(RegionBucket::from_geo("JP", "as"), RegionBucket::Asia);
    assert_eq!(RegionBucket::from_geo("CA", "NA"), RegionBucket::Other);
    assert_eq!(RegionBucket::from_geo("BR", "SA"), RegionBucket::Other);
}

#[test]
fn targets_resolve_to_buckets() {
    assert!(RegionBucket::Asia.matches_target("APAC"));
    assert!(RegionBucket::Asia.matches_target("ASIA"));
    assert!(!RegionBucket::Other.matches_target("US"));
    assert_eq!(RegionBucket::from_target("MARS"), None);
    assert!(is_supported_region("EU"));
    assert!(!is_supported_region("eu"));
}
