// src/region_map.rs
// Region code -> pricing service location name

use once_cell::sync::Lazy;
use std::collections::HashMap;

static REGION_LOCATIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("us-east-1", "US East (N. Virginia)"),
        ("us-east-2", "US East (Ohio)"),
        ("us-west-1", "US West (N. California)"),
        ("us-west-2", "US West (Oregon)"),
        ("af-south-1", "Africa (Cape Town)"),
        ("ap-east-1", "Asia Pacific (Hong Kong)"),
        ("ap-south-1", "Asia Pacific (Mumbai)"),
        ("ap-south-2", "Asia Pacific (Hyderabad)"),
        ("ap-northeast-1", "Asia Pacific (Tokyo)"),
        ("ap-northeast-2", "Asia Pacific (Seoul)"),
        ("ap-northeast-3", "Asia Pacific (Osaka)"),
        ("ap-southeast-1", "Asia Pacific (Singapore)"),
        ("ap-southeast-2", "Asia Pacific (Sydney)"),
        ("ap-southeast-3", "Asia Pacific (Jakarta)"),
        ("ap-southeast-4", "Asia Pacific (Melbourne)"),
        ("ca-central-1", "Canada (Central)"),
        ("eu-central-1", "EU (Frankfurt)"),
        ("eu-central-2", "EU (Zurich)"),
        ("eu-west-1", "EU (Ireland)"),
        ("eu-west-2", "EU (London)"),
        ("eu-west-3", "EU (Paris)"),
        ("eu-north-1", "EU (Stockholm)"),
        ("eu-south-1", "EU (Milan)"),
        ("eu-south-2", "EU (Spain)"),
        ("me-south-1", "Middle East (Bahrain)"),
        ("me-central-1", "Middle East (UAE)"),
        ("il-central-1", "Israel (Tel Aviv)"),
        ("sa-east-1", "South America (Sao Paulo)"),
    ])
});

/// Maps region codes to the location names the pricing service filters on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationResolver {
    identity_fallback: bool,
}

impl LocationResolver {
    pub fn new(identity_fallback: bool) -> Self {
        Self { identity_fallback }
    }

    /// Location name for `region`. Unknown regions resolve to the code itself only when the
    /// identity fallback is enabled.
    pub fn resolve(&self, region: &str) -> Option<String> {
        match REGION_LOCATIONS.get(region) {
            Some(location) => Some((*location).to_string()),
            None if self.identity_fallback => Some(region.to_string()),
            None => None,
        }
    }

    pub fn known_regions() -> Vec<&'static str> {
        let mut regions: Vec<_> = REGION_LOCATIONS.keys().copied().collect();
        regions.sort_unstable();
        regions
    }
}
