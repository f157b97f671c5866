//! Group synthesis
//!
//! Buckets aggregated records by region and emits the selection graph:
//! `GLOBAL`, manual select, auto select, fallback, then one select group per
//! region, regions ordered by descending size.

use crate::proxy::country::{classify, GeoCache, Region};
use crate::proxy::models::{ProxyGroup, ProxyRecord};
use std::collections::HashMap;

pub const DIRECT: &str = "DIRECT";
pub const REJECT: &str = "REJECT";

const DEFAULT_HEALTH_CHECK_URL: &str = "http://www.gstatic.com/generate_204";
const DEFAULT_INTERVAL_SECS: u32 = 300;
const DEFAULT_TOLERANCE_MS: u32 = 50;

/// Names and health-check settings of the generated groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub global_name: String,
    pub manual_name: String,
    pub auto_name: String,
    pub fallback_name: String,
    /// Probe URL for url-test and fallback groups
    pub health_check_url: String,
    /// Probe interval in seconds
    pub interval: u32,
    /// url-test tolerance in milliseconds
    pub tolerance: u32,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            global_name: "GLOBAL".to_string(),
            manual_name: "🚀 Manual Select".to_string(),
            auto_name: "♻️ Auto Select".to_string(),
            fallback_name: "🔯 Fallback".to_string(),
            health_check_url: DEFAULT_HEALTH_CHECK_URL.to_string(),
            interval: DEFAULT_INTERVAL_SECS,
            tolerance: DEFAULT_TOLERANCE_MS,
        }
    }
}

impl GroupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_health_check_url(mut self, url: String) -> Self {
        self.health_check_url = url;
        self
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_manual_name(mut self, name: String) -> Self {
        self.manual_name = name;
        self
    }
}

/// Record names of one region, in aggregation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryBucket {
    pub region: Region,
    pub members: Vec<String>,
}

impl CountryBucket {
    pub fn label(&self) -> &'static str {
        self.region.label()
    }
}

/// Bucket records by region, largest bucket first, ties in discovery order
pub fn bucket(records: &[ProxyRecord], mut geo: Option<&mut GeoCache<'_>>) -> Vec<CountryBucket> {
    let mut buckets: Vec<CountryBucket> = Vec::new();
    let mut index: HashMap<Region, usize> = HashMap::new();

    for record in records {
        let region = classify(&record.name, Some(&record.server), geo.as_deref_mut());
        let slot = *index.entry(region).or_insert_with(|| {
            buckets.push(CountryBucket {
                region,
                members: Vec::new(),
            });
            buckets.len() - 1
        });
        buckets[slot].members.push(record.name.clone());
    }

    // sort_by is stable
    buckets.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
    buckets
}

/// Build the selection graph for `records`; no records, no groups
pub fn synthesize(
    records: &[ProxyRecord],
    config: &GroupConfig,
    geo: Option<&mut GeoCache<'_>>,
) -> Vec<ProxyGroup> {
    if records.is_empty() {
        return Vec::new();
    }

    let buckets = bucket(records, geo);
    let labels: Vec<String> = buckets.iter().map(|b| b.label().to_string()).collect();

    let mut global = vec![
        DIRECT.to_string(),
        REJECT.to_string(),
        config.manual_name.clone(),
        config.auto_name.clone(),
        config.fallback_name.clone(),
    ];
    global.extend(labels.iter().cloned());

    let mut manual = vec![DIRECT.to_string(), REJECT.to_string()];
    manual.extend(labels.iter().cloned());

    let mut groups = vec![
        ProxyGroup::select(config.global_name.clone(), global),
        ProxyGroup::select(config.manual_name.clone(), manual),
        ProxyGroup::url_test(
            config.auto_name.clone(),
            labels.clone(),
            config.health_check_url.clone(),
            config.interval,
            config.tolerance,
        ),
        ProxyGroup::fallback(
            config.fallback_name.clone(),
            labels,
            config.health_check_url.clone(),
            config.interval,
        ),
    ];

    groups.extend(
        buckets
            .into_iter()
            .map(|b| ProxyGroup::select(b.label(), b.members)),
    );
    groups
}
