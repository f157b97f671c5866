//! Aggregation engine
//!
//! Loads every source through a [`ContentProvider`], sniffs its records,
//! drops provider announcement entries and renames what is left with the
//! source prefix. A source that cannot be loaded is skipped, never fatal.

use crate::proxy::country::{rename, GeoCache};
use crate::proxy::error::{MergeError, SourceError};
use crate::proxy::models::{ProxyRecord, Source};
use crate::proxy::sniffer::sniff;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name fragments of informational entries (traffic left, expiry, site links...)
pub const JUNK_KEYWORDS: &[&str] = &[
    "剩余流量",
    "套餐到期",
    "距离下次重置",
    "建议",
    "官网",
    "未到期",
    "剩余",
    "到期",
    "重置",
    "过滤掉",
    "无效",
    "测试",
    "邮件",
    "联系",
    "群",
    "频道",
    "更新",
    "发布",
    "APP",
    "教程",
    "无法",
    "Remaining",
    "Expire",
    "Official",
];

/// Whether a record name is a provider announcement rather than a node
pub fn is_junk(name: &str) -> bool {
    JUNK_KEYWORDS.iter().any(|k| name.contains(k))
}

/// Raw content of a source
pub trait ContentProvider {
    fn load(&self, source: &Source) -> Result<String, SourceError>;

    /// Ask `other` whenever this provider has nothing for a source
    fn or<B: ContentProvider>(self, other: B) -> Fallback<Self, B>
    where
        Self: Sized,
    {
        Fallback {
            primary: self,
            secondary: other,
        }
    }
}

/// Reads `<dir>/<id>.yaml`, falling back to `<dir>/<id>.yml`
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.yaml"))
    }
}

impl ContentProvider for DirectoryProvider {
    fn load(&self, source: &Source) -> Result<String, SourceError> {
        if !source.has_file_safe_id() {
            return Err(SourceError::InvalidId {
                id: source.id.clone(),
            });
        }
        let candidates = [self.path_for(&source.id), self.dir.join(format!("{}.yml", source.id))];
        for path in &candidates {
            match std::fs::read_to_string(path) {
                Ok(content) => return Ok(content),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SourceError::Io {
                        id: source.id.clone(),
                        source: e,
                    })
                }
            }
        }
        Err(SourceError::Missing {
            id: source.id.clone(),
        })
    }
}

/// In-memory contents keyed by source id
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    contents: HashMap<String, String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, content: impl Into<String>) {
        self.contents.insert(id.into(), content.into());
    }

    pub fn with(mut self, id: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(id, content);
        self
    }
}

impl ContentProvider for MemoryProvider {
    fn load(&self, source: &Source) -> Result<String, SourceError> {
        self.contents
            .get(&source.id)
            .cloned()
            .ok_or_else(|| SourceError::Missing {
                id: source.id.clone(),
            })
    }
}

/// Two providers, the second consulted only for sources the first lacks
#[derive(Debug, Clone)]
pub struct Fallback<A, B> {
    primary: A,
    secondary: B,
}

impl<A: ContentProvider, B: ContentProvider> ContentProvider for Fallback<A, B> {
    fn load(&self, source: &Source) -> Result<String, SourceError> {
        match self.primary.load(source) {
            Err(SourceError::Missing { .. }) => self.secondary.load(source),
            other => other,
        }
    }
}

/// Sort sources: explicitly ordered ones by position, the rest by id
pub fn order_sources(sources: &mut [Source]) {
    sources.sort_by(|a, b| {
        (a.order.is_none(), a.order, &a.id).cmp(&(b.order.is_none(), b.order, &b.id))
    });
}

/// Per-source counts of one aggregation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub id: String,
    /// Records the sniffer produced
    pub found: usize,
    /// Records left after the junk filter
    pub kept: usize,
}

/// Outcome of one aggregation pass
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub records: Vec<ProxyRecord>,
    pub sources: Vec<SourceSummary>,
    pub skipped: Vec<SourceError>,
}

impl AggregateReport {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Turn an empty result into an error for callers that need one
    pub fn ensure_non_empty(self) -> Result<Self, MergeError> {
        if self.records.is_empty() {
            Err(MergeError::EmptyResult {
                sources: self.sources.len() + self.skipped.len(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Merge the records of `sources`, in caller order after [`order_sources`]
pub fn aggregate(
    sources: &[Source],
    provider: &dyn ContentProvider,
    mut geo: Option<&mut GeoCache<'_>>,
) -> AggregateReport {
    let mut ordered = sources.to_vec();
    order_sources(&mut ordered);

    let known_prefixes: Vec<&str> = ordered.iter().map(Source::prefix).collect();
    let mut report = AggregateReport::default();

    for source in &ordered {
        let records = match load_records(source, provider) {
            Ok(records) => records,
            Err(e) => {
                warn!("Skipping source: {}", e);
                report.skipped.push(e);
                continue;
            }
        };

        let found = records.len();
        let prefix = source.prefix();
        let renamed: Vec<ProxyRecord> = records
            .iter()
            .filter(|record| {
                let junk = is_junk(&record.name);
                if junk {
                    debug!("Dropping informational entry {:?}", record.name);
                }
                !junk
            })
            .map(|record| rename(record, prefix, &known_prefixes, geo.as_deref_mut()))
            .collect();

        info!(
            "Source {}: {} proxies, {} after filtering",
            source.id,
            found,
            renamed.len()
        );
        report.sources.push(SourceSummary {
            id: source.id.clone(),
            found,
            kept: renamed.len(),
        });
        report.records.extend(renamed);
    }

    if report.records.is_empty() {
        warn!("No proxies found in {} source(s)", ordered.len());
    }
    report
}

fn load_records(source: &Source, provider: &dyn ContentProvider) -> Result<Vec<ProxyRecord>, SourceError> {
    let content = provider.load(source)?;
    let records = sniff(&content);
    if records.is_empty() {
        return Err(SourceError::Empty {
            id: source.id.clone(),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::geo::StaticGeo;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn names(report: &AggregateReport) -> Vec<&str> {
        report.records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_is_junk() {
        assert!(is_junk("剩余流量：10GB"));
        assert!(is_junk("套餐到期：2024-01-01"));
        assert!(is_junk("Download APP"));
        assert!(!is_junk("🇭🇰 Hong Kong 01"));
    }

    #[test]
    fn test_order_sources() {
        let mut sources = vec![
            Source::new("zeta"),
            Source::new("beta").with_order(1),
            Source::new("alpha"),
            Source::new("gamma").with_order(0),
        ];
        order_sources(&mut sources);
        let ids: Vec<_> = sources.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["gamma", "beta", "alpha", "zeta"]);
    }

    #[test]
    fn test_aggregate_filters_and_renames() {
        let provider = MemoryProvider::new()
            .with(
                "one",
                "trojan://pw@a.com:443#HK%2001\ntrojan://pw@a.com:443#%E5%89%A9%E4%BD%99%E6%B5%81%E9%87%8F\n",
            )
            .with("two", "trojan://pw@b.com:443#Two-JP%2001\n");
        let sources = vec![
            Source::new("two").with_alias("Two"),
            Source::new("one").with_alias("One").with_order(0),
        ];

        let report = aggregate(&sources, &provider, None);
        assert_eq!(names(&report), vec!["🇭🇰 One HK 01", "🇯🇵 Two-JP 01"]);
        assert_eq!(
            report.sources,
            vec![
                SourceSummary {
                    id: "one".to_string(),
                    found: 2,
                    kept: 1
                },
                SourceSummary {
                    id: "two".to_string(),
                    found: 1,
                    kept: 1
                },
            ]
        );
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_failing_sources_are_skipped() {
        let provider = MemoryProvider::new()
            .with("junk", "just some text")
            .with("good", "trojan://pw@a.com:443#node");
        let sources = vec![Source::new("missing"), Source::new("junk"), Source::new("good")];

        let report = aggregate(&sources, &provider, None);
        assert_eq!(names(&report), vec!["🔰 good node"]);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0], SourceError::Empty { .. }));
        assert!(matches!(report.skipped[1], SourceError::Missing { .. }));
    }

    #[test]
    fn test_ensure_non_empty() {
        let provider = MemoryProvider::new();
        let report = aggregate(&[Source::new("a")], &provider, None);
        assert!(report.is_empty());
        let err = report.ensure_non_empty().unwrap_err();
        assert!(matches!(err, MergeError::EmptyResult { sources: 1 }));
    }

    #[test]
    fn test_geo_fallback_during_rename() {
        let provider = MemoryProvider::new().with("s", "trojan://pw@5.6.7.8:443#node");
        let lookup = StaticGeo::from([("5.6.7.8", "SG")]);
        let mut cache = GeoCache::new(&lookup);

        let report = aggregate(&[Source::new("s")], &provider, Some(&mut cache));
        assert_eq!(names(&report), vec!["🇸🇬 s node"]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_directory_provider() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "content-a").unwrap();
        std::fs::write(dir.path().join("b.yml"), "content-b").unwrap();
        let provider = DirectoryProvider::new(dir.path());

        assert_eq!(provider.load(&Source::new("a")).unwrap(), "content-a");
        assert_eq!(provider.load(&Source::new("b")).unwrap(), "content-b");
        assert!(matches!(
            provider.load(&Source::new("c")),
            Err(SourceError::Missing { .. })
        ));
    }

    #[test]
    fn test_directory_provider_stays_in_dir() {
        let root = TempDir::new().unwrap();
        let cache = root.path().join("cache");
        std::fs::create_dir(&cache).unwrap();
        std::fs::write(root.path().join("secret.yaml"), "trojan://pw@a.com:443#n").unwrap();

        let provider = DirectoryProvider::new(&cache);
        assert!(matches!(
            provider.load(&Source::new("../secret")),
            Err(SourceError::InvalidId { .. })
        ));

        let fallback = MemoryProvider::new().with("../secret", "x").or(provider);
        assert_eq!(fallback.load(&Source::new("../secret")).unwrap(), "x");
    }

    #[test]
    fn test_fallback_provider() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "from-disk").unwrap();
        let provider = MemoryProvider::new()
            .with("custom_nodes", "from-memory")
            .or(DirectoryProvider::new(dir.path()));

        assert_eq!(provider.load(&Source::new("custom_nodes")).unwrap(), "from-memory");
        assert_eq!(provider.load(&Source::new("a")).unwrap(), "from-disk");
    }
}
