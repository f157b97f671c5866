//! Source manifest
//!
//! JSON file listing subscriptions, hand-added custom nodes and the explicit
//! source order. The manifest turns into the [`Source`] list and the
//! in-memory custom node content an aggregation pass needs.

use crate::proxy::aggregate::MemoryProvider;
use crate::proxy::encoder::encode;
use crate::proxy::models::Source;
use crate::proxy::parser::ProxyParser;
use crate::proxy::traffic::Traffic;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

/// Id of the pseudo-source holding custom nodes
pub const CUSTOM_SOURCE_ID: &str = "custom_nodes";
/// Rename prefix of custom nodes
pub const CUSTOM_ALIAS: &str = "Custom";

fn enabled_default() -> bool {
    true
}

/// A remote subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Display name, used as the rename prefix
    pub name: String,
    pub url: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Last reported usage
    #[serde(flatten)]
    pub traffic: Traffic,
    #[serde(default)]
    pub node_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("sub_{}", &id[..8]),
            name: name.into(),
            url: url.into(),
            enabled: true,
            traffic: Traffic::default(),
            node_count: 0,
            last_update: None,
        }
    }
}

/// A single share link with a chosen display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomNode {
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub custom_nodes: Vec<CustomNode>,
    /// Source ids in the order their records should appear
    #[serde(default)]
    pub source_order: Vec<String>,
    /// Profile name written into rendered configs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
}

impl Manifest {
    /// Load a manifest; a missing file is an empty manifest
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Register a subscription under a fresh id
    pub fn add_subscription(&mut self, name: impl Into<String>, url: impl Into<String>) -> &Subscription {
        let index = self.subscriptions.len();
        self.subscriptions.push(Subscription::new(name, url));
        &self.subscriptions[index]
    }

    pub fn subscription_mut(&mut self, id: &str) -> Option<&mut Subscription> {
        self.subscriptions.iter_mut().find(|s| s.id == id)
    }

    pub fn enabled_subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter().filter(|s| s.enabled)
    }

    fn order_of(&self, id: &str) -> Option<usize> {
        self.source_order.iter().position(|o| o == id)
    }

    /// Aggregation sources: enabled subscriptions plus the custom node list
    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self
            .enabled_subscriptions()
            .map(|s| {
                let source = Source::new(s.id.clone()).with_alias(s.name.clone());
                match self.order_of(&s.id) {
                    Some(order) => source.with_order(order),
                    None => source,
                }
            })
            .collect();

        if !self.custom_nodes.is_empty() {
            let source = Source::new(CUSTOM_SOURCE_ID).with_alias(CUSTOM_ALIAS);
            sources.push(match self.order_of(CUSTOM_SOURCE_ID) {
                Some(order) => source.with_order(order),
                None => source,
            });
        }
        sources
    }

    /// Link list of the custom nodes, each carrying its chosen name
    pub fn custom_content(&self) -> String {
        self.custom_nodes
            .iter()
            .filter_map(|node| match ProxyParser::parse_line(&node.link) {
                Ok(record) => Some(encode(&record.with_name(node.name.clone()))),
                Err(e) => {
                    warn!("Skipping custom node {:?}: {}", node.name, e);
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// In-memory provider serving the custom node pseudo-source
    pub fn custom_provider(&self) -> MemoryProvider {
        let mut provider = MemoryProvider::new();
        if !self.custom_nodes.is_empty() {
            provider.insert(CUSTOM_SOURCE_ID, self.custom_content());
        }
        provider
    }

    /// `(name, usage)` of every enabled subscription
    pub fn traffic(&self) -> Vec<(String, Traffic)> {
        self.enabled_subscriptions()
            .map(|s| (s.name.clone(), s.traffic))
            .collect()
    }

    /// Store the outcome of a successful fetch
    pub fn record_fetch(&mut self, id: &str, traffic: Option<Traffic>, node_count: usize) {
        if let Some(sub) = self.subscription_mut(id) {
            if let Some(traffic) = traffic {
                sub.traffic = traffic;
            }
            sub.node_count = node_count;
            sub.last_update = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::aggregate::ContentProvider;
    use crate::proxy::sniffer::sniff;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        let mut manifest = Manifest::default();
        manifest.subscriptions = vec![
            Subscription {
                id: "sub_b".to_string(),
                ..Subscription::new("Beta", "https://b.example/sub")
            },
            Subscription {
                id: "sub_a".to_string(),
                enabled: false,
                ..Subscription::new("Alpha", "https://a.example/sub")
            },
            Subscription {
                id: "sub_c".to_string(),
                ..Subscription::new("Gamma", "https://c.example/sub")
            },
        ];
        manifest.custom_nodes = vec![CustomNode {
            name: "My Node".to_string(),
            link: "trojan://pw@t.com:443#ignored".to_string(),
        }];
        manifest.source_order = vec!["sub_c".to_string(), "custom_nodes".to_string()];
        manifest
    }

    #[test]
    fn test_sources() {
        let sources = manifest().sources();
        assert_eq!(
            sources,
            vec![
                Source::new("sub_b").with_alias("Beta"),
                Source::new("sub_c").with_alias("Gamma").with_order(0),
                Source::new(CUSTOM_SOURCE_ID).with_alias(CUSTOM_ALIAS).with_order(1),
            ]
        );
    }

    #[test]
    fn test_custom_content_uses_chosen_name() {
        let mut manifest = manifest();
        manifest.custom_nodes.push(CustomNode {
            name: "broken".to_string(),
            link: "nope://x".to_string(),
        });
        let records = sniff(&manifest.custom_content());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "My Node");

        let provider = manifest.custom_provider();
        assert!(provider.load(&Source::new(CUSTOM_SOURCE_ID)).is_ok());
    }

    #[test]
    fn test_subscription_ids() {
        let mut manifest = Manifest::default();
        let id = manifest.add_subscription("New", "https://n.example").id.clone();
        assert!(id.starts_with("sub_"));
        assert_eq!(id.len(), 12);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("manifest.json");

        assert_eq!(Manifest::load(&path).unwrap(), Manifest::default());

        let mut original = manifest();
        original.record_fetch(
            "sub_b",
            Some(Traffic {
                upload: 1,
                download: 2,
                total: 3,
                expire: 4,
            }),
            7,
        );
        original.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.subscriptions[0].traffic.total, 3);
        assert_eq!(loaded.subscriptions[0].node_count, 7);
        assert!(loaded.subscriptions[0].last_update.is_some());
    }

    #[test]
    fn test_missing_keys_default() {
        let manifest: Manifest =
            serde_json::from_str(r#"{"subscriptions":[{"id":"s","name":"S","url":"u"}]}"#).unwrap();
        assert!(manifest.subscriptions[0].enabled);
        assert_eq!(manifest.subscriptions[0].traffic, Traffic::default());
        assert!(manifest.custom_nodes.is_empty());
    }
}
