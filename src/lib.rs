//! Proxy Merge - subscription decoder and config merger
//!
//! Decodes proxy share links and subscription bodies, classifies every node
//! by region, and merges many subscriptions into one country-grouped
//! selection config.

pub mod proxy;

pub use proxy::*;

use std::path::PathBuf;

/// Application result type
pub type Result<T> = anyhow::Result<T>;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Source manifest path
    pub manifest_path: PathBuf,
    /// Directory holding fetched subscription bodies
    pub cache_dir: PathBuf,
    /// MaxMind database used for servers no name pattern matches
    pub mmdb_path: Option<PathBuf>,
    pub groups: GroupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("manifest.json"),
            cache_dir: PathBuf::from("cache"),
            mmdb_path: None,
            groups: GroupConfig::default(),
        }
    }
}

impl Config {
    pub fn with_manifest_path(mut self, path: PathBuf) -> Self {
        self.manifest_path = path;
        self
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    pub fn with_mmdb_path(mut self, path: PathBuf) -> Self {
        self.mmdb_path = Some(path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::default()
            .with_manifest_path(PathBuf::from("state/manifest.json"))
            .with_cache_dir(PathBuf::from("state/cache"))
            .with_mmdb_path(PathBuf::from("GeoLite2-City.mmdb"));

        assert_eq!(config.manifest_path, PathBuf::from("state/manifest.json"));
        assert_eq!(config.cache_dir, PathBuf::from("state/cache"));
        assert_eq!(config.mmdb_path, Some(PathBuf::from("GeoLite2-City.mmdb")));
        assert_eq!(config.groups.global_name, "GLOBAL");
    }
}
