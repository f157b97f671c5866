//! Subscription fetcher
//!
//! Downloads subscription bodies concurrently and stores each one as
//! `<cache>/<id>.yaml`, where the aggregation pass picks it up through a
//! [`DirectoryProvider`](crate::proxy::aggregate::DirectoryProvider).
//! Failed downloads are reported per subscription and never abort the batch.

use crate::proxy::error::SourceError;
use crate::proxy::manifest::Subscription;
use crate::proxy::models::is_file_safe_id;
use crate::proxy::sniffer::sniff;
use crate::proxy::traffic::{Traffic, USERINFO_HEADER};
use crate::Result;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Providers serve Clash documents to Clash-looking agents
const DEFAULT_USER_AGENT: &str = "clash-verge/v1.7.7";

const DEFAULT_CONCURRENCY: usize = 8;

/// Configuration for the fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Simultaneous downloads
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl FetchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// A downloaded subscription body
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub content: String,
    /// Usage reported in the response headers, if any
    pub traffic: Option<Traffic>,
}

impl FetchedBody {
    /// Number of proxies the body decodes to
    pub fn node_count(&self) -> usize {
        sniff(&self.content).len()
    }
}

/// Outcome of fetching one subscription
#[derive(Debug)]
pub struct FetchResult {
    pub id: String,
    pub result: Result<FetchedBody>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct Fetcher {
    config: FetchConfig,
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(FetchConfig::default())
    }

    pub fn with_config(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download one URL
    pub async fn fetch_url(&self, url: &str) -> Result<FetchedBody> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "*/*")
            .send()
            .await?
            .error_for_status()?;

        let traffic = response
            .headers()
            .get(USERINFO_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Traffic::parse);
        let content = response.text().await?;

        Ok(FetchedBody { content, traffic })
    }

    /// Download every subscription, at most `concurrency` at a time.
    ///
    /// Results come back in completion order.
    pub async fn fetch_all(&self, subscriptions: &[Subscription]) -> Vec<FetchResult> {
        stream::iter(subscriptions)
            .map(|sub| async move {
                let result = self.fetch_url(&sub.url).await;
                match &result {
                    Ok(body) => info!("Fetched {} ({} bytes)", sub.id, body.content.len()),
                    Err(e) => warn!("Failed to fetch {}: {}", sub.id, e),
                }
                FetchResult {
                    id: sub.id.clone(),
                    result,
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await
    }
}

/// Cache file of a source; ids that could leave the directory are rejected
pub fn cache_path<P: AsRef<Path>>(cache_dir: P, id: &str) -> Result<PathBuf> {
    if !is_file_safe_id(id) {
        return Err(SourceError::InvalidId { id: id.to_string() }.into());
    }
    Ok(cache_dir.as_ref().join(format!("{id}.yaml")))
}

/// Store a body as the cached content of `id`
pub fn write_cache<P: AsRef<Path>>(cache_dir: P, id: &str, content: &str) -> Result<PathBuf> {
    let path = cache_path(cache_dir.as_ref(), id)?;
    std::fs::create_dir_all(cache_dir.as_ref())?;
    std::fs::write(&path, content)?;
    Ok(path)
}
