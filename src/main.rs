use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use proxy_merge::{
    proxy::{
        aggregate::{aggregate, ContentProvider, DirectoryProvider},
        clash::ClashProxy,
        country::{classify, GeoCache},
        encoder::encode,
        fetch::{write_cache, FetchConfig, Fetcher},
        geo::GeoLocator,
        groups::synthesize,
        manifest::{CustomNode, Manifest, Subscription},
        output::{render_base64, render_clash, OutputFormat},
        parser::ProxyParser,
        sniffer::sniff,
        template::Template,
        traffic::{info_nodes, prepend_info_nodes, sum_traffic},
    },
    Config,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Merge proxy subscriptions into one country-grouped config
#[derive(Parser)]
#[command(name = "proxy-merge")]
#[command(about = "Merge proxy subscriptions into one country-grouped config")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Source manifest path
    #[arg(short, long, default_value = "manifest.json")]
    manifest: PathBuf,

    /// Directory of fetched subscription bodies
    #[arg(short, long, default_value = "cache")]
    cache_dir: PathBuf,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a subscription body and print its proxies
    Decode {
        /// File holding a link list, base64 blob or Clash document
        input: PathBuf,
        /// Print Clash JSON entries instead of share links
        #[arg(long)]
        json: bool,
    },
    /// Merge cached subscriptions into one config
    Merge {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format (clash, base64)
        #[arg(short, long)]
        format: Option<String>,
        /// Pick the format the way a client with this user agent would get it
        #[arg(long)]
        user_agent: Option<String>,
        /// MaxMind database for servers whose name names no country
        #[arg(long)]
        mmdb: Option<PathBuf>,
        /// Config template (built-in template when omitted)
        #[arg(short, long)]
        template: Option<PathBuf>,
        /// Prepend traffic usage nodes
        #[arg(long)]
        traffic_info: bool,
        /// Exit with an error when no proxies are left
        #[arg(long)]
        fail_on_empty: bool,
    },
    /// Download enabled subscriptions into the cache
    Fetch {
        /// Timeout in seconds for HTTP requests
        #[arg(long, default_value = "30")]
        timeout: u64,
        /// Number of concurrent downloads
        #[arg(short = 'n', long, default_value = "8")]
        concurrency: usize,
        /// User agent sent to providers
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Register a subscription
    Add {
        /// Display name, used as the node prefix
        name: String,
        /// Subscription URL
        url: String,
    },
    /// Add a single share link as a custom node
    AddNode {
        /// Display name of the node
        name: String,
        /// Share link
        link: String,
    },
    /// Show the region a node name resolves to
    Classify {
        /// Node name
        name: String,
        /// Server address, used for geolocation
        #[arg(short, long)]
        server: Option<String>,
        /// MaxMind database
        #[arg(long)]
        mmdb: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::default()
        .with_manifest_path(cli.manifest)
        .with_cache_dir(cli.cache_dir);

    match cli.command {
        Commands::Decode { input, json } => {
            let content = std::fs::read_to_string(&input)?;
            let records = sniff(&content);
            info!("Decoded {} proxies from {:?}", records.len(), input);

            for record in &records {
                if json {
                    println!("{}", serde_json::to_string(&ClashProxy::from(record))?);
                } else {
                    println!("{}", encode(record));
                }
            }
        }
        Commands::Merge {
            output,
            format,
            user_agent,
            mmdb,
            template,
            traffic_info,
            fail_on_empty,
        } => {
            let config = match mmdb {
                Some(path) => config.with_mmdb_path(path),
                None => config,
            };
            let format = OutputFormat::negotiate(
                format.as_deref().map(parse_format).transpose()?,
                user_agent.as_deref(),
            );

            let manifest = Manifest::load(&config.manifest_path)?;
            let sources = manifest.sources();
            let provider = manifest
                .custom_provider()
                .or(DirectoryProvider::new(&config.cache_dir));

            let locator = config
                .mmdb_path
                .as_ref()
                .map(GeoLocator::from_path)
                .transpose()?;
            let mut geo = locator.as_ref().map(|l| GeoCache::new(l));

            let report = aggregate(&sources, &provider, geo.as_mut());
            for skipped in &report.skipped {
                warn!("{}", skipped);
            }
            let report = if fail_on_empty {
                report.ensure_non_empty()?
            } else {
                report
            };

            let mut records = report.records;
            let mut groups = synthesize(&records, &config.groups, geo.as_mut());
            info!(
                "Merged {} proxies from {} source(s) into {} groups",
                records.len(),
                report.sources.len(),
                groups.len()
            );

            if traffic_info {
                let nodes = info_nodes(&manifest.traffic());
                prepend_info_nodes(&mut records, &mut groups, &config.groups.manual_name, nodes);
            }

            let body = match format {
                OutputFormat::Clash => {
                    let template = match template {
                        Some(path) => Template::from_path(path)?,
                        None => Template::default(),
                    };
                    render_clash(manifest.profile_name.as_deref(), &template, &records, &groups)?
                }
                OutputFormat::Base64 => render_base64(&records),
            };

            let traffic = manifest.traffic();
            let usage = sum_traffic(traffic.iter().map(|(_, t)| t));
            info!("subscription-userinfo: {}", usage.header_value());

            match output {
                Some(path) => {
                    std::fs::write(&path, body)?;
                    println!("Saved {} config to {:?}", format, path);
                }
                None => print!("{}", body),
            }
        }
        Commands::Fetch {
            timeout,
            concurrency,
            user_agent,
        } => {
            let mut manifest = Manifest::load(&config.manifest_path)?;
            let subscriptions: Vec<Subscription> = manifest.enabled_subscriptions().cloned().collect();
            if subscriptions.is_empty() {
                println!("No enabled subscriptions.");
                return Ok(());
            }

            let mut fetch_config = FetchConfig::new()
                .with_timeout(Duration::from_secs(timeout))
                .with_concurrency(concurrency);
            if let Some(agent) = user_agent {
                fetch_config = fetch_config.with_user_agent(agent);
            }
            let fetcher = Fetcher::with_config(fetch_config)?;

            println!("Fetching {} subscription(s)...", subscriptions.len());
            let results = fetcher.fetch_all(&subscriptions).await;

            let mut fetched = 0;
            for result in results {
                match result.result {
                    Ok(body) => {
                        let nodes = body.node_count();
                        write_cache(&config.cache_dir, &result.id, &body.content)?;
                        manifest.record_fetch(&result.id, body.traffic, nodes);
                        println!("Found {} proxies in {}", nodes, result.id);
                        fetched += 1;
                    }
                    Err(e) => eprintln!("Error fetching {}: {}", result.id, e),
                }
            }

            manifest.save(&config.manifest_path)?;
            println!("Fetched {}/{} subscription(s)", fetched, subscriptions.len());
        }
        Commands::Add { name, url } => {
            let mut manifest = Manifest::load(&config.manifest_path)?;
            let id = manifest.add_subscription(name, url).id.clone();
            manifest.save(&config.manifest_path)?;
            println!("Subscription added: {}", id);
        }
        Commands::AddNode { name, link } => {
            let record = ProxyParser::parse_line(&link)?;
            let mut manifest = Manifest::load(&config.manifest_path)?;
            manifest.custom_nodes.push(CustomNode {
                name: name.clone(),
                link,
            });
            manifest.save(&config.manifest_path)?;
            println!("Custom node added: {} ({})", name, record.kind());
        }
        Commands::Classify { name, server, mmdb } => {
            let locator = mmdb.map(GeoLocator::from_path).transpose()?;
            let mut geo = locator.as_ref().map(|l| GeoCache::new(l));
            let region = classify(&name, server.as_deref(), geo.as_mut());
            println!("{}", region);

            if let (Some(locator), Some(server)) = (&locator, &server) {
                if let Ok(ip) = server.parse::<IpAddr>() {
                    println!("Location: {}", locator.locate(ip)?);
                }
            }
        }
    }

    Ok(())
}

fn parse_format(s: &str) -> Result<OutputFormat> {
    s.parse::<OutputFormat>()
        .map_err(|e| anyhow!("{}. Use: clash, base64", e))
}
