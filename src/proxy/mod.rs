//! Proxy subscription merging
//!
//! This module provides functionality for:
//! - Decoding share links of 13 protocols and re-encoding records as links
//! - Sniffing subscription bodies (Clash documents, base64, link lists)
//! - Classifying nodes by region and renaming them with a source prefix
//! - Aggregating many sources and synthesizing country-based proxy groups
//! - Fetching subscriptions and rendering merged configs

pub mod aggregate;
pub mod clash;
pub mod country;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod geo;
pub mod groups;
pub mod link;
pub mod manifest;
pub mod models;
pub mod output;
pub mod parser;
pub mod schemes;
pub mod sniffer;
pub mod template;
pub mod traffic;

pub use aggregate::{aggregate, AggregateReport, ContentProvider, DirectoryProvider, MemoryProvider};
pub use clash::ClashProxy;
pub use country::{classify, remove_decoration, rename, GeoCache, Region};
pub use encoder::encode as record_to_link;
pub use error::{DecodeError, MergeError, SourceError};
pub use fetch::{FetchConfig, Fetcher};
pub use geo::{GeoLocator, GeoLookup, StaticGeo};
pub use groups::{synthesize, GroupConfig};
pub use manifest::{CustomNode, Manifest, Subscription};
pub use models::{Credentials, ProxyGroup, ProxyKind, ProxyRecord, Source};
pub use output::{render_base64, render_clash, OutputFormat};
pub use parser::{decode, ProxyParser};
pub use sniffer::sniff;
pub use template::Template;
pub use traffic::Traffic;
