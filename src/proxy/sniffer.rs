//! Content sniffer
//!
//! Works out what an opaque source body is and turns it into records:
//!
//! 1. a structured document with a `proxies` list,
//! 2. a base64-wrapped structured document,
//! 3. a newline-delimited link list, base64-wrapped or not.
//!
//! Individual entries that fail to decode are dropped; the caller only sees
//! an empty result when nothing at all could be decoded.

use crate::proxy::clash::ClashProxy;
use crate::proxy::link::decode_base64;
use crate::proxy::models::ProxyRecord;
use crate::proxy::parser::ProxyParser;
use serde_yaml::Value;
use tracing::debug;

/// Marker that identifies a decoded base64 body as a structured document
const STRUCTURED_MARKER: &str = "proxies:";

/// Decode every proxy a source body contains
pub fn sniff(blob: &str) -> Vec<ProxyRecord> {
    if let Some(records) = parse_structured(blob) {
        debug!("Read {} proxies from structured document", records.len());
        return records;
    }

    let decoded = decode_base64(blob.trim()).ok();
    if let Some(text) = decoded.as_deref() {
        if text.contains(STRUCTURED_MARKER) {
            if let Some(records) = parse_structured(text) {
                debug!("Read {} proxies from base64 structured document", records.len());
                return records;
            }
        }
    }

    let text = decoded.as_deref().unwrap_or(blob);
    let records: Vec<ProxyRecord> = text.lines().filter_map(parse_line).collect();
    debug!("Read {} proxies from link list", records.len());
    records
}

/// `Some` when `text` is a document with a `proxies` sequence
fn parse_structured(text: &str) -> Option<Vec<ProxyRecord>> {
    let document: Value = serde_yaml::from_str(text).ok()?;
    let proxies = document.as_mapping()?.get("proxies")?.as_sequence()?;

    Some(
        proxies
            .iter()
            .filter_map(|entry| {
                let parsed = serde_yaml::from_value::<ClashProxy>(entry.clone())
                    .map_err(|e| e.to_string())
                    .and_then(|entry| ProxyRecord::try_from(entry).map_err(|e| e.to_string()));
                match parsed {
                    Ok(record) => Some(record),
                    Err(e) => {
                        debug!("Dropping structured entry: {}", e);
                        None
                    }
                }
            })
            .collect(),
    )
}

/// One line of a link list: a share link or an inline JSON entry
fn parse_line(line: &str) -> Option<ProxyRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') && line.ends_with('}') {
        let entry: ClashProxy = serde_json::from_str(line).ok()?;
        if !entry.has_identity() {
            debug!("Skipping JSON line without name and type");
            return None;
        }
        return ProxyRecord::try_from(entry)
            .map_err(|e| debug!("Dropping JSON entry: {}", e))
            .ok();
    }

    ProxyParser::parse_line(line)
        .map_err(|e| debug!("Dropping link: {}", e))
        .ok()
}
