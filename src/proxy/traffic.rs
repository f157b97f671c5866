//! Subscription traffic accounting
//!
//! Providers report usage in a `subscription-userinfo` header
//! (`upload=..; download=..; total=..; expire=..`). Merged output reports
//! the sum over all subscriptions in the same shape.

use crate::proxy::models::{Credentials, ProxyGroup, ProxyRecord};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

pub const USERINFO_HEADER: &str = "subscription-userinfo";

/// Endpoint of the display-only traffic nodes
const INFO_SERVER: &str = "1.0.0.1";
const INFO_PORT: u16 = 65535;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Usage of one subscription; all byte counts, `expire` in unix seconds (0 = never)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traffic {
    #[serde(default)]
    pub upload: u64,
    #[serde(default)]
    pub download: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub expire: i64,
}

impl Traffic {
    /// Parse a userinfo header value; unknown keys and bad numbers are ignored
    pub fn parse(value: &str) -> Self {
        let mut traffic = Self::default();
        for part in value.split(';') {
            let Some((key, val)) = part.split_once('=') else {
                continue;
            };
            let val = val.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "upload" => traffic.upload = val.parse().unwrap_or(traffic.upload),
                "download" => traffic.download = val.parse().unwrap_or(traffic.download),
                "total" => traffic.total = val.parse().unwrap_or(traffic.total),
                "expire" => traffic.expire = val.parse().unwrap_or(traffic.expire),
                _ => {}
            }
        }
        traffic
    }

    pub fn used(&self) -> u64 {
        self.upload.saturating_add(self.download)
    }

    /// Header value in provider format
    pub fn header_value(&self) -> String {
        format!(
            "upload={}; download={}; total={}; expire={}",
            self.upload, self.download, self.total, self.expire
        )
    }

    /// Expiry as `YYYY-MM-DD` (UTC)
    pub fn expire_date(&self) -> Option<String> {
        if self.expire <= 0 {
            return None;
        }
        DateTime::from_timestamp(self.expire, 0).map(|dt| dt.format("%Y-%m-%d").to_string())
    }
}

/// Sum of all subscriptions. The earliest expiry is kept only when every
/// subscription expires; a single open-ended one makes the sum open-ended.
pub fn sum_traffic<'a, I>(items: I) -> Traffic
where
    I: IntoIterator<Item = &'a Traffic>,
{
    let mut sum = Traffic::default();
    let mut expire: Option<i64> = None;
    let mut open_ended = false;
    let mut any = false;

    for t in items {
        any = true;
        sum.upload = sum.upload.saturating_add(t.upload);
        sum.download = sum.download.saturating_add(t.download);
        sum.total = sum.total.saturating_add(t.total);
        if t.expire > 0 {
            expire = Some(expire.map_or(t.expire, |e| e.min(t.expire)));
        } else {
            open_ended = true;
        }
    }

    if any && !open_ended {
        sum.expire = expire.unwrap_or(0);
    }
    sum
}

/// Human-readable size: `0B`, `512B`, `1.5KB`, `2GB`
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return if value.fract() == 0.0 {
                format!("{}{}", value as u64, unit)
            } else {
                format!("{:.1}{}", value, unit)
            };
        }
        value /= 1024.0;
    }
    format!("{:.1}PB", value)
}

/// Display-only nodes describing usage: the aggregate first (when any
/// subscription has a quota), then one per subscription
pub fn info_nodes(subscriptions: &[(String, Traffic)]) -> Vec<ProxyRecord> {
    let mut names = Vec::new();

    let total = sum_traffic(subscriptions.iter().map(|(_, t)| t));
    if total.total > 0 {
        names.push(format!(
            "📊 Total | {}/{}",
            format_bytes(total.used()),
            format_bytes(total.total)
        ));
    }

    for (name, traffic) in subscriptions {
        let expire = traffic.expire_date().unwrap_or_default();
        let label = if traffic.total > 0 {
            format!(
                "📊 {} | {}/{} | {}",
                name,
                format_bytes(traffic.used()),
                format_bytes(traffic.total),
                expire
            )
        } else {
            format!("📊 {} | {}", name, expire)
        };
        names.push(label.trim_end_matches([' ', '|']).to_string());
    }

    names
        .into_iter()
        .map(|name| {
            let mut record = ProxyRecord::new(
                name,
                INFO_SERVER.to_string(),
                INFO_PORT,
                Credentials::Http {
                    username: None,
                    password: None,
                },
            );
            record.udp = false;
            record
        })
        .collect()
}

/// Prepend info nodes to the record list and to the group called `group_name`
pub fn prepend_info_nodes(
    records: &mut Vec<ProxyRecord>,
    groups: &mut [ProxyGroup],
    group_name: &str,
    nodes: Vec<ProxyRecord>,
) {
    if nodes.is_empty() {
        return;
    }
    let names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
    if let Some(group) = groups.iter_mut().find(|g| g.name == group_name) {
        group.proxies.splice(0..0, names);
    }
    records.splice(0..0, nodes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_userinfo() {
        let traffic = Traffic::parse("upload=100; download=200; total=1073741824; expire=1735689600");
        assert_eq!(
            traffic,
            Traffic {
                upload: 100,
                download: 200,
                total: 1073741824,
                expire: 1735689600
            }
        );
        assert_eq!(traffic.used(), 300);

        let partial = Traffic::parse("Upload=5;garbage;total=abc");
        assert_eq!(partial.upload, 5);
        assert_eq!(partial.total, 0);
    }

    #[test]
    fn test_header_value() {
        let traffic = Traffic {
            upload: 1,
            download: 2,
            total: 3,
            expire: 0,
        };
        assert_eq!(traffic.header_value(), "upload=1; download=2; total=3; expire=0");
        assert_eq!(Traffic::parse(&traffic.header_value()), traffic);
    }

    #[test]
    fn test_sum_traffic_expiry() {
        let a = Traffic {
            upload: 1,
            download: 1,
            total: 10,
            expire: 2000,
        };
        let b = Traffic {
            upload: 2,
            download: 2,
            total: 20,
            expire: 1000,
        };
        let sum = sum_traffic([&a, &b]);
        assert_eq!(sum.total, 30);
        assert_eq!(sum.used(), 6);
        assert_eq!(sum.expire, 1000);

        let forever = Traffic::default();
        assert_eq!(sum_traffic([&a, &forever]).expire, 0);
        assert_eq!(sum_traffic(Vec::<Traffic>::new().iter()), Traffic::default());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1024), "1KB");
        assert_eq!(format_bytes(1536), "1.5KB");
        assert_eq!(format_bytes(10 * 1024 * 1024 * 1024), "10GB");
        assert_eq!(format_bytes(2 * 1024u64.pow(5)), "2.0PB");
    }

    #[test]
    fn test_expire_date() {
        let traffic = Traffic {
            expire: 1735689600,
            ..Default::default()
        };
        assert_eq!(traffic.expire_date().as_deref(), Some("2025-01-01"));
        assert_eq!(Traffic::default().expire_date(), None);
    }

    #[test]
    fn test_info_nodes() {
        let subs = vec![
            (
                "Alpha".to_string(),
                Traffic {
                    upload: 512,
                    download: 512,
                    total: 1024 * 1024,
                    expire: 1735689600,
                },
            ),
            ("Beta".to_string(), Traffic::default()),
        ];
        let nodes = info_nodes(&subs);
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "📊 Total | 1KB/1MB",
                "📊 Alpha | 1KB/1MB | 2025-01-01",
                "📊 Beta",
            ]
        );
        assert_eq!(nodes[0].address(), "1.0.0.1:65535");
    }

    #[test]
    fn test_prepend_info_nodes() {
        let mut records = info_nodes(&[("A".to_string(), Traffic::default())]);
        let existing = records.clone();
        let mut groups = vec![
            ProxyGroup::select("GLOBAL", vec!["DIRECT".to_string()]),
            ProxyGroup::select("manual", vec!["DIRECT".to_string()]),
        ];
        let nodes = info_nodes(&[("B".to_string(), Traffic::default())]);

        prepend_info_nodes(&mut records, &mut groups, "manual", nodes);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], existing[0]);
        assert_eq!(groups[0].proxies, vec!["DIRECT"]);
        assert_eq!(groups[1].proxies, vec!["📊 B", "DIRECT"]);
    }
}
