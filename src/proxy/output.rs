//! Rendering merged results for clients
//!
//! Two shapes: a Clash YAML document (template header, one compact JSON
//! object per proxy and group, template suffix) and a base64 link list for
//! V2Ray-style clients.

use crate::proxy::clash::ClashProxy;
use crate::proxy::encoder::encode;
use crate::proxy::link::encode_base64;
use crate::proxy::models::{ProxyGroup, ProxyRecord};
use crate::proxy::template::Template;
use std::fmt;
use std::str::FromStr;

/// User-agent fragments of clients that understand Clash YAML
const CLASH_AGENTS: &[&str] = &["clash", "stash", "shadowrocket", "quantumult", "surge", "loon"];

/// Output document shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Clash,
    Base64,
}

impl OutputFormat {
    /// Pick a format from a client's user agent; no agent means Clash
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        match user_agent {
            Some(agent) => {
                let agent = agent.to_lowercase();
                if CLASH_AGENTS.iter().any(|k| agent.contains(k)) {
                    OutputFormat::Clash
                } else {
                    OutputFormat::Base64
                }
            }
            None => OutputFormat::Clash,
        }
    }

    /// Explicit choice first, then the user agent
    pub fn negotiate(explicit: Option<OutputFormat>, user_agent: Option<&str>) -> Self {
        explicit.unwrap_or_else(|| Self::from_user_agent(user_agent))
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clash" | "yaml" => Ok(OutputFormat::Clash),
            "base64" | "v2ray" => Ok(OutputFormat::Base64),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Clash => write!(f, "clash"),
            OutputFormat::Base64 => write!(f, "base64"),
        }
    }
}

/// Render a Clash YAML document
pub fn render_clash(
    profile_name: Option<&str>,
    template: &Template,
    records: &[ProxyRecord],
    groups: &[ProxyGroup],
) -> serde_json::Result<String> {
    let mut lines: Vec<String> = Vec::new();

    if let Some(name) = profile_name.filter(|n| !n.trim().is_empty()) {
        lines.push(format!("name: {name}"));
    }
    if !template.header.is_empty() {
        lines.push(template.header.clone());
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }

    lines.push("proxies:".to_string());
    for record in records {
        let entry = ClashProxy::from(record);
        lines.push(format!("  - {}", serde_json::to_string(&entry)?));
    }

    lines.push(String::new());
    lines.push("proxy-groups:".to_string());
    for group in groups {
        lines.push(format!("  - {}", serde_json::to_string(group)?));
    }

    if !template.suffix.is_empty() {
        lines.push(String::new());
        lines.push(template.suffix.clone());
    }

    let mut document = lines.join("\n");
    document.push('\n');
    Ok(document)
}

/// Base64 of the newline-joined share links
pub fn render_base64(records: &[ProxyRecord]) -> String {
    let links: Vec<String> = records.iter().map(encode).collect();
    encode_base64(&links.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::link::decode_base64;
    use crate::proxy::models::Credentials;
    use crate::proxy::sniffer::sniff;
    use pretty_assertions::assert_eq;

    fn records() -> Vec<ProxyRecord> {
        vec![
            ProxyRecord::new(
                "🇯🇵 A 1".to_string(),
                "a.com".to_string(),
                443,
                Credentials::Trojan {
                    password: "pw".to_string(),
                },
            ),
            ProxyRecord::new(
                "🇺🇸 B 2".to_string(),
                "1.2.3.4".to_string(),
                8388,
                Credentials::Ss {
                    cipher: "aes-256-gcm".to_string(),
                    password: "pass".to_string(),
                },
            ),
        ]
    }

    #[test]
    fn test_format_from_user_agent() {
        assert_eq!(OutputFormat::from_user_agent(Some("clash-verge/v1.7.7")), OutputFormat::Clash);
        assert_eq!(OutputFormat::from_user_agent(Some("Stash/2.4")), OutputFormat::Clash);
        assert_eq!(OutputFormat::from_user_agent(Some("v2rayNG/1.8.5")), OutputFormat::Base64);
        assert_eq!(OutputFormat::from_user_agent(None), OutputFormat::Clash);
        assert_eq!(
            OutputFormat::negotiate(Some(OutputFormat::Clash), Some("v2rayN")),
            OutputFormat::Clash
        );
        assert_eq!("yaml".parse::<OutputFormat>(), Ok(OutputFormat::Clash));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_clash_layout() {
        let template = Template {
            header: "mixed-port: 7890".to_string(),
            suffix: "rules:\n  - MATCH,GLOBAL".to_string(),
        };
        let groups = vec![ProxyGroup::select("GLOBAL", vec!["DIRECT".to_string()])];
        let document = render_clash(Some("Merged"), &template, &records()[..1], &groups).unwrap();

        assert_eq!(
            document,
            concat!(
                "name: Merged\n",
                "mixed-port: 7890\n",
                "\n",
                "proxies:\n",
                "  - {\"name\":\"🇯🇵 A 1\",\"type\":\"trojan\",\"server\":\"a.com\",\"port\":443,\"password\":\"pw\",\"udp\":true}\n",
                "\n",
                "proxy-groups:\n",
                "  - {\"name\":\"GLOBAL\",\"type\":\"select\",\"proxies\":[\"DIRECT\"]}\n",
                "\n",
                "rules:\n",
                "  - MATCH,GLOBAL\n",
            )
        );
    }

    #[test]
    fn test_rendered_document_sniffs_back() {
        let document = render_clash(None, &Template::default(), &records(), &[]).unwrap();
        let parsed = sniff(&document);
        assert_eq!(parsed, records());
    }

    #[test]
    fn test_render_base64() {
        let body = render_base64(&records());
        let text = decode_base64(&body).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("trojan://pw@a.com:443"));
        assert_eq!(sniff(&body), records());
    }
}
