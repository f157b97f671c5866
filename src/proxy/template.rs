//! Config templates
//!
//! A template is a full client config whose `proxies` and `proxy-groups`
//! sections get replaced. Everything before them is the header, everything
//! from the first rule-like section on is the suffix.

use crate::Result;
use std::path::Path;

/// Built-in template
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/default.yaml");

const BODY_KEYS: &[&str] = &["proxies:", "proxy-groups:"];
const SUFFIX_KEYS: &[&str] = &["rules:", "rule-providers:", "script:", "url-rewrite:"];

/// Header and suffix around the generated sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub header: String,
    pub suffix: String,
}

impl Template {
    /// Split a full config into header and suffix
    pub fn parse(content: &str) -> Self {
        let (header, suffix) = split_template(content);
        Self { header, suffix }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::parse(DEFAULT_TEMPLATE)
    }
}

enum State {
    Header,
    Body,
    Suffix,
}

/// `(header, suffix)` of a full config, both trimmed.
///
/// Lines between the first `proxies:`/`proxy-groups:` line and the first
/// rule-like section after it are dropped. Without either marker the whole
/// input is header.
pub fn split_template(content: &str) -> (String, String) {
    let mut header = Vec::new();
    let mut suffix = Vec::new();
    let mut state = State::Header;

    for line in content.lines() {
        let stripped = line.trim();
        match state {
            State::Header => {
                if BODY_KEYS.iter().any(|k| stripped.starts_with(k)) {
                    state = State::Body;
                } else {
                    header.push(line);
                }
            }
            State::Body => {
                if SUFFIX_KEYS.iter().any(|k| stripped.starts_with(k)) {
                    state = State::Suffix;
                    suffix.push(line);
                }
            }
            State::Suffix => suffix.push(line),
        }
    }

    (
        header.join("\n").trim().to_string(),
        suffix.join("\n").trim().to_string(),
    )
}
