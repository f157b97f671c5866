//! Shared URI mechanics for proxy links
//!
//! Every scheme decoder goes through the same steps: cut the `#fragment`
//! (display name), cut the `?query`, split `userinfo@host:port`. The helpers
//! here implement those steps once so the per-scheme code only deals with
//! field mapping.

use crate::proxy::error::DecodeError;
use base64::alphabet;
use base64::engine::general_purpose;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Standard alphabet, padding optional, sloppy trailing bits accepted
const TOLERANT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Unreserved characters stay literal, everything else is escaped
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Decode base64 text leniently.
///
/// Whitespace is dropped, the URL-safe alphabet is mapped onto the standard
/// one and padding is recomputed, so `ss`/`ssr`/`vmess` payloads from any
/// generator decode the same way.
pub fn decode_base64(input: &str) -> Result<String, DecodeError> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_end_matches('=');
    if cleaned.is_empty() {
        return Err(DecodeError::InvalidBase64);
    }

    let bytes = TOLERANT_BASE64
        .decode(cleaned)
        .map_err(|_| DecodeError::InvalidBase64)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidBase64)
}

/// Standard padded base64
pub fn encode_base64(input: &str) -> String {
    general_purpose::STANDARD.encode(input.as_bytes())
}

/// URL-safe unpadded base64, the dialect ssr links use
pub fn encode_base64_url(input: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(input.as_bytes())
}

/// Percent-decode, keeping the raw text if the result is not UTF-8
pub fn pct_decode(input: &str) -> String {
    match percent_decode_str(input).decode_utf8() {
        Ok(cow) => cow.into_owned(),
        Err(_) => input.to_string(),
    }
}

pub fn pct_encode(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

/// Parsed `key=value` pairs of a link query, in order of appearance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parse `a=1&b=2`. Pairs without `=` and blank values are dropped.
    pub fn parse(raw: &str) -> Self {
        let pairs = raw
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (pct_decode(k), pct_decode(v)))
            .filter(|(k, v)| !k.is_empty() && !v.trim().is_empty())
            .collect();
        Self { pairs }
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First value among several spellings of the same key
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Cut the `#fragment` off at the first `#`, percent-decoding it as a name
pub fn split_fragment(rest: &str) -> (&str, Option<String>) {
    match rest.split_once('#') {
        Some((main, fragment)) => {
            let name = pct_decode(fragment).trim().to_string();
            (main, Some(name).filter(|n| !n.is_empty()))
        }
        None => (rest, None),
    }
}

/// A link with its scheme already removed, split into its three parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParts<'a> {
    /// Everything between the scheme and `?`/`#`
    pub body: &'a str,
    pub query: Query,
    /// Percent-decoded fragment, if any
    pub name: Option<String>,
}

impl<'a> LinkParts<'a> {
    pub fn split(rest: &'a str) -> Self {
        let (main, name) = split_fragment(rest);
        let (body, query) = match main.split_once('?') {
            Some((body, query)) => (body, Query::parse(query)),
            None => (main, Query::default()),
        };
        Self {
            body: body.trim_end_matches('/'),
            query,
            name,
        }
    }

    /// `userinfo@hostport`; the last `@` separates them
    pub fn userinfo(&self) -> (Option<&'a str>, &'a str) {
        match self.body.rsplit_once('@') {
            Some((user, host)) => (Some(user), host),
            None => (None, self.body),
        }
    }
}

/// Split `host:port`, unwrapping `[ipv6]:port`.
///
/// The bracket check must run before the plain split on the last colon,
/// otherwise an IPv6 literal loses its tail to the port.
pub fn split_host_port(input: &str) -> Result<(String, Option<u16>), DecodeError> {
    let input = input.trim().trim_end_matches('/');

    let (host, port) = if let Some(rest) = input.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| DecodeError::InvalidPayload(format!("unclosed bracket in {input}")))?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(parse_port(port)?),
            None if after.is_empty() => None,
            None => return Err(DecodeError::InvalidPayload(input.to_string())),
        };
        (host, port)
    } else {
        match input.rsplit_once(':') {
            Some((host, port)) => (host, Some(parse_port(port)?)),
            None => (input, None),
        }
    };

    if host.trim().is_empty() {
        return Err(DecodeError::MissingField("server"));
    }
    Ok((host.to_string(), port))
}

/// Parse a port in 1..=65535
pub fn parse_port(raw: &str) -> Result<u16, DecodeError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(DecodeError::InvalidPort(raw.to_string())),
    }
}

/// Host as it must appear in a link authority
pub fn host_for_link(server: &str) -> String {
    if server.contains(':') {
        format!("[{server}]")
    } else {
        server.to_string()
    }
}

/// Split a comma-separated ALPN list
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Accumulates query pairs for an encoded link
#[derive(Debug, Default)]
pub struct QueryBuilder {
    pairs: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: &str) -> &mut Self {
        self.pairs.push(format!("{}={}", key, pct_encode(value)));
        self
    }

    pub fn push_opt(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.push(key, value);
        }
        self
    }

    /// `?a=1&b=2`, or nothing when empty
    pub fn finish(&self) -> String {
        if self.pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", self.pairs.join("&"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_tolerant() {
        assert_eq!(decode_base64("YWVzLTI1Ni1nY206cGFzcw==").unwrap(), "aes-256-gcm:pass");
        // missing padding
        assert_eq!(decode_base64("YWVzLTI1Ni1nY206cGFzcw").unwrap(), "aes-256-gcm:pass");
        // url-safe alphabet: "??>" encodes to "Pz8-"
        assert_eq!(decode_base64("Pz8-").unwrap(), "??>");
        assert_eq!(decode_base64("Pz8+").unwrap(), "??>");
        // embedded line breaks
        assert_eq!(decode_base64("YWVzLTI1\nNi1nY206cGFzcw==\n").unwrap(), "aes-256-gcm:pass");
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert_eq!(decode_base64("vless://abc@host:1"), Err(DecodeError::InvalidBase64));
        assert_eq!(decode_base64(""), Err(DecodeError::InvalidBase64));
        assert_eq!(decode_base64("===="), Err(DecodeError::InvalidBase64));
    }

    #[test]
    fn test_percent_coding() {
        assert_eq!(pct_decode("%F0%9F%87%AF%F0%9F%87%B5test"), "🇯🇵test");
        assert_eq!(pct_decode("%ZZ"), "%ZZ");
        assert_eq!(pct_encode("/ws path"), "%2Fws%20path");
        assert_eq!(pct_encode("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[test]
    fn test_query_parse() {
        let q = Query::parse("sni=a.com&sni=b.com&empty=&flag&path=%2Fws");
        assert_eq!(q.get("sni"), Some("a.com"));
        assert_eq!(q.get("empty"), None);
        assert_eq!(q.get("flag"), None);
        assert_eq!(q.get("path"), Some("/ws"));
        assert_eq!(q.get_any(&["peer", "sni"]), Some("a.com"));
    }

    #[test]
    fn test_link_parts() {
        let parts = LinkParts::split("pw@host:443/?sni=x.com#My%20Node");
        assert_eq!(parts.body, "pw@host:443");
        assert_eq!(parts.query.get("sni"), Some("x.com"));
        assert_eq!(parts.name.as_deref(), Some("My Node"));
        assert_eq!(parts.userinfo(), (Some("pw"), "host:443"));

        let parts = LinkParts::split("host:443#");
        assert_eq!(parts.name, None);
        assert_eq!(parts.userinfo(), (None, "host:443"));
    }

    #[test]
    fn test_split_fragment_first_hash() {
        let (main, name) = split_fragment("abc#a%23b#c");
        assert_eq!(main, "abc");
        assert_eq!(name.as_deref(), Some("a#b#c"));
        assert_eq!(split_fragment("abc/"), ("abc/", None));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("[2001:db8::1]:443").unwrap(),
            ("2001:db8::1".to_string(), Some(443))
        );
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1".to_string(), None));
        assert_eq!(
            split_host_port("1.2.3.4:8388").unwrap(),
            ("1.2.3.4".to_string(), Some(8388))
        );
        assert_eq!(split_host_port("example.com").unwrap(), ("example.com".to_string(), None));
        assert_eq!(
            split_host_port("host:abc"),
            Err(DecodeError::InvalidPort("abc".to_string()))
        );
        assert_eq!(split_host_port("host:0"), Err(DecodeError::InvalidPort("0".to_string())));
        assert_eq!(split_host_port(":443"), Err(DecodeError::MissingField("server")));
        assert!(split_host_port("[::1:443").is_err());
    }

    #[test]
    fn test_query_builder() {
        let mut q = QueryBuilder::new();
        assert_eq!(q.finish(), "");
        q.push("type", "ws").push_opt("path", Some("/a b")).push_opt("host", None);
        assert_eq!(q.finish(), "?type=ws&path=%2Fa%20b");
    }

    #[test]
    fn test_host_for_link() {
        assert_eq!(host_for_link("::1"), "[::1]");
        assert_eq!(host_for_link("a.com"), "a.com");
    }
}
