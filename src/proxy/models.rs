//! Proxy data models

use crate::proxy::error::DecodeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Proxy protocol enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Vmess,
    Vless,
    Ss,
    Ssr,
    Trojan,
    Hysteria,
    Hysteria2,
    Tuic,
    Anytls,
    Wireguard,
    Socks5,
    Http,
    Snell,
}

impl ProxyKind {
    pub const ALL: [ProxyKind; 13] = [
        ProxyKind::Vmess,
        ProxyKind::Vless,
        ProxyKind::Ss,
        ProxyKind::Ssr,
        ProxyKind::Trojan,
        ProxyKind::Hysteria,
        ProxyKind::Hysteria2,
        ProxyKind::Tuic,
        ProxyKind::Anytls,
        ProxyKind::Wireguard,
        ProxyKind::Socks5,
        ProxyKind::Http,
        ProxyKind::Snell,
    ];

    /// The `type` value used by structured documents
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyKind::Vmess => "vmess",
            ProxyKind::Vless => "vless",
            ProxyKind::Ss => "ss",
            ProxyKind::Ssr => "ssr",
            ProxyKind::Trojan => "trojan",
            ProxyKind::Hysteria => "hysteria",
            ProxyKind::Hysteria2 => "hysteria2",
            ProxyKind::Tuic => "tuic",
            ProxyKind::Anytls => "anytls",
            ProxyKind::Wireguard => "wireguard",
            ProxyKind::Socks5 => "socks5",
            ProxyKind::Http => "http",
            ProxyKind::Snell => "snell",
        }
    }

    /// Parse a structured-document `type` value
    pub fn from_type(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Display name used when a link carries no `#fragment`
    pub fn default_name(&self) -> &'static str {
        match self {
            ProxyKind::Vmess => "VMess Node",
            ProxyKind::Vless => "VLESS Node",
            ProxyKind::Ss => "SS Node",
            ProxyKind::Ssr => "SSR Node",
            ProxyKind::Trojan => "Trojan Node",
            ProxyKind::Hysteria => "Hysteria Node",
            ProxyKind::Hysteria2 => "Hysteria2 Node",
            ProxyKind::Tuic => "TUIC Node",
            ProxyKind::Anytls => "AnyTLS Node",
            ProxyKind::Wireguard => "WireGuard Node",
            ProxyKind::Socks5 => "SOCKS5 Node",
            ProxyKind::Http => "HTTP Node",
            ProxyKind::Snell => "Snell Node",
        }
    }

    /// UDP capability assumed when the source says nothing
    pub fn default_udp(&self) -> bool {
        matches!(
            self,
            ProxyKind::Vmess
                | ProxyKind::Vless
                | ProxyKind::Ss
                | ProxyKind::Ssr
                | ProxyKind::Trojan
                | ProxyKind::Hysteria2
                | ProxyKind::Tuic
                | ProxyKind::Wireguard
        )
    }

    /// Whether TLS is an explicit, optional switch for this protocol.
    ///
    /// Protocols that always run over TLS (trojan, hysteria, anytls, ...)
    /// never set [`Security::tls`].
    pub fn has_tls_switch(&self) -> bool {
        matches!(
            self,
            ProxyKind::Vmess | ProxyKind::Vless | ProxyKind::Socks5 | ProxyKind::Http
        )
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Ws,
    Grpc,
    H2,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Ws => "ws",
            Network::Grpc => "grpc",
            Network::H2 => "h2",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DecodeError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "tcp" => Ok(Network::Tcp),
            "ws" | "websocket" => Ok(Network::Ws),
            "grpc" => Ok(Network::Grpc),
            "h2" | "http2" => Ok(Network::H2),
            other => Err(DecodeError::UnsupportedNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream transport settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transport {
    pub network: Network,
    pub path: Option<String>,
    /// Host header (ws) or authority (h2)
    pub host: Option<String>,
    /// gRPC service name
    pub service_name: Option<String>,
}

impl Transport {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    /// A tcp transport with no options carries no information
    pub fn is_plain_tcp(&self) -> bool {
        self.network == Network::Tcp
            && self.path.is_none()
            && self.host.is_none()
            && self.service_name.is_none()
    }
}

/// REALITY handshake parameters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reality {
    pub public_key: Option<String>,
    pub short_id: Option<String>,
    pub spider_x: Option<String>,
}

/// TLS-level settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Security {
    pub tls: bool,
    pub sni: Option<String>,
    pub fingerprint: Option<String>,
    pub alpn: Vec<String>,
    pub skip_cert_verify: bool,
    pub reality: Option<Reality>,
}

impl Security {
    pub fn is_empty(&self) -> bool {
        self == &Security::default()
    }
}

/// Protocol-specific credentials and options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Credentials {
    Vmess {
        uuid: String,
        alter_id: u32,
        cipher: String,
    },
    Vless {
        uuid: String,
        flow: Option<String>,
    },
    Ss {
        cipher: String,
        password: String,
    },
    Ssr {
        cipher: String,
        password: String,
        protocol: String,
        protocol_param: Option<String>,
        obfs: String,
        obfs_param: Option<String>,
    },
    Trojan {
        password: String,
    },
    Hysteria {
        auth: Option<String>,
        up: Option<String>,
        down: Option<String>,
        /// Obfuscation password
        obfs: Option<String>,
        /// Transport protocol (udp, wechat-video, faketcp)
        protocol: Option<String>,
        /// Port hopping range
        ports: Option<String>,
    },
    Hysteria2 {
        password: String,
        obfs: Option<String>,
        obfs_password: Option<String>,
    },
    Tuic {
        uuid: String,
        password: String,
        congestion_controller: Option<String>,
        udp_relay_mode: Option<String>,
    },
    Anytls {
        password: String,
    },
    Wireguard {
        private_key: String,
        public_key: Option<String>,
        ip: Option<String>,
        ipv6: Option<String>,
        reserved: Option<[u8; 3]>,
        mtu: Option<u32>,
    },
    Socks5 {
        username: Option<String>,
        password: Option<String>,
    },
    Http {
        username: Option<String>,
        password: Option<String>,
    },
    Snell {
        psk: String,
        version: Option<u8>,
        obfs: Option<String>,
        obfs_host: Option<String>,
    },
}

impl Credentials {
    pub fn kind(&self) -> ProxyKind {
        match self {
            Credentials::Vmess { .. } => ProxyKind::Vmess,
            Credentials::Vless { .. } => ProxyKind::Vless,
            Credentials::Ss { .. } => ProxyKind::Ss,
            Credentials::Ssr { .. } => ProxyKind::Ssr,
            Credentials::Trojan { .. } => ProxyKind::Trojan,
            Credentials::Hysteria { .. } => ProxyKind::Hysteria,
            Credentials::Hysteria2 { .. } => ProxyKind::Hysteria2,
            Credentials::Tuic { .. } => ProxyKind::Tuic,
            Credentials::Anytls { .. } => ProxyKind::Anytls,
            Credentials::Wireguard { .. } => ProxyKind::Wireguard,
            Credentials::Socks5 { .. } => ProxyKind::Socks5,
            Credentials::Http { .. } => ProxyKind::Http,
            Credentials::Snell { .. } => ProxyKind::Snell,
        }
    }
}

/// Canonical record for one proxy endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub name: String,
    /// Hostname or IP literal, IPv6 without brackets
    pub server: String,
    pub port: u16,
    pub credentials: Credentials,
    pub transport: Option<Transport>,
    pub security: Option<Security>,
    pub udp: bool,
    /// Keys of a structured source entry that have no canonical field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ProxyRecord {
    /// Create a record with the protocol's default UDP flag and no stream settings
    pub fn new(name: String, server: String, port: u16, credentials: Credentials) -> Self {
        let udp = credentials.kind().default_udp();
        Self {
            name,
            server,
            port,
            credentials,
            transport: None,
            security: None,
            udp,
            extra: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> ProxyKind {
        self.credentials.kind()
    }

    /// Security settings, created empty on first access
    pub fn security_mut(&mut self) -> &mut Security {
        self.security.get_or_insert_with(Security::default)
    }

    /// Transport settings, created on first access
    pub fn transport_mut(&mut self) -> &mut Transport {
        self.transport.get_or_insert_with(Transport::default)
    }

    /// Collapse empty optional sections so equal configurations compare equal
    pub fn normalized(mut self) -> Self {
        if self.security.as_ref().is_some_and(Security::is_empty) {
            self.security = None;
        }
        if self.transport.as_ref().is_some_and(Transport::is_plain_tcp) {
            self.transport = None;
        }
        self
    }

    /// Check the record invariants: non-empty name and server, non-zero port
    pub fn validate(self) -> Result<Self, DecodeError> {
        if self.name.trim().is_empty() {
            return Err(DecodeError::InvalidRecord("empty name".to_string()));
        }
        if self.server.trim().is_empty() {
            return Err(DecodeError::MissingField("server"));
        }
        if self.port == 0 {
            return Err(DecodeError::InvalidPort("0".to_string()));
        }
        Ok(self.normalized())
    }

    /// Return a copy carrying a different display name
    pub fn with_name(&self, name: String) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    /// `server:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.server.contains(':') {
            format!("[{}]:{}", self.server, self.port)
        } else {
            format!("{}:{}", self.server, self.port)
        }
    }
}

impl fmt::Display for ProxyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind(), self.address(), self.name)
    }
}

/// Non-empty, no path separators, not `.` or `..`
pub fn is_file_safe_id(id: &str) -> bool {
    !id.trim().is_empty()
        && !id.contains(['/', '\\', '\0'])
        && id != "."
        && id != ".."
}

/// One origin of records in an aggregation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable identifier, also the cache file stem
    pub id: String,
    /// Position in the explicit ordering list, if listed
    pub order: Option<usize>,
    /// Display alias used as the rename prefix
    pub alias: Option<String>,
}

impl Source {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            order: None,
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = Some(order);
        self
    }

    /// Whether the id can be used as a file stem inside the cache directory
    pub fn has_file_safe_id(&self) -> bool {
        is_file_safe_id(&self.id)
    }

    /// Prefix inserted into renamed record names
    pub fn prefix(&self) -> &str {
        self.alias
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

/// Selection strategy of a proxy group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupStrategy {
    Select,
    UrlTest,
    Fallback,
}

impl fmt::Display for GroupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupStrategy::Select => write!(f, "select"),
            GroupStrategy::UrlTest => write!(f, "url-test"),
            GroupStrategy::Fallback => write!(f, "fallback"),
        }
    }
}

/// One node of the output selection graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub strategy: GroupStrategy,
    pub proxies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<u32>,
}

impl ProxyGroup {
    /// Manual selection group
    pub fn select(name: impl Into<String>, proxies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            strategy: GroupStrategy::Select,
            proxies,
            url: None,
            interval: None,
            tolerance: None,
        }
    }

    /// Lowest-latency group, probed by the client
    pub fn url_test(
        name: impl Into<String>,
        proxies: Vec<String>,
        url: String,
        interval: u32,
        tolerance: u32,
    ) -> Self {
        Self {
            name: name.into(),
            strategy: GroupStrategy::UrlTest,
            proxies,
            url: Some(url),
            interval: Some(interval),
            tolerance: Some(tolerance),
        }
    }

    /// First-healthy-in-order group
    pub fn fallback(name: impl Into<String>, proxies: Vec<String>, url: String, interval: u32) -> Self {
        Self {
            name: name.into(),
            strategy: GroupStrategy::Fallback,
            proxies,
            url: Some(url),
            interval: Some(interval),
            tolerance: None,
        }
    }
}
