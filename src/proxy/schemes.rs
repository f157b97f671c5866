//! Static scheme registry and per-scheme query field tables
//!
//! Each supported protocol has one [`SchemeEntry`]: the URI prefixes it
//! answers to, the query keys it understands, and its decoder/encoder pair.
//! Within a field table the first key naming a [`Field`] is the canonical
//! spelling the encoder writes; later keys for the same field are accepted
//! aliases.

use crate::proxy::encoder;
use crate::proxy::error::DecodeError;
use crate::proxy::models::{ProxyKind, ProxyRecord};
use crate::proxy::parser;

/// Where a recognized query parameter lands in a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `tls`, `reality` or `none`
    Security,
    Sni,
    Fingerprint,
    Alpn,
    Insecure,
    Flow,
    PublicKey,
    ShortId,
    SpiderX,
    Network,
    Path,
    Host,
    ServiceName,
    Obfs,
    /// Obfuscation scheme name; hysteria only knows `xplus`
    ObfsMode,
    ObfsPassword,
    ObfsHost,
    /// ssr obfs parameter
    ObfsParam,
    /// ssr protocol parameter
    ProtocolParam,
    Congestion,
    UdpRelayMode,
    Udp,
    Auth,
    Up,
    Down,
    Ports,
    Protocol,
    PeerPublicKey,
    PrivateKey,
    Address,
    Reserved,
    Mtu,
    Version,
}

pub type FieldTable = &'static [(&'static str, Field)];

pub const VLESS_FIELDS: FieldTable = &[
    ("type", Field::Network),
    ("security", Field::Security),
    ("sni", Field::Sni),
    ("fp", Field::Fingerprint),
    ("alpn", Field::Alpn),
    ("flow", Field::Flow),
    ("pbk", Field::PublicKey),
    ("sid", Field::ShortId),
    ("spx", Field::SpiderX),
    ("path", Field::Path),
    ("host", Field::Host),
    ("serviceName", Field::ServiceName),
    ("allowInsecure", Field::Insecure),
    ("insecure", Field::Insecure),
];

pub const TROJAN_FIELDS: FieldTable = &[
    ("type", Field::Network),
    ("sni", Field::Sni),
    ("peer", Field::Sni),
    ("fp", Field::Fingerprint),
    ("alpn", Field::Alpn),
    ("allowInsecure", Field::Insecure),
    ("path", Field::Path),
    ("host", Field::Host),
    ("serviceName", Field::ServiceName),
];

pub const HYSTERIA2_FIELDS: FieldTable = &[
    ("sni", Field::Sni),
    ("insecure", Field::Insecure),
    ("obfs", Field::Obfs),
    ("obfs-password", Field::ObfsPassword),
    ("fp", Field::Fingerprint),
    ("alpn", Field::Alpn),
];

pub const HYSTERIA_FIELDS: FieldTable = &[
    ("auth", Field::Auth),
    ("peer", Field::Sni),
    ("sni", Field::Sni),
    ("alpn", Field::Alpn),
    ("upmbps", Field::Up),
    ("downmbps", Field::Down),
    ("obfs", Field::ObfsMode),
    ("obfsParam", Field::Obfs),
    ("insecure", Field::Insecure),
    ("mport", Field::Ports),
    ("protocol", Field::Protocol),
];

pub const TUIC_FIELDS: FieldTable = &[
    ("sni", Field::Sni),
    ("insecure", Field::Insecure),
    ("allow_insecure", Field::Insecure),
    ("congestion_control", Field::Congestion),
    ("alpn", Field::Alpn),
    ("udp_relay_mode", Field::UdpRelayMode),
];

pub const ANYTLS_FIELDS: FieldTable = &[
    ("sni", Field::Sni),
    ("insecure", Field::Insecure),
    ("alpn", Field::Alpn),
    ("fp", Field::Fingerprint),
    ("udp", Field::Udp),
];

pub const WIREGUARD_FIELDS: FieldTable = &[
    ("publickey", Field::PeerPublicKey),
    ("public-key", Field::PeerPublicKey),
    ("privatekey", Field::PrivateKey),
    ("private-key", Field::PrivateKey),
    ("address", Field::Address),
    ("ip", Field::Address),
    ("reserved", Field::Reserved),
    ("mtu", Field::Mtu),
];

pub const SNELL_FIELDS: FieldTable = &[
    ("version", Field::Version),
    ("obfs", Field::Obfs),
    ("obfs-host", Field::ObfsHost),
];

/// Keys of the vmess JSON body that map onto optional record fields.
/// Positional keys (`ps`, `add`, `port`, `id`, `aid`, `scy`, `net`, `tls`)
/// are handled by the vmess decoder itself.
pub const VMESS_JSON_FIELDS: FieldTable = &[
    ("sni", Field::Sni),
    ("alpn", Field::Alpn),
    ("fp", Field::Fingerprint),
    ("host", Field::Host),
    ("path", Field::Path),
];

/// Base64-valued parameters of the ssr body
pub const SSR_PARAMS: FieldTable = &[
    ("obfsparam", Field::ObfsParam),
    ("protoparam", Field::ProtocolParam),
];

pub type DecodeFn = fn(&SchemeEntry, &str, &str) -> Result<ProxyRecord, DecodeError>;
pub type EncodeFn = fn(&SchemeEntry, &ProxyRecord) -> String;

/// Decoder/encoder pair and grammar of one protocol
pub struct SchemeEntry {
    pub kind: ProxyKind,
    /// Accepted prefixes; the first is written by the encoder
    pub prefixes: &'static [&'static str],
    pub fields: FieldTable,
    /// Port used when the link omits one
    pub default_port: Option<u16>,
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

impl SchemeEntry {
    /// Canonical key the encoder writes for `field`
    pub fn canonical_key(&self, field: Field) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|(_, f)| *f == field)
            .map(|(key, _)| *key)
    }

    /// Every key accepted for `field`, canonical first
    pub fn keys_for(&self, field: Field) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|(_, f)| *f == field)
            .map(|(key, _)| *key)
            .collect()
    }
}

static VMESS: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Vmess,
    prefixes: &["vmess://"],
    fields: VMESS_JSON_FIELDS,
    default_port: None,
    decode: parser::decode_vmess,
    encode: encoder::encode_vmess,
};

static VLESS: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Vless,
    prefixes: &["vless://"],
    fields: VLESS_FIELDS,
    default_port: None,
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static SS: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Ss,
    prefixes: &["ss://"],
    fields: &[],
    default_port: None,
    decode: parser::decode_ss,
    encode: encoder::encode_ss,
};

static SSR: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Ssr,
    prefixes: &["ssr://"],
    fields: SSR_PARAMS,
    default_port: None,
    decode: parser::decode_ssr,
    encode: encoder::encode_ssr,
};

static TROJAN: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Trojan,
    prefixes: &["trojan://"],
    fields: TROJAN_FIELDS,
    default_port: None,
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static HYSTERIA: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Hysteria,
    prefixes: &["hysteria://", "hy://"],
    fields: HYSTERIA_FIELDS,
    default_port: Some(443),
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static HYSTERIA2: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Hysteria2,
    prefixes: &["hysteria2://", "hy2://"],
    fields: HYSTERIA2_FIELDS,
    default_port: None,
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static TUIC: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Tuic,
    prefixes: &["tuic://"],
    fields: TUIC_FIELDS,
    default_port: None,
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static ANYTLS: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Anytls,
    prefixes: &["anytls://"],
    fields: ANYTLS_FIELDS,
    default_port: Some(443),
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static WIREGUARD: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Wireguard,
    prefixes: &["wireguard://", "wg://"],
    fields: WIREGUARD_FIELDS,
    default_port: Some(51820),
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static SOCKS5: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Socks5,
    prefixes: &["socks5://", "socks5+tls://", "socks://"],
    fields: &[],
    default_port: Some(1080),
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static HTTP: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Http,
    prefixes: &["http://", "https://"],
    fields: &[],
    default_port: Some(80),
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

static SNELL: SchemeEntry = SchemeEntry {
    kind: ProxyKind::Snell,
    prefixes: &["snell://"],
    fields: SNELL_FIELDS,
    default_port: Some(443),
    decode: parser::decode_uri,
    encode: encoder::encode_uri,
};

pub static SCHEMES: &[&SchemeEntry] = &[
    &VMESS,
    &VLESS,
    &SS,
    &SSR,
    &TROJAN,
    &HYSTERIA,
    &HYSTERIA2,
    &TUIC,
    &ANYTLS,
    &WIREGUARD,
    &SOCKS5,
    &HTTP,
    &SNELL,
];

/// Registry entry for a protocol
pub fn entry(kind: ProxyKind) -> &'static SchemeEntry {
    match kind {
        ProxyKind::Vmess => &VMESS,
        ProxyKind::Vless => &VLESS,
        ProxyKind::Ss => &SS,
        ProxyKind::Ssr => &SSR,
        ProxyKind::Trojan => &TROJAN,
        ProxyKind::Hysteria => &HYSTERIA,
        ProxyKind::Hysteria2 => &HYSTERIA2,
        ProxyKind::Tuic => &TUIC,
        ProxyKind::Anytls => &ANYTLS,
        ProxyKind::Wireguard => &WIREGUARD,
        ProxyKind::Socks5 => &SOCKS5,
        ProxyKind::Http => &HTTP,
        ProxyKind::Snell => &SNELL,
    }
}

/// Find the scheme for a link by its prefix.
///
/// Matching is ASCII case-insensitive and the longest prefix wins, so
/// `hysteria2://` is never taken for `hysteria://` and `socks5+tls://` is
/// never taken for `socks5://`. Returns the entry, the matched prefix and the
/// remainder of the link.
pub fn match_scheme(link: &str) -> Option<(&'static SchemeEntry, &'static str, &str)> {
    SCHEMES
        .iter()
        .copied()
        .flat_map(|entry| entry.prefixes.iter().map(move |prefix| (entry, *prefix)))
        .filter(|(_, prefix)| {
            link.len() >= prefix.len()
                && link.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
        })
        .max_by_key(|(_, prefix)| prefix.len())
        .map(|(entry, prefix)| (entry, prefix, &link[prefix.len()..]))
}

/// Whether a matched prefix turns TLS on by itself
pub fn prefix_implies_tls(prefix: &str) -> bool {
    matches!(prefix, "socks5+tls://" | "https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_kinds() {
        for kind in ProxyKind::ALL {
            assert_eq!(
                SCHEMES.iter().filter(|e| e.kind == kind).count(),
                1,
                "{kind} must be registered once"
            );
            assert_eq!(entry(kind).kind, kind);
            assert!(SCHEMES.iter().any(|e| std::ptr::eq(*e, entry(kind))));
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (entry, prefix, rest) = match_scheme("hysteria2://pw@h:1").unwrap();
        assert_eq!(entry.kind, ProxyKind::Hysteria2);
        assert_eq!(prefix, "hysteria2://");
        assert_eq!(rest, "pw@h:1");

        let (entry, _, _) = match_scheme("hysteria://h:1").unwrap();
        assert_eq!(entry.kind, ProxyKind::Hysteria);

        let (entry, _, _) = match_scheme("hy2://pw@h:1").unwrap();
        assert_eq!(entry.kind, ProxyKind::Hysteria2);

        let (entry, _, _) = match_scheme("ssr://abc").unwrap();
        assert_eq!(entry.kind, ProxyKind::Ssr);

        let (_, prefix, _) = match_scheme("socks5+tls://h:1").unwrap();
        assert_eq!(prefix, "socks5+tls://");
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let (entry, _, rest) = match_scheme("VLESS://id@h:1").unwrap();
        assert_eq!(entry.kind, ProxyKind::Vless);
        assert_eq!(rest, "id@h:1");
        assert!(match_scheme("ftp://h").is_none());
        assert!(match_scheme("ss:").is_none());
    }

    #[test]
    fn test_canonical_keys() {
        let trojan = entry(ProxyKind::Trojan);
        assert_eq!(trojan.canonical_key(Field::Sni), Some("sni"));
        assert_eq!(trojan.keys_for(Field::Sni), vec!["sni", "peer"]);
        assert_eq!(trojan.canonical_key(Field::Flow), None);

        let wg = entry(ProxyKind::Wireguard);
        assert_eq!(wg.canonical_key(Field::PeerPublicKey), Some("publickey"));
    }
}
