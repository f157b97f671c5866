//! Link encoder, the inverse of the link decoder
//!
//! `decode(encode(r)) == r` holds for every record the decoder produces.
//! Query keys are written in field-table order using each field's canonical
//! spelling.

use crate::proxy::link::{encode_base64, encode_base64_url, host_for_link, pct_encode, QueryBuilder};
use crate::proxy::models::{Credentials, Network, ProxyRecord};
use crate::proxy::schemes::{self, Field, SchemeEntry};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Encode a record as a share link
pub fn encode(record: &ProxyRecord) -> String {
    let entry = schemes::entry(record.kind());
    (entry.encode)(entry, record)
}

/// Value the record holds for `field`, formatted for a link
fn field_value(record: &ProxyRecord, field: Field) -> Option<String> {
    let security = record.security.as_ref();
    let reality = security.and_then(|s| s.reality.as_ref());
    let transport = record.transport.as_ref();

    match field {
        Field::Security => security.and_then(|s| {
            if s.reality.is_some() {
                Some("reality".to_string())
            } else if s.tls {
                Some("tls".to_string())
            } else {
                None
            }
        }),
        Field::Sni => security.and_then(|s| s.sni.clone()),
        Field::Fingerprint => security.and_then(|s| s.fingerprint.clone()),
        Field::Alpn => security
            .filter(|s| !s.alpn.is_empty())
            .map(|s| s.alpn.join(",")),
        Field::Insecure => security
            .filter(|s| s.skip_cert_verify)
            .map(|_| "1".to_string()),
        Field::PublicKey => reality.and_then(|r| r.public_key.clone()),
        Field::ShortId => reality.and_then(|r| r.short_id.clone()),
        Field::SpiderX => reality.and_then(|r| r.spider_x.clone()),
        Field::Network => transport.map(|t| t.network.as_str().to_string()),
        Field::Path => transport.and_then(|t| t.path.clone()),
        Field::Host => transport.and_then(|t| t.host.clone()),
        Field::ServiceName => transport.and_then(|t| t.service_name.clone()),
        Field::Udp => record.udp.then(|| "1".to_string()),
        _ => credential_value(&record.credentials, field),
    }
}

fn credential_value(credentials: &Credentials, field: Field) -> Option<String> {
    match (field, credentials) {
        (Field::Flow, Credentials::Vless { flow, .. }) => flow.clone(),
        (
            Field::Obfs,
            Credentials::Hysteria { obfs, .. }
            | Credentials::Hysteria2 { obfs, .. }
            | Credentials::Snell { obfs, .. },
        ) => obfs.clone(),
        (Field::ObfsMode, Credentials::Hysteria { obfs, .. }) => {
            obfs.as_ref().map(|_| "xplus".to_string())
        }
        (Field::ObfsPassword, Credentials::Hysteria2 { obfs_password, .. }) => {
            obfs_password.clone()
        }
        (Field::ObfsHost, Credentials::Snell { obfs_host, .. }) => obfs_host.clone(),
        (Field::ObfsParam, Credentials::Ssr { obfs_param, .. }) => obfs_param.clone(),
        (Field::ProtocolParam, Credentials::Ssr { protocol_param, .. }) => protocol_param.clone(),
        (
            Field::Congestion,
            Credentials::Tuic {
                congestion_controller,
                ..
            },
        ) => congestion_controller.clone(),
        (Field::UdpRelayMode, Credentials::Tuic { udp_relay_mode, .. }) => udp_relay_mode.clone(),
        (Field::Auth, Credentials::Hysteria { auth, .. }) => auth.clone(),
        (Field::Up, Credentials::Hysteria { up, .. }) => up.clone(),
        (Field::Down, Credentials::Hysteria { down, .. }) => down.clone(),
        (Field::Ports, Credentials::Hysteria { ports, .. }) => ports.clone(),
        (Field::Protocol, Credentials::Hysteria { protocol, .. }) => protocol.clone(),
        (Field::PeerPublicKey, Credentials::Wireguard { public_key, .. }) => public_key.clone(),
        (Field::Address, Credentials::Wireguard { ip, ipv6, .. }) => {
            let addrs: Vec<&str> = ip.iter().chain(ipv6.iter()).map(String::as_str).collect();
            (!addrs.is_empty()).then(|| addrs.join(","))
        }
        (Field::Reserved, Credentials::Wireguard { reserved, .. }) => {
            reserved.map(|[a, b, c]| format!("{a},{b},{c}"))
        }
        (Field::Mtu, Credentials::Wireguard { mtu, .. }) => mtu.map(|m| m.to_string()),
        (Field::Version, Credentials::Snell { version, .. }) => version.map(|v| v.to_string()),
        // the private key travels in the userinfo
        _ => None,
    }
}

/// Query string for every field of a table, canonical keys only
fn build_query(record: &ProxyRecord, fields: &[(&'static str, Field)]) -> String {
    let mut seen = HashSet::new();
    let mut query = QueryBuilder::new();
    for (key, field) in fields {
        if seen.insert(*field) {
            query.push_opt(key, field_value(record, *field).as_deref());
        }
    }
    query.finish()
}

fn userinfo_pair(user: &str, pass: Option<&str>) -> String {
    match pass {
        Some(pass) => format!("{}:{}@", pct_encode(user), pct_encode(pass)),
        None => format!("{}@", pct_encode(user)),
    }
}

/// Encoder for every `userinfo@host:port?query#name` scheme
pub(crate) fn encode_uri(entry: &SchemeEntry, record: &ProxyRecord) -> String {
    let tls = record.security.as_ref().is_some_and(|s| s.tls);
    // socks5+tls:// and https:// carry the TLS flag themselves
    let prefix = entry
        .prefixes
        .iter()
        .find(|p| tls && schemes::prefix_implies_tls(p))
        .unwrap_or(&entry.prefixes[0]);

    let userinfo = match &record.credentials {
        Credentials::Vless { uuid, .. } => userinfo_pair(uuid, None),
        Credentials::Trojan { password }
        | Credentials::Hysteria2 { password, .. }
        | Credentials::Anytls { password } => userinfo_pair(password, None),
        Credentials::Snell { psk, .. } => userinfo_pair(psk, None),
        Credentials::Wireguard { private_key, .. } => userinfo_pair(private_key, None),
        Credentials::Tuic { uuid, password, .. } => userinfo_pair(uuid, Some(password)),
        Credentials::Socks5 { username, password } | Credentials::Http { username, password } => {
            match (username, password) {
                (Some(user), password) => userinfo_pair(user, password.as_deref()),
                (None, Some(password)) => format!(":{}@", pct_encode(password)),
                (None, None) => String::new(),
            }
        }
        _ => String::new(),
    };

    format!(
        "{}{}{}:{}{}#{}",
        prefix,
        userinfo,
        host_for_link(&record.server),
        record.port,
        build_query(record, entry.fields),
        pct_encode(&record.name)
    )
}

/// `vmess://base64(json)`
pub(crate) fn encode_vmess(entry: &SchemeEntry, record: &ProxyRecord) -> String {
    let (uuid, alter_id, cipher) = match &record.credentials {
        Credentials::Vmess {
            uuid,
            alter_id,
            cipher,
        } => (uuid.as_str(), *alter_id, cipher.as_str()),
        _ => ("", 0, "auto"),
    };
    let network = record
        .transport
        .as_ref()
        .map(|t| t.network)
        .unwrap_or_default();
    let tls = record.security.as_ref().is_some_and(|s| s.tls);

    let mut object = Map::new();
    let mut put = |key: &str, value: String| {
        object.insert(key.to_string(), Value::String(value));
    };
    put("v", "2".to_string());
    put("ps", record.name.clone());
    put("add", record.server.clone());
    put("port", record.port.to_string());
    put("id", uuid.to_string());
    put("aid", alter_id.to_string());
    put("scy", cipher.to_string());
    put("net", network.as_str().to_string());
    put("type", "none".to_string());
    put("tls", if tls { "tls" } else { "" }.to_string());

    for (key, field) in entry.fields {
        let field = match field {
            Field::Path if network == Network::Grpc => Field::ServiceName,
            other => *other,
        };
        if let Some(value) = field_value(record, field) {
            put(*key, value);
        }
    }

    format!("{}{}", entry.prefixes[0], encode_base64(&Value::Object(object).to_string()))
}

/// `ss://base64(method:password)@host:port#name`
pub(crate) fn encode_ss(entry: &SchemeEntry, record: &ProxyRecord) -> String {
    let userinfo = match &record.credentials {
        Credentials::Ss { cipher, password } => encode_base64(&format!("{cipher}:{password}")),
        _ => String::new(),
    };
    format!(
        "{}{}@{}:{}#{}",
        entry.prefixes[0],
        userinfo,
        host_for_link(&record.server),
        record.port,
        pct_encode(&record.name)
    )
}

/// `ssr://base64(server:port:protocol:method:obfs:base64(password)/?params)`
pub(crate) fn encode_ssr(entry: &SchemeEntry, record: &ProxyRecord) -> String {
    let Credentials::Ssr {
        cipher,
        password,
        protocol,
        obfs,
        ..
    } = &record.credentials
    else {
        return String::new();
    };

    let mut params = vec![format!("remarks={}", encode_base64_url(&record.name))];
    for (key, field) in entry.fields {
        if let Some(value) = credential_value(&record.credentials, *field) {
            params.push(format!("{}={}", key, encode_base64_url(&value)));
        }
    }
    let body = format!(
        "{}:{}:{}:{}:{}:{}/?{}",
        record.server,
        record.port,
        protocol,
        cipher,
        obfs,
        encode_base64_url(password),
        params.join("&")
    );
    format!("{}{}", entry.prefixes[0], encode_base64_url(&body))
}
