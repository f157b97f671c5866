//! Name sanitizer and country classifier
//!
//! Classification is a waterfall over static tables, first match wins:
//!
//! 1. the name starts with a country flag,
//! 2. the name contains a country flag,
//! 3. a keyword from the country's pattern list appears in the name,
//! 4. the server resolves to a country through a [`GeoCache`],
//! 5. otherwise the reserved unknown region.
//!
//! Generic glyphs (globe, unknown marker) are stripped by
//! [`remove_decoration`] but never count as a flag.

use crate::proxy::geo::GeoLookup;
use crate::proxy::models::ProxyRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// One entry of the country table
#[derive(Debug)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code
    pub code: &'static str,
    pub name: &'static str,
    /// Keyword patterns, matched in order
    pub keywords: &'static [&'static str],
}

const fn country(
    code: &'static str,
    name: &'static str,
    keywords: &'static [&'static str],
) -> Country {
    Country {
        code,
        name,
        keywords,
    }
}

/// Recognized countries in classification priority order
pub static COUNTRIES: &[Country] = &[
    country("HK", "Hong Kong", &["HK", "Hong Kong", "香港", "Hongkong"]),
    country("TW", "Taiwan", &["TW", "Taiwan", "台湾", "Taipei"]),
    country("JP", "Japan", &["JP", "Japan", "日本", "Tokyo", "Osaka"]),
    country(
        "US",
        "United States",
        &["US", "United States", "美国", "America", "USA", "Los Angeles", "Seattle", "San Jose"],
    ),
    country("SG", "Singapore", &["SG", "Singapore", "新加坡"]),
    country("KR", "Korea", &["KR", "Korea", "韩国", "Seoul"]),
    country(
        "GB",
        "United Kingdom",
        &["GB", "UK", "United Kingdom", "英国", "England", "London"],
    ),
    country("DE", "Germany", &["DE", "Germany", "德国", "Frankfurt"]),
    country("CA", "Canada", &["CA", "Canada", "加拿大", "Toronto", "Vancouver"]),
    country("AU", "Australia", &["AU", "Australia", "澳大利亚", "澳洲", "Sydney"]),
    country("FR", "France", &["FR", "France", "法国", "Paris"]),
    country("RU", "Russia", &["RU", "Russia", "俄罗斯", "Moscow"]),
    country("IN", "India", &["IN", "India", "印度"]),
    country("NL", "Netherlands", &["NL", "Netherlands", "荷兰", "Amsterdam"]),
    country("TR", "Turkey", &["TR", "Turkey", "土耳其", "Istanbul"]),
    country("AQ", "Antarctica", &["Antarctica", "南极"]),
    country("MY", "Malaysia", &["MY", "Malaysia", "马来西亚"]),
    country("ES", "Spain", &["ES", "Spain", "西班牙"]),
    country("VN", "Vietnam", &["VN", "Vietnam", "越南"]),
    country("UA", "Ukraine", &["UA", "Ukraine", "乌克兰"]),
    country("MD", "Moldova", &["MD", "Moldova", "摩尔多瓦"]),
    country("NG", "Nigeria", &["NG", "Nigeria", "尼日利亚"]),
    country("BR", "Brazil", &["BR", "Brazil", "巴西"]),
    country("IT", "Italy", &["IT", "Italy", "意大利"]),
    country("PL", "Poland", &["PL", "Poland", "波兰"]),
    country("CH", "Switzerland", &["CH", "Switzerland", "瑞士"]),
    country("AT", "Austria", &["AT", "Austria", "奥地利"]),
    country("BE", "Belgium", &["BE", "Belgium", "比利时"]),
    country("SE", "Sweden", &["SE", "Sweden", "瑞典"]),
    country("NO", "Norway", &["NO", "Norway", "挪威"]),
    country("DK", "Denmark", &["DK", "Denmark", "丹麦"]),
    country("FI", "Finland", &["FI", "Finland", "芬兰"]),
    country("IE", "Ireland", &["IE", "Ireland", "爱尔兰"]),
    country("PT", "Portugal", &["PT", "Portugal", "葡萄牙"]),
    country("GR", "Greece", &["GR", "Greece", "希腊"]),
    country("CZ", "Czechia", &[]),
    country("HU", "Hungary", &[]),
    country("RO", "Romania", &[]),
    country("BG", "Bulgaria", &[]),
    country("HR", "Croatia", &[]),
    country("SK", "Slovakia", &[]),
    country("SI", "Slovenia", &[]),
    country("LT", "Lithuania", &[]),
    country("LV", "Latvia", &[]),
    country("EE", "Estonia", &[]),
    country("IL", "Israel", &["IL", "Israel", "以色列"]),
    country("AE", "United Arab Emirates", &["AE", "UAE", "阿联酋", "Dubai"]),
    country("SA", "Saudi Arabia", &[]),
    country("QA", "Qatar", &[]),
    country("KW", "Kuwait", &[]),
    country("OM", "Oman", &[]),
    country("BH", "Bahrain", &[]),
    country("JO", "Jordan", &[]),
    country("LB", "Lebanon", &[]),
    country("EG", "Egypt", &[]),
    country("ZA", "South Africa", &["ZA", "South Africa", "南非"]),
    country("KE", "Kenya", &[]),
    country("NZ", "New Zealand", &["NZ", "New Zealand", "新西兰"]),
    country("PH", "Philippines", &["PH", "Philippines", "菲律宾"]),
    country("TH", "Thailand", &["TH", "Thailand", "泰国"]),
    country("ID", "Indonesia", &["ID", "Indonesia", "印尼", "印度尼西亚"]),
    country("PK", "Pakistan", &["PK", "Pakistan", "巴基斯坦"]),
    country("BD", "Bangladesh", &[]),
    country("LK", "Sri Lanka", &[]),
    country("NP", "Nepal", &[]),
    country("MM", "Myanmar", &[]),
    country("KH", "Cambodia", &[]),
    country("LA", "Laos", &[]),
    country("MN", "Mongolia", &[]),
    country("KZ", "Kazakhstan", &[]),
    country("UZ", "Uzbekistan", &[]),
    country("AZ", "Azerbaijan", &[]),
    country("GE", "Georgia", &[]),
    country("AM", "Armenia", &[]),
    country("CY", "Cyprus", &[]),
    country("MT", "Malta", &[]),
    country("IS", "Iceland", &[]),
    country("LU", "Luxembourg", &[]),
    country("MC", "Monaco", &[]),
    country("AD", "Andorra", &[]),
    country("LI", "Liechtenstein", &[]),
    country("SM", "San Marino", &[]),
    country("VA", "Vatican City", &[]),
    country("MX", "Mexico", &["MX", "Mexico", "墨西哥"]),
    country("AR", "Argentina", &["AR", "Argentina", "阿根廷"]),
    country("CL", "Chile", &[]),
    country("CO", "Colombia", &[]),
    country("PE", "Peru", &[]),
    country("VE", "Venezuela", &[]),
    country("EC", "Ecuador", &[]),
    country("BO", "Bolivia", &[]),
    country("PY", "Paraguay", &[]),
    country("UY", "Uruguay", &[]),
    country("CR", "Costa Rica", &[]),
    country("PA", "Panama", &[]),
    country("CU", "Cuba", &[]),
    country("DO", "Dominican Republic", &[]),
    country("PR", "Puerto Rico", &[]),
    country("JM", "Jamaica", &[]),
    country("HT", "Haiti", &[]),
];

/// Decorative glyphs that are removed but never identify a country
pub const GENERIC_GLYPHS: &[&str] = &["🔰", "🌏", "🌍", "🌎", "🏳\u{fe0f}"];

pub const UNKNOWN_FLAG: &str = "🔰";
pub const UNKNOWN_LABEL: &str = "🔰 Unknown";

enum Pattern {
    /// Chinese-script keyword, plain substring
    Cjk(&'static str),
    /// Short Latin code that needs non-letter boundaries
    Code(Regex),
    /// Longer Latin keyword, uppercased for case-insensitive containment
    Word(String),
}

impl Pattern {
    fn new(keyword: &'static str) -> Option<Self> {
        if keyword.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
            Some(Pattern::Cjk(keyword))
        } else if keyword.chars().count() <= 3 {
            let pattern = format!(r"(?i)(?:^|[^A-Za-z]){}(?:$|[^A-Za-z])", regex::escape(keyword));
            Regex::new(&pattern).ok().map(Pattern::Code)
        } else {
            Some(Pattern::Word(keyword.to_uppercase()))
        }
    }

    fn matches(&self, name: &str, upper: &str) -> bool {
        match self {
            Pattern::Cjk(keyword) => name.contains(keyword),
            Pattern::Code(re) => re.is_match(name),
            Pattern::Word(keyword) => upper.contains(keyword.as_str()),
        }
    }
}

struct Entry {
    flag: String,
    label: String,
    patterns: Vec<Pattern>,
}

/// Regional indicator pair for an ISO code
fn flag_for(code: &str) -> String {
    code.bytes()
        .filter(u8::is_ascii_uppercase)
        .filter_map(|b| char::from_u32(0x1F1E6 + u32::from(b - b'A')))
        .collect()
}

static TABLE: Lazy<Vec<Entry>> = Lazy::new(|| {
    COUNTRIES
        .iter()
        .map(|country| {
            let flag = flag_for(country.code);
            Entry {
                label: format!("{} {}", flag, country.name),
                flag,
                patterns: country.keywords.iter().copied().filter_map(Pattern::new).collect(),
            }
        })
        .collect()
});

/// Classification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Index into [`COUNTRIES`]
    Country(usize),
    Unknown,
}

impl Region {
    /// Region for an ISO code, as returned by a geolocation lookup
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase();
        COUNTRIES
            .iter()
            .position(|c| c.code == code)
            .map(Region::Country)
    }

    pub fn country(&self) -> Option<&'static Country> {
        match self {
            Region::Country(index) => COUNTRIES.get(*index),
            Region::Unknown => None,
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            Region::Country(index) => TABLE.get(*index).map_or(UNKNOWN_FLAG, |e| e.flag.as_str()),
            Region::Unknown => UNKNOWN_FLAG,
        }
    }

    /// Group label, e.g. `🇯🇵 Japan`
    pub fn label(&self) -> &'static str {
        match self {
            Region::Country(index) => TABLE.get(*index).map_or(UNKNOWN_LABEL, |e| e.label.as_str()),
            Region::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-run memo of geolocation answers, keyed by server string.
///
/// One cache belongs to one aggregation pass; concurrent passes each get
/// their own.
pub struct GeoCache<'a> {
    lookup: &'a dyn GeoLookup,
    resolved: HashMap<String, Region>,
}

impl<'a> GeoCache<'a> {
    pub fn new(lookup: &'a dyn GeoLookup) -> Self {
        Self {
            lookup,
            resolved: HashMap::new(),
        }
    }

    /// Resolve a server, consulting the collaborator at most once per server
    pub fn resolve(&mut self, server: &str) -> Region {
        if let Some(region) = self.resolved.get(server) {
            return *region;
        }
        let region = self
            .lookup
            .lookup(server)
            .and_then(|code| Region::from_code(&code))
            .unwrap_or(Region::Unknown);
        self.resolved.insert(server.to_string(), region);
        region
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Steps 1 to 3 of the waterfall, name only
pub fn classify_name(name: &str) -> Option<Region> {
    let table = &*TABLE;

    if let Some(index) = table.iter().position(|e| name.starts_with(e.flag.as_str())) {
        return Some(Region::Country(index));
    }
    if let Some(index) = table.iter().position(|e| name.contains(e.flag.as_str())) {
        return Some(Region::Country(index));
    }

    let upper = name.to_uppercase();
    table
        .iter()
        .position(|e| e.patterns.iter().any(|p| p.matches(name, &upper)))
        .map(Region::Country)
}

/// Full waterfall: name heuristics, then geolocation of `server`, then unknown
pub fn classify(name: &str, server: Option<&str>, geo: Option<&mut GeoCache<'_>>) -> Region {
    if let Some(region) = classify_name(name) {
        return region;
    }
    match (server, geo) {
        (Some(server), Some(cache)) if !server.trim().is_empty() => cache.resolve(server.trim()),
        _ => Region::Unknown,
    }
}

fn strip_glyphs(name: &str) -> String {
    let mut cleaned = name.to_string();
    for entry in TABLE.iter() {
        if cleaned.contains(entry.flag.as_str()) {
            cleaned = cleaned.replace(entry.flag.as_str(), "");
        }
    }
    for glyph in GENERIC_GLYPHS {
        cleaned = cleaned.replace(glyph, "");
    }
    cleaned
}

/// Delete every flag and generic glyph, then collapse whitespace.
///
/// Removing a glyph can pair up two stray regional indicators into a new
/// flag, so stripping repeats until nothing changes.
pub fn remove_decoration(name: &str) -> String {
    let mut cleaned = strip_glyphs(name);
    loop {
        let next = strip_glyphs(&cleaned);
        if next == cleaned {
            break;
        }
        cleaned = next;
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Copy of `record` named `"{flag} {prefix} {clean name}"`.
///
/// The flag comes from classifying the original, still decorated name.
/// When the cleaned name already starts with one of `known_prefixes`
/// followed by a space or hyphen, the prefix is not repeated.
pub fn rename(
    record: &ProxyRecord,
    prefix: &str,
    known_prefixes: &[&str],
    geo: Option<&mut GeoCache<'_>>,
) -> ProxyRecord {
    let region = classify(&record.name, Some(&record.server), geo);
    let cleaned = remove_decoration(&record.name).replace("[ipv6]", "ipv6");

    let has_prefix = known_prefixes
        .iter()
        .chain(std::iter::once(&prefix))
        .filter(|p| !p.is_empty())
        .any(|p| cleaned.starts_with(&format!("{p} ")) || cleaned.starts_with(&format!("{p}-")));

    let name = if has_prefix || prefix.is_empty() {
        format!("{} {}", region.flag(), cleaned)
    } else {
        format!("{} {} {}", region.flag(), prefix, cleaned)
    };
    record.with_name(name.trim_end().to_string())
}
