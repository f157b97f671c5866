//! Geolocation of proxy servers
//!
//! The classifier only needs [`GeoLookup`]: a server string in, an ISO
//! country code out. [`GeoLocator`] answers it from a local MMDB file;
//! hostnames are not resolved and simply yield `None`.

use crate::Result;
use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Country lookup for a server address
pub trait GeoLookup {
    /// ISO 3166-1 alpha-2 code of the server's country, if known
    fn lookup(&self, server: &str) -> Option<String>;
}

/// Country-level location of an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "JP")
    pub country_code: Option<String>,
    /// Country name in English
    pub country_name: Option<String>,
    pub city_name: Option<String>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none() && self.country_name.is_none() && self.city_name.is_none()
    }
}

impl std::fmt::Display for GeoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.country_code, &self.city_name) {
            (Some(cc), Some(city)) => write!(f, "{}, {}", city, cc),
            (Some(cc), None) => write!(f, "{}", cc),
            (None, Some(city)) => write!(f, "{}", city),
            (None, None) => write!(f, "Unknown"),
        }
    }
}

/// MMDB-backed locator
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    /// Open an MMDB file (GeoLite2-City or GeoLite2-Country layout)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Location of an IP address
    pub fn locate(&self, ip: IpAddr) -> Result<GeoLocation> {
        let lookup_result = self.reader.lookup(ip)?;
        let city: Option<geoip2::City> = lookup_result.decode()?;

        let Some(city) = city else {
            return Ok(GeoLocation::default());
        };

        Ok(GeoLocation {
            country_code: city.country.iso_code.map(String::from),
            country_name: city.country.names.english.map(String::from),
            city_name: city.city.names.english.map(String::from),
        })
    }
}

impl GeoLookup for GeoLocator {
    fn lookup(&self, server: &str) -> Option<String> {
        let ip: IpAddr = server.trim_matches(|c| c == '[' || c == ']').parse().ok()?;
        match self.locate(ip) {
            Ok(location) => location.country_code,
            Err(e) => {
                debug!("Geolocation failed for {}: {}", server, e);
                None
            }
        }
    }
}

impl Clone for GeoLocator {
    fn clone(&self) -> Self {
        Self {
            reader: Arc::clone(&self.reader),
        }
    }
}

/// Fixed server-to-country table, counting how often it is asked
#[derive(Debug, Default)]
pub struct StaticGeo {
    entries: HashMap<String, String>,
    calls: Cell<usize>,
}

impl StaticGeo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, server: impl Into<String>, code: impl Into<String>) {
        self.entries.insert(server.into(), code.into());
    }

    /// Number of lookups served so far
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for StaticGeo {
    fn from(entries: [(&str, &str); N]) -> Self {
        let mut geo = Self::new();
        for (server, code) in entries {
            geo.insert(server, code);
        }
        geo
    }
}

impl GeoLookup for StaticGeo {
    fn lookup(&self, server: &str) -> Option<String> {
        self.calls.set(self.calls.get() + 1);
        self.entries.get(server).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_location_display() {
        let mut loc = GeoLocation::default();
        assert!(loc.is_empty());
        assert_eq!(loc.to_string(), "Unknown");

        loc.country_code = Some("US".to_string());
        assert_eq!(loc.to_string(), "US");

        loc.city_name = Some("New York".to_string());
        assert_eq!(loc.to_string(), "New York, US");
    }

    #[test]
    fn test_static_geo() {
        let geo = StaticGeo::from([("1.2.3.4", "JP")]);
        assert_eq!(geo.lookup("1.2.3.4").as_deref(), Some("JP"));
        assert_eq!(geo.lookup("example.com"), None);
        assert_eq!(geo.calls(), 2);
    }

    #[test]
    fn test_missing_database() {
        assert!(GeoLocator::from_path("/nonexistent/GeoLite2-City.mmdb").is_err());
    }
}
