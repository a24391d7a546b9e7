//! Visitor location lookup using a MaxMind GeoLite2/GeoIP2 City database
//!
//! Lookups use the anonymized address, so results are approximate by
//! construction (city level at best).

use std::net::IpAddr;

/// Location details attached to a visit record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorLocation {
    /// `"<city>, <country>"`, or just the country when the city is unknown
    pub location: Option<String>,
    /// IANA time zone name, e.g. `Europe/London`
    pub timezone: Option<String>,
}

#[cfg(feature = "geoip")]
mod service {
    use anyhow::{Context, Result};
    use maxminddb::{geoip2, Mmap, Reader};
    use std::net::IpAddr;
    use std::sync::Arc;

    use super::VisitorLocation;

    /// Memory-mapped City database reader, safe to share across tasks
    pub struct GeoIpService {
        city_reader: Arc<Reader<Mmap>>,
    }

    impl GeoIpService {
        pub fn new(city_path: &str) -> Result<Self> {
            let reader = unsafe { Reader::open_mmap(city_path) }
                .with_context(|| format!("Failed to open GeoIP City database at {}", city_path))?;
            Ok(Self {
                city_reader: Arc::new(reader),
            })
        }

        pub fn lookup(&self, ip: IpAddr) -> VisitorLocation {
            let Ok(result) = self.city_reader.lookup(ip) else {
                return VisitorLocation::default();
            };
            let Ok(Some(city)) = result.decode::<geoip2::City>() else {
                return VisitorLocation::default();
            };

            let country = city.country.names.english;
            let location = match (city.city.names.english, country) {
                (Some(city_name), Some(country)) => Some(format!("{city_name}, {country}")),
                (None, Some(country)) => Some(country.to_string()),
                (Some(city_name), None) => Some(city_name.to_string()),
                (None, None) => None,
            };

            VisitorLocation {
                location,
                timezone: city.location.time_zone.map(|tz| tz.to_string()),
            }
        }
    }
}

#[cfg(not(feature = "geoip"))]
mod service {
    use std::net::IpAddr;

    use super::VisitorLocation;

    /// Stand-in used when the crate is built without the `geoip` feature
    pub struct GeoIpService;

    impl GeoIpService {
        pub fn new(_city_path: &str) -> anyhow::Result<Self> {
            tracing::warn!("Built without the geoip feature, visitor locations are disabled");
            Ok(Self)
        }

        pub fn lookup(&self, _ip: IpAddr) -> VisitorLocation {
            VisitorLocation::default()
        }
    }
}

pub use service::GeoIpService;

/// Look up an anonymized address string, if a database is configured
pub fn locate(geoip: Option<&GeoIpService>, anonymized: &str) -> VisitorLocation {
    match (geoip, anonymized.parse::<IpAddr>()) {
        (Some(service), Ok(ip)) => service.lookup(ip),
        _ => VisitorLocation::default(),
    }
}
