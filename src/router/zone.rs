//! Zone Classification
//!
//! Maps ISO 3166-1 alpha-2 country codes to coarse zones that share a
//! provider priority list. Unmapped codes are not an error: the router
//! substitutes its configured fallback zone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::CountryCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Africa,
    Europe,
    NorthAmerica,
    Asia,
    LatinAmerica,
    MiddleEast,
    Oceania,
}

impl Zone {
    pub const ALL: [Zone; 7] = [
        Zone::Africa,
        Zone::Europe,
        Zone::NorthAmerica,
        Zone::Asia,
        Zone::LatinAmerica,
        Zone::MiddleEast,
        Zone::Oceania,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Africa => "africa",
            Zone::Europe => "europe",
            Zone::NorthAmerica => "north_america",
            Zone::Asia => "asia",
            Zone::LatinAmerica => "latin_america",
            Zone::MiddleEast => "middle_east",
            Zone::Oceania => "oceania",
        }
    }

    /// Zone for a country, `None` when the code is not mapped
    pub fn classify(country: &CountryCode) -> Option<Zone> {
        let code = country.as_str();
        if AFRICA.contains(&code) {
            Some(Zone::Africa)
        } else if EUROPE.contains(&code) {
            Some(Zone::Europe)
        } else if NORTH_AMERICA.contains(&code) {
            Some(Zone::NorthAmerica)
        } else if LATIN_AMERICA.contains(&code) {
            Some(Zone::LatinAmerica)
        } else if MIDDLE_EAST.contains(&code) {
            Some(Zone::MiddleEast)
        } else if ASIA.contains(&code) {
            Some(Zone::Asia)
        } else if OCEANIA.contains(&code) {
            Some(Zone::Oceania)
        } else {
            None
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Zone::ALL
            .iter()
            .copied()
            .find(|z| z.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown zone: {}", s))
    }
}

const AFRICA: &[&str] = &[
    "DZ", "AO", "BJ", "BW", "BF", "BI", "CV", "CM", "CF", "TD", "KM", "CG", "CD", "CI", "DJ",
    "EG", "GQ", "ER", "SZ", "ET", "GA", "GM", "GH", "GN", "GW", "KE", "LS", "LR", "LY", "MG",
    "MW", "ML", "MR", "MU", "MA", "MZ", "NA", "NE", "NG", "RW", "ST", "SN", "SC", "SL", "SO",
    "ZA", "SS", "SD", "TZ", "TG", "TN", "UG", "ZM", "ZW",
];

const EUROPE: &[&str] = &[
    "AL", "AD", "AT", "BY", "BE", "BA", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE",
    "GR", "HU", "IS", "IE", "IT", "XK", "LV", "LI", "LT", "LU", "MT", "MD", "MC", "ME", "NL",
    "MK", "NO", "PL", "PT", "RO", "RU", "SM", "RS", "SK", "SI", "ES", "SE", "CH", "UA", "GB",
    "VA",
];

const NORTH_AMERICA: &[&str] = &["US", "CA", "MX", "BM", "GL", "PM"];

const LATIN_AMERICA: &[&str] = &[
    "AR", "BO", "BR", "CL", "CO", "CR", "CU", "DO", "EC", "SV", "GT", "HN", "HT", "JM", "NI",
    "PA", "PY", "PE", "PR", "TT", "UY", "VE", "BZ", "GY", "SR", "BS", "BB",
];

const MIDDLE_EAST: &[&str] = &[
    "AE", "BH", "IL", "IQ", "IR", "JO", "KW", "LB", "OM", "PS", "QA", "SA", "SY", "TR", "YE",
];

const ASIA: &[&str] = &[
    "AF", "AM", "AZ", "BD", "BT", "BN", "KH", "CN", "GE", "HK", "IN", "ID", "JP", "KZ", "KG",
    "LA", "MO", "MY", "MV", "MN", "MM", "NP", "KP", "KR", "PK", "PH", "SG", "LK", "TW", "TJ",
    "TH", "TL", "TM", "UZ", "VN",
];

const OCEANIA: &[&str] = &[
    "AU", "NZ", "FJ", "PG", "WS", "TO", "VU", "SB", "KI", "FM", "MH", "NR", "PW", "TV",
];
