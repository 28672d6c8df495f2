//! Built-in reference airports and per-airport distance column aliases.

use serde::Serialize;

use crate::phase::AirportBuffer;
use crate::types::LonLat;

/// Default "near the airport" radius: 3 nautical miles.
pub const DEFAULT_BUFFER_M: f64 = 3.0 * 1852.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Airport {
    pub code: &'static str,
    pub name: &'static str,
    pub lon: f64,
    pub lat: f64,
}

impl Airport {
    pub fn position(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }

    /// Buffer of `radius_m` around the reference point.
    pub fn buffer(&self, radius_m: f64) -> AirportBuffer {
        AirportBuffer::new(self.position(), radius_m)
    }
}

static AIRPORTS: &[Airport] = &[
    Airport {
        code: "BOS",
        name: "Boston Logan International",
        lon: -71.00956,
        lat: 42.36561,
    },
    Airport {
        code: "SEA",
        name: "Seattle-Tacoma International",
        lon: -122.3088,
        lat: 47.4502,
    },
    Airport {
        code: "OAK",
        name: "Oakland International",
        lon: -122.2197,
        lat: 37.7213,
    },
    Airport {
        code: "SFO",
        name: "San Francisco International",
        lon: -122.3790,
        lat: 37.6213,
    },
    Airport {
        code: "SJC",
        name: "San Jose International",
        lon: -121.9290,
        lat: 37.3626,
    },
    Airport {
        code: "SMF",
        name: "Sacramento International",
        lon: -121.5908,
        lat: 38.6954,
    },
];

/// All built-in airports.
pub fn all() -> &'static [Airport] {
    AIRPORTS
}

/// Look up an airport by IATA code, ignoring case and whitespace.
pub fn lookup(code: &str) -> Option<&'static Airport> {
    let code = code.trim();
    AIRPORTS.iter().find(|a| a.code.eq_ignore_ascii_case(code))
}

/// Distance column spellings seen for one airport, e.g. `dist_to_sfo`.
pub fn distance_aliases(code: &str) -> Vec<String> {
    let c = code.trim().to_ascii_lowercase();
    vec![
        format!("dis_to_{c}"),
        format!("dist_to_{c}"),
        format!("dist_to_{c}_km"),
        format!("{c}_km"),
        format!("dist_{c}_km"),
        format!("distance_to_{c}_km"),
        format!("distance_to_{c}"),
        format!("dist_{c}"),
    ]
}
