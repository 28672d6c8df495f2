//! Shared types, error enum, and point/track records for trackline-core.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::columns::CanonicalField;

/// All errors produced by trackline-core.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("missing column for `{field}`: none of [{tried}] found in CSV header")]
    MissingColumn { field: CanonicalField, tried: String },
    #[error("no points survived filtering{} ({rows_read} rows read)", airport_suffix(.airport))]
    EmptyResult {
        airport: Option<String>,
        rows_read: u64,
    },
    #[error("CSV has no header row")]
    NoHeader,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

fn airport_suffix(airport: &Option<String>) -> String {
    match airport {
        Some(code) => format!(" for {code}"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, TrackError>;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// WGS-84 coordinate, longitude first (x, y) as written to shapefiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        LonLat { lon, lat }
    }
}

/// Latitude within [-90, 90] and finite.
pub fn valid_lat(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

/// Longitude within [-180, 180] and finite.
pub fn valid_lon(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}

// ---------------------------------------------------------------------------
// Filter configuration
// ---------------------------------------------------------------------------

/// How flight identifiers are normalized before grouping.
///
/// `Trimmed` keeps the identifier verbatim apart from surrounding whitespace,
/// so `"0042"` and `"42"` are different flights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightIdPolicy {
    #[default]
    Trimmed,
    StripLeadingZeros,
    Uppercase,
}

impl FlightIdPolicy {
    pub fn apply(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            FlightIdPolicy::Trimmed => trimmed.to_string(),
            FlightIdPolicy::StripLeadingZeros => {
                let stripped = trimmed.trim_start_matches('0');
                if stripped.is_empty() && !trimmed.is_empty() {
                    "0".to_string()
                } else {
                    stripped.to_string()
                }
            }
            FlightIdPolicy::Uppercase => trimmed.to_uppercase(),
        }
    }
}

/// Per-row inclusion knobs. `None` disables the corresponding rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_distance_km: Option<f64>,
    pub max_altitude_100ft: Option<f64>,
    pub departure_airport_code: Option<String>,
    /// Reject rows whose timestamp does not parse.
    #[serde(default)]
    pub require_timestamp: bool,
    #[serde(default)]
    pub flight_id: FlightIdPolicy,
}

// ---------------------------------------------------------------------------
// Points and tracks
// ---------------------------------------------------------------------------

/// Attribute key for the retained distance-to-airport value.
pub const ATTR_DIST_KM: &str = "dist_km";
/// Attribute key for the retained altitude (100 ft units).
pub const ATTR_ALT_100FT: &str = "alt_100ft";

/// One accepted position report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    pub flight_id: String,
    pub timestamp: Option<NaiveDateTime>,
    pub lat: f64,
    pub lon: f64,
    pub attributes: BTreeMap<String, f64>,
}

impl PointRecord {
    pub fn position(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }
}

/// Flight phase relative to a reference airport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Arrival,
    Departure,
    Local,
    Overflight,
    Unknown,
}

impl Phase {
    /// The four labels a classified track can carry.
    pub const CLASSIFIED: [Phase; 4] = [
        Phase::Arrival,
        Phase::Departure,
        Phase::Local,
        Phase::Overflight,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Arrival => "Arrival",
            Phase::Departure => "Departure",
            Phase::Local => "Local",
            Phase::Overflight => "Overflight",
            Phase::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A reconstructed flight: points of one flight id in timestamp order.
///
/// Always holds at least two points. The phase starts as `Unknown` and is
/// assigned once by [`Track::classified`].
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub flight_id: String,
    points: Vec<PointRecord>,
    phase: Phase,
}

impl Track {
    /// Returns `None` for fewer than two points.
    pub fn new(flight_id: String, points: Vec<PointRecord>) -> Option<Self> {
        if points.len() < 2 {
            return None;
        }
        Some(Track {
            flight_id,
            points,
            phase: Phase::Unknown,
        })
    }

    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Consume the track and return it with its phase set.
    pub fn classified(mut self, phase: Phase) -> Self {
        debug_assert_eq!(self.phase, Phase::Unknown, "phase assigned twice");
        self.phase = phase;
        self
    }

    pub fn vertices(&self) -> Vec<LonLat> {
        self.points.iter().map(PointRecord::position).collect()
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.points.iter().find_map(|p| p.timestamp)
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.points.iter().rev().find_map(|p| p.timestamp)
    }
}

/// Exported geometry of a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackLine {
    pub flight_id: String,
    pub phase: Phase,
    pub vertices: Vec<LonLat>,
    pub n_points: usize,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
}

impl TrackLine {
    /// Line through the track's points, optionally replaced by `vertices`.
    pub fn from_track(track: &Track, vertices: Option<Vec<LonLat>>) -> Self {
        TrackLine {
            flight_id: track.flight_id.clone(),
            phase: track.phase(),
            vertices: vertices.unwrap_or_else(|| track.vertices()),
            n_points: track.points().len(),
            start_time: track.start_time(),
            end_time: track.end_time(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, lat: f64, lon: f64) -> PointRecord {
        PointRecord {
            flight_id: id.into(),
            timestamp: None,
            lat,
            lon,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_flight_id_policy() {
        assert_eq!(FlightIdPolicy::Trimmed.apply("  0042 "), "0042");
        assert_eq!(FlightIdPolicy::StripLeadingZeros.apply("0042"), "42");
        assert_eq!(FlightIdPolicy::StripLeadingZeros.apply("000"), "0");
        assert_eq!(FlightIdPolicy::Uppercase.apply(" dal12 "), "DAL12");
    }

    #[test]
    fn test_track_requires_two_points() {
        assert!(Track::new("A".into(), vec![point("A", 1.0, 2.0)]).is_none());
        let track = Track::new("A".into(), vec![point("A", 1.0, 2.0), point("A", 1.5, 2.5)]);
        let track = track.unwrap();
        assert_eq!(track.phase(), Phase::Unknown);
        assert_eq!(track.vertices()[1], LonLat::new(2.5, 1.5));
    }

    #[test]
    fn test_classified_sets_phase() {
        let track = Track::new("A".into(), vec![point("A", 1.0, 2.0), point("A", 1.5, 2.5)])
            .unwrap()
            .classified(Phase::Arrival);
        assert_eq!(track.phase(), Phase::Arrival);
        assert_eq!(TrackLine::from_track(&track, None).phase, Phase::Arrival);
    }

    #[test]
    fn test_coordinate_ranges() {
        assert!(valid_lat(42.36));
        assert!(!valid_lat(91.0));
        assert!(!valid_lon(f64::NAN));
        assert!(valid_lon(-180.0));
    }

    #[test]
    fn test_error_messages() {
        let err = TrackError::EmptyResult {
            airport: Some("SFO".into()),
            rows_read: 12,
        };
        assert_eq!(err.to_string(), "no points survived filtering for SFO (12 rows read)");
        let err = TrackError::MissingColumn {
            field: CanonicalField::Lat,
            tried: "lat/latitude".into(),
        };
        assert!(err.to_string().contains("`lat`"));
    }
}
