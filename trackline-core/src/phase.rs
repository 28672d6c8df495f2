//! Phase classification against a circular airport buffer.
//!
//! A track is judged only by its first and last vertex: inside the buffer at
//! the start means it left the airport, inside at the end means it landed.

use serde::Serialize;

use crate::types::{LonLat, Phase};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Point reached by travelling `distance_m` from `origin` on `bearing_deg`.
pub fn destination(origin: LonLat, bearing_deg: f64, distance_m: f64) -> LonLat {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let phi1 = origin.lat.to_radians();
    let lambda1 = origin.lon.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());

    // normalize to [-180, 180)
    let lon = (lambda2.to_degrees() + 540.0) % 360.0 - 180.0;
    LonLat::new(lon, phi2.to_degrees())
}

// ---------------------------------------------------------------------------
// Airport buffer
// ---------------------------------------------------------------------------

/// Geodesic disk around an airport reference point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AirportBuffer {
    pub center: LonLat,
    pub radius_m: f64,
}

impl AirportBuffer {
    pub fn new(center: LonLat, radius_m: f64) -> Self {
        AirportBuffer { center, radius_m }
    }

    /// Boundary counts as inside.
    pub fn contains(&self, p: LonLat) -> bool {
        haversine_m(self.center.lat, self.center.lon, p.lat, p.lon) <= self.radius_m
    }

    /// Closed clockwise ring approximating the buffer boundary.
    ///
    /// Bearings run 0° → 360° (north, east, south, west), which is clockwise
    /// in lon/lat. The first vertex is repeated at the end.
    pub fn ring(&self, segments: usize) -> Vec<LonLat> {
        let segments = segments.max(8);
        let mut ring: Vec<LonLat> = (0..segments)
            .map(|i| {
                let bearing = 360.0 * i as f64 / segments as f64;
                destination(self.center, bearing, self.radius_m)
            })
            .collect();
        ring.push(ring[0]);
        ring
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Endpoint-in-buffer flags for one track. `None` means the test could not
/// be made (no geometry).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseFlags {
    pub near_start: Option<bool>,
    pub near_end: Option<bool>,
}

/// Map endpoint flags to a phase. Missing flags count as "not near".
pub fn classify(flags: PhaseFlags) -> Phase {
    match (
        flags.near_start.unwrap_or(false),
        flags.near_end.unwrap_or(false),
    ) {
        (true, false) => Phase::Departure,
        (false, true) => Phase::Arrival,
        (true, true) => Phase::Local,
        (false, false) => Phase::Overflight,
    }
}

/// Compute endpoint flags for a vertex sequence.
pub fn endpoint_flags(vertices: &[LonLat], buffer: &AirportBuffer) -> PhaseFlags {
    PhaseFlags {
        near_start: vertices.first().map(|p| buffer.contains(*p)),
        near_end: vertices.last().map(|p| buffer.contains(*p)),
    }
}

pub fn classify_track(vertices: &[LonLat], buffer: &AirportBuffer) -> Phase {
    classify(endpoint_flags(vertices, buffer))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
