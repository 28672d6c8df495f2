//! Gaussian-kernel line smoothing over along-track distance.
//!
//! Each interior vertex becomes the weighted mean of every vertex within
//! `tolerance_m` along the line. Endpoints never move, so classification
//! gives the same answer on smoothed and raw geometry.

use crate::phase::haversine_m;
use crate::types::LonLat;

/// Kernel width as a fraction of the tolerance.
const SIGMA_FRACTION: f64 = 1.0 / 3.0;

/// Cumulative along-track distance in meters, starting at 0.
pub fn cumulative_distance(vertices: &[LonLat]) -> Vec<f64> {
    let mut out = Vec::with_capacity(vertices.len());
    let mut total = 0.0;
    for (i, v) in vertices.iter().enumerate() {
        if i > 0 {
            let prev = vertices[i - 1];
            total += haversine_m(prev.lat, prev.lon, v.lat, v.lon);
        }
        out.push(total);
    }
    out
}

/// Smooth a polyline. Returns the input unchanged for fewer than three
/// vertices or a non-positive tolerance.
pub fn smooth_line(vertices: &[LonLat], tolerance_m: f64) -> Vec<LonLat> {
    if vertices.len() < 3 || tolerance_m.is_nan() || tolerance_m <= 0.0 {
        return vertices.to_vec();
    }

    let along = cumulative_distance(vertices);
    let sigma = tolerance_m * SIGMA_FRACTION;
    let last = vertices.len() - 1;

    let mut out = Vec::with_capacity(vertices.len());
    out.push(vertices[0]);
    for i in 1..last {
        let (mut wsum, mut lon, mut lat) = (0.0, 0.0, 0.0);
        for (j, v) in vertices.iter().enumerate() {
            let d = (along[j] - along[i]).abs();
            if d > tolerance_m {
                continue;
            }
            let w = (-0.5 * (d / sigma).powi(2)).exp();
            wsum += w;
            lon += w * v.lon;
            lat += w * v.lat;
        }
        // wsum >= 1: the vertex itself always contributes weight 1
        out.push(LonLat::new(lon / wsum, lat / wsum));
    }
    out.push(vertices[last]);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Vec<LonLat> {
        (0..10)
            .map(|i| {
                let lat = if i % 2 == 0 { 42.0 } else { 42.001 };
                LonLat::new(-71.0 + i as f64 * 0.001, lat)
            })
            .collect()
    }

    #[test]
    fn test_endpoints_fixed_and_count_preserved() {
        let line = zigzag();
        let smoothed = smooth_line(&line, 500.0);
        assert_eq!(smoothed.len(), line.len());
        assert_eq!(smoothed[0], line[0]);
        assert_eq!(smoothed.last(), line.last());
    }

    #[test]
    fn test_reduces_zigzag() {
        let line = zigzag();
        let smoothed = smooth_line(&line, 500.0);
        let amplitude = |pts: &[LonLat]| {
            pts[1..pts.len() - 1]
                .windows(2)
                .map(|w| (w[0].lat - w[1].lat).abs())
                .fold(0.0, f64::max)
        };
        assert!(amplitude(&smoothed) < amplitude(&line));
    }

    #[test]
    fn test_short_or_zero_tolerance_unchanged() {
        let two = vec![LonLat::new(0.0, 0.0), LonLat::new(1.0, 1.0)];
        assert_eq!(smooth_line(&two, 1000.0), two);
        let line = zigzag();
        assert_eq!(smooth_line(&line, 0.0), line);
        assert_eq!(smooth_line(&line, f64::NAN), line);
    }

    #[test]
    fn test_straight_line_stays_put() {
        let line: Vec<LonLat> = (0..5).map(|i| LonLat::new(0.0, i as f64 * 0.01)).collect();
        let smoothed = smooth_line(&line, 200.0);
        for (a, b) in line.iter().zip(&smoothed) {
            assert!((a.lon - b.lon).abs() < 1e-12);
        }
    }

    #[test]
    fn test_cumulative_distance() {
        let line = vec![LonLat::new(0.0, 0.0), LonLat::new(0.0, 0.0), LonLat::new(0.0, 1.0)];
        let d = cumulative_distance(&line);
        assert_eq!(d[0], 0.0);
        assert_eq!(d[1], 0.0);
        assert!((d[2] - 111_195.0).abs() < 10.0);
    }
}
