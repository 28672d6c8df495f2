//! Track reconstruction: group accepted points by flight id and order them.
//!
//! Pure logic, no I/O. Feed points with `add()` in file order, then call
//! `finish()` once to get the tracks.

use std::collections::BTreeMap;

use tracing::warn;

use crate::types::*;

/// Output of a build pass.
#[derive(Debug, Clone, Default)]
pub struct TrackSet {
    /// Tracks in ascending flight-id order.
    pub tracks: Vec<Track>,
    /// Flight ids that had a single point and produced no track.
    pub degenerate: Vec<String>,
}

/// Collects points per flight and turns each group into a `Track`.
#[derive(Debug, Default)]
pub struct TrackBuilder {
    groups: BTreeMap<String, Vec<PointRecord>>,

    // Counters
    pub points_added: u64,
    pub untimed_points: u64,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, point: PointRecord) {
        self.points_added += 1;
        if point.timestamp.is_none() {
            self.untimed_points += 1;
        }
        self.groups
            .entry(point.flight_id.clone())
            .or_default()
            .push(point);
    }

    pub fn extend<I: IntoIterator<Item = PointRecord>>(&mut self, points: I) {
        for p in points {
            self.add(p);
        }
    }

    /// Number of distinct flight ids seen so far.
    pub fn flight_count(&self) -> usize {
        self.groups.len()
    }

    /// Sort each group and build tracks. Single-point groups are reported,
    /// not returned.
    pub fn finish(self) -> TrackSet {
        let mut set = TrackSet::default();
        for (flight_id, mut points) in self.groups {
            // Stable: equal timestamps keep file order. `None` sorts first.
            points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
            match Track::new(flight_id.clone(), points) {
                Some(track) => set.tracks.push(track),
                None => {
                    warn!(flight_id = %flight_id, "Degenerate track: single point, skipped");
                    set.degenerate.push(flight_id);
                }
            }
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datetime::parse_timestamp;

    fn point(id: &str, ts: &str, lat: f64, lon: f64) -> PointRecord {
        PointRecord {
            flight_id: id.into(),
            timestamp: parse_timestamp(ts),
            lat,
            lon,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_groups_and_orders() {
        let mut builder = TrackBuilder::new();
        builder.add(point("A", "2015-01-01 10:02:00", 1.0, 1.0));
        builder.add(point("B", "2015-01-01 09:00:00", 5.0, 5.0));
        builder.add(point("A", "2015-01-01 10:00:00", 2.0, 2.0));
        builder.add(point("B", "2015-01-01 09:30:00", 6.0, 6.0));
        builder.add(point("A", "2015-01-01 10:01:00", 3.0, 3.0));

        let set = builder.finish();
        assert_eq!(set.tracks.len(), 2);
        assert!(set.degenerate.is_empty());

        let a = &set.tracks[0];
        assert_eq!(a.flight_id, "A");
        let lats: Vec<f64> = a.points().iter().map(|p| p.lat).collect();
        assert_eq!(lats, [2.0, 3.0, 1.0]);
        assert_eq!(set.tracks[1].flight_id, "B");
    }

    #[test]
    fn test_orders_by_timestamp_and_drops_single_point() {
        let mut builder = TrackBuilder::new();
        builder.add(point("A1", "2015-01-01 00:00:03", 3.0, 0.0));
        builder.add(point("A1", "2015-01-01 00:00:01", 1.0, 0.0));
        builder.add(point("A1", "2015-01-01 00:00:02", 2.0, 0.0));
        builder.add(point("B2", "2015-01-01 00:00:05", 5.0, 0.0));

        let set = builder.finish();
        assert_eq!(set.tracks.len(), 1);
        assert_eq!(set.tracks[0].flight_id, "A1");
        let lats: Vec<f64> = set.tracks[0].points().iter().map(|p| p.lat).collect();
        assert_eq!(lats, [1.0, 2.0, 3.0]);
        assert_eq!(set.degenerate, ["B2"]);
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let mut builder = TrackBuilder::new();
        builder.add(point("A", "2015-01-01 10:00:00", 1.0, 1.0));
        builder.add(point("B", "2015-01-01 10:00:00", 1.0, 1.0));
        builder.add(point("B", "2015-01-01 10:05:00", 1.1, 1.1));

        let set = builder.finish();
        assert_eq!(set.tracks.len(), 1);
        assert_eq!(set.degenerate, ["A"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let mut builder = TrackBuilder::new();
        builder.add(point("A", "2015-01-01 10:00:00", 1.0, 0.0));
        builder.add(point("A", "2015-01-01 10:00:00", 2.0, 0.0));
        builder.add(point("A", "2015-01-01 10:00:00", 3.0, 0.0));
        let set = builder.finish();
        let lats: Vec<f64> = set.tracks[0].points().iter().map(|p| p.lat).collect();
        assert_eq!(lats, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_untimed_points_sort_first() {
        let mut builder = TrackBuilder::new();
        builder.add(point("A", "2015-01-01 10:00:00", 1.0, 0.0));
        builder.add(point("A", "garbage", 2.0, 0.0));
        builder.add(point("A", "", 3.0, 0.0));
        assert_eq!(builder.untimed_points, 2);

        let set = builder.finish();
        let lats: Vec<f64> = set.tracks[0].points().iter().map(|p| p.lat).collect();
        assert_eq!(lats, [2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_ids_distinct_verbatim() {
        let mut builder = TrackBuilder::new();
        for id in ["0042", "42", "0042", "42"] {
            builder.add(point(id, "2015-01-01 10:00:00", 1.0, 1.0));
        }
        assert_eq!(builder.flight_count(), 2);
        let set = builder.finish();
        let ids: Vec<&str> = set.tracks.iter().map(|t| t.flight_id.as_str()).collect();
        assert_eq!(ids, ["0042", "42"]);
    }

    #[test]
    fn test_coincident_points_kept() {
        let mut builder = TrackBuilder::new();
        builder.add(point("A", "2015-01-01 10:00:00", 1.0, 1.0));
        builder.add(point("A", "2015-01-01 10:01:00", 1.0, 1.0));
        let set = builder.finish();
        assert_eq!(set.tracks[0].vertices().len(), 2);
    }
}
