//! Load → build → smooth → classify, per reference airport.
//!
//! Each airport gets its own load pass over the CSV so per-airport distance
//! columns and filters never leak between runs. Airports run in order.

use std::collections::BTreeMap;
use std::io::Read;

use serde::Serialize;
use tracing::{info, warn};

use crate::columns::{AliasTable, CanonicalField, ColumnSet};
use crate::config::{AirportConfig, Config};
use crate::filter::FilterStats;
use crate::loader::{load_points, LoadOptions};
use crate::phase::{classify_track, AirportBuffer};
use crate::smooth::smooth_line;
use crate::tracker::TrackBuilder;
use crate::types::*;

/// One unit of work: an optional airport and what to do with it.
#[derive(Debug, Clone, Default)]
pub struct AirportRun {
    /// `None` for a plain run with no reference airport.
    pub code: Option<String>,
    pub buffer: Option<AirportBuffer>,
    /// Distance column names tried ahead of the built-in aliases.
    pub distance_aliases: Vec<String>,
}

impl AirportRun {
    pub fn from_config(airport: &AirportConfig) -> Self {
        let buffer = airport.buffer();
        if buffer.is_none() {
            warn!(
                airport = %airport.code,
                "No coordinates for airport, tracks will not be classified"
            );
        }
        AirportRun {
            code: Some(airport.code.clone()),
            buffer,
            distance_aliases: airport.distance_aliases(),
        }
    }

    /// Runs for every configured airport, or one plain run when none are.
    pub fn all_from_config(config: &Config) -> Vec<AirportRun> {
        if config.airports.is_empty() {
            vec![AirportRun::default()]
        } else {
            config.airports.iter().map(AirportRun::from_config).collect()
        }
    }

    pub fn label(&self) -> &str {
        self.code.as_deref().unwrap_or("-")
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub filter: FilterConfig,
    pub aliases: AliasTable,
    /// Smoothing tolerance in meters; `None` exports raw vertices.
    pub smoothing_m: Option<f64>,
    pub classify: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(PipelineOptions {
            filter: config.filter.clone(),
            aliases: config.alias_table()?,
            smoothing_m: config
                .smoothing
                .enabled
                .then_some(config.smoothing.tolerance_m),
            classify: config.phase.classify,
        })
    }
}

/// Everything one airport run produced.
#[derive(Debug, Clone)]
pub struct AirportOutput {
    pub code: Option<String>,
    pub buffer: Option<AirportBuffer>,
    pub columns: ColumnSet,
    pub points: Vec<PointRecord>,
    pub lines: Vec<TrackLine>,
    pub stats: FilterStats,
    pub degenerate: Vec<String>,
    /// Counts per phase; empty when classification did not run.
    pub phase_counts: BTreeMap<Phase, usize>,
}

impl AirportOutput {
    /// Whether the lines carry a phase label.
    pub fn classified(&self) -> bool {
        !self.phase_counts.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            airport: self.code.clone(),
            rows_read: self.stats.rows_read,
            loaded: self.stats.loaded,
            skipped_invalid: self.stats.skipped_invalid(),
            rejected: self.stats.by_reason_name(),
            tracks: self.lines.len(),
            degenerate: self.degenerate.len(),
            phases: self
                .phase_counts
                .iter()
                .map(|(p, n)| (p.label().to_string(), *n))
                .collect(),
        }
    }
}

/// Flat end-of-run counters, for tables and JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub airport: Option<String>,
    pub rows_read: u64,
    pub loaded: u64,
    pub skipped_invalid: u64,
    pub rejected: BTreeMap<String, u64>,
    pub tracks: usize,
    pub degenerate: usize,
    pub phases: BTreeMap<String, usize>,
}

/// Run the whole pipeline for one airport over `reader`.
///
/// Fails with `EmptyResult` when no row survives filtering.
pub fn run_airport<R: Read>(
    reader: R,
    run: &AirportRun,
    options: &PipelineOptions,
) -> Result<AirportOutput> {
    let aliases = if run.distance_aliases.is_empty() {
        options.aliases.clone()
    } else {
        options
            .aliases
            .clone()
            .with_preferred(CanonicalField::DistKm, run.distance_aliases.iter().cloned())
    };
    let load = LoadOptions {
        filter: options.filter.clone(),
        aliases,
        label: run.code.clone(),
    };
    let report = load_points(reader, &load)?;
    if report.points.is_empty() {
        return Err(TrackError::EmptyResult {
            airport: run.code.clone(),
            rows_read: report.stats.rows_read,
        });
    }

    let mut builder = TrackBuilder::new();
    builder.extend(report.points.iter().cloned());
    let set = builder.finish();
    if !set.degenerate.is_empty() {
        warn!(
            airport = run.label(),
            "{} flight(s) had a single point and were skipped",
            set.degenerate.len()
        );
    }

    let buffer = if options.classify { run.buffer } else { None };
    let mut phase_counts = BTreeMap::new();
    let mut lines = Vec::with_capacity(set.tracks.len());
    for track in set.tracks {
        let track = match &buffer {
            Some(b) => {
                let phase = classify_track(&track.vertices(), b);
                *phase_counts.entry(phase).or_insert(0) += 1;
                track.classified(phase)
            }
            None => track,
        };
        let smoothed = options
            .smoothing_m
            .map(|tol| smooth_line(&track.vertices(), tol));
        lines.push(TrackLine::from_track(&track, smoothed));
    }

    info!(
        airport = run.label(),
        "Built {} tracks from {} points ({} degenerate)",
        lines.len(),
        report.points.len(),
        set.degenerate.len()
    );

    Ok(AirportOutput {
        code: run.code.clone(),
        buffer,
        columns: report.columns,
        points: report.points,
        lines,
        stats: report.stats,
        degenerate: set.degenerate,
        phase_counts,
    })
}

/// Run every airport in order, opening a fresh reader for each.
///
/// With a single run any error is returned as-is. With several, an airport
/// that lacks its columns or keeps no rows is skipped with a warning; the
/// call fails only when every airport does. I/O and CSV errors always fail.
pub fn run_airports<R, F>(
    mut open: F,
    runs: &[AirportRun],
    options: &PipelineOptions,
) -> Result<Vec<AirportOutput>>
where
    R: Read,
    F: FnMut() -> Result<R>,
{
    if runs.len() == 1 {
        return Ok(vec![run_airport(open()?, &runs[0], options)?]);
    }

    let mut outputs = Vec::new();
    let mut first_err = None;
    for run in runs {
        match run_airport(open()?, run, options) {
            Ok(out) => outputs.push(out),
            Err(e @ (TrackError::MissingColumn { .. } | TrackError::EmptyResult { .. })) => {
                warn!(airport = run.label(), "Skipping airport: {e}");
                first_err.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match (outputs.is_empty(), first_err) {
        (true, Some(e)) => Err(e),
        _ => Ok(outputs),
    }
}

// ---------------------------------------------------------------------------
// Output naming
// ---------------------------------------------------------------------------

fn suffixed(base: &str, code: Option<&str>) -> String {
    match code {
        Some(c) => format!("{base}_{}", c.to_ascii_uppercase()),
        None => base.to_string(),
    }
}

/// All tracks of a run.
pub fn tracks_layer(code: Option<&str>) -> String {
    suffixed("flights_tracks", code)
}

/// Accepted points of a run.
pub fn points_layer(code: Option<&str>) -> String {
    suffixed("flights_pts", code)
}

/// Tracks of one phase.
pub fn phase_layer(phase: Phase, code: Option<&str>) -> String {
    let base = match phase {
        Phase::Arrival => "tracks_arrivals",
        Phase::Departure => "tracks_departures",
        Phase::Local => "tracks_local",
        Phase::Overflight => "tracks_overflights",
        Phase::Unknown => "tracks_unknown",
    };
    suffixed(base, code)
}

/// Buffer polygon of an airport.
pub fn buffer_layer(code: Option<&str>) -> String {
    match code {
        Some(c) => format!("{}_buffer", c.to_ascii_uppercase()),
        None => "airport_buffer".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airports;
    use crate::filter::RejectReason;

    // Logan is at (-71.00956, 42.36561); 0.01° lat ≈ 1.1 km.
    const FIVE_ROWS: &str = "flight_index,date,lat,long,dist_to_bos,altitudex100ft\n\
        A,2015-03-01 10:00:00,42.36561,-71.00956,0.0,5\n\
        A,2015-03-01 10:05:00,42.50000,-71.00956,15.0,40\n\
        B,2015-03-01 11:00:00,42.70000,-71.00956,37.0,45\n\
        B,2015-03-01 11:10:00,42.37000,-71.00956,0.5,3\n\
        C,2015-03-01 12:00:00,42.36561,-71.00956,0.0,2\n";

    fn bos_run() -> AirportRun {
        AirportRun::from_config(&AirportConfig::new("BOS"))
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            filter: FilterConfig {
                max_distance_km: Some(60.0),
                ..Default::default()
            },
            classify: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_five_row_scenario() {
        let out = run_airport(FIVE_ROWS.as_bytes(), &bos_run(), &options()).unwrap();
        assert_eq!(out.stats.loaded, 5);
        assert_eq!(out.points.len(), 5);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.degenerate, ["C"]);

        assert_eq!(out.lines[0].flight_id, "A");
        assert_eq!(out.lines[0].phase, Phase::Departure);
        assert_eq!(out.lines[1].flight_id, "B");
        assert_eq!(out.lines[1].phase, Phase::Arrival);

        assert_eq!(out.phase_counts.get(&Phase::Departure), Some(&1));
        assert_eq!(out.phase_counts.get(&Phase::Arrival), Some(&1));
        assert!(out.classified());
    }

    #[test]
    fn test_straddling_flight_loses_far_point() {
        // A straddles 20 km; B's second row has no latitude.
        let csv = "flight_index,date,lat,long,dist_to_bos,altitudex100ft\n\
            A,2015-03-01 10:00:00,42.40000,-71.00956,4.0,20\n\
            A,2015-03-01 10:05:00,42.50000,-71.00956,15.0,40\n\
            A,2015-03-01 10:10:00,42.70000,-71.00956,37.0,60\n\
            B,2015-03-01 11:00:00,42.45000,-71.00956,9.5,30\n\
            B,2015-03-01 11:05:00,,-71.00956,5.0,20\n";
        let mut opts = options();
        opts.filter.max_distance_km = Some(20.0);
        opts.classify = false;
        let out = run_airport(csv.as_bytes(), &bos_run(), &opts).unwrap();

        assert_eq!(out.stats.count(RejectReason::TooFar), 1);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.lines[0].flight_id, "A");
        assert_eq!(out.lines[0].n_points, 2);
        assert_eq!(out.degenerate, ["B"]);

        let summary = out.summary();
        assert_eq!(summary.airport.as_deref(), Some("BOS"));
        assert_eq!(summary.rows_read, 5);
        assert_eq!(summary.loaded, 3);
        assert_eq!(summary.skipped_invalid, 1);
        assert_eq!(summary.rejected.get("too_far"), Some(&1));
        assert_eq!(summary.rejected.get("blank_or_invalid:lat"), Some(&1));
        assert_eq!(summary.rejected.values().sum::<u64>(), 2);
        assert_eq!(summary.tracks, 1);
        assert_eq!(summary.degenerate, 1);
        assert!(summary.phases.is_empty());
    }

    #[test]
    fn test_distance_filter_applies_per_airport_column() {
        let mut opts = options();
        opts.filter.max_distance_km = Some(20.0);
        let out = run_airport(FIVE_ROWS.as_bytes(), &bos_run(), &opts).unwrap();
        assert_eq!(out.stats.count(RejectReason::TooFar), 1);
        // B lost its far point and became degenerate
        assert_eq!(out.degenerate, ["B", "C"]);
        assert_eq!(out.lines.len(), 1);
    }

    #[test]
    fn test_no_classification_without_buffer() {
        let mut opts = options();
        opts.classify = false;
        let out = run_airport(FIVE_ROWS.as_bytes(), &bos_run(), &opts).unwrap();
        assert!(out.lines.iter().all(|l| l.phase == Phase::Unknown));
        assert!(!out.classified());
        assert!(out.buffer.is_none());
    }

    #[test]
    fn test_smoothing_keeps_endpoints() {
        let mut opts = options();
        opts.smoothing_m = Some(200.0);
        let out = run_airport(FIVE_ROWS.as_bytes(), &bos_run(), &opts).unwrap();
        let a = &out.lines[0];
        assert_eq!(a.vertices.first().map(|v| v.lat), Some(42.36561));
        assert_eq!(a.n_points, 2);
    }

    #[test]
    fn test_empty_result_names_airport() {
        let mut opts = options();
        opts.filter.max_distance_km = Some(-1.0);
        let err = run_airport(FIVE_ROWS.as_bytes(), &bos_run(), &opts).unwrap_err();
        match err {
            TrackError::EmptyResult { airport, rows_read } => {
                assert_eq!(airport.as_deref(), Some("BOS"));
                assert_eq!(rows_read, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_multi_airport_skips_missing_column() {
        let runs = vec![
            bos_run(),
            AirportRun::from_config(&AirportConfig::new("SFO")),
        ];
        let outs = run_airports(|| Ok(FIVE_ROWS.as_bytes()), &runs, &options()).unwrap();
        assert_eq!(outs.len(), 1);
        assert_eq!(outs[0].code.as_deref(), Some("BOS"));
    }

    #[test]
    fn test_multi_airport_all_fail() {
        let runs = vec![
            AirportRun::from_config(&AirportConfig::new("SFO")),
            AirportRun::from_config(&AirportConfig::new("OAK")),
        ];
        let err = run_airports(|| Ok(FIVE_ROWS.as_bytes()), &runs, &options()).unwrap_err();
        assert!(matches!(err, TrackError::MissingColumn { .. }));
    }

    #[test]
    fn test_single_run_error_is_fatal() {
        let runs = vec![AirportRun::from_config(&AirportConfig::new("SFO"))];
        assert!(run_airports(|| Ok(FIVE_ROWS.as_bytes()), &runs, &options()).is_err());
    }

    #[test]
    fn test_plain_run_without_airports() {
        let runs = AirportRun::all_from_config(&Config::default());
        assert_eq!(runs.len(), 1);
        let out = run_airport(FIVE_ROWS.as_bytes(), &runs[0], &PipelineOptions::default()).unwrap();
        assert_eq!(out.lines.len(), 2);
        assert!(out.phase_counts.is_empty());
        assert_eq!(out.summary().tracks, 2);
    }

    #[test]
    fn test_layer_names() {
        assert_eq!(tracks_layer(None), "flights_tracks");
        assert_eq!(tracks_layer(Some("sfo")), "flights_tracks_SFO");
        assert_eq!(points_layer(Some("BOS")), "flights_pts_BOS");
        assert_eq!(phase_layer(Phase::Arrival, Some("BOS")), "tracks_arrivals_BOS");
        assert_eq!(phase_layer(Phase::Local, Some("BOS")), "tracks_local_BOS");
        assert_eq!(buffer_layer(Some("bos")), "BOS_buffer");
    }

    #[test]
    fn test_registry_buffer_used() {
        let run = bos_run();
        let bos = airports::lookup("BOS").unwrap();
        assert_eq!(run.buffer.unwrap().center, bos.position());
    }
}
