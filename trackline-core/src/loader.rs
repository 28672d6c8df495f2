//! CSV → `PointRecord` loading.
//!
//! Columns are resolved once from the header row, then every record runs
//! through the `RowFilter`. Rejections are counted and logged with a cap so
//! large exports don't flood the output.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::columns::{AliasTable, ColumnSet};
use crate::filter::{FilterStats, RowFilter};
use crate::types::*;

/// Log every rejection up to this many.
pub const LOG_FIRST_REJECTIONS: u64 = 10;
/// After the first few, log every Nth rejection.
pub const LOG_EVERY_REJECTION: u64 = 5000;

/// Everything the loader needs besides the input.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub filter: FilterConfig,
    pub aliases: AliasTable,
    /// Label used in log lines (airport code for multi-airport runs).
    pub label: Option<String>,
}

/// Result of one load pass.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub points: Vec<PointRecord>,
    pub stats: FilterStats,
    pub columns: ColumnSet,
}

/// Read the header row of a CSV.
pub fn read_headers<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?;
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(TrackError::NoHeader);
    }
    Ok(headers.iter().map(str::to_string).collect())
}

/// Resolve the columns the given options need against a header row.
pub fn resolve_columns<S: AsRef<str>>(headers: &[S], options: &LoadOptions) -> Result<ColumnSet> {
    ColumnSet::resolve(
        headers,
        &options.aliases,
        &RowFilter::required_fields(&options.filter),
        &RowFilter::optional_fields(),
    )
}

/// Load and filter points from CSV text.
///
/// Returns an empty point list rather than an error when nothing survives;
/// the caller decides whether that is fatal.
pub fn load_points<R: Read>(reader: R, options: &LoadOptions) -> Result<LoadReport> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(TrackError::NoHeader);
    }
    let columns = resolve_columns(&headers, options)?;
    let tag = options.label.as_deref().unwrap_or("-");
    info!(airport = tag, "Resolved columns: {}", columns.describe());

    let filter = RowFilter::new(&options.filter, &columns);
    let mut stats = FilterStats::default();
    let mut points = Vec::new();

    for (row_no, result) in rdr.records().enumerate() {
        let record = result?;
        match filter.evaluate(&record) {
            Ok(row) => {
                let mut attributes = BTreeMap::new();
                if let Some(d) = row.dist_km {
                    attributes.insert(ATTR_DIST_KM.to_string(), d);
                }
                if let Some(a) = row.alt_100ft {
                    attributes.insert(ATTR_ALT_100FT.to_string(), a);
                }
                points.push(PointRecord {
                    flight_id: row.flight_id,
                    timestamp: row.timestamp,
                    lat: row.lat,
                    lon: row.lon,
                    attributes,
                });
                stats.record_loaded();
            }
            Err(reason) => {
                let total = stats.record_rejected(reason);
                if total <= LOG_FIRST_REJECTIONS || total % LOG_EVERY_REJECTION == 0 {
                    // +2: header line plus 1-based numbering
                    warn!(airport = tag, "Skip row {} ({total}): {reason}", row_no + 2);
                } else {
                    debug!(airport = tag, "Skip row {}: {reason}", row_no + 2);
                }
            }
        }
    }

    info!(
        airport = tag,
        "Loaded {} points. Skipped {} invalid rows, {} total rejected of {} read",
        stats.loaded,
        stats.skipped_invalid(),
        stats.total_rejected(),
        stats.rows_read
    );

    Ok(LoadReport {
        points,
        stats,
        columns,
    })
}

/// `load_points` over a file path.
pub fn load_points_from_path(path: &Path, options: &LoadOptions) -> Result<LoadReport> {
    let file = File::open(path)?;
    load_points(std::io::BufReader::new(file), options)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
