//! Calendar-day windowing of a CSV export.
//!
//! Keeps the first N or last N calendar days present in the file and writes
//! them back out with the date column normalized. Rows whose date does not
//! parse are dropped.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::columns::{AliasTable, CanonicalField, ColumnSet};
use crate::datetime::{format_timestamp, parse_timestamp};
use crate::types::*;

/// Which end of the file the window hangs from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowAnchor {
    #[default]
    First,
    Last,
}

impl std::str::FromStr for WindowAnchor {
    type Err = TrackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(WindowAnchor::First),
            "last" => Ok(WindowAnchor::Last),
            other => Err(TrackError::InvalidWindow(format!(
                "unknown anchor `{other}` (expected first or last)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub aliases: AliasTable,
    pub days: u32,
    pub anchor: WindowAnchor,
}

impl WindowSpec {
    pub fn new(days: u32, anchor: WindowAnchor) -> Self {
        WindowSpec {
            aliases: AliasTable::default(),
            days,
            anchor,
        }
    }

    /// Half-open `[start, end)` range of kept timestamps.
    pub fn bounds(
        &self,
        min: NaiveDateTime,
        max: NaiveDateTime,
    ) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let days = i64::from(self.days);
        let bounds = match self.anchor {
            WindowAnchor::First => {
                let start = midnight(min.date());
                start
                    .checked_add_signed(Duration::days(days))
                    .map(|end| (start, end))
            }
            WindowAnchor::Last => {
                let last = midnight(max.date());
                last.checked_sub_signed(Duration::days(days - 1))
                    .zip(last.checked_add_signed(Duration::days(1)))
            }
        };
        bounds.ok_or_else(|| {
            TrackError::InvalidWindow(format!("{} days is outside the calendar range", self.days))
        })
    }
}

/// Summary of one windowing pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub min: NaiveDateTime,
    pub max: NaiveDateTime,
    pub unique_days: usize,
    pub rows_read: u64,
    pub unparseable: u64,
    pub exported: u64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Filter `reader` to the configured window and write the kept rows.
pub fn apply_window<R: Read, W: Write>(
    reader: R,
    writer: W,
    spec: &WindowSpec,
) -> Result<WindowReport> {
    if spec.days == 0 {
        return Err(TrackError::InvalidWindow("days must be at least 1".into()));
    }

    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: StringRecord = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim())
        .collect();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(TrackError::NoHeader);
    }
    let columns = ColumnSet::resolve(
        &headers.iter().collect::<Vec<_>>(),
        &spec.aliases,
        &[CanonicalField::Date],
        &[],
    )?;
    let date_idx = columns.index(CanonicalField::Date).unwrap_or_default();

    let mut rows_read = 0u64;
    let mut unparseable = 0u64;
    let mut parsed: Vec<(NaiveDateTime, StringRecord)> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows_read += 1;
        match parse_timestamp(record.get(date_idx).unwrap_or("")) {
            Some(ts) => parsed.push((ts, record)),
            None => unparseable += 1,
        }
    }

    let (min, max) = match (
        parsed.iter().map(|(ts, _)| *ts).min(),
        parsed.iter().map(|(ts, _)| *ts).max(),
    ) {
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(TrackError::EmptyResult {
                airport: None,
                rows_read,
            })
        }
    };
    let unique_days = parsed
        .iter()
        .map(|(ts, _)| ts.date())
        .collect::<BTreeSet<_>>()
        .len();
    let (start, end) = spec.bounds(min, max)?;

    let mut wtr = WriterBuilder::new().flexible(true).from_writer(writer);
    wtr.write_record(&headers)?;
    let mut exported = 0u64;
    for (ts, record) in &parsed {
        if *ts < start || *ts >= end {
            continue;
        }
        let normalized = format_timestamp(ts);
        let row: StringRecord = record
            .iter()
            .enumerate()
            .map(|(i, v)| if i == date_idx { normalized.as_str() } else { v })
            .collect();
        wtr.write_record(&row)?;
        exported += 1;
    }
    wtr.flush()?;

    info!(
        "Parsed date range {} to {}, {} unique days, exported {} of {} rows",
        format_timestamp(&min),
        format_timestamp(&max),
        unique_days,
        exported,
        rows_read
    );

    Ok(WindowReport {
        min,
        max,
        unique_days,
        rows_read,
        unparseable,
        exported,
        start,
        end,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
