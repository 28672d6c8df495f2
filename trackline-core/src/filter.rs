//! Row filters: required fields, distance, altitude and departure airport.
//!
//! Each row is judged on its own. A rejection carries a `RejectReason` and is
//! counted in `FilterStats`; it never aborts the run.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use csv::StringRecord;
use serde::Serialize;

use crate::columns::{CanonicalField, ColumnSet};
use crate::datetime::parse_timestamp;
use crate::types::{valid_lat, valid_lon, FilterConfig};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const REASON_TOO_FAR: &str = "too_far";
pub const REASON_TOO_HIGH: &str = "too_high";
pub const REASON_WRONG_DEPARTURE: &str = "wrong_departure_airport";
pub const REASON_UNPARSEABLE_TIMESTAMP: &str = "unparseable_timestamp";
pub const REASON_BLANK_OR_INVALID_PREFIX: &str = "blank_or_invalid";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RejectReason {
    BlankOrInvalid(CanonicalField),
    TooFar,
    TooHigh,
    WrongDepartureAirport,
    UnparseableTimestamp,
}

impl RejectReason {
    /// Invalid-value rejections, as opposed to threshold rejections.
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            RejectReason::BlankOrInvalid(_) | RejectReason::UnparseableTimestamp
        )
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::BlankOrInvalid(field) => {
                write!(f, "{REASON_BLANK_OR_INVALID_PREFIX}:{}", field.name())
            }
            RejectReason::TooFar => f.write_str(REASON_TOO_FAR),
            RejectReason::TooHigh => f.write_str(REASON_TOO_HIGH),
            RejectReason::WrongDepartureAirport => f.write_str(REASON_WRONG_DEPARTURE),
            RejectReason::UnparseableTimestamp => f.write_str(REASON_UNPARSEABLE_TIMESTAMP),
        }
    }
}

impl Serialize for RejectReason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Values pulled out of a row that passed every rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRow {
    pub flight_id: String,
    pub timestamp: Option<NaiveDateTime>,
    pub lat: f64,
    pub lon: f64,
    pub dist_km: Option<f64>,
    pub alt_100ft: Option<f64>,
}

/// Per-run counters for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub rows_read: u64,
    pub loaded: u64,
    pub rejected: BTreeMap<RejectReason, u64>,
}

impl FilterStats {
    pub fn record_loaded(&mut self) {
        self.rows_read += 1;
        self.loaded += 1;
    }

    pub fn record_rejected(&mut self, reason: RejectReason) -> u64 {
        self.rows_read += 1;
        let count = self.rejected.entry(reason).or_insert(0);
        *count += 1;
        self.total_rejected()
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected.values().sum()
    }

    /// Rows dropped for blank or unparseable values.
    pub fn skipped_invalid(&self) -> u64 {
        self.rejected
            .iter()
            .filter(|(reason, _)| reason.is_invalid())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn count(&self, reason: RejectReason) -> u64 {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    /// Rejection counts keyed by their stable reason names.
    pub fn by_reason_name(&self) -> BTreeMap<String, u64> {
        self.rejected
            .iter()
            .map(|(reason, n)| (reason.to_string(), *n))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Row filter
// ---------------------------------------------------------------------------

/// Predicate over a raw record, parameterized by `FilterConfig`.
pub struct RowFilter<'a> {
    config: &'a FilterConfig,
    columns: &'a ColumnSet,
}

impl<'a> RowFilter<'a> {
    pub fn new(config: &'a FilterConfig, columns: &'a ColumnSet) -> Self {
        RowFilter { config, columns }
    }

    /// Fields the active rules need resolved before any row is read.
    pub fn required_fields(config: &FilterConfig) -> Vec<CanonicalField> {
        let mut fields = vec![
            CanonicalField::FlightId,
            CanonicalField::Date,
            CanonicalField::Lat,
            CanonicalField::Lon,
        ];
        if config.max_distance_km.is_some() {
            fields.push(CanonicalField::DistKm);
        }
        if config.max_altitude_100ft.is_some() {
            fields.push(CanonicalField::Alt100ft);
        }
        fields
    }

    /// Fields picked up when present.
    pub fn optional_fields() -> Vec<CanonicalField> {
        vec![
            CanonicalField::DistKm,
            CanonicalField::Alt100ft,
            CanonicalField::DepAirport,
        ]
    }

    /// Run every rule against one record, in order.
    pub fn evaluate(&self, record: &StringRecord) -> Result<AcceptedRow, RejectReason> {
        let need_dist = self.config.max_distance_km.is_some();
        let need_alt = self.config.max_altitude_100ft.is_some();
        let dist_km = self.check_number(record, CanonicalField::DistKm, need_dist)?;
        let alt_100ft = self.check_number(record, CanonicalField::Alt100ft, need_alt)?;
        let lat = self.check_coordinate(record, CanonicalField::Lat, valid_lat)?;
        let lon = self.check_coordinate(record, CanonicalField::Lon, valid_lon)?;

        let raw_id = self.field(record, CanonicalField::FlightId);
        let flight_id = self.config.flight_id.apply(raw_id);
        if flight_id.is_empty() {
            return Err(RejectReason::BlankOrInvalid(CanonicalField::FlightId));
        }

        self.check_distance(dist_km)?;
        self.check_altitude(alt_100ft)?;
        self.check_departure(record)?;

        let timestamp = parse_timestamp(self.field(record, CanonicalField::Date));
        if timestamp.is_none() && self.config.require_timestamp {
            return Err(RejectReason::UnparseableTimestamp);
        }

        Ok(AcceptedRow {
            flight_id,
            timestamp,
            lat,
            lon,
            dist_km,
            alt_100ft,
        })
    }

    /// Raw trimmed text of a field; blank when the column or cell is absent.
    fn field<'r>(&self, record: &'r StringRecord, field: CanonicalField) -> &'r str {
        self.columns
            .index(field)
            .and_then(|i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }

    /// Parse an optional numeric column. When `required`, a blank or bad value
    /// rejects the row; otherwise it is just dropped.
    fn check_number(
        &self,
        record: &StringRecord,
        field: CanonicalField,
        required: bool,
    ) -> Result<Option<f64>, RejectReason> {
        if !self.columns.contains(field) {
            return if required {
                Err(RejectReason::BlankOrInvalid(field))
            } else {
                Ok(None)
            };
        }
        match parse_finite(self.field(record, field)) {
            Some(v) => Ok(Some(v)),
            None if required => Err(RejectReason::BlankOrInvalid(field)),
            None => Ok(None),
        }
    }

    fn check_coordinate(
        &self,
        record: &StringRecord,
        field: CanonicalField,
        in_range: fn(f64) -> bool,
    ) -> Result<f64, RejectReason> {
        parse_finite(self.field(record, field))
            .filter(|v| in_range(*v))
            .ok_or(RejectReason::BlankOrInvalid(field))
    }

    fn check_distance(&self, dist_km: Option<f64>) -> Result<(), RejectReason> {
        match (self.config.max_distance_km, dist_km) {
            (Some(max), Some(d)) if d > max => Err(RejectReason::TooFar),
            _ => Ok(()),
        }
    }

    fn check_altitude(&self, alt_100ft: Option<f64>) -> Result<(), RejectReason> {
        match (self.config.max_altitude_100ft, alt_100ft) {
            (Some(max), Some(a)) if a > max => Err(RejectReason::TooHigh),
            _ => Ok(()),
        }
    }

    fn check_departure(&self, record: &StringRecord) -> Result<(), RejectReason> {
        let code = match &self.config.departure_airport_code {
            Some(c) => c.trim(),
            None => return Ok(()),
        };
        if !self.columns.contains(CanonicalField::DepAirport) {
            return Ok(());
        }
        let value = self.field(record, CanonicalField::DepAirport);
        if value.eq_ignore_ascii_case(code) {
            Ok(())
        } else {
            Err(RejectReason::WrongDepartureAirport)
        }
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
