//! Header resolution: canonical fields, alias lists, and the per-file column set.
//!
//! Each CSV export spells its headers differently (`latitude`, `LAT`,
//! `lat_dd`, ...). Resolution runs once per file against the header row and
//! fails fast when a required field has no match.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::types::{Result, TrackError};

/// Pipeline-internal column names, independent of the file's spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CanonicalField {
    FlightId,
    Date,
    Lat,
    Lon,
    DistKm,
    Alt100ft,
    DepAirport,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::FlightId,
        CanonicalField::Date,
        CanonicalField::Lat,
        CanonicalField::Lon,
        CanonicalField::DistKm,
        CanonicalField::Alt100ft,
        CanonicalField::DepAirport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalField::FlightId => "flight_id",
            CanonicalField::Date => "date",
            CanonicalField::Lat => "lat",
            CanonicalField::Lon => "lon",
            CanonicalField::DistKm => "dist_km",
            CanonicalField::Alt100ft => "alt_100ft",
            CanonicalField::DepAirport => "dep_airport",
        }
    }

    /// Parse a canonical name as used in config files.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|f| f.name() == lower)
    }

    /// Built-in aliases, most specific first.
    pub fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::FlightId => &["flight_index", "flight_id", "flight"],
            CanonicalField::Date => &["date", "timestamp", "ts", "time"],
            CanonicalField::Lat => &["lat", "latitude", "y", "lat_dd"],
            CanonicalField::Lon => &["long", "longitude", "lon", "x", "lon_dd"],
            CanonicalField::DistKm => &["dist_km", "distance_km"],
            CanonicalField::Alt100ft => &[
                "altitudex100ft",
                "altitude_x100ft",
                "altitude100ft",
                "altitude_100ft",
                "altitude_x100_ft",
                "alt100ft",
                "alt_100ft",
            ],
            CanonicalField::DepAirport => &["dep_aprt", "dep_airport", "departure_airport"],
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Alias table
// ---------------------------------------------------------------------------

/// Ordered alias lists per canonical field.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTable {
    entries: BTreeMap<CanonicalField, Vec<String>>,
}

impl Default for AliasTable {
    fn default() -> Self {
        let entries = CanonicalField::ALL
            .into_iter()
            .map(|f| {
                let aliases = f.default_aliases().iter().map(|a| a.to_string()).collect();
                (f, aliases)
            })
            .collect();
        AliasTable { entries }
    }
}

impl AliasTable {
    /// Replace the alias list for one field.
    pub fn with_aliases<I, S>(mut self, field: CanonicalField, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(field, aliases.into_iter().map(Into::into).collect());
        self
    }

    /// Put extra aliases ahead of the existing ones for a field.
    pub fn with_preferred<I, S>(mut self, field: CanonicalField, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged: Vec<String> = aliases.into_iter().map(Into::into).collect();
        let existing = self.entries.remove(&field).unwrap_or_default();
        for alias in existing {
            if !merged.iter().any(|m| m.eq_ignore_ascii_case(&alias)) {
                merged.push(alias);
            }
        }
        self.entries.insert(field, merged);
        self
    }

    pub fn aliases(&self, field: CanonicalField) -> &[String] {
        self.entries.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Resolved column set
// ---------------------------------------------------------------------------

/// One resolved column: its position in the record and the header as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub index: usize,
    pub header: String,
}

/// Canonical field → actual column, built once per file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnSet {
    columns: BTreeMap<CanonicalField, ResolvedColumn>,
}

/// Fold a header for case-insensitive comparison. Strips a UTF-8 BOM.
fn fold_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}

impl ColumnSet {
    /// Resolve `required` and `optional` fields against a header row.
    ///
    /// For each field the first alias present in the header wins. Missing
    /// optional fields are left out; a missing required field is an error
    /// naming every alias tried.
    pub fn resolve<S: AsRef<str>>(
        headers: &[S],
        aliases: &AliasTable,
        required: &[CanonicalField],
        optional: &[CanonicalField],
    ) -> Result<ColumnSet> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            by_name.entry(fold_header(header.as_ref())).or_insert(index);
        }

        let lookup = |field: CanonicalField| -> Option<ResolvedColumn> {
            aliases.aliases(field).iter().find_map(|alias| {
                by_name.get(&fold_header(alias)).map(|&index| ResolvedColumn {
                    index,
                    header: headers[index].as_ref().trim_start_matches('\u{feff}').trim().to_string(),
                })
            })
        };

        let mut columns = BTreeMap::new();
        for &field in required {
            match lookup(field) {
                Some(col) => {
                    columns.insert(field, col);
                }
                None => {
                    return Err(TrackError::MissingColumn {
                        field,
                        tried: aliases.aliases(field).join("/"),
                    })
                }
            }
        }
        for &field in optional {
            if columns.contains_key(&field) {
                continue;
            }
            if let Some(col) = lookup(field) {
                columns.insert(field, col);
            }
        }

        Ok(ColumnSet { columns })
    }

    pub fn index(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).map(|c| c.index)
    }

    pub fn header(&self, field: CanonicalField) -> Option<&str> {
        self.columns.get(&field).map(|c| c.header.as_str())
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    /// Resolved fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &ResolvedColumn)> {
        self.columns.iter().map(|(f, c)| (*f, c))
    }

    /// One-line description for logs, e.g. `flight_id=flight_index, lat=LAT`.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(f, c)| format!("{}={}", f.name(), c.header))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [CanonicalField; 4] = [
        CanonicalField::FlightId,
        CanonicalField::Date,
        CanonicalField::Lat,
        CanonicalField::Lon,
    ];

    #[test]
    fn test_resolve_case_insensitive() {
        let headers = ["Flight_Index", "DATE", "Latitude", "LONGITUDE", "dist_to_sea"];
        let cols = ColumnSet::resolve(&headers, &AliasTable::default(), &BASE, &[]).unwrap();
        assert_eq!(cols.header(CanonicalField::FlightId), Some("Flight_Index"));
        assert_eq!(cols.index(CanonicalField::Lat), Some(2));
        assert_eq!(cols.index(CanonicalField::Lon), Some(3));
    }

    #[test]
    fn test_resolve_strips_bom_and_whitespace() {
        let headers = ["\u{feff}flight_id", " ts ", "lat", "lon"];
        let cols = ColumnSet::resolve(&headers, &AliasTable::default(), &BASE, &[]).unwrap();
        assert_eq!(cols.header(CanonicalField::FlightId), Some("flight_id"));
        assert_eq!(cols.header(CanonicalField::Date), Some("ts"));
    }

    #[test]
    fn test_missing_required_column() {
        let headers = ["flight_id", "date", "lat"];
        let err = ColumnSet::resolve(&headers, &AliasTable::default(), &BASE, &[]).unwrap_err();
        match err {
            TrackError::MissingColumn { field, tried } => {
                assert_eq!(field, CanonicalField::Lon);
                assert_eq!(tried, "long/longitude/lon/x/lon_dd");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_optional_column_absent() {
        let headers = ["flight", "time", "y", "x"];
        let cols = ColumnSet::resolve(
            &headers,
            &AliasTable::default(),
            &BASE,
            &[CanonicalField::DepAirport],
        )
        .unwrap();
        assert!(!cols.contains(CanonicalField::DepAirport));
        assert_eq!(cols.describe(), "flight_id=flight, date=time, lat=y, lon=x");
    }

    #[test]
    fn test_resolution_independent_of_header_order_and_case() {
        let variants: [[&str; 5]; 3] = [
            ["flight_index", "date", "lat", "long", "AltitudeX100ft"],
            ["LONG", "altitudex100ft", "LAT", "Flight_Index", "Date"],
            ["Date", "Lat", "Long", "ALTITUDEX100FT", "FLIGHT_INDEX"],
        ];
        let mut required = BASE.to_vec();
        required.push(CanonicalField::Alt100ft);

        let resolved: Vec<Vec<(CanonicalField, String)>> = variants
            .iter()
            .map(|headers| {
                let cols =
                    ColumnSet::resolve(headers, &AliasTable::default(), &required, &[]).unwrap();
                cols.iter()
                    .map(|(f, c)| (f, c.header.to_lowercase()))
                    .collect()
            })
            .collect();

        assert_eq!(resolved[0], resolved[1]);
        assert_eq!(resolved[1], resolved[2]);
    }

    #[test]
    fn test_first_alias_wins() {
        // Both `lat` and `latitude` exist; `lat` is earlier in the alias list.
        let headers = ["flight", "date", "latitude", "lat", "lon"];
        let cols = ColumnSet::resolve(&headers, &AliasTable::default(), &BASE, &[]).unwrap();
        assert_eq!(cols.index(CanonicalField::Lat), Some(3));
    }

    #[test]
    fn test_alias_overrides() {
        let table = AliasTable::default()
            .with_aliases(CanonicalField::FlightId, ["callsign"])
            .with_preferred(CanonicalField::DistKm, ["dist_to_bos", "DIST_KM"]);
        assert_eq!(table.aliases(CanonicalField::FlightId), ["callsign"]);
        assert_eq!(
            table.aliases(CanonicalField::DistKm),
            ["dist_to_bos", "DIST_KM", "distance_km"]
        );
    }

    #[test]
    fn test_from_name() {
        assert_eq!(CanonicalField::from_name("Alt_100ft"), Some(CanonicalField::Alt100ft));
        assert_eq!(CanonicalField::from_name("bogus"), None);
    }
}
