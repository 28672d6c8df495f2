//! Dataset export behind the `SpatialBackend` trait.
//!
//! `ShapefileBackend` writes ESRI shapefiles (`.shp/.shx/.dbf`) with a WGS-84
//! `.prj` sidecar. `export_airport` decides which layers a run produces and
//! skips empty ones.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing, Polyline, Writer};
use tracing::{debug, info, warn};

use trackline_core::datetime::format_timestamp;
use trackline_core::pipeline::{buffer_layer, phase_layer, points_layer, tracks_layer};
use trackline_core::types::*;
use trackline_core::AirportOutput;

/// Files that make up one dataset.
pub const DATASET_EXTENSIONS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

/// WKT for EPSG:4326, as ArcGIS writes it.
pub const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",\
SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],\
UNIT[\"Degree\",0.0174532925199433]]";

/// Somewhere named datasets can be written and removed.
pub trait SpatialBackend {
    /// Polylines with `flight_id`, `n_points`, `start_ts`, `end_ts`, and
    /// `phase` when `with_phase` is set.
    fn write_lines(&mut self, name: &str, lines: &[TrackLine], with_phase: bool) -> Result<()>;

    /// Points with `flight_id`, `ts`, `lat`, `lon`, plus `dist_km` and
    /// `alt_100ft` when any point carries them.
    fn write_points(&mut self, name: &str, points: &[PointRecord]) -> Result<()>;

    /// A single polygon from a closed ring.
    fn write_polygon(&mut self, name: &str, ring: &[LonLat]) -> Result<()>;

    /// Remove a dataset. Returns whether anything was there.
    fn delete_dataset(&mut self, name: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// Shapefile backend
// ---------------------------------------------------------------------------

pub struct ShapefileBackend {
    dir: PathBuf,
}

impl ShapefileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ShapefileBackend { dir: dir.into() }
    }

    /// Path of one dataset component, e.g. `<dir>/<name>.dbf`.
    pub fn file_path(&self, name: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{name}.{ext}"))
    }

    fn write_prj(&self, name: &str) -> Result<()> {
        let path = self.file_path(name, "prj");
        std::fs::write(&path, WGS84_PRJ).with_context(|| format!("writing {}", path.display()))
    }
}

fn field(name: &str) -> Result<FieldName> {
    FieldName::try_from(name).map_err(|e| anyhow!("bad dbf field name {name}: {e:?}"))
}

fn text(value: &str) -> FieldValue {
    FieldValue::Character(Some(value.to_string()))
}

fn opt_ts(ts: Option<chrono::NaiveDateTime>) -> FieldValue {
    FieldValue::Character(ts.map(|t| format_timestamp(&t)))
}

fn point(v: &LonLat) -> Point {
    Point::new(v.lon, v.lat)
}

impl SpatialBackend for ShapefileBackend {
    fn write_lines(&mut self, name: &str, lines: &[TrackLine], with_phase: bool) -> Result<()> {
        let mut table = TableWriterBuilder::new().add_character_field(field("flight_id")?, 64);
        if with_phase {
            table = table.add_character_field(field("phase")?, 16);
        }
        let table = table
            .add_numeric_field(field("n_points")?, 10, 0)
            .add_character_field(field("start_ts")?, 19)
            .add_character_field(field("end_ts")?, 19);

        let path = self.file_path(name, "shp");
        let mut writer = Writer::from_path(&path, table)
            .with_context(|| format!("creating {}", path.display()))?;
        for line in lines {
            if line.vertices.len() < 2 {
                warn!(flight_id = %line.flight_id, "Line with fewer than 2 vertices, skipped");
                continue;
            }
            let shape = Polyline::new(line.vertices.iter().map(point).collect());
            let mut record = Record::default();
            record.insert("flight_id".into(), text(&line.flight_id));
            if with_phase {
                record.insert("phase".into(), text(line.phase.label()));
            }
            record.insert(
                "n_points".into(),
                FieldValue::Numeric(Some(line.n_points as f64)),
            );
            record.insert("start_ts".into(), opt_ts(line.start_time));
            record.insert("end_ts".into(), opt_ts(line.end_time));
            writer
                .write_shape_and_record(&shape, &record)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        drop(writer);
        self.write_prj(name)?;
        debug!("Wrote {} lines to {}", lines.len(), path.display());
        Ok(())
    }

    fn write_points(&mut self, name: &str, points: &[PointRecord]) -> Result<()> {
        let has = |key: &str| points.iter().any(|p| p.attributes.contains_key(key));
        let with_dist = has(ATTR_DIST_KM);
        let with_alt = has(ATTR_ALT_100FT);

        let mut table = TableWriterBuilder::new()
            .add_character_field(field("flight_id")?, 64)
            .add_character_field(field("ts")?, 19)
            .add_numeric_field(field("lat")?, 19, 8)
            .add_numeric_field(field("lon")?, 19, 8);
        if with_dist {
            table = table.add_numeric_field(field(ATTR_DIST_KM)?, 16, 4);
        }
        if with_alt {
            table = table.add_numeric_field(field(ATTR_ALT_100FT)?, 12, 2);
        }

        let path = self.file_path(name, "shp");
        let mut writer = Writer::from_path(&path, table)
            .with_context(|| format!("creating {}", path.display()))?;
        for p in points {
            let mut record = Record::default();
            record.insert("flight_id".into(), text(&p.flight_id));
            record.insert("ts".into(), opt_ts(p.timestamp));
            record.insert("lat".into(), FieldValue::Numeric(Some(p.lat)));
            record.insert("lon".into(), FieldValue::Numeric(Some(p.lon)));
            if with_dist {
                let v = p.attributes.get(ATTR_DIST_KM).copied();
                record.insert(ATTR_DIST_KM.into(), FieldValue::Numeric(v));
            }
            if with_alt {
                let v = p.attributes.get(ATTR_ALT_100FT).copied();
                record.insert(ATTR_ALT_100FT.into(), FieldValue::Numeric(v));
            }
            writer
                .write_shape_and_record(&point(&p.position()), &record)
                .with_context(|| format!("writing {}", path.display()))?;
        }
        drop(writer);
        self.write_prj(name)?;
        debug!("Wrote {} points to {}", points.len(), path.display());
        Ok(())
    }

    fn write_polygon(&mut self, name: &str, ring: &[LonLat]) -> Result<()> {
        let table = TableWriterBuilder::new().add_character_field(field("name")?, 32);
        let path = self.file_path(name, "shp");
        let mut writer = Writer::from_path(&path, table)
            .with_context(|| format!("creating {}", path.display()))?;
        let shape = Polygon::new(PolygonRing::Outer(ring.iter().map(point).collect()));
        let mut record = Record::default();
        record.insert("name".into(), text(name));
        writer
            .write_shape_and_record(&shape, &record)
            .with_context(|| format!("writing {}", path.display()))?;
        drop(writer);
        self.write_prj(name)
    }

    fn delete_dataset(&mut self, name: &str) -> Result<bool> {
        let mut removed = false;
        for ext in DATASET_EXTENSIONS {
            let path = self.file_path(name, ext);
            match std::fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("removing {}", path.display()));
                }
            }
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Layer selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub write_points: bool,
    pub write_buffer: bool,
    pub buffer_segments: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            write_points: true,
            write_buffer: true,
            buffer_segments: 64,
        }
    }
}

/// Write every layer one airport run produces. Returns the names written.
///
/// An empty layer is deleted from the backend instead of written, so a
/// stale dataset from an earlier run never survives under that name.
pub fn export_airport<B: SpatialBackend>(
    backend: &mut B,
    output: &AirportOutput,
    options: &ExportOptions,
) -> Result<Vec<String>> {
    let code = output.code.as_deref();
    let classified = output.classified();
    let mut written = Vec::new();

    let name = tracks_layer(code);
    if skip_if_empty(backend, &name, output.lines.len())? {
        backend.write_lines(&name, &output.lines, classified)?;
        written.push(name);
    }

    if options.write_points {
        let name = points_layer(code);
        if skip_if_empty(backend, &name, output.points.len())? {
            backend.write_points(&name, &output.points)?;
            written.push(name);
        }
    }

    if classified {
        for phase in Phase::CLASSIFIED {
            let name = phase_layer(phase, code);
            let lines: Vec<TrackLine> = output
                .lines
                .iter()
                .filter(|l| l.phase == phase)
                .cloned()
                .collect();
            if skip_if_empty(backend, &name, lines.len())? {
                backend.write_lines(&name, &lines, true)?;
                written.push(name);
            }
        }
    }

    if let (true, Some(buffer)) = (options.write_buffer, output.buffer) {
        let name = buffer_layer(code);
        backend.write_polygon(&name, &buffer.ring(options.buffer_segments))?;
        written.push(name);
    }

    info!(
        airport = code.unwrap_or("-"),
        "Exported {} layer(s): {}",
        written.len(),
        written.join(", ")
    );
    Ok(written)
}

/// `true` when the layer has content; otherwise clears it and logs.
fn skip_if_empty<B: SpatialBackend>(backend: &mut B, name: &str, count: usize) -> Result<bool> {
    if count > 0 {
        return Ok(true);
    }
    backend.delete_dataset(name)?;
    info!("Layer {name} is empty, skipped");
    Ok(false)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
