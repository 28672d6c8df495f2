//! Configuration file management for trackline.
//!
//! Reads/writes `~/.trackline/config.toml` (or an explicit path) with input,
//! output, smoothing, filter and airport settings. Command-line flags are
//! applied on top by the binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::airports::{self, DEFAULT_BUFFER_M};
use crate::columns::{AliasTable, CanonicalField};
use crate::phase::AirportBuffer;
use crate::types::*;

/// Full configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub smoothing: SmoothingConfig,
    pub phase: PhaseConfig,
    pub filter: FilterConfig,
    /// Canonical field name → extra aliases tried before the built-in ones.
    pub columns: BTreeMap<String, Vec<String>>,
    pub airports: Vec<AirportConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: PathBuf,
    /// Append `_<YYYYmmdd_HHMMSS>` to the output folder name.
    pub timestamped: bool,
    pub write_points: bool,
    pub write_buffer: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub tolerance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    pub classify: bool,
    /// Vertices in the exported buffer ring.
    pub buffer_segments: usize,
}

/// One reference airport. Coordinates default to the built-in registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportConfig {
    pub code: String,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default = "default_buffer_m")]
    pub buffer_m: f64,
    /// Extra distance column names, tried before the generated ones.
    #[serde(default)]
    pub distance_columns: Vec<String>,
}

fn default_buffer_m() -> f64 {
    DEFAULT_BUFFER_M
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            root: PathBuf::from("."),
            timestamped: false,
            write_points: true,
            write_buffer: true,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig {
            enabled: true,
            tolerance_m: 200.0,
        }
    }
}

impl Default for PhaseConfig {
    fn default() -> Self {
        PhaseConfig {
            classify: true,
            buffer_segments: 64,
        }
    }
}

impl AirportConfig {
    pub fn new(code: &str) -> Self {
        AirportConfig {
            code: code.trim().to_ascii_uppercase(),
            lon: None,
            lat: None,
            buffer_m: DEFAULT_BUFFER_M,
            distance_columns: Vec::new(),
        }
    }

    /// Reference buffer: explicit coordinates first, then the registry.
    /// `None` when neither knows the airport.
    pub fn buffer(&self) -> Option<AirportBuffer> {
        match (self.lon, self.lat) {
            (Some(lon), Some(lat)) => {
                Some(AirportBuffer::new(LonLat::new(lon, lat), self.buffer_m))
            }
            _ => airports::lookup(&self.code).map(|a| a.buffer(self.buffer_m)),
        }
    }

    /// Configured distance columns followed by the generated aliases.
    pub fn distance_aliases(&self) -> Vec<String> {
        let mut out = self.distance_columns.clone();
        for alias in airports::distance_aliases(&self.code) {
            if !out.iter().any(|a| a.eq_ignore_ascii_case(&alias)) {
                out.push(alias);
            }
        }
        out
    }
}

impl OutputConfig {
    /// `<root>/shapefiles_<csvstem>[_<YYYYmmdd_HHMMSS>]`
    pub fn dir_for(&self, csv: &Path, now: NaiveDateTime) -> PathBuf {
        let stem = csv
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".into());
        let mut name = format!("shapefiles_{stem}");
        if self.timestamped {
            name.push('_');
            name.push_str(&now.format("%Y%m%d_%H%M%S").to_string());
        }
        self.root.join(name)
    }
}

impl Config {
    /// Starter config written by `init-config`.
    pub fn sample() -> Self {
        Config {
            filter: FilterConfig {
                max_distance_km: Some(60.0),
                max_altitude_100ft: Some(50.0),
                ..Default::default()
            },
            airports: vec![AirportConfig::new("BOS")],
            ..Default::default()
        }
    }

    /// Built-in aliases with the `[columns]` overrides in front.
    pub fn alias_table(&self) -> Result<AliasTable> {
        let mut table = AliasTable::default();
        for (name, aliases) in &self.columns {
            let field = CanonicalField::from_name(name)
                .ok_or_else(|| TrackError::Config(format!("unknown column field `{name}`")))?;
            table = table.with_preferred(field, aliases.iter().cloned());
        }
        Ok(table)
    }

    /// Check values that serde can't.
    pub fn validate(&self) -> Result<()> {
        if self.smoothing.enabled && !positive(self.smoothing.tolerance_m) {
            return Err(TrackError::Config(
                "smoothing.tolerance_m must be positive".into(),
            ));
        }
        for airport in &self.airports {
            if airport.code.trim().is_empty() {
                return Err(TrackError::Config("airport code is blank".into()));
            }
            if !positive(airport.buffer_m) {
                return Err(TrackError::Config(format!(
                    "airport {}: buffer_m must be positive",
                    airport.code
                )));
            }
            if airport.lon.is_some() != airport.lat.is_some() {
                return Err(TrackError::Config(format!(
                    "airport {}: set both lon and lat or neither",
                    airport.code
                )));
            }
        }
        self.alias_table().map(|_| ())
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

/// Get the config directory path (`~/.trackline/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".trackline")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `path`, or `~/.trackline/config.toml` when `None`.
///
/// A missing default file yields the default config. A missing explicit
/// file or a malformed one is an error.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_file(), false),
    };
    if !explicit && !path.exists() {
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(&path)
        .map_err(|e| TrackError::Config(format!("{}: {e}", path.display())))?;
    parse_config(&text)
}

/// Save config to `path`, or `~/.trackline/config.toml` when `None`.
pub fn save_config(config: &Config, path: Option<&Path>) -> Result<PathBuf> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_file);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| TrackError::Config(e.to_string()))?;
    }
    let text = serialize_config(config)?;
    std::fs::write(&path, text).map_err(|e| TrackError::Config(e.to_string()))?;
    Ok(path)
}

/// Parse TOML config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text).map_err(|e| TrackError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Serialize config to TOML.
pub fn serialize_config(config: &Config) -> Result<String> {
    let body = toml::to_string_pretty(config).map_err(|e| TrackError::Config(e.to_string()))?;
    Ok(format!("# trackline configuration\n\n{body}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
