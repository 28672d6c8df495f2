//! trackline: build flight-track shapefiles from CSV position exports.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use trackline_core::columns::{CanonicalField, ColumnSet};
use trackline_core::config::{self, AirportConfig, Config};
use trackline_core::datetime::format_timestamp;
use trackline_core::loader::read_headers;
use trackline_core::pipeline::{run_airports, AirportRun, PipelineOptions, RunSummary};
use trackline_core::types::*;
use trackline_core::window::{apply_window, WindowAnchor, WindowReport, WindowSpec};

mod export;
mod session;

use export::{export_airport, ExportOptions};
use session::Session;

#[derive(Parser)]
#[command(name = "trackline", version, about = "Flight track builder for CSV position exports")]
struct Cli {
    /// Config file (default: ~/.trackline/config.toml)
    #[arg(short, long, global = true, env = "TRACKLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build tracks from a CSV and export shapefiles
    Tracks(TracksArgs),

    /// Keep the first or last N calendar days of a CSV
    Window {
        /// Input CSV
        input: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Number of calendar days to keep
        #[arg(long)]
        days: u32,

        /// Window start: first or last day in the file
        #[arg(long, default_value = "first")]
        anchor: WindowAnchor,

        /// Date column name, tried before the built-in aliases
        #[arg(long)]
        date_column: Option<String>,
    },

    /// Write a starter config file
    InitConfig {
        /// Destination (default: ~/.trackline/config.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show how each canonical field resolves against a CSV header
    Columns {
        /// Input CSV
        csv: PathBuf,

        /// Resolve the distance column for this airport
        #[arg(long)]
        airport: Option<String>,
    },
}

#[derive(clap::Args, Debug, Default)]
struct TracksArgs {
    /// Input CSV (default: input.csv from config)
    csv: Option<PathBuf>,

    /// Directory that receives the shapefiles_<name> folder
    #[arg(long)]
    out_root: Option<PathBuf>,

    /// Append a timestamp to the output folder name
    #[arg(long)]
    timestamped: bool,

    /// Reference airport code; repeat for several
    #[arg(long = "airport")]
    airports: Vec<String>,

    /// Drop rows farther than this from the airport (km)
    #[arg(long)]
    max_distance_km: Option<f64>,

    /// Drop rows above this altitude (hundreds of feet)
    #[arg(long)]
    max_altitude_100ft: Option<f64>,

    /// Keep only rows departing this airport
    #[arg(long)]
    departure_airport: Option<String>,

    /// Drop rows whose timestamp does not parse
    #[arg(long)]
    require_timestamp: bool,

    /// Smoothing tolerance in meters
    #[arg(long)]
    tolerance_m: Option<f64>,

    /// Export raw vertices
    #[arg(long)]
    no_smooth: bool,

    /// Skip phase classification
    #[arg(long)]
    no_classify: bool,

    /// Skip the points layer
    #[arg(long)]
    no_points: bool,

    /// Skip the airport buffer layer
    #[arg(long)]
    no_buffer: bool,
}

impl TracksArgs {
    /// Apply command-line overrides on top of the config file.
    fn apply(&self, config: &mut Config) {
        if let Some(csv) = &self.csv {
            config.input.csv = Some(csv.clone());
        }
        if let Some(root) = &self.out_root {
            config.output.root = root.clone();
        }
        if self.timestamped {
            config.output.timestamped = true;
        }
        if !self.airports.is_empty() {
            let existing = std::mem::take(&mut config.airports);
            config.airports = self
                .airports
                .iter()
                .map(|code| {
                    existing
                        .iter()
                        .find(|a| a.code.eq_ignore_ascii_case(code.trim()))
                        .cloned()
                        .unwrap_or_else(|| AirportConfig::new(code))
                })
                .collect();
        }
        if self.max_distance_km.is_some() {
            config.filter.max_distance_km = self.max_distance_km;
        }
        if self.max_altitude_100ft.is_some() {
            config.filter.max_altitude_100ft = self.max_altitude_100ft;
        }
        if let Some(code) = &self.departure_airport {
            config.filter.departure_airport_code = Some(code.clone());
        }
        if self.require_timestamp {
            config.filter.require_timestamp = true;
        }
        if let Some(tol) = self.tolerance_m {
            config.smoothing.tolerance_m = tol;
        }
        if self.no_smooth {
            config.smoothing.enabled = false;
        }
        if self.no_classify {
            config.phase.classify = false;
        }
        if self.no_points {
            config.output.write_points = false;
        }
        if self.no_buffer {
            config.output.write_buffer = false;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,trackline={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Tracks(args) => {
            let mut config = config::load_config(config_path)?;
            args.apply(&mut config);
            let report = cmd_tracks(&config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_tracks_report(&report);
            }
        }
        Commands::Window {
            input,
            output,
            days,
            anchor,
            date_column,
        } => {
            let config = config::load_config(config_path)?;
            let mut spec = WindowSpec::new(days, anchor);
            spec.aliases = config.alias_table()?;
            if let Some(col) = date_column {
                spec.aliases = spec.aliases.with_preferred(CanonicalField::Date, [col]);
            }
            let report = cmd_window(&input, &output, &spec)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_window_report(&report, &spec, &output);
            }
        }
        Commands::InitConfig { path, force } => {
            let target = path.unwrap_or_else(config::config_file);
            if target.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", target.display());
            }
            let written = config::save_config(&Config::sample(), Some(target.as_path()))?;
            println!("Wrote {}", written.display());
        }
        Commands::Columns { csv, airport } => {
            let config = config::load_config(config_path)?;
            let columns = cmd_columns(&csv, &config, airport.as_deref())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                print_columns(&columns, &csv);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// tracks
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TracksReport {
    output_dir: PathBuf,
    datasets: Vec<String>,
    airports: Vec<RunSummary>,
}

fn cmd_tracks(config: &Config) -> Result<TracksReport> {
    config.validate()?;
    let csv = match &config.input.csv {
        Some(p) => p.clone(),
        None => bail!("no input CSV (pass a path or set input.csv in the config)"),
    };

    let runs = AirportRun::all_from_config(config);
    let options = PipelineOptions::from_config(config)?;
    info!("Reading {} for {} run(s)", csv.display(), runs.len());

    let open = || -> trackline_core::Result<BufReader<File>> {
        Ok(BufReader::new(File::open(&csv)?))
    };
    let outputs = run_airports(open, &runs, &options)
        .with_context(|| format!("processing {}", csv.display()))?;

    let out_dir = config
        .output
        .dir_for(&csv, chrono::Local::now().naive_local());
    let export = ExportOptions {
        write_points: config.output.write_points,
        write_buffer: config.output.write_buffer,
        buffer_segments: config.phase.buffer_segments,
    };

    let mut session = Session::open(&out_dir)?;
    for output in &outputs {
        export_airport(&mut session, output, &export)?;
    }
    let datasets = session.commit()?;

    Ok(TracksReport {
        output_dir: out_dir,
        datasets,
        airports: outputs.iter().map(|o| o.summary()).collect(),
    })
}

fn print_tracks_report(report: &TracksReport) {
    println!();
    println!("Output: {}", report.output_dir.display());
    println!();

    let mut table = Table::new();
    table.set_header(vec![
        "Airport", "Read", "Loaded", "Invalid", "Rejected", "Tracks", "Degenerate", "Arrival",
        "Departure", "Local", "Overflight",
    ]);
    for s in &report.airports {
        let phase = |p: Phase| match s.phases.get(p.label()) {
            Some(n) => Cell::new(n),
            None if s.phases.is_empty() => Cell::new("-"),
            None => Cell::new(0),
        };
        let rejected: u64 = s.rejected.values().sum();
        table.add_row(vec![
            Cell::new(s.airport.as_deref().unwrap_or("-")),
            Cell::new(s.rows_read),
            Cell::new(s.loaded),
            Cell::new(s.skipped_invalid),
            Cell::new(rejected),
            Cell::new(s.tracks),
            Cell::new(s.degenerate),
            phase(Phase::Arrival),
            phase(Phase::Departure),
            phase(Phase::Local),
            phase(Phase::Overflight),
        ]);
    }
    println!("{table}");

    let mut reasons = Table::new();
    reasons.set_header(vec!["Airport", "Reason", "Rows"]);
    let mut any = false;
    for s in &report.airports {
        for (reason, n) in &s.rejected {
            any = true;
            reasons.add_row(vec![
                Cell::new(s.airport.as_deref().unwrap_or("-")),
                Cell::new(reason),
                Cell::new(n),
            ]);
        }
    }
    if any {
        println!();
        println!("{reasons}");
    }

    println!();
    println!("Datasets: {}", report.datasets.join(", "));
}

// ---------------------------------------------------------------------------
// window
// ---------------------------------------------------------------------------

fn cmd_window(input: &Path, output: &Path, spec: &WindowSpec) -> Result<WindowReport> {
    let reader = File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let writer = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let report = apply_window(BufReader::new(reader), BufWriter::new(writer), spec)
        .with_context(|| format!("windowing {}", input.display()))?;
    Ok(report)
}

fn print_window_report(report: &WindowReport, spec: &WindowSpec, output: &Path) {
    let anchor = match spec.anchor {
        WindowAnchor::First => "first",
        WindowAnchor::Last => "last",
    };
    println!();
    println!(
        "Parsed date range: {} to {}",
        format_timestamp(&report.min),
        format_timestamp(&report.max)
    );
    println!("Unique calendar days available: {}", report.unique_days);
    println!("Rows read: {}", report.rows_read);
    println!("Unparseable dates dropped: {}", report.unparseable);
    println!(
        "Rows exported ({anchor} {} days): {}",
        spec.days, report.exported
    );
    println!("Saved to: {}", output.display());
}

// ---------------------------------------------------------------------------
// columns
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ColumnReport {
    field: CanonicalField,
    header: Option<String>,
    index: Option<usize>,
    tried: Vec<String>,
}

fn cmd_columns(csv: &Path, config: &Config, airport: Option<&str>) -> Result<Vec<ColumnReport>> {
    let file = File::open(csv).with_context(|| format!("opening {}", csv.display()))?;
    let headers = read_headers(BufReader::new(file))?;

    let mut aliases = config.alias_table()?;
    if let Some(code) = airport {
        let entry = config
            .airports
            .iter()
            .find(|a| a.code.eq_ignore_ascii_case(code.trim()))
            .cloned()
            .unwrap_or_else(|| AirportConfig::new(code));
        aliases = aliases.with_preferred(CanonicalField::DistKm, entry.distance_aliases());
    }

    let resolved = ColumnSet::resolve(&headers, &aliases, &[], &CanonicalField::ALL)?;
    Ok(CanonicalField::ALL
        .into_iter()
        .map(|field| ColumnReport {
            field,
            header: resolved.header(field).map(str::to_string),
            index: resolved.index(field),
            tried: aliases.aliases(field).to_vec(),
        })
        .collect())
}

fn print_columns(columns: &[ColumnReport], csv: &Path) {
    println!();
    println!("Columns in {}", csv.display());
    println!();
    let mut table = Table::new();
    table.set_header(vec!["Field", "Column", "Index", "Aliases"]);
    for c in columns {
        table.add_row(vec![
            Cell::new(c.field.name()),
            Cell::new(c.header.as_deref().unwrap_or("-")),
            Cell::new(c.index.map(|i| i.to_string()).unwrap_or("-".into())),
            Cell::new(c.tried.join(", ")),
        ]);
    }
    println!("{table}");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
