//! trackline-core: CSV position reports → flight tracks → phase labels.
//!
//! No filesystem writes. CSV comes in through `std::io::Read`; geometry and
//! attributes come out as plain values. The `trackline` binary owns
//! exporting and the output directory.

pub mod airports;
pub mod columns;
pub mod config;
pub mod datetime;
pub mod filter;
pub mod loader;
pub mod phase;
pub mod pipeline;
pub mod smooth;
pub mod tracker;
pub mod types;
pub mod window;

// Re-export commonly used types at crate root
pub use columns::{AliasTable, CanonicalField, ColumnSet};
pub use datetime::{format_timestamp, parse_timestamp};
pub use filter::{FilterStats, RejectReason};
pub use phase::{classify, AirportBuffer, PhaseFlags};
pub use pipeline::{run_airport, run_airports, AirportOutput, AirportRun, PipelineOptions};
pub use tracker::{TrackBuilder, TrackSet};
pub use types::*;
