//! Scoped output workspace for one run.
//!
//! Datasets are written into a hidden staging directory inside the output
//! directory. `commit()` replaces every dataset name the run touched and
//! moves the new files in. A session dropped without committing removes its
//! staging directory and leaves the output directory as it was.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info};

use trackline_core::types::{LonLat, PointRecord, TrackLine};

use crate::export::{ShapefileBackend, SpatialBackend};

pub struct Session {
    out_dir: PathBuf,
    staging: TempDir,
    backend: ShapefileBackend,
    /// Names written or cleared during the run.
    claimed: BTreeSet<String>,
}

impl Session {
    /// Create `out_dir` if needed and open a staging area inside it.
    pub fn open(out_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("creating output directory {}", out_dir.display()))?;
        let staging = tempfile::Builder::new()
            .prefix(".trackline-staging-")
            .tempdir_in(out_dir)
            .with_context(|| format!("creating staging directory in {}", out_dir.display()))?;
        debug!("Staging in {}", staging.path().display());
        let backend = ShapefileBackend::new(staging.path());
        Ok(Session {
            out_dir: out_dir.to_path_buf(),
            staging,
            backend,
            claimed: BTreeSet::new(),
        })
    }

    /// Replace claimed datasets in the output directory with the staged
    /// files. Returns the dataset names now present.
    pub fn commit(self) -> Result<Vec<String>> {
        let mut target = ShapefileBackend::new(&self.out_dir);
        for name in &self.claimed {
            if target.delete_dataset(name)? {
                debug!("Replaced existing dataset {name}");
            }
        }

        let mut committed = BTreeSet::new();
        let entries = std::fs::read_dir(self.staging.path())
            .with_context(|| format!("reading {}", self.staging.path().display()))?;
        for entry in entries {
            let entry = entry?;
            let from = entry.path();
            let to = self.out_dir.join(entry.file_name());
            std::fs::rename(&from, &to)
                .with_context(|| format!("moving {} to {}", from.display(), to.display()))?;
            if let Some(stem) = to.file_stem() {
                committed.insert(stem.to_string_lossy().into_owned());
            }
        }

        info!(
            "Committed {} dataset(s) to {}",
            committed.len(),
            self.out_dir.display()
        );
        // staging is empty now; TempDir removes it on drop
        Ok(committed.into_iter().collect())
    }
}

impl SpatialBackend for Session {
    fn write_lines(&mut self, name: &str, lines: &[TrackLine], with_phase: bool) -> Result<()> {
        self.claimed.insert(name.to_string());
        self.backend.write_lines(name, lines, with_phase)
    }

    fn write_points(&mut self, name: &str, points: &[PointRecord]) -> Result<()> {
        self.claimed.insert(name.to_string());
        self.backend.write_points(name, points)
    }

    fn write_polygon(&mut self, name: &str, ring: &[LonLat]) -> Result<()> {
        self.claimed.insert(name.to_string());
        self.backend.write_polygon(name, ring)
    }

    /// Drops the staged copy and marks the name for removal on commit.
    fn delete_dataset(&mut self, name: &str) -> Result<bool> {
        self.claimed.insert(name.to_string());
        let staged = self.backend.delete_dataset(name)?;
        Ok(staged || self.out_dir.join(format!("{name}.shp")).exists())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
