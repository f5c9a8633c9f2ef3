//! Run-wide state passed explicitly to every component.

use crate::config::Config;
use crate::file_ops::FileOps;
use crate::stats::Statistics;
use std::path::{Path, PathBuf};

/// What to sort, where to, and how.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Without force the run only plans and reports.
    pub force: bool,
    pub config: Config,
}

impl Settings {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        force: bool,
        config: Config,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            force,
            config,
        }
    }

    /// Root of the quarantine tree inside the destination.
    pub fn quarantine_root(&self) -> PathBuf {
        self.destination.join(&self.config.sorting.quarantine_dir)
    }

    /// Whether the walk must skip `path`: the quarantine tree always, the
    /// destination tree when it is nested inside a different source.
    pub fn is_output_path(&self, path: &Path) -> bool {
        if path.starts_with(self.quarantine_root()) {
            return true;
        }
        self.destination != self.source && path.starts_with(&self.destination)
    }
}

/// Settings, filesystem layer and statistics of one run.
#[derive(Debug)]
pub struct SortContext {
    pub settings: Settings,
    pub fs: FileOps,
    pub stats: Statistics,
}

impl SortContext {
    pub fn new(settings: Settings) -> Self {
        let fs = FileOps::new(settings.force);
        Self {
            settings,
            fs,
            stats: Statistics::new(),
        }
    }
}
