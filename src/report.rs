//! Machine-readable summary of a run.
//!
//! Written as pretty JSON when `--report` is given, in dry runs too, so a
//! planned run can be inspected before it is forced.

use crate::error::{SortError, SortResult};
use crate::error_collection::{ErrorCollection, ErrorRecord};
use crate::sorter::SortOutcome;
use crate::stats::Statistics;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One error record as written to the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub kind: String,
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl From<&ErrorRecord> for RecordEntry {
    fn from(record: &ErrorRecord) -> Self {
        Self {
            kind: record.kind().name().to_string(),
            file: record.file().to_path_buf(),
            target: record.target().map(Path::to_path_buf),
            messages: record.messages().to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// RFC 3339 time the report was created.
    pub timestamp: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub dry_run: bool,
    pub stats: Statistics,
    pub records: Vec<RecordEntry>,
}

impl RunReport {
    pub fn new(source: &Path, destination: &Path, outcome: &SortOutcome) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            dry_run: outcome.dry_run,
            stats: outcome.stats.snapshot(),
            records: entries(&outcome.errors),
        }
    }

    pub fn save(&self, path: &Path) -> SortResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SortError::Report(format!("JSON serialization failed: {}", e)))?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| SortError::io(parent, e))?;
        }
        fs::write(path, json).map_err(|e| SortError::io(path, e))
    }

    pub fn load(path: &Path) -> SortResult<Self> {
        let json = fs::read_to_string(path).map_err(|e| SortError::io(path, e))?;
        serde_json::from_str(&json)
            .map_err(|e| SortError::Report(format!("Invalid report {}: {}", path.display(), e)))
    }
}

fn entries(errors: &ErrorCollection) -> Vec<RecordEntry> {
    errors.errors().iter().map(RecordEntry::from).collect()
}
