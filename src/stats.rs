//! Run statistics.

use serde::{Deserialize, Serialize};

/// Counters mutated by the sorter, the resolver and the comparator.
///
/// The run is single-threaded, so plain integers are enough.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Media files (images and videos) found in the source tree.
    pub images_found: usize,
    /// Files copied, including quarantine copies.
    pub images_copied: usize,
    /// Files moved into the destination tree.
    pub images_moved: usize,
    /// Media files discarded as duplicates.
    pub images_skipped: usize,
    pub xmps_found: usize,
    /// Sidecars discarded as duplicates.
    pub xmps_skipped: usize,
    pub directories_found: usize,
    pub directories_deleted: usize,
    /// Error records plus failures while resolving them.
    pub errors: usize,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only copy for reporting.
    pub fn snapshot(&self) -> Statistics {
        self.clone()
    }

    /// Labelled counters in display order.
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("Images found", self.images_found),
            ("Images moved", self.images_moved),
            ("Images copied", self.images_copied),
            ("Images skipped", self.images_skipped),
            ("XMPs found", self.xmps_found),
            ("XMPs skipped", self.xmps_skipped),
            ("Directories found", self.directories_found),
            ("Directories deleted", self.directories_deleted),
            ("Errors", self.errors),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_detached() {
        let mut stats = Statistics::new();
        stats.images_found = 3;
        let snapshot = stats.snapshot();
        stats.images_found += 1;

        assert_eq!(snapshot.images_found, 3);
        assert_eq!(stats.images_found, 4);
    }

    #[test]
    fn test_rows_cover_every_counter() {
        let stats = Statistics {
            errors: 2,
            ..Default::default()
        };
        let rows = stats.rows();
        assert_eq!(rows.len(), 9);
        assert_eq!(rows.last(), Some(&("Errors", 2)));
    }
}
