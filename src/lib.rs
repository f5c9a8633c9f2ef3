//! photosort - sort photos and videos into date-based directories
//!
//! The library walks a source tree, reads each media file's capture time
//! from its metadata and places it (with its XMP sidecars) under a
//! directory derived from that time. Files that cannot be placed are
//! collected and resolved afterwards: name collisions are compared by
//! content and either discarded as duplicates or quarantined side by side,
//! and files without usable metadata are quarantined by reason.
//!
//! All filesystem changes go through [`file_ops::FileOps`], which in dry-run
//! mode records them instead, so a planned run reports the same numbers as
//! the real one.

pub mod cli;
pub mod comparator;
pub mod config;
pub mod context;
pub mod decomposition;
pub mod error;
pub mod error_collection;
pub mod file_kind;
pub mod file_ops;
pub mod metadata;
pub mod output;
pub mod report;
pub mod resolver;
pub mod sorter;
pub mod stats;

pub use comparator::ContentComparator;
pub use config::{CompiledFilters, Config, ConfigError, TransferMode};
pub use context::{Settings, SortContext};
pub use error::{SortError, SortResult};
pub use error_collection::{ErrorCollection, ErrorKind, ErrorRecord};
pub use file_kind::{FileClassifier, FileKind};
pub use file_ops::FileOps;
pub use metadata::{
    ExifMetadataReader, ExifTimestampResolver, Metadata, MetadataReader, TimestampResolver,
};
pub use report::RunReport;
pub use resolver::{Resolution, Resolver};
pub use sorter::{SortOutcome, Sorter};
pub use stats::Statistics;

pub use cli::{Cli, run_cli};
