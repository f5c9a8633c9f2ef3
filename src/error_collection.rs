//! Per-file failures accumulated during the sorting pass.
//!
//! Every file that could not be placed directly ends up here as exactly one
//! [`ErrorRecord`]. The collection is filled by the sorter and then handed,
//! read-only, to the resolver.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Discriminator of an [`ErrorRecord`]; also names its quarantine directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    FileAlreadyExists,
    NoTimeFound,
    MetadataError,
    ImageProcessingFailure,
}

impl ErrorKind {
    /// All kinds, in the order the resolver processes them.
    pub const ALL: [ErrorKind; 4] = [
        ErrorKind::FileAlreadyExists,
        ErrorKind::NoTimeFound,
        ErrorKind::MetadataError,
        ErrorKind::ImageProcessingFailure,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::FileAlreadyExists => "FileAlreadyExists",
            ErrorKind::NoTimeFound => "NoTimeFound",
            ErrorKind::MetadataError => "MetadataError",
            ErrorKind::ImageProcessingFailure => "ImageProcessingFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A file that could not be placed at its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorRecord {
    /// `target` already exists; `incoming` is the file that wanted its place.
    FileAlreadyExists {
        target: PathBuf,
        incoming: PathBuf,
        messages: Vec<String>,
    },
    /// Metadata was readable but carries no capture time.
    NoTimeFound {
        path: PathBuf,
        diagnostics: Vec<String>,
        messages: Vec<String>,
    },
    /// The metadata reader reported problems while parsing.
    MetadataError {
        path: PathBuf,
        diagnostics: Vec<String>,
        messages: Vec<String>,
    },
    /// The metadata container could not be read at all.
    ImageProcessingFailure {
        path: PathBuf,
        cause: String,
        messages: Vec<String>,
    },
}

impl ErrorRecord {
    pub fn file_already_exists(target: impl Into<PathBuf>, incoming: impl Into<PathBuf>) -> Self {
        let target = target.into();
        let message = format!("Destination already exists: {}", target.display());
        ErrorRecord::FileAlreadyExists {
            target,
            incoming: incoming.into(),
            messages: vec![message],
        }
    }

    pub fn no_time_found(path: impl Into<PathBuf>, diagnostics: Vec<String>) -> Self {
        ErrorRecord::NoTimeFound {
            path: path.into(),
            diagnostics,
            messages: vec!["No capture time found in metadata".to_string()],
        }
    }

    pub fn metadata_error(path: impl Into<PathBuf>, diagnostics: Vec<String>) -> Self {
        let message = format!("Metadata could not be parsed cleanly: {}", diagnostics.join("; "));
        ErrorRecord::MetadataError {
            path: path.into(),
            diagnostics,
            messages: vec![message],
        }
    }

    pub fn image_processing_failure(path: impl Into<PathBuf>, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        ErrorRecord::ImageProcessingFailure {
            path: path.into(),
            messages: vec![cause.clone()],
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorRecord::FileAlreadyExists { .. } => ErrorKind::FileAlreadyExists,
            ErrorRecord::NoTimeFound { .. } => ErrorKind::NoTimeFound,
            ErrorRecord::MetadataError { .. } => ErrorKind::MetadataError,
            ErrorRecord::ImageProcessingFailure { .. } => ErrorKind::ImageProcessingFailure,
        }
    }

    /// The file that failed to land at its destination.
    pub fn file(&self) -> &Path {
        match self {
            ErrorRecord::FileAlreadyExists { incoming, .. } => incoming,
            ErrorRecord::NoTimeFound { path, .. }
            | ErrorRecord::MetadataError { path, .. }
            | ErrorRecord::ImageProcessingFailure { path, .. } => path,
        }
    }

    /// The occupied destination, for collisions.
    pub fn target(&self) -> Option<&Path> {
        match self {
            ErrorRecord::FileAlreadyExists { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn messages(&self) -> &[String] {
        match self {
            ErrorRecord::FileAlreadyExists { messages, .. }
            | ErrorRecord::NoTimeFound { messages, .. }
            | ErrorRecord::MetadataError { messages, .. }
            | ErrorRecord::ImageProcessingFailure { messages, .. } => messages,
        }
    }

    fn messages_mut(&mut self) -> &mut Vec<String> {
        match self {
            ErrorRecord::FileAlreadyExists { messages, .. }
            | ErrorRecord::NoTimeFound { messages, .. }
            | ErrorRecord::MetadataError { messages, .. }
            | ErrorRecord::ImageProcessingFailure { messages, .. } => messages,
        }
    }
}

/// Insertion-ordered records, at most one per file.
#[derive(Debug, Default)]
pub struct ErrorCollection {
    records: Vec<ErrorRecord>,
    index: HashMap<PathBuf, usize>,
}

impl ErrorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, or appends its messages to the record already held
    /// for the same file. Returns `true` when a new record was inserted.
    pub fn add(&mut self, record: ErrorRecord) -> bool {
        if let Some(&idx) = self.index.get(record.file()) {
            let existing = &mut self.records[idx];
            existing
                .messages_mut()
                .extend(record.messages().iter().cloned());
            return false;
        }
        self.index
            .insert(record.file().to_path_buf(), self.records.len());
        self.records.push(record);
        true
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.records
    }

    /// Records of one kind, in discovery order.
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter().filter(move |r| r.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_file_merges_messages() {
        let mut errors = ErrorCollection::new();
        assert!(errors.add(ErrorRecord::no_time_found("a/1.jpg", vec![])));
        assert!(!errors.add(ErrorRecord::metadata_error(
            "a/1.jpg",
            vec!["bad IFD".to_string()]
        )));

        assert_eq!(errors.len(), 1);
        let record = &errors.errors()[0];
        assert_eq!(record.kind(), ErrorKind::NoTimeFound);
        assert_eq!(record.messages().len(), 2);
        assert!(record.messages()[1].contains("bad IFD"));
    }

    #[test]
    fn test_discovery_order_is_kept() {
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists("d/1.jpg", "b/1.jpg"));
        errors.add(ErrorRecord::no_time_found("c/2.jpg", vec![]));
        errors.add(ErrorRecord::file_already_exists("d/1.jpg", "a/1.jpg"));

        let files: Vec<_> = errors.errors().iter().map(|r| r.file()).collect();
        assert_eq!(
            files,
            vec![Path::new("b/1.jpg"), Path::new("c/2.jpg"), Path::new("a/1.jpg")]
        );

        let collisions: Vec<_> = errors
            .of_kind(ErrorKind::FileAlreadyExists)
            .map(|r| r.file())
            .collect();
        assert_eq!(collisions, vec![Path::new("b/1.jpg"), Path::new("a/1.jpg")]);
    }

    #[test]
    fn test_record_accessors() {
        let record = ErrorRecord::file_already_exists("2023/01/18/1.jpg", "B/1.jpg");
        assert_eq!(record.file(), Path::new("B/1.jpg"));
        assert_eq!(record.target(), Some(Path::new("2023/01/18/1.jpg")));

        let record = ErrorRecord::image_processing_failure("x.jpg", "truncated");
        assert_eq!(record.kind().name(), "ImageProcessingFailure");
        assert_eq!(record.target(), None);
        assert_eq!(record.messages(), ["truncated".to_string()]);
    }
}
