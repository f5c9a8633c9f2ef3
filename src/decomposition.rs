//! Splitting file names into base name and compound extension.

use std::path::{Path, PathBuf};

/// A file name placed in a directory, split for quarantine naming.
///
/// The extension runs from the first dot of the name, so sidecars keep
/// their media extension: `img1234.jpg.xmp` has base `img1234` and
/// extension `.jpg.xmp`. A leading dot belongs to the base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecomposition {
    pub full_path: PathBuf,
    pub directory: PathBuf,
    pub base_name: String,
    pub extension: String,
}

impl FileDecomposition {
    /// Decomposes the file name of `file` as if it were placed in `directory`.
    pub fn at(directory: &Path, file: &Path) -> Self {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (base_name, extension) = split_name(&file_name);
        Self {
            full_path: directory.join(&file_name),
            directory: directory.to_path_buf(),
            base_name: base_name.to_string(),
            extension: extension.to_string(),
        }
    }

    /// `<base><ext>` for 0, `<base>_<n><ext>` otherwise.
    pub fn file_name_with_suffix(&self, n: usize) -> String {
        if n == 0 {
            format!("{}{}", self.base_name, self.extension)
        } else {
            format!("{}_{}{}", self.base_name, n, self.extension)
        }
    }

    /// Same decomposition moved to another directory.
    pub fn relocate(&self, directory: &Path) -> Self {
        Self {
            full_path: directory.join(self.file_name_with_suffix(0)),
            directory: directory.to_path_buf(),
            base_name: self.base_name.clone(),
            extension: self.extension.clone(),
        }
    }
}

/// Splits a file name into (base, extension) at the first non-leading dot.
pub fn split_name(file_name: &str) -> (&str, &str) {
    let search_from = usize::from(file_name.starts_with('.'));
    match file_name[search_from..].find('.') {
        Some(idx) => file_name.split_at(search_from + idx),
        None => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_extension() {
        let d = FileDecomposition::at(Path::new("/q/FileAlreadyExists"), Path::new("/a/img1234.jpg.xmp"));
        assert_eq!(d.base_name, "img1234");
        assert_eq!(d.extension, ".jpg.xmp");
        assert_eq!(d.directory, PathBuf::from("/q/FileAlreadyExists"));
        assert_eq!(d.full_path, PathBuf::from("/q/FileAlreadyExists/img1234.jpg.xmp"));
    }

    #[test]
    fn test_split_edge_cases() {
        assert_eq!(split_name("1.jpg"), ("1", ".jpg"));
        assert_eq!(split_name("README"), ("README", ""));
        assert_eq!(split_name(".hidden.jpg"), (".hidden", ".jpg"));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_suffixes() {
        let d = FileDecomposition::at(Path::new("q"), Path::new("1.jpg"));
        assert_eq!(d.file_name_with_suffix(0), "1.jpg");
        assert_eq!(d.file_name_with_suffix(2), "1_2.jpg");

        let moved = d.relocate(Path::new("q/1"));
        assert_eq!(moved.full_path, PathBuf::from("q/1/1.jpg"));
        assert_eq!(moved.base_name, "1");
    }
}
