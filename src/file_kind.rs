/// Classification of source files into media and sidecar kinds.
///
/// The kind decides how a file is sorted (media files carry the capture
/// time, sidecars follow their media file) and how two colliding files are
/// compared.
///
/// # Examples
///
/// ```
/// use photosort::config::FileTypes;
/// use photosort::file_kind::{FileClassifier, FileKind};
/// use std::path::Path;
///
/// let classifier = FileClassifier::new(&FileTypes::default());
/// assert_eq!(classifier.classify_by_extension(Path::new("IMG_0001.JPG")), Some(FileKind::Image));
/// assert_eq!(classifier.classify_by_extension(Path::new("IMG_0001.jpg.xmp")), Some(FileKind::Sidecar));
/// ```
use crate::config::FileTypes;
use std::collections::HashSet;
use std::path::Path;

/// Broad kind of a file found in the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Still images, including camera raw formats.
    Image,
    Video,
    /// Metadata files riding along with a media file (XMP).
    Sidecar,
    /// Anything else; left where it is.
    Other,
}

impl FileKind {
    /// Whether the file carries its own capture time.
    pub fn is_media(&self) -> bool {
        matches!(self, FileKind::Image | FileKind::Video)
    }
}

/// Maps file extensions (and, as a fallback, file content) to a [`FileKind`].
#[derive(Debug, Clone)]
pub struct FileClassifier {
    images: HashSet<String>,
    videos: HashSet<String>,
    sidecars: HashSet<String>,
}

impl FileClassifier {
    pub fn new(types: &FileTypes) -> Self {
        let normalize = |list: &[String]| {
            list.iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect::<HashSet<_>>()
        };
        Self {
            images: normalize(&types.image_extensions),
            videos: normalize(&types.video_extensions),
            sidecars: normalize(&types.sidecar_extensions),
        }
    }

    /// Classifies by the last extension only, case-insensitively.
    pub fn classify_by_extension(&self, path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        if self.sidecars.contains(&ext) {
            Some(FileKind::Sidecar)
        } else if self.images.contains(&ext) {
            Some(FileKind::Image)
        } else if self.videos.contains(&ext) {
            Some(FileKind::Video)
        } else {
            None
        }
    }

    /// Classifies by extension, sniffing the content when the extension is
    /// unknown or missing.
    pub fn classify(&self, path: &Path) -> FileKind {
        if let Some(kind) = self.classify_by_extension(path) {
            return kind;
        }

        match infer::get_from_path(path) {
            Ok(Some(kind)) => match kind.matcher_type() {
                infer::MatcherType::Image => FileKind::Image,
                infer::MatcherType::Video => FileKind::Video,
                _ => FileKind::Other,
            },
            Ok(None) => FileKind::Other,
            Err(e) => {
                log::debug!("Could not sniff {}: {}", path.display(), e);
                FileKind::Other
            }
        }
    }

    /// Whether `sidecar` belongs to `media` by name: `<name>.<ext>.xmp` or
    /// `<stem>.xmp` in the same directory, compared case-insensitively.
    pub fn is_sidecar_of(&self, sidecar: &Path, media: &Path) -> bool {
        if sidecar.parent() != media.parent() {
            return false;
        }
        if self.classify_by_extension(sidecar) != Some(FileKind::Sidecar) {
            return false;
        }
        let (Some(sidecar_stem), Some(media_name), Some(media_stem)) = (
            sidecar.file_stem().map(|s| s.to_string_lossy().to_lowercase()),
            media.file_name().map(|s| s.to_string_lossy().to_lowercase()),
            media.file_stem().map(|s| s.to_string_lossy().to_lowercase()),
        ) else {
            return false;
        };
        sidecar_stem == media_name || sidecar_stem == media_stem
    }
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new(&FileTypes::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classify_by_extension_case_insensitive() {
        let classifier = FileClassifier::default();
        assert_eq!(
            classifier.classify_by_extension(Path::new("a/IMG.JPG")),
            Some(FileKind::Image)
        );
        assert_eq!(
            classifier.classify_by_extension(Path::new("a/clip.MOV")),
            Some(FileKind::Video)
        );
        assert_eq!(
            classifier.classify_by_extension(Path::new("a/IMG.jpg.XMP")),
            Some(FileKind::Sidecar)
        );
        assert_eq!(classifier.classify_by_extension(Path::new("a/notes.txt")), None);
        assert_eq!(classifier.classify_by_extension(Path::new("a/README")), None);
    }

    #[test]
    fn test_classify_sniffs_unknown_extension() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let png = temp_dir.path().join("picture.bin");
        fs::write(
            &png,
            [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D],
        )
        .expect("Failed to write file");
        let text = temp_dir.path().join("notes.txt");
        fs::write(&text, "just text").expect("Failed to write file");

        let classifier = FileClassifier::default();
        assert_eq!(classifier.classify(&png), FileKind::Image);
        assert_eq!(classifier.classify(&text), FileKind::Other);
    }

    #[test]
    fn test_is_sidecar_of() {
        let classifier = FileClassifier::default();
        let media = Path::new("trip/IMG_1234.JPG");

        assert!(classifier.is_sidecar_of(Path::new("trip/IMG_1234.JPG.xmp"), media));
        assert!(classifier.is_sidecar_of(Path::new("trip/img_1234.xmp"), media));
        assert!(!classifier.is_sidecar_of(Path::new("other/IMG_1234.xmp"), media));
        assert!(!classifier.is_sidecar_of(Path::new("trip/IMG_1235.xmp"), media));
        assert!(!classifier.is_sidecar_of(Path::new("trip/IMG_1234.txt"), media));
    }

    #[test]
    fn test_media_kinds() {
        assert!(FileKind::Image.is_media());
        assert!(FileKind::Video.is_media());
        assert!(!FileKind::Sidecar.is_media());
        assert!(!FileKind::Other.is_media());
    }
}
