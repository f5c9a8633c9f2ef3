//! Metadata reading and capture-time resolution.
//!
//! The sorter only asks two questions of a file's metadata: did parsing
//! report problems, and is there a capture time. Both collaborators are
//! traits so the sorter can be driven by other metadata sources.

use crate::config::SortingConfig;
use crate::error::{SortError, SortResult};
use chrono::{DateTime, Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;

/// Structured tag data of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Tag name -> value, primary image only.
    pub tags: BTreeMap<String, String>,
    /// Problems reported while parsing; the tags may be incomplete.
    pub diagnostics: Vec<String>,
    pub modified: Option<SystemTime>,
}

impl Metadata {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Supplies the metadata of a file.
///
/// `Err` means the metadata container could not be read at all; a file
/// without any metadata is an `Ok` with no tags.
pub trait MetadataReader {
    fn read(&self, path: &Path) -> SortResult<Metadata>;
}

/// Derives the capture time from metadata. `None` is an expected outcome.
pub trait TimestampResolver {
    fn capture_time(&self, metadata: &Metadata) -> Option<NaiveDateTime>;
}

/// Reads EXIF data from any container kamadak-exif understands (JPEG, TIFF
/// based raw formats, HEIF, PNG, WebP).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifMetadataReader;

impl MetadataReader for ExifMetadataReader {
    fn read(&self, path: &Path) -> SortResult<Metadata> {
        let file = File::open(path).map_err(|e| SortError::io(path, e))?;
        let modified = file.metadata().and_then(|m| m.modified()).ok();
        let mut reader = BufReader::new(file);

        let mut exif_reader = exif::Reader::new();
        exif_reader.continue_on_error(true);

        let (exif, diagnostics) = match exif_reader.read_from_container(&mut reader) {
            Ok(exif) => (Some(exif), Vec::new()),
            Err(exif::Error::PartialResult(partial)) => {
                let (exif, errors) = partial.into_inner();
                (Some(exif), errors.iter().map(ToString::to_string).collect())
            }
            Err(exif::Error::NotFound(_)) | Err(exif::Error::NotSupported(_)) => (None, Vec::new()),
            Err(exif::Error::Io(e)) => return Err(SortError::io(path, e)),
            Err(e) => {
                return Err(SortError::Exif {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        let mut tags = BTreeMap::new();
        for field in exif.iter().flat_map(|exif| exif.fields()) {
            if field.ifd_num != exif::In::PRIMARY {
                continue;
            }
            let value = match field.value {
                exif::Value::Ascii(ref values) if !values.is_empty() => {
                    String::from_utf8_lossy(&values[0]).into_owned()
                }
                _ => field.display_value().to_string(),
            };
            tags.entry(field.tag.to_string()).or_insert(value);
        }

        Ok(Metadata {
            tags,
            diagnostics,
            modified,
        })
    }
}

/// Takes the first parseable timestamp among the configured tags.
#[derive(Debug, Clone)]
pub struct ExifTimestampResolver {
    tags: Vec<String>,
    mtime_fallback: bool,
}

impl ExifTimestampResolver {
    pub fn new(tags: Vec<String>, mtime_fallback: bool) -> Self {
        Self {
            tags,
            mtime_fallback,
        }
    }

    pub fn from_config(config: &SortingConfig) -> Self {
        Self::new(config.timestamp_tags.clone(), config.mtime_fallback)
    }
}

impl Default for ExifTimestampResolver {
    fn default() -> Self {
        Self::from_config(&SortingConfig::default())
    }
}

impl TimestampResolver for ExifTimestampResolver {
    fn capture_time(&self, metadata: &Metadata) -> Option<NaiveDateTime> {
        let from_tags = self
            .tags
            .iter()
            .filter_map(|tag| metadata.tag(tag))
            .find_map(parse_exif_datetime);
        if from_tags.is_some() || !self.mtime_fallback {
            return from_tags;
        }
        metadata
            .modified
            .map(|m| DateTime::<Local>::from(m).naive_local())
    }
}

/// Parses `YYYY:MM:DD HH:MM:SS`, also accepting dashes in the date part.
pub fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('\0');
    NaiveDateTime::parse_from_str(value, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::fs;
    use tempfile::TempDir;

    /// Minimal JPEG whose APP1 segment holds a little-endian TIFF with an
    /// Exif IFD carrying DateTimeOriginal.
    fn jpeg_with_exif_datetime(datetime: &str) -> Vec<u8> {
        assert_eq!(datetime.len(), 19);
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"II*\0");
        tiff.extend_from_slice(&8u32.to_le_bytes());
        // IFD0 at 8: ExifIFDPointer -> 26
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x8769u16.to_le_bytes());
        tiff.extend_from_slice(&4u16.to_le_bytes());
        tiff.extend_from_slice(&1u32.to_le_bytes());
        tiff.extend_from_slice(&26u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        // Exif IFD at 26: DateTimeOriginal, ASCII[20] at 44
        tiff.extend_from_slice(&1u16.to_le_bytes());
        tiff.extend_from_slice(&0x9003u16.to_le_bytes());
        tiff.extend_from_slice(&2u16.to_le_bytes());
        tiff.extend_from_slice(&20u32.to_le_bytes());
        tiff.extend_from_slice(&44u32.to_le_bytes());
        tiff.extend_from_slice(&0u32.to_le_bytes());
        tiff.extend_from_slice(datetime.as_bytes());
        tiff.push(0);

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    fn metadata_with(tags: &[(&str, &str)]) -> Metadata {
        Metadata {
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_exif_datetime() {
        let t = parse_exif_datetime("2023:01:18 10:20:30").expect("valid timestamp");
        assert_eq!((t.year(), t.month(), t.day()), (2023, 1, 18));
        assert_eq!((t.hour(), t.minute(), t.second()), (10, 20, 30));

        assert!(parse_exif_datetime("2023-01-18 10:20:30").is_some());
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("    ").is_none());
    }

    #[test]
    fn test_resolver_prefers_configured_order() {
        let resolver = ExifTimestampResolver::default();
        let metadata = metadata_with(&[
            ("DateTime", "2024:05:05 00:00:00"),
            ("DateTimeOriginal", "2023:01:18 10:00:00"),
        ]);
        let t = resolver.capture_time(&metadata).expect("timestamp");
        assert_eq!(t.year(), 2023);

        let metadata = metadata_with(&[
            ("DateTimeOriginal", "garbage"),
            ("DateTime", "2024:05:05 00:00:00"),
        ]);
        let t = resolver.capture_time(&metadata).expect("timestamp");
        assert_eq!(t.year(), 2024);
    }

    #[test]
    fn test_resolver_not_found_and_mtime_fallback() {
        let metadata = Metadata {
            modified: Some(SystemTime::now()),
            ..Default::default()
        };
        assert!(ExifTimestampResolver::default().capture_time(&metadata).is_none());

        let resolver = ExifTimestampResolver::new(vec!["DateTimeOriginal".to_string()], true);
        assert!(resolver.capture_time(&metadata).is_some());
    }

    #[test]
    fn test_exif_reader_extracts_datetime_original() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("IMG_0001.jpg");
        fs::write(&path, jpeg_with_exif_datetime("2023:01:18 10:00:00")).expect("write");

        let metadata = ExifMetadataReader.read(&path).expect("readable metadata");
        assert!(!metadata.has_errors());
        assert_eq!(metadata.tag("DateTimeOriginal"), Some("2023:01:18 10:00:00"));
        assert!(metadata.modified.is_some());

        let t = ExifTimestampResolver::default()
            .capture_time(&metadata)
            .expect("timestamp");
        assert_eq!((t.year(), t.month(), t.day()), (2023, 1, 18));
    }

    #[test]
    fn test_exif_reader_without_exif_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("plain.png");
        image::RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .expect("save png");

        let metadata = ExifMetadataReader.read(&path).expect("readable file");
        assert!(metadata.tags.is_empty());
        assert!(!metadata.has_errors());
        assert!(ExifTimestampResolver::default().capture_time(&metadata).is_none());
    }

    #[test]
    fn test_exif_reader_missing_file_is_an_error() {
        let result = ExifMetadataReader.read(Path::new("/non/existent/IMG.jpg"));
        assert!(matches!(result, Err(SortError::Io { .. })));
    }
}
