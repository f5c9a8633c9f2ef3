//! Content comparison of two files competing for the same name.
//!
//! Sidecars and other non-image files are duplicates only when their SHA-256
//! digests match. Images are decoded and compared pixel by pixel, so the
//! same picture stored with a different encoding still counts as a
//! duplicate, while any visible difference does not.

use crate::config::ComparisonConfig;
use crate::error::{SortError, SortResult};
use crate::file_kind::{FileClassifier, FileKind};
use crate::stats::Statistics;
use image::{DynamicImage, ImageReader, Limits, RgbaImage};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Lower bound for the decoder allocation cap.
const MIN_DECODER_ALLOC: u64 = 64 * 1024 * 1024;
/// Used when the platform does not report available memory.
const FALLBACK_DECODER_ALLOC: u64 = 512 * 1024 * 1024;

/// Decides whether two files hold the same content.
#[derive(Debug, Clone)]
pub struct ContentComparator {
    classifier: FileClassifier,
    pixel_threshold: f64,
    max_alloc: u64,
}

impl ContentComparator {
    /// Creates a comparator whose decoder may use `memory_fraction` of the
    /// memory available right now.
    pub fn new(classifier: FileClassifier, config: &ComparisonConfig) -> Self {
        let max_alloc = decoder_memory_cap(config.memory_fraction);
        log::debug!("Image decoder allocation cap: {} bytes", max_alloc);
        Self::with_memory_cap(classifier, config.pixel_threshold, max_alloc)
    }

    /// Creates a comparator with an explicit decoder allocation cap.
    ///
    /// # Arguments
    ///
    /// * `classifier` - Decides whether a file is compared as an image
    /// * `pixel_threshold` - Mean absolute difference below which two images
    ///   count as the same
    /// * `max_alloc` - Upper bound, in bytes, for a single image decode
    pub fn with_memory_cap(classifier: FileClassifier, pixel_threshold: f64, max_alloc: u64) -> Self {
        Self {
            classifier,
            pixel_threshold,
            max_alloc,
        }
    }

    /// Whether `incoming` duplicates `original`.
    ///
    /// Failures are logged and answered with `false`, so nothing is ever
    /// discarded on a comparison error. A confirmed duplicate is counted as
    /// skipped, as a sidecar or as an image.
    pub fn are_duplicates(&self, original: &Path, incoming: &Path, stats: &mut Statistics) -> bool {
        let kind = self.classifier.classify(incoming);
        match self.compare(kind, original, incoming) {
            Ok(true) => {
                match kind {
                    FileKind::Sidecar => stats.xmps_skipped += 1,
                    FileKind::Image | FileKind::Video | FileKind::Other => stats.images_skipped += 1,
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::warn!(
                    "Could not compare {} with {}: {}",
                    incoming.display(),
                    original.display(),
                    e
                );
                false
            }
        }
    }

    /// Compares two files of the given kind.
    pub fn compare(&self, kind: FileKind, a: &Path, b: &Path) -> SortResult<bool> {
        match kind {
            FileKind::Image => self.images_match(a, b),
            FileKind::Sidecar | FileKind::Video | FileKind::Other => {
                Ok(file_digest(a)? == file_digest(b)?)
            }
        }
    }

    fn images_match(&self, a: &Path, b: &Path) -> SortResult<bool> {
        if file_digest(a)? == file_digest(b)? {
            return Ok(true);
        }

        let first = self.decode(a)?.into_rgba8();
        let second = self.decode(b)?.into_rgba8();
        if first.dimensions() != second.dimensions() {
            return Ok(false);
        }

        let distortion = mean_absolute_difference(&first, &second);
        log::debug!(
            "Distortion between {} and {}: {}",
            a.display(),
            b.display(),
            distortion
        );
        Ok(distortion < self.pixel_threshold)
    }

    fn decode(&self, path: &Path) -> SortResult<DynamicImage> {
        let mut reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| SortError::io(path, e))?;
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc);
        reader.limits(limits);
        reader.decode().map_err(|e| SortError::Image {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// SHA-256 of a file, read in chunks.
pub fn file_digest(path: &Path) -> SortResult<[u8; 32]> {
    let file = File::open(path).map_err(|e| SortError::io(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buffer).map_err(|e| SortError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().into())
}

/// Mean absolute channel difference of two equally sized images, in [0, 1].
pub fn mean_absolute_difference(a: &RgbaImage, b: &RgbaImage) -> f64 {
    let (a, b) = (a.as_raw(), b.as_raw());
    if a.is_empty() {
        return 0.0;
    }
    let total: u64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| u64::from(x.abs_diff(*y)))
        .sum();
    total as f64 / (a.len() as f64 * 255.0)
}

/// Share of the currently available memory the decoder may allocate.
pub fn decoder_memory_cap(fraction: f64) -> u64 {
    let system = System::new_with_specifics(
        RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
    );
    let available = system.available_memory();
    if available == 0 {
        return FALLBACK_DECODER_ALLOC;
    }
    ((available as f64 * fraction) as u64).max(MIN_DECODER_ALLOC)
}
