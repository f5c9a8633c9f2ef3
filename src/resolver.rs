//! Collision and duplicate resolution.
//!
//! Runs once after the sorting pass over the frozen [`ErrorCollection`].
//! Each error kind gets its own quarantine directory
//! (`<destination>/ErrorFiles/<Kind>`); inside it every conflicting name gets
//! a subdirectory holding the original under its plain name and the other
//! contenders as `<name>_<n><ext>`. Confirmed duplicates are deleted instead.
//! Nothing is ever overwritten, and a failure on one record never stops the
//! others.

use crate::comparator::ContentComparator;
use crate::context::SortContext;
use crate::decomposition::{FileDecomposition, split_name};
use crate::error::SortResult;
use crate::error_collection::{ErrorCollection, ErrorKind, ErrorRecord};
use crate::file_ops::FileOps;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What the resolver did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Files copied into the quarantine, at their quarantine paths.
    pub quarantined: Vec<PathBuf>,
    /// Incoming files deleted as duplicates.
    pub discarded: Vec<PathBuf>,
    /// Quarantine directories renamed aside: (old, new).
    pub renamed_aside: Vec<(PathBuf, PathBuf)>,
    pub failures: usize,
}

/// Turns the error records of a sorting pass into quarantine copies and
/// duplicate deletions.
///
/// All filesystem access goes through the context's [`FileOps`], so a dry
/// run plans exactly what a forced run does.
pub struct Resolver {
    comparator: ContentComparator,
}

impl Resolver {
    /// Creates a resolver deciding duplicates with `comparator`.
    ///
    /// # Example
    ///
    /// ```
    /// use photosort::{ContentComparator, FileClassifier, Resolver};
    ///
    /// let comparator =
    ///     ContentComparator::with_memory_cap(FileClassifier::default(), 0.0001, 64 << 20);
    /// let resolver = Resolver::new(comparator);
    /// # let _ = resolver;
    /// ```
    pub fn new(comparator: ContentComparator) -> Self {
        Self { comparator }
    }

    /// Quarantines or discards every file recorded in `errors`.
    ///
    /// Kinds are handled in the order of [`ErrorKind::ALL`], records of one
    /// kind in discovery order. A record that cannot be resolved is logged,
    /// counted in `ctx.stats.errors` and in [`Resolution::failures`]; the
    /// remaining records are still processed.
    ///
    /// # Arguments
    ///
    /// * `errors` - The frozen collection of the sorting pass
    /// * `ctx` - Settings, filesystem layer and statistics of the run
    pub fn resolve(&self, errors: &ErrorCollection, ctx: &mut SortContext) -> Resolution {
        let mut resolution = Resolution::default();

        for kind in ErrorKind::ALL {
            let records: Vec<&ErrorRecord> = errors.of_kind(kind).collect();
            if records.is_empty() {
                continue;
            }
            log::info!("Resolving {} {} record(s)", records.len(), kind);

            let kind_dir = match prepare_quarantine(kind, ctx, &mut resolution) {
                Ok(dir) => dir,
                Err(e) => {
                    log::warn!("Could not prepare quarantine for {}: {}", kind, e);
                    ctx.stats.errors += 1;
                    resolution.failures += 1;
                    continue;
                }
            };

            // Targets already copied into this quarantine.
            let mut placed_targets = HashSet::new();
            for record in records {
                if let Err(e) =
                    self.resolve_record(record, &kind_dir, &mut placed_targets, ctx, &mut resolution)
                {
                    log::warn!(
                        "Could not resolve {} ({}): {}",
                        record.file().display(),
                        kind,
                        e
                    );
                    ctx.stats.errors += 1;
                    resolution.failures += 1;
                }
            }
        }

        resolution
    }

    fn resolve_record(
        &self,
        record: &ErrorRecord,
        kind_dir: &Path,
        placed_targets: &mut HashSet<PathBuf>,
        ctx: &mut SortContext,
        resolution: &mut Resolution,
    ) -> SortResult<()> {
        match record {
            ErrorRecord::FileAlreadyExists {
                target, incoming, ..
            } => self.resolve_collision(target, incoming, kind_dir, placed_targets, ctx, resolution),
            ErrorRecord::NoTimeFound { path, .. }
            | ErrorRecord::MetadataError { path, .. }
            | ErrorRecord::ImageProcessingFailure { path, .. } => {
                let placement = quarantine_slot(kind_dir, path, ctx)?;
                let dest = free_path(&ctx.fs, &placement, 0);
                ctx.fs.copy(path, &dest, &mut ctx.stats)?;
                resolution.quarantined.push(dest);
                Ok(())
            }
        }
    }

    fn resolve_collision(
        &self,
        target: &Path,
        incoming: &Path,
        kind_dir: &Path,
        placed_targets: &mut HashSet<PathBuf>,
        ctx: &mut SortContext,
        resolution: &mut Resolution,
    ) -> SortResult<()> {
        // A sidecar following its colliding media file may have no
        // counterpart at the destination.
        let target_exists = ctx.fs.exists(target);
        let original = ctx.fs.resolve(target);
        let contender = ctx.fs.resolve(incoming);
        if target_exists
            && self
                .comparator
                .are_duplicates(&original, &contender, &mut ctx.stats)
        {
            log::info!(
                "{} duplicates {}, discarding it",
                incoming.display(),
                target.display()
            );
            ctx.fs.delete(incoming)?;
            resolution.discarded.push(incoming.to_path_buf());
            return Ok(());
        }

        log::info!(
            "{} collides with {}, quarantining both",
            incoming.display(),
            target.display()
        );
        let placement = quarantine_slot(kind_dir, target, ctx)?;

        if target_exists && !placed_targets.contains(target) {
            let dest = free_path(&ctx.fs, &placement, 0);
            ctx.fs.copy(target, &dest, &mut ctx.stats)?;
            placed_targets.insert(target.to_path_buf());
            resolution.quarantined.push(dest);
        }

        // The plain name belongs to the target; contenders start at `_1`.
        let siblings = count_with_extension(&ctx.fs, &placement.directory, &placement.extension)?;
        let dest = free_path(&ctx.fs, &placement, siblings.max(1));
        ctx.fs.copy(incoming, &dest, &mut ctx.stats)?;
        resolution.quarantined.push(dest);
        Ok(())
    }
}

/// Renames an existing quarantine for `kind` aside and creates a fresh one.
fn prepare_quarantine(
    kind: ErrorKind,
    ctx: &mut SortContext,
    resolution: &mut Resolution,
) -> SortResult<PathBuf> {
    let kind_dir = ctx.settings.quarantine_root().join(kind.name());
    if ctx.fs.exists(&kind_dir) {
        let aside = rename_aside_path(&ctx.fs, &kind_dir, kind);
        log::info!(
            "Moving previous quarantine {} aside to {}",
            kind_dir.display(),
            aside.display()
        );
        ctx.fs.rename_dir(&kind_dir, &aside)?;
        resolution.renamed_aside.push((kind_dir.clone(), aside));
    }
    ctx.fs.create_dir_all(&kind_dir)?;
    Ok(kind_dir)
}

/// `<Kind>_<YYYYmmdd_HHMMSS>` from the directory's last write time, with a
/// counter appended while the name is taken.
fn rename_aside_path(fs: &FileOps, kind_dir: &Path, kind: ErrorKind) -> PathBuf {
    let written: DateTime<Local> = fs
        .modified(kind_dir)
        .map(DateTime::from)
        .unwrap_or_else(|_| Local::now());
    let stem = format!("{}_{}", kind.name(), written.format("%Y%m%d_%H%M%S"));
    let parent = kind_dir.parent().unwrap_or(kind_dir);

    let mut candidate = parent.join(&stem);
    let mut n = 1;
    while fs.exists(&candidate) {
        candidate = parent.join(format!("{}_{}", stem, n));
        n += 1;
    }
    candidate
}

/// Decomposition of `file` inside its own `<kind_dir>/<base_name>`
/// subdirectory, which is created on demand.
fn quarantine_slot(kind_dir: &Path, file: &Path, ctx: &mut SortContext) -> SortResult<FileDecomposition> {
    let decomposition = FileDecomposition::at(kind_dir, file);
    let subdir = kind_dir.join(&decomposition.base_name);
    ctx.fs.create_dir_all(&subdir)?;
    Ok(decomposition.relocate(&subdir))
}

/// First free `<base>_<n><ext>` starting at `start` (0 is the plain name).
fn free_path(fs: &FileOps, placement: &FileDecomposition, start: usize) -> PathBuf {
    let mut n = start;
    loop {
        let candidate = placement
            .directory
            .join(placement.file_name_with_suffix(n));
        if !fs.exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Number of entries in `dir` whose compound extension equals `extension`.
fn count_with_extension(fs: &FileOps, dir: &Path, extension: &str) -> SortResult<usize> {
    Ok(fs
        .list_dir(dir)?
        .iter()
        .filter_map(|p| p.file_name())
        .filter(|name| split_name(&name.to_string_lossy()).1 == extension)
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::Settings;
    use crate::file_kind::FileClassifier;
    use crate::stats::Statistics;
    use image::{Rgba, RgbaImage};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                temp_dir: TempDir::new().expect("Failed to create temp directory"),
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.temp_dir.path().join(rel)
        }

        fn image(&self, rel: &str, shade: u8) -> PathBuf {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
            RgbaImage::from_pixel(16, 16, Rgba([shade, shade, shade, 255]))
                .save(&path)
                .expect("save image");
            path
        }

        fn text(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.path(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
            fs::write(&path, content).expect("write");
            path
        }

        fn context(&self, force: bool) -> SortContext {
            SortContext::new(Settings::new(
                self.path("src"),
                self.path("dst"),
                force,
                Config::default(),
            ))
        }

        fn quarantine(&self, rel: &str) -> PathBuf {
            self.path("dst/ErrorFiles").join(rel)
        }
    }

    fn resolver() -> Resolver {
        Resolver::new(ContentComparator::with_memory_cap(
            FileClassifier::default(),
            0.0001,
            64 * 1024 * 1024,
        ))
    }

    #[test]
    fn test_true_collision_keeps_both() {
        let f = Fixture::new();
        let target = f.image("dst/2023/01/18/1.png", 10);
        let incoming = f.image("src/B/1.png", 200);
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists(&target, &incoming));

        let mut ctx = f.context(true);
        let resolution = resolver().resolve(&errors, &mut ctx);

        let kept = f.quarantine("FileAlreadyExists/1/1.png");
        let other = f.quarantine("FileAlreadyExists/1/1_1.png");
        assert_eq!(resolution.quarantined, vec![kept.clone(), other.clone()]);
        assert_eq!(fs::read(&kept).expect("read"), fs::read(&target).expect("read"));
        assert_eq!(fs::read(&other).expect("read"), fs::read(&incoming).expect("read"));
        assert!(target.exists());
        assert!(incoming.exists());
        assert_eq!(ctx.stats.images_copied, 2);
        assert_eq!(ctx.stats.images_skipped, 0);
    }

    #[test]
    fn test_duplicate_deletes_incoming_only() {
        let f = Fixture::new();
        let target = f.image("dst/2023/01/18/1.png", 10);
        let incoming = f.image("src/B/1.png", 10);
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists(&target, &incoming));

        let mut ctx = f.context(true);
        let resolution = resolver().resolve(&errors, &mut ctx);

        assert!(target.exists());
        assert!(!incoming.exists());
        assert_eq!(resolution.discarded, vec![incoming]);
        assert!(resolution.quarantined.is_empty());
        assert!(!f.quarantine("FileAlreadyExists/1").exists());
        assert_eq!(ctx.stats.images_skipped, 1);
    }

    #[test]
    fn test_many_contenders_get_sequential_suffixes() {
        let f = Fixture::new();
        let target = f.image("dst/2023/01/18/1.png", 10);
        let mut errors = ErrorCollection::new();
        for (dir, shade) in [("A", 50), ("B", 100), ("C", 150)] {
            let incoming = f.image(&format!("src/{}/1.png", dir), shade);
            errors.add(ErrorRecord::file_already_exists(&target, &incoming));
        }

        let mut ctx = f.context(true);
        resolver().resolve(&errors, &mut ctx);

        for name in ["1.png", "1_1.png", "1_2.png", "1_3.png"] {
            assert!(f.quarantine(&format!("FileAlreadyExists/1/{}", name)).exists());
        }
        // The original target is copied once only.
        assert_eq!(ctx.stats.images_copied, 4);
    }

    #[test]
    fn test_sidecar_and_image_share_subdirectory() {
        let f = Fixture::new();
        let target = f.image("dst/2023/01/18/1.png", 10);
        let incoming = f.image("src/B/1.png", 90);
        let target_xmp = f.text("dst/2023/01/18/1.png.xmp", "<a/>");
        let incoming_xmp = f.text("src/B/1.png.xmp", "<b/>");
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists(&target, &incoming));
        errors.add(ErrorRecord::file_already_exists(&target_xmp, &incoming_xmp));

        let mut ctx = f.context(true);
        resolver().resolve(&errors, &mut ctx);

        for name in ["1.png", "1_1.png", "1.png.xmp", "1_1.png.xmp"] {
            assert!(f.quarantine(&format!("FileAlreadyExists/1/{}", name)).exists());
        }
    }

    #[test]
    fn test_sidecar_without_counterpart_is_quarantined_as_contender() {
        let f = Fixture::new();
        let target = f.image("dst/2023/01/18/1.png", 10);
        let incoming = f.image("src/B/1.png", 90);
        let incoming_xmp = f.text("src/B/1.png.xmp", "<b/>");
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists(&target, &incoming));
        errors.add(ErrorRecord::file_already_exists(
            f.path("dst/2023/01/18/1.png.xmp"),
            &incoming_xmp,
        ));

        let mut ctx = f.context(true);
        let resolution = resolver().resolve(&errors, &mut ctx);

        assert_eq!(resolution.failures, 0);
        assert_eq!(
            fs::read_to_string(f.quarantine("FileAlreadyExists/1/1_1.png.xmp")).expect("read"),
            "<b/>"
        );
        assert!(!f.quarantine("FileAlreadyExists/1/1.png.xmp").exists());
        assert!(incoming_xmp.exists());
        assert_eq!(ctx.stats.xmps_skipped, 0);
    }

    #[test]
    fn test_same_name_from_different_targets_never_overwrites() {
        let f = Fixture::new();
        let first_target = f.image("dst/2023/01/18/1.png", 10);
        let second_target = f.image("dst/2023/02/01/1.png", 20);
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists(
            &first_target,
            f.image("src/A/1.png", 30),
        ));
        errors.add(ErrorRecord::file_already_exists(
            &second_target,
            f.image("src/B/1.png", 40),
        ));

        let mut ctx = f.context(true);
        let resolution = resolver().resolve(&errors, &mut ctx);

        assert_eq!(resolution.quarantined.len(), 4);
        let unique: HashSet<_> = resolution.quarantined.iter().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(
            fs::read(f.quarantine("FileAlreadyExists/1/1.png")).expect("read"),
            fs::read(&first_target).expect("read")
        );
    }

    #[test]
    fn test_missing_metadata_is_always_quarantined() {
        let f = Fixture::new();
        let no_time = f.image("src/A/2.png", 10);
        let broken = f.text("src/A/3.jpg", "garbage");
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::no_time_found(&no_time, vec![]));
        errors.add(ErrorRecord::metadata_error(&broken, vec!["bad IFD".to_string()]));

        let mut ctx = f.context(true);
        resolver().resolve(&errors, &mut ctx);

        assert!(f.quarantine("NoTimeFound/2/2.png").exists());
        assert!(f.quarantine("MetadataError/3/3.jpg").exists());
        assert!(no_time.exists());
        assert!(!f.quarantine("FileAlreadyExists").exists());
        assert!(!f.quarantine("ImageProcessingFailure").exists());
    }

    #[test]
    fn test_failure_does_not_stop_resolution() {
        let f = Fixture::new();
        let present = f.image("src/A/2.png", 10);
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::no_time_found(f.path("src/A/missing.png"), vec![]));
        errors.add(ErrorRecord::no_time_found(&present, vec![]));

        let mut ctx = f.context(true);
        let resolution = resolver().resolve(&errors, &mut ctx);

        assert_eq!(resolution.failures, 1);
        assert_eq!(ctx.stats.errors, 1);
        assert!(f.quarantine("NoTimeFound/2/2.png").exists());
    }

    #[test]
    fn test_second_run_renames_previous_quarantine_aside() {
        let f = Fixture::new();
        let target = f.image("dst/2023/01/18/1.png", 10);
        let incoming = f.image("src/B/1.png", 200);
        let mut errors = ErrorCollection::new();
        errors.add(ErrorRecord::file_already_exists(&target, &incoming));

        let mut ctx = f.context(true);
        resolver().resolve(&errors, &mut ctx);
        let resolution = resolver().resolve(&errors, &mut ctx);

        assert_eq!(resolution.renamed_aside.len(), 1);
        let (old, aside) = &resolution.renamed_aside[0];
        assert_eq!(old, &f.quarantine("FileAlreadyExists"));
        assert!(
            aside
                .file_name()
                .expect("name")
                .to_string_lossy()
                .starts_with("FileAlreadyExists_")
        );
        assert!(aside.join("1/1.png").exists());
        assert!(aside.join("1/1_1.png").exists());
        assert!(f.quarantine("FileAlreadyExists/1/1.png").exists());
        assert!(f.quarantine("FileAlreadyExists/1/1_1.png").exists());
        assert!(!f.quarantine("FileAlreadyExists/1/1_2.png").exists());
    }

    #[test]
    fn test_dry_run_matches_forced_run_without_touching_disk() {
        let build = |f: &Fixture| {
            let target = f.image("dst/2023/01/18/1.png", 10);
            let mut errors = ErrorCollection::new();
            errors.add(ErrorRecord::file_already_exists(&target, f.image("src/A/1.png", 10)));
            errors.add(ErrorRecord::file_already_exists(&target, f.image("src/B/1.png", 99)));
            errors.add(ErrorRecord::no_time_found(f.image("src/C/4.png", 1), vec![]));
            errors
        };

        let forced = Fixture::new();
        let mut forced_ctx = forced.context(true);
        let forced_resolution = resolver().resolve(&build(&forced), &mut forced_ctx);

        let dry = Fixture::new();
        let errors = build(&dry);
        let mut dry_ctx = dry.context(false);
        let dry_resolution = resolver().resolve(&errors, &mut dry_ctx);

        assert_eq!(dry_ctx.stats, forced_ctx.stats);
        assert_eq!(dry_resolution.quarantined.len(), forced_resolution.quarantined.len());
        assert_eq!(dry_resolution.discarded.len(), 1);
        assert!(!dry.path("dst/ErrorFiles").exists());
        assert!(dry.path("src/A/1.png").exists());
        let expected = Statistics {
            images_copied: 3,
            images_skipped: 1,
            ..Default::default()
        };
        assert_eq!(dry_ctx.stats, expected);
    }
}
