//! The sorting pass.
//!
//! Walks the source tree once, places every media file (and the sidecars
//! named after it) under its capture date, and records everything that could
//! not be placed. Afterwards the resolver quarantines or discards the
//! recorded files, and source directories left empty are removed bottom-up.

use crate::comparator::ContentComparator;
use crate::config::{CompiledFilters, TransferMode};
use crate::context::{Settings, SortContext};
use crate::error::{SortError, SortResult};
use crate::error_collection::{ErrorCollection, ErrorKind, ErrorRecord};
use crate::file_kind::{FileClassifier, FileKind};
use crate::metadata::{ExifMetadataReader, ExifTimestampResolver, MetadataReader, TimestampResolver};
use crate::resolver::{Resolution, Resolver};
use crate::stats::Statistics;
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct SortOutcome {
    pub stats: Statistics,
    pub errors: ErrorCollection,
    pub resolution: Resolution,
    pub dry_run: bool,
}

/// What happened to a file handed to `Sorter::place`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Placed,
    InPlace,
    Collided,
    Failed,
}

/// Files found in the source tree, grouped by role.
#[derive(Debug, Default)]
struct Inventory {
    media: Vec<PathBuf>,
    sidecars: Vec<PathBuf>,
}

/// One sorting run over a source tree.
///
/// Built from [`Settings`], consumed by [`Sorter::run`]. The metadata
/// reader and the timestamp resolver are swappable, which is how tests
/// drive a sort without real EXIF data.
pub struct Sorter {
    ctx: SortContext,
    classifier: FileClassifier,
    filters: CompiledFilters,
    reader: Box<dyn MetadataReader>,
    timestamps: Box<dyn TimestampResolver>,
    resolver: Resolver,
    errors: ErrorCollection,
}

impl Sorter {
    /// A sorter reading capture times from EXIF.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or a filter does not compile.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use indicatif::ProgressBar;
    /// use photosort::{Config, Settings, Sorter};
    ///
    /// let settings = Settings::new("/photos/inbox", "/photos/sorted", false, Config::default());
    /// let outcome = Sorter::new(settings)?.run(&ProgressBar::hidden())?;
    /// println!("{} file(s) moved", outcome.stats.images_moved);
    /// # Ok::<(), photosort::SortError>(())
    /// ```
    pub fn new(settings: Settings) -> SortResult<Self> {
        let timestamps = ExifTimestampResolver::from_config(&settings.config.sorting);
        Self::with_collaborators(settings, Box::new(ExifMetadataReader), Box::new(timestamps))
    }

    /// A sorter using the given metadata reader and timestamp resolver.
    ///
    /// # Arguments
    ///
    /// * `settings` - Source, destination, force flag and configuration
    /// * `reader` - Supplies the metadata of each media file
    /// * `timestamps` - Derives the capture time from that metadata
    pub fn with_collaborators(
        settings: Settings,
        reader: Box<dyn MetadataReader>,
        timestamps: Box<dyn TimestampResolver>,
    ) -> SortResult<Self> {
        settings.config.validate()?;
        let filters = settings.config.compile_filters()?;
        let classifier = FileClassifier::new(&settings.config.files);
        let comparator = ContentComparator::new(classifier.clone(), &settings.config.comparison);
        Ok(Self {
            ctx: SortContext::new(settings),
            classifier,
            filters,
            reader,
            timestamps,
            resolver: Resolver::new(comparator),
            errors: ErrorCollection::new(),
        })
    }

    /// Runs the whole pass: sort, resolve, clean up.
    ///
    /// Per-file problems never abort the run; they end up in the returned
    /// [`SortOutcome`]. Only an invalid source directory is fatal.
    ///
    /// # Arguments
    ///
    /// * `progress` - Advanced once per media file; its length is set after
    ///   the walk
    pub fn run(mut self, progress: &ProgressBar) -> SortResult<SortOutcome> {
        self.validate_source()?;

        let inventory = self.collect_files();
        self.ctx.stats.images_found = inventory.media.len();
        self.ctx.stats.xmps_found = inventory.sidecars.len();
        log::info!(
            "Found {} media file(s) and {} sidecar(s) in {}",
            inventory.media.len(),
            inventory.sidecars.len(),
            self.ctx.settings.source.display()
        );

        progress.set_length(inventory.media.len() as u64);
        let mut claimed = HashSet::new();
        for media in &inventory.media {
            let sidecars: Vec<PathBuf> = inventory
                .sidecars
                .iter()
                .filter(|s| !claimed.contains(*s) && self.classifier.is_sidecar_of(s, media))
                .cloned()
                .collect();
            claimed.extend(sidecars.iter().cloned());

            progress.set_message(
                media
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            self.sort_media(media, &sidecars);
            progress.inc(1);
        }
        progress.finish_and_clear();

        for orphan in inventory.sidecars.iter().filter(|s| !claimed.contains(*s)) {
            log::warn!("No media file for sidecar {}, leaving it in place", orphan.display());
        }

        self.ctx.stats.errors += self.errors.len();
        let resolution = self.resolver.resolve(&self.errors, &mut self.ctx);

        let source = self.ctx.settings.source.clone();
        self.remove_empty_dirs(&source);

        Ok(SortOutcome {
            stats: self.ctx.stats.snapshot(),
            dry_run: self.ctx.fs.is_dry_run(),
            errors: self.errors,
            resolution,
        })
    }

    fn validate_source(&self) -> SortResult<()> {
        let source = &self.ctx.settings.source;
        if !source.is_dir() {
            return Err(SortError::InvalidSource {
                path: source.clone(),
                reason: "not an existing directory".to_string(),
            });
        }
        Ok(())
    }

    fn collect_files(&mut self) -> Inventory {
        let settings = &self.ctx.settings;
        let mut inventory = Inventory::default();
        let walker = WalkDir::new(&settings.source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !settings.is_output_path(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry: {}", e);
                    self.ctx.stats.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&settings.source).unwrap_or(path);
            if !self.filters.should_include(relative) {
                log::debug!("Filtered out {}", path.display());
                continue;
            }

            match self.classifier.classify(path) {
                kind if kind.is_media() => inventory.media.push(path.to_path_buf()),
                FileKind::Sidecar => inventory.sidecars.push(path.to_path_buf()),
                _ => log::debug!("Ignoring {}", path.display()),
            }
        }
        inventory
    }

    /// Places one media file and its sidecars, or records why it cannot be
    /// placed. Sidecars share the fate of their media file.
    fn sort_media(&mut self, media: &Path, sidecars: &[PathBuf]) {
        let metadata = match self.reader.read(media) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::debug!("Unreadable metadata in {}: {}", media.display(), e);
                let cause = e.to_string();
                self.record_group(media, sidecars, |path| {
                    ErrorRecord::image_processing_failure(path, cause.clone())
                });
                return;
            }
        };

        if metadata.has_errors() {
            let diagnostics = metadata.diagnostics.clone();
            self.record_group(media, sidecars, |path| {
                ErrorRecord::metadata_error(path, diagnostics.clone())
            });
            return;
        }

        let Some(captured) = self.timestamps.capture_time(&metadata) else {
            self.record_group(media, sidecars, |path| ErrorRecord::no_time_found(path, Vec::new()));
            return;
        };

        let settings = &self.ctx.settings;
        let dest_dir = settings
            .destination
            .join(captured.format(&settings.config.sorting.date_format).to_string());

        if self.place(media, &dest_dir) == Placement::Collided {
            // The sidecars follow their media file into the quarantine.
            for sidecar in sidecars {
                if let Some(name) = sidecar.file_name() {
                    self.record(ErrorRecord::file_already_exists(dest_dir.join(name), sidecar));
                }
            }
            return;
        }
        for sidecar in sidecars {
            self.place(sidecar, &dest_dir);
        }
    }

    /// Moves or copies `file` into `dest_dir` under its own name.
    fn place(&mut self, file: &Path, dest_dir: &Path) -> Placement {
        let Some(file_name) = file.file_name() else {
            return Placement::Failed;
        };
        let target = dest_dir.join(file_name);
        if target == file {
            log::debug!("{} is already in place", file.display());
            return Placement::InPlace;
        }
        if self.ctx.fs.exists(&target) {
            self.record(ErrorRecord::file_already_exists(&target, file));
            return Placement::Collided;
        }

        match self.transfer(file, dest_dir, &target) {
            Ok(()) => Placement::Placed,
            Err(e) => {
                log::warn!("Could not place {}: {}", file.display(), e);
                self.ctx.stats.errors += 1;
                Placement::Failed
            }
        }
    }

    fn transfer(&mut self, file: &Path, dest_dir: &Path, target: &Path) -> SortResult<()> {
        let ctx = &mut self.ctx;
        ctx.fs.create_dir_all(dest_dir)?;
        match ctx.settings.config.sorting.transfer {
            TransferMode::Move => ctx.fs.move_file(file, target, &mut ctx.stats),
            TransferMode::Copy => ctx.fs.copy(file, target, &mut ctx.stats),
        }
    }

    fn record_group(
        &mut self,
        media: &Path,
        sidecars: &[PathBuf],
        make: impl Fn(&Path) -> ErrorRecord,
    ) {
        self.record(make(media));
        for sidecar in sidecars {
            self.record(make(sidecar));
        }
    }

    fn record(&mut self, record: ErrorRecord) {
        let kind: ErrorKind = record.kind();
        log::debug!("{}: {}", kind, record.file().display());
        if !self.errors.add(record) {
            log::debug!("Merged with an earlier record for the same file");
        }
    }

    /// Post-order removal of empty directories below `dir`. Returns whether
    /// `dir` itself is empty afterwards. `dir` itself is never removed here.
    fn remove_empty_dirs(&mut self, dir: &Path) -> bool {
        let entries = match self.ctx.fs.list_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not list {}: {}", dir.display(), e);
                return false;
            }
        };

        for child in entries {
            if !self.ctx.fs.is_dir(&child) || self.ctx.settings.is_output_path(&child) {
                continue;
            }
            self.ctx.stats.directories_found += 1;
            if self.remove_empty_dirs(&child) {
                match self.ctx.fs.remove_dir(&child) {
                    Ok(()) => self.ctx.stats.directories_deleted += 1,
                    Err(e) => log::warn!("Could not remove {}: {}", child.display(), e),
                }
            }
        }

        self.ctx
            .fs
            .list_dir(dir)
            .map(|entries| entries.is_empty())
            .unwrap_or(false)
    }
}
