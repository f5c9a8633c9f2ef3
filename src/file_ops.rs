/// Filesystem mutations gated by the force flag.
///
/// With force enabled every operation goes straight to disk. Without it
/// (the default) nothing on disk changes: operations are recorded in an
/// in-memory shadow, and every query (`exists`, `list_dir`, ...) answers from
/// the shadow layered over the real tree. A dry run therefore sees the same
/// collisions and counts the same statistics as a forced run.
use crate::error::{SortError, SortResult};
use crate::stats::Statistics;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Planned state of a dry run.
#[derive(Debug, Default)]
struct Shadow {
    /// Planned file path -> real file providing its content.
    files: HashMap<PathBuf, PathBuf>,
    dirs: HashSet<PathBuf>,
    /// Real entries deleted or moved away.
    removed: HashSet<PathBuf>,
    /// Real directories renamed away; their whole subtree is invisible.
    hidden: HashSet<PathBuf>,
}

impl Shadow {
    fn is_hidden(&self, path: &Path) -> bool {
        path.ancestors().any(|a| self.hidden.contains(a))
    }

    fn real_visible(&self, path: &Path) -> bool {
        !self.removed.contains(path) && !self.is_hidden(path)
    }
}

/// The filesystem layer used by the sorter and the resolver.
#[derive(Debug)]
pub struct FileOps {
    force: bool,
    shadow: Shadow,
}

fn not_found(path: &Path) -> SortError {
    SortError::io(
        path,
        io::Error::new(io::ErrorKind::NotFound, "file does not exist"),
    )
}

impl FileOps {
    /// Creates the layer. Without `force` every mutation is only planned.
    ///
    /// # Example
    ///
    /// ```
    /// use photosort::FileOps;
    /// use std::path::Path;
    ///
    /// let mut fs = FileOps::new(false);
    /// fs.create_dir_all(Path::new("/nonexistent/planned"))?;
    /// assert!(fs.is_dir(Path::new("/nonexistent/planned")));
    /// assert!(!Path::new("/nonexistent/planned").exists());
    /// # Ok::<(), photosort::SortError>(())
    /// ```
    pub fn new(force: bool) -> Self {
        Self {
            force,
            shadow: Shadow::default(),
        }
    }

    /// Whether mutations are only recorded.
    pub fn is_dry_run(&self) -> bool {
        !self.force
    }

    /// Whether `path` exists, including planned entries and excluding
    /// planned removals.
    pub fn exists(&self, path: &Path) -> bool {
        if self.force {
            return path.exists();
        }
        if self.shadow.files.contains_key(path) || self.shadow.dirs.contains(path) {
            return true;
        }
        self.shadow.real_visible(path) && path.exists()
    }

    /// Whether `path` is a directory, as [`FileOps::exists`] sees it.
    pub fn is_dir(&self, path: &Path) -> bool {
        if self.force {
            return path.is_dir();
        }
        if self.shadow.dirs.contains(path) {
            return true;
        }
        if self.shadow.files.contains_key(path) {
            return false;
        }
        self.shadow.real_visible(path) && path.is_dir()
    }

    /// Real path holding the content of `path`.
    ///
    /// In a dry run a planned file is backed by the source it was copied or
    /// moved from.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.shadow
            .files
            .get(path)
            .cloned()
            .unwrap_or_else(|| path.to_path_buf())
    }

    /// Entries of a directory, sorted.
    pub fn list_dir(&self, dir: &Path) -> SortResult<Vec<PathBuf>> {
        if self.force {
            let mut entries = fs::read_dir(dir)
                .map_err(|e| SortError::io(dir, e))?
                .map(|entry| entry.map(|e| e.path()).map_err(|e| SortError::io(dir, e)))
                .collect::<SortResult<Vec<_>>>()?;
            entries.sort();
            return Ok(entries);
        }

        if !self.is_dir(dir) {
            return Err(not_found(dir));
        }

        let mut entries = BTreeSet::new();
        if self.shadow.real_visible(dir) && dir.is_dir() {
            for entry in fs::read_dir(dir).map_err(|e| SortError::io(dir, e))? {
                let path = entry.map_err(|e| SortError::io(dir, e))?.path();
                if self.shadow.real_visible(&path) {
                    entries.insert(path);
                }
            }
        }
        let planned = self
            .shadow
            .files
            .keys()
            .chain(self.shadow.dirs.iter())
            .filter(|p| p.parent() == Some(dir));
        entries.extend(planned.cloned());
        Ok(entries.into_iter().collect())
    }

    /// Creates `dir` and any missing parents.
    pub fn create_dir_all(&mut self, dir: &Path) -> SortResult<()> {
        if self.force {
            return fs::create_dir_all(dir).map_err(|e| SortError::io(dir, e));
        }
        let missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|a| !a.as_os_str().is_empty() && !self.exists(a))
            .map(Path::to_path_buf)
            .collect();
        for path in missing {
            self.shadow.removed.remove(&path);
            self.shadow.dirs.insert(path);
        }
        Ok(())
    }

    /// Copies a file; the destination must not exist.
    pub fn copy(&mut self, from: &Path, to: &Path, stats: &mut Statistics) -> SortResult<()> {
        self.ensure_free(to)?;
        if self.force {
            fs::copy(from, to).map_err(|e| SortError::io(from, e))?;
            log::debug!("Copied {} to {}", from.display(), to.display());
        } else {
            if !self.exists(from) {
                return Err(not_found(from));
            }
            let backing = self.resolve(from);
            self.shadow.removed.remove(to);
            self.shadow.files.insert(to.to_path_buf(), backing);
            log::info!("[DRY RUN] Would copy {} to {}", from.display(), to.display());
        }
        stats.images_copied += 1;
        Ok(())
    }

    /// Moves a file; the destination must not exist.
    ///
    /// Falls back to copy and delete when a rename is not possible, e.g.
    /// across filesystems.
    pub fn move_file(&mut self, from: &Path, to: &Path, stats: &mut Statistics) -> SortResult<()> {
        self.ensure_free(to)?;
        if self.force {
            if let Err(rename_err) = fs::rename(from, to) {
                log::debug!(
                    "Rename of {} failed ({}), copying instead",
                    from.display(),
                    rename_err
                );
                fs::copy(from, to).map_err(|e| SortError::io(from, e))?;
                fs::remove_file(from).map_err(|e| SortError::io(from, e))?;
            }
            log::debug!("Moved {} to {}", from.display(), to.display());
        } else {
            if !self.exists(from) {
                return Err(not_found(from));
            }
            let backing = self.resolve(from);
            self.shadow.files.remove(from);
            self.shadow.removed.insert(from.to_path_buf());
            self.shadow.removed.remove(to);
            self.shadow.files.insert(to.to_path_buf(), backing);
            log::info!("[DRY RUN] Would move {} to {}", from.display(), to.display());
        }
        stats.images_moved += 1;
        Ok(())
    }

    /// Deletes a file.
    ///
    /// # Errors
    ///
    /// Fails when the file does not exist or cannot be removed.
    pub fn delete(&mut self, path: &Path) -> SortResult<()> {
        if self.force {
            fs::remove_file(path).map_err(|e| SortError::io(path, e))?;
            log::debug!("Deleted {}", path.display());
        } else {
            if !self.exists(path) {
                return Err(not_found(path));
            }
            self.shadow.files.remove(path);
            self.shadow.removed.insert(path.to_path_buf());
            log::info!("[DRY RUN] Would delete {}", path.display());
        }
        Ok(())
    }

    /// Removes an empty directory.
    pub fn remove_dir(&mut self, dir: &Path) -> SortResult<()> {
        if self.force {
            fs::remove_dir(dir).map_err(|e| SortError::io(dir, e))?;
            log::debug!("Removed directory {}", dir.display());
        } else {
            if !self.list_dir(dir)?.is_empty() {
                return Err(SortError::io(
                    dir,
                    io::Error::new(io::ErrorKind::DirectoryNotEmpty, "directory not empty"),
                ));
            }
            self.shadow.dirs.remove(dir);
            self.shadow.removed.insert(dir.to_path_buf());
            log::info!("[DRY RUN] Would remove directory {}", dir.display());
        }
        Ok(())
    }

    /// Renames a directory; the destination must not exist.
    pub fn rename_dir(&mut self, from: &Path, to: &Path) -> SortResult<()> {
        self.ensure_free(to)?;
        if self.force {
            fs::rename(from, to).map_err(|e| SortError::io(from, e))?;
            log::debug!("Renamed {} to {}", from.display(), to.display());
            return Ok(());
        }

        let rebase = |p: &Path| to.join(p.strip_prefix(from).unwrap_or(p));
        self.shadow.files = std::mem::take(&mut self.shadow.files)
            .into_iter()
            .map(|(p, backing)| {
                if p.starts_with(from) {
                    (rebase(&p), backing)
                } else {
                    (p, backing)
                }
            })
            .collect();
        self.shadow.dirs = std::mem::take(&mut self.shadow.dirs)
            .into_iter()
            .map(|p| if p.starts_with(from) { rebase(&p) } else { p })
            .collect();
        self.shadow.dirs.insert(to.to_path_buf());
        self.shadow.hidden.insert(from.to_path_buf());
        log::info!("[DRY RUN] Would rename {} to {}", from.display(), to.display());
        Ok(())
    }

    /// Last write time of the real entry behind `path`.
    pub fn modified(&self, path: &Path) -> SortResult<SystemTime> {
        let real = self.resolve(path);
        fs::metadata(&real)
            .and_then(|m| m.modified())
            .map_err(|e| SortError::io(real, e))
    }

    fn ensure_free(&self, path: &Path) -> SortResult<()> {
        if self.exists(path) {
            return Err(SortError::io(
                path,
                io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
            ));
        }
        Ok(())
    }
}
