//! Configuration loaded from TOML.
//!
//! Controls the destination layout, how files are transferred, the
//! comparator's tolerances, which extensions count as images, videos and
//! sidecars, and which files are filtered out of the walk.
//!
//! # Configuration File Format
//!
//! ```toml
//! [sorting]
//! date_format = "%Y/%m/%d"
//! transfer = "move"
//! quarantine_dir = "ErrorFiles"
//! timestamp_tags = ["DateTimeOriginal", "DateTimeDigitized", "DateTime"]
//! mtime_fallback = false
//!
//! [comparison]
//! pixel_threshold = 0.0001
//! memory_fraction = 0.25
//!
//! [files]
//! sidecar_extensions = ["xmp"]
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["**/@eaDir/**"]
//! extensions = ["tmp"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use chrono::format::{Item, StrftimeItems};
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".photosortrc.toml";

/// Errors that can occur during configuration loading and filter compilation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Whether sorted files leave the source tree or stay behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Move,
    Copy,
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sorting: SortingConfig,

    #[serde(default)]
    pub comparison: ComparisonConfig,

    #[serde(default)]
    pub files: FileTypes,

    #[serde(default)]
    pub filters: FilterRules,
}

/// Destination layout and placement behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortingConfig {
    /// chrono format string producing the relative destination directory.
    pub date_format: String,
    pub transfer: TransferMode,
    /// Name of the quarantine root created inside the destination.
    pub quarantine_dir: String,
    /// EXIF tags consulted for the capture time, in order of preference.
    pub timestamp_tags: Vec<String>,
    /// Use the file modification time when no tag carries a timestamp.
    pub mtime_fallback: bool,
}

impl Default for SortingConfig {
    fn default() -> Self {
        Self {
            date_format: "%Y/%m/%d".to_string(),
            transfer: TransferMode::Move,
            quarantine_dir: "ErrorFiles".to_string(),
            timestamp_tags: vec![
                "DateTimeOriginal".to_string(),
                "DateTimeDigitized".to_string(),
                "DateTime".to_string(),
            ],
            mtime_fallback: false,
        }
    }
}

/// Tolerances of the content comparator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Normalized mean absolute pixel difference below which two images are
    /// the same picture.
    pub pixel_threshold: f64,
    /// Share of the available memory the image decoder may allocate.
    pub memory_fraction: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: 0.0001,
            memory_fraction: 0.25,
        }
    }
}

/// Extension lists used to classify files. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTypes {
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub sidecar_extensions: Vec<String>,
}

impl Default for FileTypes {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            image_extensions: list(&[
                "jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp", "heic", "heif", "cr2",
                "cr3", "nef", "arw", "dng", "orf", "rw2", "raf",
            ]),
            video_extensions: list(&["mp4", "mov", "m4v", "avi", "mkv", "mts", "3gp"]),
            sidecar_extensions: list(&["xmp"]),
        }
    }
}

/// Rules deciding which files of the source tree are considered at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist, overrides every exclude rule.
    #[serde(default)]
    pub include: IncludeRules,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns matched against the path relative to the source root.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Config {
    /// Load configuration, falling back to defaults.
    ///
    /// Attempts, in order:
    /// 1. `config_path` if provided
    /// 2. `.photosortrc.toml` in the current directory
    /// 3. `~/.config/photosort/config.toml`
    /// 4. built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found (or explicitly given) but cannot
    /// be read or parsed, or if it carries out-of-range values.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("photosort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges, the quarantine directory name and the date
    /// format.
    ///
    /// Files are validated when loaded; a `Config` built in code is
    /// validated when a sorter is created from it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.comparison.pixel_threshold;
        if !(0.0..1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "comparison.pixel_threshold",
                reason: format!("{} is outside [0, 1)", threshold),
            });
        }
        let fraction = self.comparison.memory_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "comparison.memory_fraction",
                reason: format!("{} is outside (0, 1]", fraction),
            });
        }
        if self.sorting.quarantine_dir.is_empty()
            || self.sorting.quarantine_dir.contains(['/', '\\'])
        {
            return Err(ConfigError::InvalidValue {
                field: "sorting.quarantine_dir",
                reason: "must be a single non-empty directory name".to_string(),
            });
        }
        let date_format = &self.sorting.date_format;
        if date_format.trim().is_empty()
            || StrftimeItems::new(date_format).any(|item| matches!(item, Item::Error))
        {
            return Err(ConfigError::InvalidValue {
                field: "sorting.date_format",
                reason: format!("'{}' is not a valid strftime format", date_format),
            });
        }
        Ok(())
    }

    /// Compiles the filter rules into matchers.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Pre-compiled filter rules.
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Whether a file (path relative to the source root) takes part in sorting.
    ///
    /// Include patterns win; then hidden files, exact names, extensions,
    /// globs and regexes exclude, in that order.
    pub fn should_include(&self, relative_path: &Path) -> bool {
        let file_name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = relative_path.extension()
            && self
                .exclude_extensions
                .contains(&ext.to_string_lossy().to_lowercase())
        {
            return false;
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(relative_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
