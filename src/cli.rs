//! Command-line interface for photosort.
//!
//! Parses arguments, loads the configuration, runs the sorter and prints
//! the summary. Without `--force` the run is a dry run: every decision is
//! made and counted, nothing on disk changes.

use crate::config::{Config, TransferMode};
use crate::context::Settings;
use crate::error::SortResult;
use crate::output::OutputFormatter;
use crate::report::RunReport;
use crate::sorter::{SortOutcome, Sorter};
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "photosort")]
#[command(version)]
#[command(about = "Sort photos and videos into date-based directories")]
#[command(long_about = "Moves photos, videos and their XMP sidecars from SOURCE into \
DESTINATION/<capture date>, using the EXIF capture time.

Files that cannot be placed end up under DESTINATION/ErrorFiles/<reason>. \
When a file with the same name already exists at the destination, both \
versions are kept side by side unless their content is identical, in which \
case the incoming copy is deleted.

Nothing is changed unless --force is given.")]
pub struct Cli {
    /// Directory to sort
    pub source: PathBuf,

    /// Root of the date-based tree
    pub destination: PathBuf,

    /// Actually change files (default is a dry run)
    #[arg(short, long)]
    pub force: bool,

    /// Copy into the destination instead of moving
    #[arg(long)]
    pub copy: bool,

    /// Configuration file (default: ./.photosortrc.toml, then ~/.config/photosort/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a JSON report of the run
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Increase verbosity (-v=INFO, -vv=DEBUG, -vvv=TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Settings for this invocation, with command-line flags applied over
    /// the loaded configuration.
    pub fn settings(&self) -> SortResult<Settings> {
        let mut config = Config::load(self.config.as_deref())?;
        if self.copy {
            config.sorting.transfer = TransferMode::Copy;
        }
        Ok(Settings::new(
            &self.source,
            &self.destination,
            self.force,
            config,
        ))
    }
}

/// Runs one sort as described by `cli` and prints the outcome.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use photosort::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["photosort", "/photos/inbox", "/photos/sorted"]);
/// match run_cli(&cli) {
///     Ok(outcome) => println!("{} error(s)", outcome.stats.errors),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(cli: &Cli) -> SortResult<SortOutcome> {
    let settings = cli.settings()?;

    if settings.force {
        OutputFormatter::info(&format!(
            "Sorting {} into {}",
            settings.source.display(),
            settings.destination.display()
        ));
    } else {
        OutputFormatter::dry_run_notice(&format!(
            "Planning sort of {} into {}",
            settings.source.display(),
            settings.destination.display()
        ));
    }

    let progress = OutputFormatter::create_progress_bar(0);
    let outcome = Sorter::new(settings)?.run(&progress)?;

    OutputFormatter::summary_table(&outcome.stats);
    OutputFormatter::error_summary(&outcome.errors, &outcome.resolution);

    if let Some(path) = &cli.report {
        RunReport::new(&cli.source, &cli.destination, &outcome).save(path)?;
        OutputFormatter::info(&format!("Report written to {}", path.display()));
    }

    if outcome.dry_run {
        println!();
        OutputFormatter::dry_run_notice("No files were modified. Run again with --force to apply.");
    } else if outcome.stats.errors == 0 {
        println!();
        OutputFormatter::success("Sorting complete");
    } else {
        println!();
        OutputFormatter::warning("Sorting complete with errors, see the summary above");
    }

    Ok(outcome)
}
