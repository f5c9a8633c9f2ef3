//! Terminal output.
//!
//! Everything the user is meant to read goes through [`OutputFormatter`];
//! diagnostics go through `log`.

use crate::error_collection::{ErrorCollection, ErrorKind};
use crate::resolver::Resolution;
use crate::stats::Statistics;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Consistent styling for CLI messages, progress and the run summary.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use photosort::output::OutputFormatter;
    /// OutputFormatter::success("Sorting complete");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a bold section header preceded by a blank line.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Progress bar over the media files of a run. The length is set once
    /// the source tree has been walked.
    ///
    /// ```no_run
    /// use photosort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(0);
    /// pb.set_length(10);
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints the run counters as a two-column table.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use photosort::Statistics;
    /// use photosort::output::OutputFormatter;
    ///
    /// let stats = Statistics { images_found: 12, images_moved: 11, ..Statistics::default() };
    /// OutputFormatter::summary_table(&stats);
    /// ```
    pub fn summary_table(stats: &Statistics) {
        Self::header("SUMMARY");

        let rows = stats.rows();
        let width = rows
            .iter()
            .map(|(label, _)| label.len())
            .max()
            .unwrap_or(0)
            .max("Counter".len());

        println!("{:<width$} | {}", "Counter".bold(), "Count".bold(), width = width);
        println!("{}", "-".repeat(width + 10));
        for (label, count) in rows {
            let count = if label == "Errors" && count > 0 {
                count.to_string().red()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", label, count, width = width);
        }
        println!("{}", "-".repeat(width + 10));
    }

    /// Lists the recorded errors grouped by kind, then what the resolver
    /// did with them. Prints nothing when the run had no errors.
    ///
    /// # Arguments
    ///
    /// * `errors` - The records collected while sorting
    /// * `resolution` - What the resolver did with them
    pub fn error_summary(errors: &ErrorCollection, resolution: &Resolution) {
        if errors.is_empty() {
            return;
        }
        Self::header("UNSORTED FILES");
        for kind in ErrorKind::ALL {
            let records: Vec<_> = errors.of_kind(kind).collect();
            if records.is_empty() {
                continue;
            }
            println!("{} ({})", kind.name().yellow(), records.len());
            for record in records {
                match record.target() {
                    Some(target) => println!(
                        "  {} -> {}",
                        record.file().display(),
                        target.display()
                    ),
                    None => println!("  {}", record.file().display()),
                }
            }
        }

        println!();
        Self::plain(&format!(
            "{} quarantined, {} discarded as duplicates",
            resolution.quarantined.len(),
            resolution.discarded.len()
        ));
        for (old, new) in &resolution.renamed_aside {
            Self::info(&format!(
                "Previous quarantine {} moved to {}",
                old.display(),
                new.display()
            ));
        }
        if resolution.failures > 0 {
            Self::warning(&format!(
                "{} record(s) could not be resolved, see the log",
                resolution.failures
            ));
        }
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}
