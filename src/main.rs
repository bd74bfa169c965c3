//! picsort - file photos into a date-based library tree
//!
//! Walks a source tree, works out when each photo was taken and moves it
//! into `<target>/<year>/<MM>/<day>`, removing exact duplicates and keeping
//! same-named photos with different content as variants.

use anyhow::{Context, Result};
use clap::Parser;
use picsort::{Cli, Config, DecisionSink, Error, Placement, Processor, RunReport};
use std::path::Path;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// CLI Output Module
mod cli_output {
    //! Colored console lines for per-file decisions and the run summary

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use picsort::{Error, Placement, PlacementOutcome, ProcessingStats};
    use std::io::{stderr, stdout};
    use std::path::Path;

    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(format!("{}\n", "─".repeat(60))));
    }

    /// One line per file, printed before the file is touched
    pub fn print_decision(source: &Path, placement: &Placement, dry_run: bool) {
        let (icon, color) = match placement.outcome {
            PlacementOutcome::MovedNew => ("→", CliTheme::SUCCESS),
            PlacementOutcome::CopiedAsVariant => ("+", CliTheme::ACCENT),
            PlacementOutcome::RemovedAsDuplicate => ("≡", CliTheme::WARNING),
        };
        let prefix = if dry_run { "[test] " } else { "" };

        let _ = stdout().execute(Print(format!(
            "{}{} {} {} {}\n",
            style(prefix).with(CliTheme::HINT),
            style(icon).with(color).bold(),
            style(source.display()).italic(),
            style(placement.outcome.to_string()).with(color),
            style(placement.destination.display()).with(CliTheme::HINT),
        )));
    }

    pub fn print_skipped(source: &Path, error: &Error) {
        let _ = stderr().execute(Print(format!(
            "{} {} {}\n",
            style("⊘").with(CliTheme::WARNING).bold(),
            style(source.display()).italic(),
            style(error.to_string()).with(CliTheme::WARNING),
        )));
    }

    pub fn print_stat(key: &str, value: usize, color: Color) {
        let _ = stdout().execute(Print(format!(
            "  {}: {}\n",
            style(key).with(CliTheme::HINT),
            style(value.to_string()).with(color).bold(),
        )));
    }

    /// Nothing leaves the source in test mode, so say what would
    pub fn relocated_label(dry_run: bool) -> &'static str {
        if dry_run {
            "Would leave source"
        } else {
            "Gone from source"
        }
    }

    pub fn print_summary(stats: &ProcessingStats, relocated: usize, dry_run: bool) {
        print_separator();
        print_stat("Photos found", stats.total_files, CliTheme::ACCENT);
        print_stat("Moved", stats.moved, CliTheme::SUCCESS);
        print_stat("Copied as variant", stats.variants, CliTheme::ACCENT);
        print_stat("Duplicates removed", stats.duplicates, CliTheme::WARNING);
        print_stat("Skipped", stats.skipped, CliTheme::ERROR);
        print_stat(relocated_label(dry_run), relocated, CliTheme::HINT);
        if stats.processed() < stats.total_files {
            print_stat("Not reached", stats.total_files - stats.processed(), CliTheme::ERROR);
        }
        if dry_run {
            let _ = stdout().execute(Print(
                style("  Test mode: no files were changed\n").with(CliTheme::WARNING),
            ));
        }
        print_separator();
    }

    pub fn print_error(msg: &str) {
        let _ = stderr().execute(Print(format!(
            "{} {}\n",
            style("✗").with(CliTheme::ERROR).bold(),
            style(msg).with(CliTheme::ERROR),
        )));
    }
}

/// Prints every decision to the console
struct ConsoleSink;

impl DecisionSink for ConsoleSink {
    fn announce(&mut self, source: &Path, placement: &Placement, dry_run: bool) {
        cli_output::print_decision(source, placement, dry_run);
    }

    fn skipped(&mut self, source: &Path, error: &Error) {
        cli_output::print_skipped(source, error);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let guard = setup_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "picsort starting");

    let config = load_config(&cli)?;
    if config.verbose {
        info!(?config, "Configuration loaded");
    }
    config.validate()?;

    let mut report = RunReport::new(config.dry_run);
    let mut processor = Processor::new(config);
    let outcome = processor.run(&mut ConsoleSink, &mut report);

    cli_output::print_summary(&report.stats, report.relocated().count(), report.dry_run);

    if let Some(ref path) = cli.report {
        report
            .save(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(report = %path.display(), "Run report written");
    }

    if let Err(e) = outcome {
        error!(error = %e, "Processing failed");
        cli_output::print_error(&e.to_string());
        // Flush the log file before exiting
        drop(guard);
        std::process::exit(1);
    }

    Ok(())
}

/// Load configuration from file or CLI arguments
fn load_config(cli: &Cli) -> Result<Config> {
    let config = if let Some(ref config_path) = cli.config {
        info!(config_file = %config_path.display(), "Loading configuration from file");
        let file_config = Config::load_from_file(config_path)?;
        cli.merge_with_config(file_config)
    } else {
        cli.to_config()
    };

    Ok(config)
}

/// Setup logging (stderr, plus an optional log file)
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    let Some(ref log_path) = cli.log_file else {
        subscriber.init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .init();
    }

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::cli_output::relocated_label;

    #[test]
    fn test_dry_run_summary_does_not_claim_files_left() {
        assert_eq!(relocated_label(false), "Gone from source");
        assert_eq!(relocated_label(true), "Would leave source");
    }
}
