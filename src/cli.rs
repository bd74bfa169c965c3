//! CLI argument parsing with clap

use crate::config::{BadDatePolicy, Config, VariantNaming};
use clap::Parser;
use std::path::PathBuf;

/// picsort - file photos into a <year>/<MM>/<day> library
///
/// Dates come from EXIF (DateTimeOriginal, then DateTime), then from
/// IMG_<YYYYMMDD>_<HHMMSS> folder names, and finally fall back to the
/// 1995-01-01 bucket. Files whose content is already in the library are
/// removed; same-named files with different content are kept as variants.
#[derive(Parser, Debug, Default)]
#[command(name = "picsort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// CLI arguments override values from the file.
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Directory to scan for photos (default: current directory)
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Library root the photos are filed into
    #[arg(short, long, env = "PICSORT_TARGET")]
    pub target: Option<PathBuf>,

    /// Test mode: print every decision without touching any file
    #[arg(short = 'n', long = "test", visible_alias = "dry-run")]
    pub test: bool,

    /// Naming scheme for same-name files with different content
    #[arg(long, value_enum)]
    pub variant_naming: Option<VariantNaming>,

    /// What to do when a photo's date cannot be resolved
    #[arg(long, value_enum)]
    pub on_bad_date: Option<BadDatePolicy>,

    /// Parse IMG_<date>_<time> from file names when the folder has no date
    #[arg(long)]
    pub infer_from_file_name: bool,

    /// Write a JSON report of every decision to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Write the log file as JSON lines
    #[arg(long)]
    pub json_log: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        if let Some(ref source) = self.source {
            config.source_dir = source.clone();
        }
        if let Some(ref target) = self.target {
            config.target_dir = target.clone();
        }
        if let Some(naming) = self.variant_naming {
            config.variant_naming = naming;
        }
        if let Some(policy) = self.on_bad_date {
            config.on_bad_date = policy;
        }
        if self.infer_from_file_name {
            config.infer_from_file_name = true;
        }
        if self.test {
            config.dry_run = true;
        }
        if self.verbose {
            config.verbose = true;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}
