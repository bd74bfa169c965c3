//! Configuration types for picsort

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How a colliding file with different content is named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VariantNaming {
    /// Historical layout: `<base>_01.jpg<base>`
    #[default]
    Legacy,
    /// Plain suffix before the extension: `<base>_01.jpg`
    Suffix,
}

/// What to do with a file whose capture date cannot be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BadDatePolicy {
    /// Report the file, leave it in place and continue with the next one
    #[default]
    Skip,
    /// Stop the whole run at the first such file
    Abort,
}

/// Configuration for a picsort run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory scanned recursively for photos
    pub source_dir: PathBuf,

    /// Root of the date-organized library
    pub target_dir: PathBuf,

    /// Directories to skip while scanning (absolute paths or folder names)
    pub exclude_dirs: Vec<PathBuf>,

    /// File extensions to pick up, matched case-sensitively
    pub extensions: Vec<String>,

    /// Naming scheme for same-name, different-content files
    pub variant_naming: VariantNaming,

    /// Policy for files with an unresolvable capture date
    pub on_bad_date: BadDatePolicy,

    /// Also parse the file's own name when its folder carries no date
    pub infer_from_file_name: bool,

    /// Copy the source modification time onto copied files
    pub preserve_mtime: bool,

    /// Dry run mode - report decisions without touching the filesystem
    pub dry_run: bool,

    /// Verbose output
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            target_dir: default_target_dir(),
            exclude_dirs: vec![],
            extensions: vec!["jpg".into()],
            variant_naming: VariantNaming::default(),
            on_bad_date: BadDatePolicy::default(),
            infer_from_file_name: false,
            preserve_mtime: true,
            dry_run: false,
            verbose: false,
        }
    }
}

/// Well-known library location: `<Pictures>/Sorted`
pub fn default_target_dir() -> PathBuf {
    dirs::picture_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Sorted")
}

impl Config {
    /// Check if a file extension is in scope (no case folding)
    pub fn is_supported(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }

    /// Reject layouts where the library and the scanned tree overlap dangerously
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("no file extensions configured".into()));
        }

        let source = absolute(&self.source_dir);
        let target = absolute(&self.target_dir);
        if source == target {
            return Err(ConfigError::Invalid(format!(
                "source and target are the same directory: {}",
                source.display()
            )));
        }
        if source.starts_with(&target) {
            return Err(ConfigError::Invalid(format!(
                "source {} is inside the target library {}",
                source.display(),
                target.display()
            )));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# picsort configuration file (TOML)

# Directory scanned recursively for photos
source_dir = "."

# Root of the library; photos land in <target_dir>/<year>/<MM>/<day>
target_dir = "/home/me/Pictures/Sorted"

# Folders to skip while scanning (absolute paths or folder names)
exclude_dirs = [".thumbnails"]

# Extensions to pick up; matching is case-sensitive
extensions = ["jpg"]

# Same name, different content: "legacy" (a_01.jpga) or "suffix" (a_01.jpg)
variant_naming = "legacy"

# Unparseable capture date: "skip" the file or "abort" the run
on_bad_date = "skip"

# Parse IMG_YYYYMMDD_HHMMSS from the file name when the folder has no date
infer_from_file_name = false

# Keep the source modification time on copied files
preserve_mtime = true

# Report what would happen without touching any file
dry_run = false

verbose = false
"#
        .to_string()
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Errors that can occur when loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
