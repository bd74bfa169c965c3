//! Error types for picsort

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for picsort operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for picsort
#[derive(Error, Debug)]
pub enum Error {
    /// A metadata timestamp was present but could not be parsed
    #[error("Unresolvable date for {source_info}: {message}")]
    UnresolvableDate { source_info: String, message: String },

    /// A folder name looked like `IMG_<date>_<time>` but the date or time is invalid
    #[error("Bad date folder '{name}': {message}")]
    BadDateFolder { name: String, message: String },

    #[error("File hash computation failed for {path}: {message}")]
    HashComputation { path: PathBuf, message: String },

    #[error("Failed to {op} {path}: {source}")]
    Mutation {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file to delete is the very copy the library keeps
    #[error("Refusing to delete {path}: it is the retained library copy")]
    RetainedCopy { path: PathBuf },

    #[error("Written file {path} does not match its source")]
    VerifyFailed { path: PathBuf },

    #[error("No free variant name left for {path}")]
    VariantsExhausted { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to serialize report {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Build a mutation error that carries the offending path
    pub fn mutation(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Mutation {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            path: path.into(),
            source,
        }
    }

    /// True for errors that mean "this file has no usable capture date"
    pub fn is_unresolvable_date(&self) -> bool {
        matches!(
            self,
            Error::UnresolvableDate { .. } | Error::BadDateFolder { .. }
        )
    }
}
