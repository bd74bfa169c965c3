//! Capture-date inference from directory and file names
//!
//! Camera dumps land in folders named `IMG_<YYYYMMDD>_<HHMMSS>`. When a name
//! carries that pattern the date and time must both be valid; a name that
//! carries no known pattern at all falls into the sentinel bucket.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// Sentinel capture time for files whose date cannot be determined
pub fn sentinel() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1995, 1, 1)
        .and_then(|d| d.and_hms_opt(1, 0, 0))
        .unwrap_or_default()
}

/// One naming convention that may encode a capture time.
///
/// `None` means the name does not follow this convention at all;
/// `Some(Err(..))` means it does, but the encoded date is invalid.
pub trait NamePattern: Send + Sync {
    fn label(&self) -> &'static str;

    fn parse(&self, name: &str) -> Option<Result<NaiveDateTime>>;
}

/// `IMG_<YYYYMMDD>_<HHMMSS>` anywhere in the name
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraDumpPattern;

fn camera_dump_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"IMG_(\d{8})_(\d{6})").unwrap())
}

impl NamePattern for CameraDumpPattern {
    fn label(&self) -> &'static str {
        "IMG_YYYYMMDD_HHMMSS"
    }

    fn parse(&self, name: &str) -> Option<Result<NaiveDateTime>> {
        let caps = camera_dump_regex().captures(name)?;
        let (date, time) = (&caps[1], &caps[2]);

        let parsed = NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|e| bad_folder(name, format!("invalid date '{}': {}", date, e)))
            .and_then(|d| {
                NaiveTime::parse_from_str(time, "%H%M%S")
                    .map(|t| d.and_time(t))
                    .map_err(|e| bad_folder(name, format!("invalid time '{}': {}", time, e)))
            });
        Some(parsed)
    }
}

fn bad_folder(name: &str, message: String) -> Error {
    Error::BadDateFolder {
        name: name.to_string(),
        message,
    }
}

/// Ordered set of naming conventions; first convention that recognizes a name wins
pub struct FilenameInferer {
    patterns: Vec<Box<dyn NamePattern>>,
}

impl Default for FilenameInferer {
    fn default() -> Self {
        Self::new(vec![Box::new(CameraDumpPattern)])
    }
}

impl FilenameInferer {
    pub fn new(patterns: Vec<Box<dyn NamePattern>>) -> Self {
        Self { patterns }
    }

    /// Add a convention after the existing ones
    pub fn with_pattern(mut self, pattern: Box<dyn NamePattern>) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Try each convention without falling back to the sentinel
    pub fn try_infer(&self, name: &str) -> Option<Result<NaiveDateTime>> {
        self.patterns.iter().find_map(|pattern| {
            let parsed = pattern.parse(name)?;
            trace!(name, pattern = pattern.label(), "Matched name pattern");
            Some(parsed)
        })
    }

    /// Infer a capture time from a name, or return the sentinel when nothing matches
    pub fn infer(&self, name: &str) -> Result<NaiveDateTime> {
        self.try_infer(name).unwrap_or_else(|| Ok(sentinel()))
    }
}
