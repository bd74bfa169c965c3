//! Capture time resolution
//!
//! Each candidate file gets exactly one capture time, chosen in this order:
//! 1. EXIF `DateTimeOriginal`
//! 2. EXIF `Image DateTime`
//! 3. The containing directory name (`IMG_<date>_<time>`)
//! 4. Optionally the file stem, using the same name conventions
//! 5. The sentinel date `1995-01-01 01:00:00`
//!
//! A metadata value that is present but malformed is an error, not a
//! reason to fall through to the next source.

pub mod exif;
pub mod filename;

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

pub use self::exif::{DateFields, ExifReader, MetadataSource};
pub use self::filename::{CameraDumpPattern, FilenameInferer, NamePattern, sentinel};

/// EXIF timestamp layout
pub const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Source of the resolved timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeSource {
    /// EXIF `DateTimeOriginal`
    ExifOriginal,
    /// EXIF `Image DateTime`
    ExifDateTime,
    /// Parsed from the containing directory name
    FolderName,
    /// Parsed from the file's own name
    FileName,
    /// No date signal; sentinel bucket
    Sentinel,
}

/// Result of timestamp resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedTime {
    pub timestamp: NaiveDateTime,
    pub source: TimeSource,
}

impl ResolvedTime {
    fn new(timestamp: NaiveDateTime, source: TimeSource) -> Self {
        Self { timestamp, source }
    }
}

/// Parse an EXIF timestamp string, naming where it came from on failure
pub fn parse_exif_timestamp(value: &str, source_info: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), EXIF_FORMAT).map_err(|e| {
        Error::UnresolvableDate {
            source_info: source_info.to_string(),
            message: format!("'{}': {}", value, e),
        }
    })
}

/// Combines a metadata source with name-based inference
pub struct DateResolver<M> {
    metadata: M,
    names: FilenameInferer,
    infer_from_file_name: bool,
}

impl<M: MetadataSource> DateResolver<M> {
    pub fn new(metadata: M, names: FilenameInferer) -> Self {
        Self {
            metadata,
            names,
            infer_from_file_name: false,
        }
    }

    /// Also try the file stem when the directory name matches no convention
    pub fn infer_from_file_name(mut self, enabled: bool) -> Self {
        self.infer_from_file_name = enabled;
        self
    }

    /// Resolve the capture time for one file
    pub fn resolve(&self, path: &Path) -> Result<ResolvedTime> {
        let fields = self.metadata.read_dates(path)?;

        if let Some(ref value) = fields.original {
            let ts = parse_exif_timestamp(value, &format!("{} (DateTimeOriginal)", path.display()))?;
            debug!(?path, %ts, "Resolved time from DateTimeOriginal");
            return Ok(ResolvedTime::new(ts, TimeSource::ExifOriginal));
        }

        if let Some(ref value) = fields.datetime {
            let ts = parse_exif_timestamp(value, &format!("{} (DateTime)", path.display()))?;
            debug!(?path, %ts, "Resolved time from Image DateTime");
            return Ok(ResolvedTime::new(ts, TimeSource::ExifDateTime));
        }

        let folder = parent_dir_name(path).unwrap_or_default();
        if let Some(parsed) = self.names.try_infer(folder) {
            let ts = parsed?;
            debug!(?path, folder, %ts, "Resolved time from folder name");
            return Ok(ResolvedTime::new(ts, TimeSource::FolderName));
        }

        if self.infer_from_file_name
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            && let Some(parsed) = self.names.try_infer(stem)
        {
            let ts = parsed?;
            debug!(?path, %ts, "Resolved time from file name");
            return Ok(ResolvedTime::new(ts, TimeSource::FileName));
        }

        debug!(?path, "No date signal found, using sentinel date");
        Ok(ResolvedTime::new(sentinel(), TimeSource::Sentinel))
    }
}

/// Name of the directory immediately containing `path`
pub fn parent_dir_name(path: &Path) -> Option<&str> {
    path.parent()?.file_name()?.to_str()
}
