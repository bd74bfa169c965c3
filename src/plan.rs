//! Destination planning: where a photo belongs in the library

use crate::config::VariantNaming;
use chrono::{Datelike, NaiveDateTime};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Folder prefix written by cameras for burst/session dumps
pub const CAMERA_DUMP_PREFIX: &str = "IMG_";

/// Highest variant number tried before giving up on a name collision
pub const MAX_VARIANT: u32 = 99;

/// Target directory and file name for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPlan {
    pub dir: PathBuf,
    pub file_name: OsString,
}

impl DestinationPlan {
    /// Full destination path
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    /// Path of the `n`th variant for a colliding name
    pub fn variant_path(&self, n: u32, naming: VariantNaming) -> PathBuf {
        self.dir.join(variant_name(&self.file_name, n, naming))
    }
}

/// Build the file name of the `n`th variant.
///
/// `Legacy` reproduces the historical `<base>_01.jpg<base>` layout so that
/// existing libraries keep matching; `Suffix` gives `<base>_01.jpg`.
pub fn variant_name(file_name: &OsStr, n: u32, naming: VariantNaming) -> OsString {
    let path = Path::new(file_name);
    let stem = path.file_stem().unwrap_or(file_name);
    let ext = path.extension();

    let mut name = OsString::from(stem);
    name.push(format!("_{:02}", n));
    if let Some(ext) = ext {
        name.push(".");
        name.push(ext);
    }
    if naming == VariantNaming::Legacy {
        name.push(stem);
    }
    name
}

/// Maps capture times onto the `<root>/<year>/<MM>/<day>` layout
#[derive(Debug, Clone)]
pub struct PathPlanner {
    root: PathBuf,
}

impl PathPlanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for a capture time; the day is deliberately not zero-padded
    pub fn day_dir(&self, timestamp: &NaiveDateTime) -> PathBuf {
        let mut dir = self.root.clone();
        dir.push(timestamp.year().to_string());
        dir.push(format!("{:02}", timestamp.month()));
        dir.push(timestamp.day().to_string());
        dir
    }

    /// Plan the destination for `source`, keeping camera dump folders as a subfolder
    pub fn plan(
        &self,
        timestamp: &NaiveDateTime,
        parent_dir_name: Option<&str>,
        file_name: &OsStr,
    ) -> DestinationPlan {
        let mut dir = self.day_dir(timestamp);
        if let Some(parent) = parent_dir_name
            && parent.starts_with(CAMERA_DUMP_PREFIX)
        {
            dir.push(parent);
        }

        DestinationPlan {
            dir,
            file_name: file_name.to_os_string(),
        }
    }
}
