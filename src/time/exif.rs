//! EXIF date field extraction for images

use crate::error::{Error, Result};
use exif::{Field, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, trace};

/// The two date fields the resolver cares about, as raw strings.
///
/// Both are expected in `YYYY:MM:DD HH:MM:SS` form when present; parsing is
/// left to the resolver so that a malformed value surfaces as an error there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFields {
    /// `EXIF DateTimeOriginal`
    pub original: Option<String>,
    /// `Image DateTime`
    pub datetime: Option<String>,
}

impl DateFields {
    pub fn is_empty(&self) -> bool {
        self.original.is_none() && self.datetime.is_none()
    }
}

/// Anything that can report the date fields of a file
pub trait MetadataSource {
    fn read_dates(&self, path: &Path) -> Result<DateFields>;
}

/// Reads date fields from the EXIF block of an image container
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifReader;

impl MetadataSource for ExifReader {
    fn read_dates(&self, path: &Path) -> Result<DateFields> {
        let file = File::open(path).map_err(|e| Error::read(path, e))?;
        let mut reader = BufReader::new(file);

        // A file without a readable EXIF container simply has no metadata
        let exif = match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(e) => {
                debug!(?path, error = %e, "No EXIF data available");
                return Ok(DateFields::default());
            }
        };

        let fields = DateFields {
            original: exif
                .get_field(Tag::DateTimeOriginal, In::PRIMARY)
                .and_then(ascii_value),
            datetime: exif.get_field(Tag::DateTime, In::PRIMARY).and_then(ascii_value),
        };
        trace!(?path, ?fields, "Read EXIF date fields");
        Ok(fields)
    }
}

/// Raw ASCII text of a field, without the display formatting kamadak-exif applies
fn ascii_value(field: &Field) -> Option<String> {
    match field.value {
        Value::Ascii(ref parts) => parts.first().map(|bytes| {
            String::from_utf8_lossy(bytes)
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string()
        }),
        _ => None,
    }
}
