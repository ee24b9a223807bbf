//! Capture timestamps for source images.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use std::path::Path;
use tracing::{debug, trace};

/// Format used when a capture date stands in for the watermark text.
pub const CAPTURE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    Exif,
    FileModified,
    /// Neither EXIF nor the filesystem had a usable time; the value is the
    /// time of the lookup.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTime {
    pub at: NaiveDateTime,
    pub source: TimestampSource,
}

impl CaptureTime {
    pub fn date_label(&self) -> String {
        self.at.format(CAPTURE_DATE_FORMAT).to_string()
    }
}

/// Source of capture timestamps. Lookups never fail; implementations fall
/// back to whatever time they can find.
pub trait MetadataResolver: Send + Sync {
    fn capture_time(&self, path: &Path) -> CaptureTime;
}

/// Reads EXIF dates, falling back to the file modification time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifResolver;

impl MetadataResolver for ExifResolver {
    fn capture_time(&self, path: &Path) -> CaptureTime {
        if let Some(at) = exif_capture_time(path) {
            return CaptureTime {
                at,
                source: TimestampSource::Exif,
            };
        }

        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => {
                trace!("Using modification time for {}", path.display());
                CaptureTime {
                    at: DateTime::<Local>::from(modified).naive_local(),
                    source: TimestampSource::FileModified,
                }
            }
            Err(e) => {
                debug!("No timestamp available for {}: {}", path.display(), e);
                CaptureTime {
                    at: Local::now().naive_local(),
                    source: TimestampSource::Unknown,
                }
            }
        }
    }
}

fn exif_capture_time(path: &Path) -> Option<NaiveDateTime> {
    let exif = match rexif::parse_file(path) {
        Ok(exif) => exif,
        Err(e) => {
            trace!("No EXIF data for {}: {}", path.display(), e);
            return None;
        }
    };

    // Preferred order: when the shutter fired, when it was digitized, when
    // the file was last written by the camera
    let date_fields = [
        rexif::ExifTag::DateTimeOriginal,
        rexif::ExifTag::DateTimeDigitized,
        rexif::ExifTag::DateTime,
    ];

    date_fields.iter().find_map(|field| {
        let entry = exif.entries.iter().find(|e| e.tag == *field)?;
        let parsed = parse_exif_datetime(&entry.value_more_readable);
        if parsed.is_none() {
            trace!(
                "Unparseable {:?} '{}' in {}",
                field,
                entry.value_more_readable,
                path.display()
            );
        }
        parsed
    })
}

/// Parse the date strings cameras write. The EXIF form is
/// `2005:07:30 07:22:46`; a few common variants and bare dates are accepted.
pub fn parse_exif_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_matches('\0').trim();

    const DATETIME_FORMATS: [&str; 3] = ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];
    const DATE_FORMATS: [&str; 3] = ["%Y:%m:%d", "%Y-%m-%d", "%Y/%m/%d"];

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
