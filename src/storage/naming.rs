// Artifact naming
//
// Video files are named `<trackingNumber>_<YYYYMMDD>_<HHMMSS>.<ext>` using
// the session's local start time. Tracking numbers may themselves contain
// underscores, so parsing always takes the last two segments as date and
// time.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::path::{Path, PathBuf};

use crate::recorder::error::SessionError;

/// `strftime` pattern of the timestamp part of a file stem
pub const STEM_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Human-readable timestamp used by query consumers
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FORBIDDEN_CHARS: [char; 9] = ['/', '\\', '<', '>', ':', '"', '|', '?', '*'];

/// Identity of a recording: tracking number plus start second
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub tracking_number: String,
    pub started_at: NaiveDateTime,
}

impl ArtifactKey {
    pub fn new(tracking_number: impl Into<String>, started_at: NaiveDateTime) -> Self {
        Self {
            tracking_number: tracking_number.into(),
            started_at: started_at.with_nanosecond(0).unwrap_or(started_at),
        }
    }

    pub fn from_local(tracking_number: impl Into<String>, started_at: DateTime<Local>) -> Self {
        Self::new(tracking_number, started_at.naive_local())
    }

    /// `ABC123_20250107_143000`
    pub fn stem(&self) -> String {
        format!(
            "{}_{}",
            self.tracking_number,
            self.started_at.format(STEM_TIMESTAMP_FORMAT)
        )
    }

    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem(), extension)
    }

    pub fn video_path(&self, dir: &Path, extension: &str) -> PathBuf {
        dir.join(self.file_name(extension))
    }

    /// `2025-01-07 14:30:00`
    pub fn timestamp_display(&self) -> String {
        self.started_at.format(DISPLAY_TIMESTAMP_FORMAT).to_string()
    }

    /// Parse a file name, with or without extension
    pub fn parse(file_name: &str) -> Option<Self> {
        Self::parse_stem(strip_extension(file_name))
    }

    pub fn parse_path(path: &Path) -> Option<Self> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(Self::parse)
    }

    /// Parse `<trackingNumber>_<YYYYMMDD>_<HHMMSS>`
    pub fn parse_stem(stem: &str) -> Option<Self> {
        let mut parts = stem.rsplitn(3, '_');
        let time = parts.next()?;
        let date = parts.next()?;
        let tracking_number = parts.next()?;

        if tracking_number.is_empty()
            || date.len() != 8
            || time.len() != 6
            || !date.bytes().all(|b| b.is_ascii_digit())
            || !time.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        let time = NaiveTime::parse_from_str(time, "%H%M%S").ok()?;
        Some(Self::new(tracking_number, date.and_time(time)))
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stem())
    }
}

/// Drop a trailing `.ext` if it looks like a file extension
fn strip_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            stem
        }
        _ => file_name,
    }
}

/// Check that a tracking number can be embedded in a file name
///
/// Returns the trimmed tracking number.
pub fn validate_tracking_number(raw: &str, min_len: usize) -> Result<String, SessionError> {
    let tracking_number = raw.trim();

    if tracking_number.is_empty() {
        return Err(SessionError::invalid_id("tracking number is empty"));
    }
    if tracking_number.chars().count() < min_len {
        return Err(SessionError::invalid_id(format!(
            "'{}' is shorter than {} characters",
            tracking_number, min_len
        )));
    }
    if let Some(c) = tracking_number
        .chars()
        .find(|c| c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(SessionError::invalid_id(format!(
            "'{}' contains forbidden character {:?}",
            tracking_number, c
        )));
    }
    if tracking_number.starts_with('.') {
        return Err(SessionError::invalid_id(format!(
            "'{}' must not start with '.'",
            tracking_number
        )));
    }

    Ok(tracking_number.to_string())
}
