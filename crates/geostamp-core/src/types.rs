//! Core value types shared across the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A geographic position fix captured together with a photo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in decimal degrees (positive north)
    #[serde(alias = "lat")]
    pub latitude: f64,

    /// Longitude in decimal degrees (positive east)
    #[serde(alias = "lon")]
    pub longitude: f64,

    /// Elevation above sea level in meters
    #[serde(default, alias = "elevation")]
    pub elevation_m: f64,

    /// Fix time as milliseconds since the Unix epoch
    #[serde(alias = "timestamp")]
    pub timestamp_ms: i64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, elevation_m: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            elevation_m,
            timestamp_ms,
        }
    }

    /// The fix time as a UTC instant, if the millisecond value is representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// A reverse-geocoded address.
///
/// `lines` holds the human-readable address lines in reading order, e.g.
/// `["123 Main St", "Springfield, IL"]`. The structured fields are kept when
/// the provider reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub lines: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thoroughfare: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_area: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Address {
    /// Build an address from display lines only.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Get one address line by index, skipping blank lines.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .nth(index)
    }
}

/// Session-scoped settings handed to every stage when a pipeline starts.
///
/// A session corresponds to one capture run: the directory the photos of
/// this run are written to, and when the run began.
#[derive(Debug, Clone)]
pub struct Session {
    /// Directory relative file locations are resolved against
    pub directory: PathBuf,

    /// When this session started
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            started_at: Utc::now(),
        }
    }

    /// Resolve a file location against the session directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, location: &Path) -> PathBuf {
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.directory.join(location)
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(".")
    }
}
