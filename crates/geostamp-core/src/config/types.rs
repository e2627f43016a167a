//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name, used in log lines
    pub name: String,

    /// Directory relative photo paths are resolved against
    pub session_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "geostamp".to_string(),
            session_dir: PathBuf::from("."),
        }
    }
}

/// Reverse geocoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Provider: "nominatim" or "none"
    pub provider: String,

    /// Base URL of the Nominatim-compatible service
    pub endpoint: String,

    /// User-Agent sent with every request (Nominatim's usage policy requires one)
    pub user_agent: String,

    /// Preferred response language (Accept-Language), if any
    pub language: Option<String>,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Fixed delay between retries of a failed lookup, in milliseconds
    pub retry_delay_ms: u64,

    /// Give up after this many failed attempts. Unset means retry until cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            provider: "nominatim".to_string(),
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: format!("geostamp/{}", env!("CARGO_PKG_VERSION")),
            language: None,
            timeout_ms: 15_000,
            retry_delay_ms: 10_000,
            max_attempts: None,
        }
    }
}

/// How a coordinate's sign is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignStyle {
    /// `37.77490°N 122.41940°W`
    #[default]
    Hemisphere,
    /// `37.77490° -122.41940°`
    Signed,
}

/// Decimal precision of rendered coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateFormat {
    /// 3 decimals (2 on the minutes/seconds part)
    Short,
    /// 5 decimals (4 on the minutes/seconds part)
    #[default]
    Long,
    /// 8 decimals (full precision on the minutes/seconds part)
    Detailed,
}

/// Units coordinates are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateUnits {
    /// Decimal degrees
    #[default]
    Degrees,
    /// Degrees and decimal minutes
    Minutes,
    /// Degrees, minutes and decimal seconds
    Seconds,
}

/// Annotation (overlay) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// JPEG quality of the rewritten image (1-100)
    pub jpeg_quality: u8,

    /// TrueType font for captions. Unset means probe common system fonts.
    pub font_path: Option<PathBuf>,

    /// Text size in pixels at the reference height
    pub font_size: f32,

    /// Caption box height in pixels at the reference height
    pub box_height: u32,

    /// Padding inside a caption box in pixels at the reference height
    pub box_padding: u32,

    /// Distance between caption boxes and the image edges at the reference height
    pub box_margin: u32,

    /// Image height the sizes above are tuned for. The first photo a stage
    /// sees scales them; the result is reused for the rest of the run.
    pub reference_height: u32,

    /// Scale factor applied to the photo before annotating (1.0 keeps size)
    pub output_scale: f32,

    /// strftime pattern for the timestamp caption
    pub datetime_format: String,

    /// Fixed UTC offset for the timestamp caption. Unset means local time.
    pub utc_offset_minutes: Option<i32>,

    /// Coordinate precision
    pub coordinate_format: CoordinateFormat,

    /// Coordinate units
    pub coordinate_units: CoordinateUnits,

    /// Coordinate sign rendering
    pub sign_style: SignStyle,

    /// Caption drawn when no address was found
    pub unknown_location_text: String,

    /// Caption box color, RGBA
    pub background_rgba: [u8; 4],

    /// Caption text color, RGBA
    pub text_rgba: [u8; 4],
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            font_path: None,
            font_size: 24.0,
            box_height: 32,
            box_padding: 4,
            box_margin: 16,
            reference_height: 768,
            output_scale: 1.0,
            datetime_format: "%B %-d, %Y %-I:%M:%S %p".to_string(),
            utc_offset_minutes: None,
            coordinate_format: CoordinateFormat::Long,
            coordinate_units: CoordinateUnits::Degrees,
            sign_style: SignStyle::Hemisphere,
            unknown_location_text: "Location unknown".to_string(),
            background_rgba: [0, 0, 0, 160],
            text_rgba: [255, 255, 255, 255],
        }
    }
}

/// Capture-side settings used by producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Image extensions picked up when scanning directories
    pub supported_formats: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "webp".to_string(),
            ],
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
