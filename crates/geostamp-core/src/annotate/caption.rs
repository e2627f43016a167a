//! Caption text: coordinate and timestamp formatting.

use chrono::{DateTime, FixedOffset, Local, Utc};

use crate::config::{AnnotationConfig, CoordinateFormat, CoordinateUnits, SignStyle};
use crate::types::Position;

/// The number of feet per meter.
pub const FEET_PER_METER: f64 = 3.2808399;

pub fn meters_to_feet(meters: f64) -> f64 {
    meters * FEET_PER_METER
}

/// How coordinates are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinateStyle {
    pub format: CoordinateFormat,
    pub units: CoordinateUnits,
    pub sign: SignStyle,
}

impl CoordinateStyle {
    pub fn from_config(config: &AnnotationConfig) -> Self {
        Self {
            format: config.coordinate_format,
            units: config.coordinate_units,
            sign: config.sign_style,
        }
    }
}

/// Latitude then longitude, separated by a space, e.g. `37.77490°N 122.41940°W`.
pub fn format_coordinates(position: &Position, style: CoordinateStyle) -> String {
    format!(
        "{} {}",
        format_latitude(position.latitude, style),
        format_longitude(position.longitude, style)
    )
}

pub fn format_latitude(latitude: f64, style: CoordinateStyle) -> String {
    with_sign(latitude, 'N', 'S', style)
}

pub fn format_longitude(longitude: f64, style: CoordinateStyle) -> String {
    with_sign(longitude, 'E', 'W', style)
}

fn with_sign(value: f64, positive: char, negative: char, style: CoordinateStyle) -> String {
    let is_negative = value < 0.0;
    let body = magnitude(value.abs(), style);
    match (style.sign, is_negative) {
        (SignStyle::Signed, true) => format!("-{body}"),
        (SignStyle::Signed, false) => body,
        (SignStyle::Hemisphere, true) => format!("{body}{negative}"),
        (SignStyle::Hemisphere, false) => format!("{body}{positive}"),
    }
}

fn magnitude(coord: f64, style: CoordinateStyle) -> String {
    match style.units {
        CoordinateUnits::Degrees => {
            let decimals = match style.format {
                CoordinateFormat::Short => 3,
                CoordinateFormat::Long => 5,
                CoordinateFormat::Detailed => 8,
            };
            format!("{coord:.decimals$}\u{00b0}")
        }
        CoordinateUnits::Minutes => {
            // Round in the smallest shown unit first so 59.99995′ carries
            // into the degrees instead of printing as 60′.
            let total = rounded(coord * 60.0, style.format);
            let degrees = (total / 60.0).floor();
            let minutes = total - degrees * 60.0;
            format!(
                "{}\u{00b0}{}\u{2032}",
                degrees as u32,
                fraction(minutes, style.format)
            )
        }
        CoordinateUnits::Seconds => {
            let total = rounded(coord * 3600.0, style.format);
            let degrees = (total / 3600.0).floor();
            let remainder = total - degrees * 3600.0;
            let minutes = (remainder / 60.0).floor();
            let seconds = remainder - minutes * 60.0;
            format!(
                "{}\u{00b0}{}\u{2032}{}\u{2033}",
                degrees as u32,
                minutes as u32,
                fraction(seconds, style.format)
            )
        }
    }
}

/// Decimal places shown on the minutes or seconds part.
fn fraction_decimals(format: CoordinateFormat) -> Option<usize> {
    match format {
        CoordinateFormat::Short => Some(2),
        CoordinateFormat::Long => Some(4),
        CoordinateFormat::Detailed => None,
    }
}

fn rounded(value: f64, format: CoordinateFormat) -> f64 {
    match fraction_decimals(format) {
        Some(decimals) => {
            let scale = 10f64.powi(decimals as i32);
            (value * scale).round() / scale
        }
        None => value,
    }
}

fn fraction(value: f64, format: CoordinateFormat) -> String {
    match fraction_decimals(format) {
        Some(decimals) => format!("{value:.decimals$}"),
        None => format!("{value}"),
    }
}

/// Formats position timestamps for the time caption.
#[derive(Debug, Clone)]
pub struct TimestampFormat {
    pattern: String,
    offset: Option<FixedOffset>,
}

impl TimestampFormat {
    pub fn from_config(config: &AnnotationConfig) -> Self {
        Self {
            pattern: config.datetime_format.clone(),
            offset: config
                .utc_offset_minutes
                .and_then(|minutes| FixedOffset::east_opt(minutes * 60)),
        }
    }

    /// Format a millisecond Unix timestamp. Falls back to RFC 3339 in UTC if
    /// the pattern cannot be rendered.
    pub fn format(&self, timestamp_ms: i64) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp_millis(timestamp_ms) else {
            return "Unknown time".to_string();
        };

        let mut out = String::new();
        let rendered = match self.offset {
            Some(offset) => {
                use std::fmt::Write;
                write!(out, "{}", utc.with_timezone(&offset).format(&self.pattern))
            }
            None => {
                use std::fmt::Write;
                write!(out, "{}", utc.with_timezone(&Local).format(&self.pattern))
            }
        };

        match rendered {
            Ok(()) => out,
            Err(_) => utc.to_rfc3339(),
        }
    }
}
