//! Position fixes from photo EXIF metadata.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::types::Position;

/// Reads the GPS fix a camera embedded in a photo.
pub struct ExifPosition;

impl ExifPosition {
    /// Extract the position from an image file.
    ///
    /// Returns `None` if the file cannot be read or has no GPS latitude and
    /// longitude. The timestamp comes from the GPS date/time when present,
    /// then `DateTimeOriginal`, then the file modification time.
    pub fn extract(path: &Path) -> Option<Position> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new().read_from_container(&mut reader).ok()?;

        let mut position = Self::from_exif(&exif)?;
        if position.timestamp_ms == 0 {
            position.timestamp_ms = modified_ms(path).unwrap_or(0);
        }
        Some(position)
    }

    /// Build a position from parsed EXIF fields. A missing timestamp is 0.
    pub fn from_exif(exif: &Exif) -> Option<Position> {
        let latitude = get_gps_coord(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef)?;
        let longitude = get_gps_coord(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef)?;
        let elevation_m = get_altitude(exif).unwrap_or(0.0);
        let timestamp_ms = get_gps_time(exif)
            .or_else(|| get_original_time(exif))
            .map(|t| t.timestamp_millis())
            .unwrap_or(0);

        Some(Position::new(latitude, longitude, elevation_m, timestamp_ms))
    }
}

fn modified_ms(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp_millis())
}

fn get_ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}

/// GPS coordinate, converted from degrees/minutes/seconds to signed decimal.
fn get_gps_coord(exif: &Exif, coord_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let coord = exif.get_field(coord_tag, In::PRIMARY)?;
    let degrees = parse_gps_rationals(&coord.value)?;
    let reference = get_ascii(exif, ref_tag).unwrap_or_default();

    let sign = if reference.starts_with('S') || reference.starts_with('W') {
        -1.0
    } else {
        1.0
    };
    Some(sign * degrees)
}

/// Degrees, minutes, seconds rationals to decimal degrees.
fn parse_gps_rationals(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(rationals) if rationals.len() >= 3 => {
            let degrees = rationals[0].to_f64();
            let minutes = rationals[1].to_f64();
            let seconds = rationals[2].to_f64();
            Some(degrees + minutes / 60.0 + seconds / 3600.0)
        }
        _ => None,
    }
}

/// Altitude in meters; a reference of 1 means below sea level.
fn get_altitude(exif: &Exif) -> Option<f64> {
    let altitude = match &exif.get_field(Tag::GPSAltitude, In::PRIMARY)?.value {
        Value::Rational(v) => v.first()?.to_f64(),
        _ => return None,
    };
    let below = exif
        .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        == Some(1);
    Some(if below { -altitude } else { altitude })
}

/// GPS date stamp plus time stamp, always UTC.
fn get_gps_time(exif: &Exif) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(&get_ascii(exif, Tag::GPSDateStamp)?, "%Y:%m:%d").ok()?;
    let hms = match &exif.get_field(Tag::GPSTimeStamp, In::PRIMARY)?.value {
        Value::Rational(v) if v.len() >= 3 => [v[0].to_f64(), v[1].to_f64(), v[2].to_f64()],
        _ => return None,
    };
    let millis = (hms[2].fract() * 1000.0).round() as u32;
    let time = NaiveTime::from_hms_milli_opt(hms[0] as u32, hms[1] as u32, hms[2] as u32, millis)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// `DateTimeOriginal`, using `OffsetTimeOriginal` when the camera wrote one
/// and UTC otherwise.
fn get_original_time(exif: &Exif) -> Option<DateTime<Utc>> {
    let text = get_ascii(exif, Tag::DateTimeOriginal)?;
    let naive = NaiveDateTime::parse_from_str(&text, "%Y:%m:%d %H:%M:%S").ok()?;

    let offset = get_ascii(exif, Tag::OffsetTimeOriginal).and_then(|s| parse_offset(&s));
    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|t| t.with_timezone(&Utc)),
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// Parse an EXIF offset such as `+02:00` or `-07:30`.
fn parse_offset(text: &str) -> Option<FixedOffset> {
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let seconds = hours.parse::<i32>().ok()? * 3600 + minutes.parse::<i32>().ok()? * 60;
    FixedOffset::east_opt(sign * seconds)
}
