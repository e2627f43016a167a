//! Configuration validation with range checks.

use chrono::format::{Item, StrftimeItems};

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.name must not be empty".into(),
            ));
        }
        if !matches!(self.geocoder.provider.as_str(), "nominatim" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "geocoder.provider must be \"nominatim\" or \"none\", got \"{}\"",
                self.geocoder.provider
            )));
        }
        if self.geocoder.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "geocoder.timeout_ms must be > 0".into(),
            ));
        }
        if self.geocoder.retry_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "geocoder.retry_delay_ms must be > 0".into(),
            ));
        }
        if self.geocoder.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "geocoder.max_attempts must be > 0 when set".into(),
            ));
        }
        if self.annotation.jpeg_quality == 0 || self.annotation.jpeg_quality > 100 {
            return Err(ConfigError::ValidationError(
                "annotation.jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.annotation.font_size <= 0.0 {
            return Err(ConfigError::ValidationError(
                "annotation.font_size must be > 0".into(),
            ));
        }
        if self.annotation.box_height == 0 {
            return Err(ConfigError::ValidationError(
                "annotation.box_height must be > 0".into(),
            ));
        }
        if self.annotation.reference_height == 0 {
            return Err(ConfigError::ValidationError(
                "annotation.reference_height must be > 0".into(),
            ));
        }
        if self.annotation.output_scale <= 0.0 || self.annotation.output_scale > 1.0 {
            return Err(ConfigError::ValidationError(
                "annotation.output_scale must be in (0.0, 1.0]".into(),
            ));
        }
        if StrftimeItems::new(&self.annotation.datetime_format)
            .any(|item| matches!(item, Item::Error))
        {
            return Err(ConfigError::ValidationError(format!(
                "annotation.datetime_format is not a valid strftime pattern: \"{}\"",
                self.annotation.datetime_format
            )));
        }
        if let Some(offset) = self.annotation.utc_offset_minutes {
            if offset.abs() >= 24 * 60 {
                return Err(ConfigError::ValidationError(
                    "annotation.utc_offset_minutes must be within +/- 1439".into(),
                ));
            }
        }
        Ok(())
    }
}
