//! Reverse geocoder trait and provider factory.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::GeocoderConfig;
use crate::error::PipelineError;
use crate::types::Address;

/// Resolves a coordinate to human-readable addresses.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (stages hold an `Arc<dyn Geocoder>`).
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Provider name for logging (e.g., "nominatim").
    fn name(&self) -> &str;

    /// Look up addresses near a coordinate, best match first.
    ///
    /// An empty list means the lookup worked but found nothing; only a
    /// failed lookup returns an error.
    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
    ) -> Result<Vec<Address>, PipelineError>;
}

/// A geocoder that never finds anything. Used when lookups are disabled.
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    fn name(&self) -> &str {
        "none"
    }

    async fn reverse(
        &self,
        _latitude: f64,
        _longitude: f64,
        _max_results: usize,
    ) -> Result<Vec<Address>, PipelineError> {
        Ok(Vec::new())
    }
}

/// Factory that creates the configured geocoder.
pub struct GeocoderFactory;

impl GeocoderFactory {
    /// Create a geocoder from the `[geocoder]` config section.
    pub fn create(config: &GeocoderConfig) -> Result<Arc<dyn Geocoder>, PipelineError> {
        match config.provider.as_str() {
            "nominatim" => Ok(Arc::new(super::nominatim::NominatimGeocoder::new(config)?)),
            "none" => Ok(Arc::new(DisabledGeocoder)),
            other => Err(PipelineError::Geocode {
                message: format!("Unknown geocoder provider: {other}"),
                status_code: None,
            }),
        }
    }
}
