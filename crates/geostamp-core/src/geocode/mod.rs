//! Reverse geocoding.
//!
//! - **provider**: the [`Geocoder`] trait, a disabled geocoder, and the factory
//! - **nominatim**: OpenStreetMap Nominatim client
//! - **retry**: fixed-backoff, interruptible retry loop

pub mod nominatim;
pub mod provider;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use nominatim::NominatimGeocoder;
pub use provider::{DisabledGeocoder, Geocoder, GeocoderFactory};
pub use retry::{is_retryable, lookup_with_retry, Lookup, RetryPolicy};
