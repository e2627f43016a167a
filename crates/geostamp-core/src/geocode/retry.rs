//! Retry loop for reverse-geocode lookups.
//!
//! Transient failures are retried after a fixed backoff, by default until the
//! stage is interrupted. Interruption is honoured before each attempt, during
//! the call, and during the backoff sleep.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::provider::Geocoder;
use crate::config::GeocoderConfig;
use crate::error::PipelineError;
use crate::types::{Address, Position};

/// Outcome of a lookup with retries.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The service answered. The list may be empty.
    Resolved(Vec<Address>),
    /// A permanent error, or the attempt cap was reached
    GaveUp,
    /// Interrupted before an answer arrived
    Interrupted,
}

impl Lookup {
    /// The best address, if one was found.
    pub fn best(&self) -> Option<&Address> {
        match self {
            Lookup::Resolved(addresses) => addresses.first(),
            _ => None,
        }
    }
}

/// Determine whether a geocode error is worth retrying.
///
/// Retryable errors: timeouts, rate limits (429), server errors (5xx),
/// connection failures. Non-retryable: other HTTP errors, bad responses.
pub fn is_retryable(error: &PipelineError) -> bool {
    match error {
        PipelineError::Timeout { .. } => true,
        PipelineError::Geocode {
            status_code,
            message,
        } => {
            if let Some(code) = status_code {
                return *code == 429 || (500..=599).contains(code);
            }
            message.contains("timed out") || message.contains("connect")
        }
        _ => false,
    }
}

/// Fixed-interval retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn from_config(config: &GeocoderConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.retry_delay_ms),
            max_attempts: config.max_attempts,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GeocoderConfig::default())
    }
}

/// Look up the address for a position, retrying transient failures.
pub async fn lookup_with_retry(
    geocoder: &dyn Geocoder,
    position: &Position,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Lookup {
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Lookup::Interrupted;
        }
        attempts += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Lookup::Interrupted,
            result = geocoder.reverse(position.latitude, position.longitude, 1) => result,
        };

        match result {
            Ok(addresses) => {
                tracing::debug!(
                    geocoder = geocoder.name(),
                    attempts,
                    found = addresses.len(),
                    "Reverse geocode finished"
                );
                return Lookup::Resolved(addresses);
            }
            Err(e) if is_retryable(&e) => {
                if policy.exhausted(attempts) {
                    tracing::warn!(
                        geocoder = geocoder.name(),
                        attempts,
                        "Giving up on reverse geocode: {}",
                        e
                    );
                    return Lookup::GaveUp;
                }
                tracing::warn!(
                    geocoder = geocoder.name(),
                    attempts,
                    "Reverse geocode failed, retrying in {:?}: {}",
                    policy.delay,
                    e
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Lookup::Interrupted,
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
            Err(e) => {
                tracing::warn!(
                    geocoder = geocoder.name(),
                    "Reverse geocode failed permanently: {}",
                    e
                );
                return Lookup::GaveUp;
            }
        }
    }
}
