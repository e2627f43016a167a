//! Scripted geocoder for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::provider::Geocoder;
use crate::error::PipelineError;
use crate::types::Address;

enum Script {
    Answer(Option<Address>),
    FailTransient,
    FailPermanent,
    Hang,
}

/// A geocoder whose behaviour is fixed up front. Counts calls.
pub struct StubGeocoder {
    failures_first: usize,
    then: Script,
    calls: AtomicUsize,
}

impl StubGeocoder {
    fn new(failures_first: usize, then: Script) -> Self {
        Self {
            failures_first,
            then,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers with this address.
    pub fn returning(lines: &[&str]) -> Self {
        Self::new(0, Script::Answer(Some(Address::from_lines(lines.iter().copied()))))
    }

    /// Succeeds with zero results.
    pub fn empty() -> Self {
        Self::new(0, Script::Answer(None))
    }

    /// Fails transiently `failures` times, then answers.
    pub fn failing_then(failures: usize, lines: &[&str]) -> Self {
        Self::new(
            failures,
            Script::Answer(Some(Address::from_lines(lines.iter().copied()))),
        )
    }

    /// Every call is a transient (retryable) failure.
    pub fn always_failing() -> Self {
        Self::new(0, Script::FailTransient)
    }

    /// Every call is a permanent failure.
    pub fn rejecting() -> Self {
        Self::new(0, Script::FailPermanent)
    }

    /// Every call blocks forever.
    pub fn hanging() -> Self {
        Self::new(0, Script::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn transient() -> PipelineError {
    PipelineError::Geocode {
        message: "HTTP 503: service unavailable".to_string(),
        status_code: Some(503),
    }
}

#[async_trait]
impl Geocoder for StubGeocoder {
    fn name(&self) -> &str {
        "stub"
    }

    async fn reverse(
        &self,
        _latitude: f64,
        _longitude: f64,
        _max_results: usize,
    ) -> Result<Vec<Address>, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_first {
            return Err(transient());
        }
        match &self.then {
            Script::Answer(address) => Ok(address.iter().cloned().collect()),
            Script::FailTransient => Err(transient()),
            Script::FailPermanent => Err(PipelineError::Geocode {
                message: "HTTP 400: bad request".to_string(),
                status_code: Some(400),
            }),
            Script::Hang => std::future::pending().await,
        }
    }
}
