//! Nominatim (OpenStreetMap) reverse geocoder.
//!
//! Calls `GET {endpoint}/reverse?format=jsonv2&lat=..&lon=..` and turns the
//! structured `address` object into two display lines: street, then
//! locality and region.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::provider::Geocoder;
use crate::config::GeocoderConfig;
use crate::error::PipelineError;
use crate::types::Address;

/// Reverse geocoder backed by a Nominatim-compatible HTTP service.
pub struct NominatimGeocoder {
    endpoint: String,
    language: Option<String>,
    timeout_ms: u64,
    client: reqwest::Client,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PipelineError::Geocode {
                message: format!("Failed to build HTTP client: {e}"),
                status_code: None,
            })?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            timeout_ms: config.timeout_ms,
            client,
        })
    }

    /// Map a transport failure. Timeouts and dropped connections are
    /// transient; only a malformed request is not.
    fn transport_error(&self, e: reqwest::Error) -> PipelineError {
        if e.is_timeout() {
            PipelineError::Timeout {
                stage: "geocode".to_string(),
                timeout_ms: self.timeout_ms,
            }
        } else if e.is_builder() {
            PipelineError::Geocode {
                message: format!("Invalid Nominatim request: {e}"),
                status_code: None,
            }
        } else {
            PipelineError::Geocode {
                message: format!("Nominatim connection failed: {e}"),
                status_code: None,
            }
        }
    }
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    address: Option<AddressParts>,
}

#[derive(Debug, Default, Deserialize)]
struct AddressParts {
    house_number: Option<String>,
    road: Option<String>,
    pedestrian: Option<String>,
    neighbourhood: Option<String>,
    suburb: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl AddressParts {
    fn street(&self) -> Option<String> {
        let road = self
            .road
            .as_deref()
            .or(self.pedestrian.as_deref())
            .or(self.neighbourhood.as_deref())
            .or(self.suburb.as_deref())?;
        Some(match self.house_number.as_deref() {
            Some(number) => format!("{number} {road}"),
            None => road.to_string(),
        })
    }

    fn locality(&self) -> Option<&str> {
        self.city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
            .or(self.hamlet.as_deref())
            .or(self.municipality.as_deref())
            .or(self.county.as_deref())
    }

    fn locality_line(&self) -> Option<String> {
        match (self.locality(), self.state.as_deref()) {
            (Some(locality), Some(state)) => Some(format!("{locality}, {state}")),
            (Some(locality), None) => Some(locality.to_string()),
            (None, Some(state)) => Some(state.to_string()),
            (None, None) => None,
        }
    }
}

/// Convert a reverse response into an address, or `None` if the service
/// found nothing at that coordinate.
fn address_from_response(response: ReverseResponse) -> Option<Address> {
    if response.error.is_some() {
        return None;
    }

    let parts = response.address.unwrap_or_default();
    let mut lines: Vec<String> = [parts.street(), parts.locality_line()]
        .into_iter()
        .flatten()
        .collect();

    // Fall back to the first two components of the display name.
    if lines.is_empty() {
        lines = response
            .display_name
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(2)
            .collect();
    }
    if lines.is_empty() {
        return None;
    }

    Some(Address {
        lines,
        thoroughfare: parts.road.clone(),
        locality: parts.locality().map(String::from),
        admin_area: parts.state.clone(),
        country: parts.country.clone(),
    })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn reverse(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
    ) -> Result<Vec<Address>, PipelineError> {
        let url = format!("{}/reverse", self.endpoint);
        let mut request = self.client.get(&url).query(&[
            ("format", "jsonv2".to_string()),
            ("lat", latitude.to_string()),
            ("lon", longitude.to_string()),
            ("addressdetails", "1".to_string()),
        ]);
        if let Some(language) = &self.language {
            request = request.header("accept-language", language);
        }

        let resp = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Geocode {
                message: format!("Nominatim HTTP {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }

        // Read the whole body first: a connection dropped mid-body is a
        // transport failure, only a complete but malformed body is not.
        let bytes = resp.bytes().await.map_err(|e| self.transport_error(e))?;
        let body: ReverseResponse =
            serde_json::from_slice(&bytes).map_err(|e| PipelineError::Geocode {
                message: format!("Failed to parse Nominatim response: {e}"),
                status_code: None,
            })?;

        Ok(address_from_response(body)
            .into_iter()
            .take(max_results)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::is_retryable;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port, then hang up.
    async fn serve_once(response: String) -> NominatimGeocoder {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });

        let config = GeocoderConfig {
            endpoint: format!("http://{addr}"),
            timeout_ms: 5_000,
            ..Default::default()
        };
        NominatimGeocoder::new(&config).unwrap()
    }

    fn ok_response(body: &str, content_length: usize) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {content_length}\r\nConnection: close\r\n\r\n{body}"
        )
    }

    fn parse(json: &str) -> Option<Address> {
        address_from_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_full_address() {
        let address = parse(
            r#"{
                "display_name": "123, Main St, Springfield, Sangamon County, Illinois, United States",
                "address": {
                    "house_number": "123",
                    "road": "Main St",
                    "city": "Springfield",
                    "county": "Sangamon County",
                    "state": "IL",
                    "country": "United States"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(address.lines, vec!["123 Main St", "Springfield, IL"]);
        assert_eq!(address.thoroughfare.as_deref(), Some("Main St"));
        assert_eq!(address.locality.as_deref(), Some("Springfield"));
        assert_eq!(address.country.as_deref(), Some("United States"));
    }

    #[test]
    fn test_rural_address_uses_village_and_road() {
        let address = parse(
            r#"{"address": {"road": "County Road 7", "village": "Elm", "state": "Kansas"}}"#,
        )
        .unwrap();
        assert_eq!(address.lines, vec!["County Road 7", "Elm, Kansas"]);
    }

    #[test]
    fn test_unable_to_geocode_is_empty_not_error() {
        assert!(parse(r#"{"error": "Unable to geocode"}"#).is_none());
    }

    #[test]
    fn test_display_name_fallback() {
        let address = parse(r#"{"display_name": "Atlantic Ocean, Somewhere, Far"}"#).unwrap();
        assert_eq!(address.lines, vec!["Atlantic Ocean", "Somewhere"]);
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = GeocoderConfig {
            endpoint: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        assert_eq!(geocoder.endpoint, "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_reverse_over_http() {
        let body = r#"{"address": {"road": "Main St", "city": "Springfield", "state": "IL"}}"#;
        let geocoder = serve_once(ok_response(body, body.len())).await;

        let addresses = geocoder.reverse(39.8, -89.6, 1).await.unwrap();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].lines, vec!["Main St", "Springfield, IL"]);
    }

    #[tokio::test]
    async fn test_truncated_body_is_retryable() {
        let geocoder = serve_once(ok_response(r#"{"address":"#, 500)).await;

        let err = geocoder.reverse(39.8, -89.6, 1).await.unwrap_err();
        assert!(is_retryable(&err), "{err}");
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retryable() {
        let body = "not json";
        let geocoder = serve_once(ok_response(body, body.len())).await;

        let err = geocoder.reverse(39.8, -89.6, 1).await.unwrap_err();
        assert!(err.to_string().contains("parse"), "{err}");
        assert!(!is_retryable(&err));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let geocoder = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let err = geocoder.reverse(39.8, -89.6, 1).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Geocode {
                status_code: Some(503),
                ..
            }
        ));
        assert!(is_retryable(&err));
    }
}
