//! Reverse geocoding: coordinates to a printable address.
//!
//! Keyed by `GEOCODING_API_KEY`. Without a key no geocoder is built and
//! address enrichment is skipped; pages still render with raw coordinates.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, RideAlongError};
use crate::models::{Coordinates, Location};

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, at: Coordinates) -> Result<Option<String>>;
}

pub struct HttpGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
}

impl HttpGeocoder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build geocoding client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Result<Option<Arc<dyn Geocoder>>> {
        let Some(key) = config.runtime.geocoding_api_key.clone() else {
            debug!("GEOCODING_API_KEY not set, address enrichment disabled");
            return Ok(None);
        };
        let geocoder = Self::new(
            config.geocoding.base_url.clone(),
            key,
            Duration::from_millis(config.geocoding.timeout_ms),
        )?;
        Ok(Some(Arc::new(geocoder)))
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn reverse(&self, at: Coordinates) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("latlng", format!("{},{}", at.lat, at.lng)),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| RideAlongError::Geocoding {
                message: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(RideAlongError::Geocoding {
                message: format!("provider returned HTTP {}", response.status()),
            });
        }

        let body: GeocodeResponse = response.json().await.map_err(|e| RideAlongError::Geocoding {
            message: format!("unreadable response: {}", e),
        })?;

        match body.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") => {}
            Some(other) => {
                return Err(RideAlongError::Geocoding {
                    message: format!(
                        "provider status {}: {}",
                        other,
                        body.error_message.unwrap_or_default()
                    ),
                });
            }
        }

        Ok(body
            .results
            .into_iter()
            .find_map(|r| r.formatted_address.filter(|a| !a.trim().is_empty())))
    }
}

/// Fill in a missing address from coordinates. Lookup failures are logged and
/// leave the location untouched.
pub async fn enrich_location(geocoder: &dyn Geocoder, location: &mut Location) {
    if !location.needs_address() {
        return;
    }
    let Some(at) = location.coordinates else { return };
    match geocoder.reverse(at).await {
        Ok(Some(address)) => location.address = Some(address),
        Ok(None) => debug!(lat = at.lat, lng = at.lng, "no address for coordinates"),
        Err(e) => warn!(error = %e, "reverse geocoding failed"),
    }
}
