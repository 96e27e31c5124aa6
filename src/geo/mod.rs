//! Geocoding — resolves free-form addresses to coordinates via Nominatim.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::GeoError;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-form address or place name to a coordinate, or
    /// `None` when the service finds nothing.
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>, GeoError>;
}

/// OpenStreetMap Nominatim geocoder.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl NominatimGeocoder {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "krishi-assist".to_string(),
        }
    }

    /// Point the geocoder at a different endpoint (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>, GeoError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| GeoError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::RequestFailed(format!("HTTP {status}")));
        }

        let results: Value = response
            .json()
            .await
            .map_err(|e| GeoError::InvalidResponse(e.to_string()))?;
        let Some(first) = results.get(0) else {
            debug!(query, "Nominatim returned no results");
            return Ok(None);
        };

        // Nominatim returns lat/lon as strings
        let parse_coord = |key: &str| -> Result<f64, GeoError> {
            first
                .get(key)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| GeoError::InvalidResponse(format!("missing or non-numeric {key}")))
        };

        Ok(Some(GeoPoint {
            latitude: parse_coord("lat")?,
            longitude: parse_coord("lon")?,
        }))
    }
}
