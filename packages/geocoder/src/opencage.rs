//! `OpenCage` geocoding API client.
//!
//! See <https://opencagedata.com/api>

use async_trait::async_trait;

use crate::{Candidate, GeocodeError, Geocoder, check_status, coordinate_value};

/// Forward geocoding against the `OpenCage` API.
#[derive(Debug, Clone)]
pub struct OpenCageGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    limit: u32,
}

impl OpenCageGeocoder {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String, limit: u32) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            api_key,
            limit,
        }
    }
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
        let limit = self.limit.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("key", self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("no_annotations", "1"),
            ])
            .send()
            .await?;

        check_status(&resp)?;

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses an `OpenCage` JSON response.
fn parse_response(body: &serde_json::Value) -> Result<Vec<Candidate>, GeocodeError> {
    let results = body
        .get("results")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| GeocodeError::Parse {
            message: "OpenCage response missing 'results' array".to_string(),
        })?;

    Ok(results
        .iter()
        .map(|r| Candidate {
            label: r["formatted"].as_str().unwrap_or_default().to_string(),
            latitude: r.pointer("/geometry/lat").and_then(coordinate_value),
            longitude: r.pointer("/geometry/lng").and_then(coordinate_value),
        })
        .collect())
}
