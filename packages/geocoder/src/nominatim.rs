//! Nominatim / OpenStreetMap geocoder client.
//!
//! Nominatim has strict rate limits on the public instance: **1 request
//! per second** maximum, and a descriptive `User-Agent` is required.
//! Location search is user-driven, one request per submission, so no
//! client-side throttling is done here.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use async_trait::async_trait;

use crate::{Candidate, GeocodeError, Geocoder, check_status, coordinate_value};

/// Free-form search against a Nominatim instance.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    limit: u32,
}

impl NominatimGeocoder {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, limit: u32) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            limit,
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
        let limit = self.limit.to_string();
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "jsonv2"), ("limit", limit.as_str())])
            .send()
            .await?;

        check_status(&resp)?;

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

/// Parses a Nominatim `jsonv2` response.
fn parse_response(body: &serde_json::Value) -> Result<Vec<Candidate>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    Ok(results
        .iter()
        .map(|r| Candidate {
            label: r["display_name"].as_str().unwrap_or_default().to_string(),
            latitude: coordinate_value(&r["lat"]),
            longitude: coordinate_value(&r["lon"]),
        })
        .collect())
}
