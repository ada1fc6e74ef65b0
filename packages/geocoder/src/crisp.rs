//! Geocoding through a CRISP server's `/api/search` proxy.

use async_trait::async_trait;
use crisp_server_models::SearchResponse;

use crate::{Candidate, GeocodeError, Geocoder, check_status};

/// Geocoder that asks the CRISP server, which forwards to its configured
/// provider.
#[derive(Debug, Clone)]
pub struct CrispSearch {
    client: reqwest::Client,
    base_url: String,
}

impl CrispSearch {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for CrispSearch {
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
        let url = format!("{}/api/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await?;

        check_status(&resp)?;

        let body: SearchResponse = resp.json().await?;
        Ok(body
            .results
            .into_iter()
            .map(|r| Candidate {
                label: r.label,
                latitude: r.lat,
                longitude: r.lng,
            })
            .collect())
    }
}
