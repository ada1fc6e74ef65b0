//! Incident Query Gateway clients.
//!
//! The gateway is an external collaborator: it accepts query params and
//! returns matching incidents. [`HttpIncidentGateway`] talks to the CRISP
//! server's `GET /api/incidents`.

use std::time::Duration;

use async_trait::async_trait;
use crisp_incident_models::Incident;
use crisp_server_models::{IncidentQueryParams, IncidentsResponse};
use thiserror::Error;

/// Per-request timeout for incident fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from fetching incidents.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed or the body could not be decoded.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("Gateway returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Any other gateway-specific failure.
    #[error("Gateway error: {message}")]
    Other {
        /// Description of what went wrong.
        message: String,
    },
}

/// Source of incident records for a given query.
#[async_trait]
pub trait IncidentGateway: Send + Sync {
    /// Returns the incidents matching `query`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the gateway is unreachable or rejects the
    /// request.
    async fn fetch(&self, query: &IncidentQueryParams) -> Result<Vec<Incident>, GatewayError>;
}

#[async_trait]
impl<G: IncidentGateway + ?Sized> IncidentGateway for std::sync::Arc<G> {
    async fn fetch(&self, query: &IncidentQueryParams) -> Result<Vec<Incident>, GatewayError> {
        (**self).fetch(query).await
    }
}

/// Gateway backed by the CRISP server's REST API.
#[derive(Debug, Clone)]
pub struct HttpIncidentGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIncidentGateway {
    /// Creates a gateway for the server at `base_url` (e.g.
    /// `http://127.0.0.1:8080`).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Server base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IncidentGateway for HttpIncidentGateway {
    async fn fetch(&self, query: &IncidentQueryParams) -> Result<Vec<Incident>, GatewayError> {
        let url = format!("{}/api/incidents", self.base_url);
        let resp = self.client.get(&url).query(&query.to_pairs()).send().await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: IncidentsResponse = resp.json().await?;
        log::debug!("Fetched {} incidents from {url}", body.incidents.len());
        Ok(body.incidents)
    }
}
