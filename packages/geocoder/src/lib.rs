#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Location search for the CRISP map.
//!
//! Resolves a free-text query to a `[longitude, latitude]` pair through one
//! of several providers configured via TOML files in `services/`:
//!
//! 1. **`OpenCage`** (priority 1), needs an API key in `OPENCAGE_KEY`.
//! 2. **Nominatim / OpenStreetMap** (priority 2), free, 1 req/sec on the
//!    public instance.
//!
//! Map clients that run against a CRISP server use [`crisp::CrispSearch`],
//! which goes through the server's `/api/search` proxy so provider keys
//! stay on the server.
//!
//! [`search::LocationSearch`] holds the active coordinate and turns
//! provider failures into user-facing notices without ever clearing it.

pub mod crisp;
pub mod nominatim;
pub mod opencage;
pub mod search;
pub mod service_registry;

use async_trait::async_trait;
use thiserror::Error;

/// A geocoding candidate as returned by a provider.
///
/// Coordinates are `None` when the provider sent something that is not a
/// number; validation happens in [`search::LocationSearch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Formatted place name.
    pub label: String,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status.
    #[error("Geocoder returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Provider needs an API key that is not configured.
    #[error("Missing API key: set {env_var}")]
    MissingApiKey {
        /// Environment variable expected to hold the key.
        env_var: String,
    },
}

/// A geocoding provider.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns candidates for `query` in provider ranking order.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the response is not
    /// in the expected shape.
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError>;
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for Box<G> {
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
        (**self).geocode(query).await
    }
}

#[async_trait]
impl<G: Geocoder + ?Sized> Geocoder for std::sync::Arc<G> {
    async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
        (**self).geocode(query).await
    }
}

/// Reads a coordinate that may be encoded as a JSON number or a numeric
/// string (Nominatim sends strings).
fn coordinate_value(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Maps 429 and other non-success statuses to errors.
fn check_status(resp: &reqwest::Response) -> Result<(), GeocodeError> {
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(GeocodeError::RateLimited);
    }
    if !status.is_success() {
        return Err(GeocodeError::Status {
            status: status.as_u16(),
        });
    }
    Ok(())
}
