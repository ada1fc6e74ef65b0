#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident storage for the CRISP REST gateway.
//!
//! The server only needs a handful of operations (filtered listing, a
//! single-record lookup, and status updates), so storage sits behind the
//! [`IncidentStore`] trait. [`memory::MemoryStore`] is the implementation
//! used by the server binary; it is seeded from a JSON file.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crisp_incident_models::{Incident, IncidentDetail, IncidentStatus};
use crisp_server_models::{IncidentQueryParams, StatusUpdate};

pub use memory::MemoryStore;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the seed file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The seed file is not a JSON array of incidents.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No incident with the given id.
    #[error("Incident not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A filter value could not be understood.
    #[error("Invalid filter: {message}")]
    InvalidFilter {
        /// Description of the bad value.
        message: String,
    },
}

/// Storage operations used by the REST gateway.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Lists incidents matching `params`, newest first.
    ///
    /// `since` windows are resolved relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidFilter`] if `params.status` is not a
    /// known status code.
    async fn query(
        &self,
        params: &IncidentQueryParams,
        now: DateTime<Utc>,
    ) -> Result<Vec<Incident>, StoreError>;

    /// Every stored incident, in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    async fn all(&self) -> Result<Vec<Incident>, StoreError>;

    /// Looks up one incident with its detail and timeline.
    ///
    /// The timeline is returned newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing storage cannot be read.
    async fn get(&self, id: &str) -> Result<Option<IncidentDetail>, StoreError>;

    /// Moves an incident to `status`, maintaining `resolved_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if `id` is unknown.
    async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError>;
}

/// Length of a symbolic `since` window. Unknown tokens have none.
#[must_use]
pub fn since_window(token: &str) -> Option<Duration> {
    match token {
        "24hours" => Some(Duration::days(1)),
        "7days" => Some(Duration::days(7)),
        "30days" => Some(Duration::days(30)),
        "90days" => Some(Duration::days(90)),
        _ => None,
    }
}

/// A compiled form of [`IncidentQueryParams`].
#[derive(Debug, Clone)]
struct Predicate {
    types: Vec<String>,
    status: Option<IncidentStatus>,
    reported_after: Option<DateTime<Utc>>,
}

impl Predicate {
    fn compile(params: &IncidentQueryParams, now: DateTime<Utc>) -> Result<Self, StoreError> {
        let status = match params.status.as_deref() {
            None | Some("all") => None,
            Some(code) => Some(code.parse().map_err(|_| StoreError::InvalidFilter {
                message: format!("unknown status '{code}'"),
            })?),
        };

        let reported_after = params.since.as_deref().and_then(|token| {
            let window = since_window(token);
            if window.is_none() {
                log::debug!("Ignoring unknown since window '{token}'");
            }
            window.map(|w| now - w)
        });

        Ok(Self {
            types: params
                .types
                .iter()
                .map(|t| t.trim().to_lowercase())
                .collect(),
            status,
            reported_after,
        })
    }

    fn matches(&self, incident: &Incident) -> bool {
        if !self.types.is_empty() && !self.types.contains(&incident.category_key()) {
            return false;
        }
        if self.status.is_some_and(|s| s != incident.status) {
            return false;
        }
        self.reported_after
            .is_none_or(|after| incident.reported_at >= after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_since_tokens_have_windows() {
        assert_eq!(since_window("24hours"), Some(Duration::days(1)));
        assert_eq!(since_window("90days"), Some(Duration::days(90)));
        assert_eq!(since_window("custom"), None);
        assert_eq!(since_window("forever"), None);
    }

    #[test]
    fn all_status_is_no_restriction() {
        let params = IncidentQueryParams {
            status: Some("all".to_string()),
            ..IncidentQueryParams::default()
        };
        let predicate = Predicate::compile(&params, Utc::now()).unwrap();
        assert!(predicate.status.is_none());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let params = IncidentQueryParams {
            status: Some("CLOSED".to_string()),
            ..IncidentQueryParams::default()
        };
        assert!(matches!(
            Predicate::compile(&params, Utc::now()),
            Err(StoreError::InvalidFilter { .. })
        ));
    }
}
