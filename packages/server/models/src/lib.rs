#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the CRISP incident server.
//!
//! These types are serialized to JSON for the REST API. They are shared by
//! the server handlers and by the HTTP clients on the map side so both ends
//! agree on one contract.

use chrono::{DateTime, Utc};
use crisp_incident_models::{CategoryDef, Incident, IncidentDetail, IncidentStatus};
use serde::{Deserialize, Serialize};

/// Query parameters for `GET /api/incidents`.
///
/// `type` may repeat (`?type=theft&type=noise`), which `serde_urlencoded`
/// cannot map onto a struct, so these are built from raw key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentQueryParams {
    /// Category ids to include. Empty means every type.
    pub types: Vec<String>,
    /// Status code to match, `None` for any status.
    pub status: Option<String>,
    /// Symbolic time window (`24hours`, `7days`, `30days`, `90days`).
    pub since: Option<String>,
}

impl IncidentQueryParams {
    /// Flattens the params into query-string pairs, one `type` entry per
    /// selected category, in selection order.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> =
            self.types.iter().map(|t| ("type", t.clone())).collect();
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        if let Some(since) = &self.since {
            pairs.push(("since", since.clone()));
        }
        pairs
    }

    /// Collects params from decoded query-string pairs. Unknown keys and
    /// empty values are ignored.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "type" => params.types.push(value),
                "status" => params.status = Some(value),
                "since" => params.since = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Response from `GET /api/incidents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentsResponse {
    /// Matching incidents, newest first.
    pub incidents: Vec<Incident>,
}

/// Response from `GET /api/incidents/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentResponse {
    /// The incident with its full detail and timeline.
    pub incident: IncidentDetail,
}

/// Response from `GET /api/stats/summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatsSummary {
    /// Every stored incident.
    pub total_incidents: u64,
    /// Incidents not yet resolved.
    pub active_alerts: u64,
    /// Incidents resolved since local midnight.
    pub resolved_today: u64,
    /// Average time to resolution, e.g. `"45 min"`. `None` until an
    /// incident has been resolved.
    pub response_time: Option<String>,
}

/// Query parameters for `GET /api/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchQueryParams {
    /// Free-text location query.
    pub query: Option<String>,
}

/// A geocoding candidate returned by `GET /api/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Formatted place name.
    pub label: String,
    /// Latitude, `null` when the provider returned something non-numeric.
    pub lat: Option<f64>,
    /// Longitude, `null` when the provider returned something non-numeric.
    pub lng: Option<f64>,
}

/// Response from `GET /api/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Candidates in provider order; only the first is normally used.
    pub results: Vec<SearchResult>,
}

/// Body of `PATCH /api/admin/reports`.
///
/// Both fields are optional at the type level so a missing field can be
/// answered with a 400 carrying a useful message.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdateRequest {
    /// Incident id.
    pub id: Option<String>,
    /// New status code.
    pub status: Option<IncidentStatus>,
}

/// The fields touched by a status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    /// Incident id.
    pub id: String,
    /// Status after the update.
    pub status: IncidentStatus,
    /// Set to the update time when resolved, cleared otherwise.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Response from `PATCH /api/admin/reports`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    /// The updated fields.
    pub updated: StatusUpdate,
}

/// A category entry returned by `GET /api/categories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCategory {
    /// Lower-case id used in `type` filters.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Hex color.
    pub color: String,
}

impl From<&CategoryDef> for ApiCategory {
    fn from(def: &CategoryDef) -> Self {
        Self {
            id: def.id.to_string(),
            label: def.label.to_string(),
            color: def.color.to_string(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

/// Error body shared by all failing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_types_emit_no_type_pairs() {
        let params = IncidentQueryParams {
            types: Vec::new(),
            status: None,
            since: Some("7days".to_string()),
        };
        assert_eq!(params.to_pairs(), vec![("since", "7days".to_string())]);
    }

    #[test]
    fn repeated_types_keep_selection_order() {
        let params = IncidentQueryParams {
            types: vec!["theft".to_string(), "noise".to_string()],
            status: Some("RESOLVED".to_string()),
            since: None,
        };
        assert_eq!(
            params.to_pairs(),
            vec![
                ("type", "theft".to_string()),
                ("type", "noise".to_string()),
                ("status", "RESOLVED".to_string()),
            ]
        );
    }

    #[test]
    fn from_pairs_inverts_to_pairs() {
        let params = IncidentQueryParams {
            types: vec!["theft".to_string(), "noise".to_string()],
            status: Some("RECEIVED".to_string()),
            since: Some("24hours".to_string()),
        };
        assert_eq!(IncidentQueryParams::from_pairs(params.to_pairs()), params);
    }

    #[test]
    fn from_pairs_skips_blank_and_unknown_keys() {
        let params = IncidentQueryParams::from_pairs([
            ("type", ""),
            ("page", "2"),
            ("status", "RECEIVED"),
        ]);
        assert!(params.types.is_empty());
        assert_eq!(params.status.as_deref(), Some("RECEIVED"));
    }

    #[test]
    fn status_update_request_allows_missing_fields() {
        let req: StatusUpdateRequest =
            serde_json::from_value(serde_json::json!({ "id": "abc" })).unwrap();
        assert_eq!(req.id.as_deref(), Some("abc"));
        assert!(req.status.is_none());
    }
}
