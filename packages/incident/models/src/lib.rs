#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident record types, statuses, and the incident category taxonomy.
//!
//! These are the shapes shared by the store, the REST gateway, and every
//! consumer on the map page. Categories are static configuration: the
//! taxonomy never changes at runtime, only the counts derived from it do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Lifecycle status of an incident report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// Report received, nobody has looked at it yet
    Received,
    /// A moderator or agency is working the report
    UnderInvestigation,
    /// Closed out
    Resolved,
}

impl IncidentStatus {
    /// Human-readable label shown in badges.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Received => "Received",
            Self::UnderInvestigation => "Under Investigation",
            Self::Resolved => "Resolved",
        }
    }

    /// Badge color for this status.
    #[must_use]
    pub const fn color(self) -> &'static str {
        match self {
            Self::Received => "#e74c3c",
            Self::UnderInvestigation => "#f1c40f",
            Self::Resolved => "#27ae60",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Received, Self::UnderInvestigation, Self::Resolved]
    }
}

/// A `[longitude, latitude]` pair in WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinate {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    /// Whether both components are finite and within WGS84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        Self::new(longitude, latitude)
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(c: Coordinate) -> Self {
        [c.longitude, c.latitude]
    }
}

/// A single incident report as consumed by the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Opaque unique identifier.
    pub id: String,
    /// Free-form category label (e.g. "theft").
    #[serde(rename = "type")]
    pub incident_type: String,
    /// Current lifecycle status.
    pub status: IncidentStatus,
    /// Human-readable location.
    #[serde(default)]
    pub location: String,
    /// Latitude (WGS84). `NaN` when the record has no usable geometry.
    #[serde(deserialize_with = "nan_if_null")]
    pub latitude: f64,
    /// Longitude (WGS84). `NaN` when the record has no usable geometry.
    #[serde(deserialize_with = "nan_if_null")]
    pub longitude: f64,
    /// When the report was created.
    pub reported_at: DateTime<Utc>,
    /// When the report was last resolved. Only set while `status` is
    /// [`IncidentStatus::Resolved`].
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    /// Returns the coordinate if both components are finite.
    #[must_use]
    pub fn coordinate(&self) -> Option<Coordinate> {
        (self.latitude.is_finite() && self.longitude.is_finite())
            .then(|| Coordinate::new(self.longitude, self.latitude))
    }

    /// Lower-cased type, the key used to match against [`CategoryDef::id`].
    #[must_use]
    pub fn category_key(&self) -> String {
        self.incident_type.trim().to_lowercase()
    }

    /// Applies a status change, keeping `resolved_at` consistent with it.
    pub fn set_status(&mut self, status: IncidentStatus, now: DateTime<Utc>) {
        self.status = status;
        self.resolved_at = (status == IncidentStatus::Resolved).then_some(now);
    }
}

fn nan_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// One entry of an incident's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// When the update happened.
    pub timestamp: DateTime<Utc>,
    /// Status after the update.
    pub status: IncidentStatus,
    /// Free-text note attached by a moderator.
    #[serde(default)]
    pub note: Option<String>,
}

/// Full incident record as returned by the single-incident endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDetail {
    #[serde(flatten)]
    pub incident: Incident,
    /// Short headline.
    #[serde(default)]
    pub title: Option<String>,
    /// Reporter's description.
    #[serde(default)]
    pub description: Option<String>,
    /// Public tracking code (`CRISP-XXXXXXXX`).
    #[serde(default)]
    pub tracking_code: Option<String>,
    /// Status history, oldest first as stored.
    #[serde(default)]
    pub timeline: Vec<TimelineEntry>,
}

/// A known incident category shown as a filter facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CategoryDef {
    /// Lower-case id incidents are matched against.
    pub id: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Hex color used for markers and legend dots.
    pub color: &'static str,
}

/// Color used for incidents whose type is not a known category.
pub const NEUTRAL_COLOR: &str = "#6b7280";

/// The built-in category taxonomy, in display order.
pub const CATEGORIES: &[CategoryDef] = &[
    CategoryDef {
        id: "theft",
        label: "Theft/Burglary",
        color: "#ef4444",
    },
    CategoryDef {
        id: "vandalism",
        label: "Vandalism",
        color: "#f97316",
    },
    CategoryDef {
        id: "assault",
        label: "Assault",
        color: "#dc2626",
    },
    CategoryDef {
        id: "drug",
        label: "Drug Activity",
        color: "#a855f7",
    },
    CategoryDef {
        id: "suspicious",
        label: "Suspicious Activity",
        color: "#eab308",
    },
    CategoryDef {
        id: "noise",
        label: "Noise Complaint",
        color: "#3b82f6",
    },
    CategoryDef {
        id: "traffic",
        label: "Traffic Violation",
        color: "#22c55e",
    },
];

/// Finds the category whose id matches `incident_type` case-insensitively.
#[must_use]
pub fn find_category<'a>(
    categories: &'a [CategoryDef],
    incident_type: &str,
) -> Option<&'a CategoryDef> {
    let key = incident_type.trim();
    categories.iter().find(|c| c.id.eq_ignore_ascii_case(key))
}

/// Marker color for an incident type, falling back to [`NEUTRAL_COLOR`].
#[must_use]
pub fn color_for(categories: &[CategoryDef], incident_type: &str) -> &'static str {
    find_category(categories, incident_type).map_or(NEUTRAL_COLOR, |c| c.color)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Incident {
        serde_json::from_value(serde_json::json!({
            "id": "1",
            "type": "theft",
            "status": "RECEIVED",
            "location": "Main St & 5th Ave",
            "latitude": 40.7,
            "longitude": -74.0,
            "reportedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn deserializes_api_shape() {
        let incident = sample();
        assert_eq!(incident.incident_type, "theft");
        assert_eq!(incident.status, IncidentStatus::Received);
        assert!(incident.resolved_at.is_none());
        assert_eq!(incident.coordinate(), Some(Coordinate::new(-74.0, 40.7)));
    }

    #[test]
    fn null_latitude_is_not_renderable() {
        let incident: Incident = serde_json::from_value(serde_json::json!({
            "id": "2",
            "type": "noise",
            "status": "RESOLVED",
            "latitude": null,
            "longitude": -74.0,
            "reportedAt": "2024-01-01T00:00:00Z",
            "resolvedAt": "2024-01-02T00:00:00Z"
        }))
        .unwrap();
        assert!(incident.latitude.is_nan());
        assert!(incident.coordinate().is_none());
    }

    #[test]
    fn status_codes_round_trip_through_strum() {
        for status in IncidentStatus::all() {
            let parsed: IncidentStatus = status.as_ref().parse().unwrap();
            assert_eq!(parsed, *status);
        }
        assert_eq!(IncidentStatus::UnderInvestigation.to_string(), "UNDER_INVESTIGATION");
        assert!("investigating".parse::<IncidentStatus>().is_err());
    }

    #[test]
    fn set_status_keeps_resolved_at_consistent() {
        let mut incident = sample();
        let now = Utc::now();
        incident.set_status(IncidentStatus::Resolved, now);
        assert_eq!(incident.resolved_at, Some(now));
        incident.set_status(IncidentStatus::UnderInvestigation, now);
        assert!(incident.resolved_at.is_none());
    }

    #[test]
    fn category_lookup_is_case_insensitive() {
        assert_eq!(find_category(CATEGORIES, "Theft").map(|c| c.id), Some("theft"));
        assert_eq!(color_for(CATEGORIES, "VANDALISM"), "#f97316");
        assert_eq!(color_for(CATEGORIES, "arson"), NEUTRAL_COLOR);
    }

    #[test]
    fn category_ids_are_unique_and_lowercase() {
        let mut seen = std::collections::BTreeSet::new();
        for cat in CATEGORIES {
            assert!(seen.insert(cat.id), "Duplicate category id: {}", cat.id);
            assert_eq!(cat.id, cat.id.to_lowercase());
        }
    }

    #[test]
    fn coordinate_serializes_as_lng_lat_pair() {
        let json = serde_json::to_value(Coordinate::new(-74.0, 40.7)).unwrap();
        assert_eq!(json, serde_json::json!([-74.0, 40.7]));
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 91.0).is_valid());
    }
}
