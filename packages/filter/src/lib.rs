#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filter state, query translation, and incident fetching for the map.
//!
//! A [`FilterSpec`] is the user's current selection in the sidebar. It is
//! translated into [`IncidentQueryParams`] by the pure [`to_query`]
//! function and handed to an [`IncidentGateway`]. The
//! [`FilterStateManager`] owns the spec, triggers one fetch per change,
//! and publishes only the result of the most recently initiated fetch.

pub mod gateway;
pub mod manager;

use std::fmt;
use std::str::FromStr;

use crisp_incident_models::IncidentStatus;
use crisp_server_models::IncidentQueryParams;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use gateway::{GatewayError, HttpIncidentGateway, IncidentGateway};
pub use manager::{FAILURE_NOTICE_THRESHOLD, FetchStatus, FilterStateManager};

/// Symbolic reporting window. Resolved to an absolute boundary by the
/// gateway, never on the client.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum DateRange {
    #[serde(rename = "24hours")]
    #[strum(serialize = "24hours")]
    Last24Hours,
    #[default]
    #[serde(rename = "7days")]
    #[strum(serialize = "7days")]
    Last7Days,
    #[serde(rename = "30days")]
    #[strum(serialize = "30days")]
    Last30Days,
    #[serde(rename = "90days")]
    #[strum(serialize = "90days")]
    Last90Days,
    /// A user-picked range. The picker is not wired up, so no window is sent.
    #[serde(rename = "custom")]
    #[strum(serialize = "custom")]
    Custom,
}

impl DateRange {
    /// The `since` token sent to the gateway, if this range has one.
    #[must_use]
    pub const fn since_token(self) -> Option<&'static str> {
        match self {
            Self::Last24Hours => Some("24hours"),
            Self::Last7Days => Some("7days"),
            Self::Last30Days => Some("30days"),
            Self::Last90Days => Some("90days"),
            Self::Custom => None,
        }
    }
}

/// Status selection: everything, or one status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    #[default]
    All,
    Only(IncidentStatus),
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(status) => write!(f, "{status}"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            s.parse().map(Self::Only)
        }
    }
}

/// The sidebar's current filter selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Selected category ids in selection order. Empty means no restriction.
    pub crime_types: Vec<String>,
    pub date_range: DateRange,
    pub status: StatusFilter,
}

/// A partial change to a [`FilterSpec`]. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterUpdate {
    pub crime_types: Option<Vec<String>>,
    pub date_range: Option<DateRange>,
    pub status: Option<StatusFilter>,
}

impl FilterUpdate {
    #[must_use]
    pub fn crime_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            crime_types: Some(types.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn date_range(range: DateRange) -> Self {
        Self {
            date_range: Some(range),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn status(status: StatusFilter) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl FilterSpec {
    /// Returns a new spec with `update` applied on top of `self`.
    #[must_use]
    pub fn merge(&self, update: FilterUpdate) -> Self {
        Self {
            crime_types: update
                .crime_types
                .unwrap_or_else(|| self.crime_types.clone()),
            date_range: update.date_range.unwrap_or(self.date_range),
            status: update.status.unwrap_or(self.status),
        }
    }

    /// The update a checkbox click produces: removes `id` if selected,
    /// appends it otherwise.
    #[must_use]
    pub fn toggle_type(&self, id: &str) -> FilterUpdate {
        let types = if self.crime_types.iter().any(|t| t == id) {
            self.crime_types
                .iter()
                .filter(|t| *t != id)
                .cloned()
                .collect()
        } else {
            let mut types = self.crime_types.clone();
            types.push(id.to_string());
            types
        };
        FilterUpdate {
            crime_types: Some(types),
            ..FilterUpdate::default()
        }
    }
}

/// Translates a filter selection into gateway query params.
#[must_use]
pub fn to_query(spec: &FilterSpec) -> IncidentQueryParams {
    IncidentQueryParams {
        types: spec.crime_types.clone(),
        status: match spec.status {
            StatusFilter::All => None,
            StatusFilter::Only(status) => Some(status.to_string()),
        },
        since: spec.date_range.since_token().map(str::to_string),
    }
}
