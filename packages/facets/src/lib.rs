#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sidebar aggregates derived from the current incident snapshot.
//!
//! Everything here is a pure function of `(incidents, categories, now)`.
//! None of it fails: an empty incident list yields zero counts, an empty
//! recent list, and an all-zero summary. Spatial validity is irrelevant
//! here, so incidents without usable coordinates are still counted.

use chrono::{DateTime, TimeZone, Utc};
use crisp_incident_models::{CategoryDef, Incident, IncidentStatus, find_category};
use serde::Serialize;

/// Number of entries shown under "Recent Activity".
pub const DEFAULT_RECENT_COUNT: usize = 3;

/// One category row in the filter list with its live count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetBucket {
    pub id: String,
    pub label: String,
    pub color: String,
    pub count: u64,
}

/// A "Recent Activity" card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    /// Category label, or the raw type if it matches no category.
    #[serde(rename = "type")]
    pub incident_type: String,
    pub location: String,
    /// E.g. "2 hours ago".
    pub relative_time: String,
    pub status_label: String,
    pub status_color: String,
}

/// Quick-stats counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: u64,
    /// Everything not yet resolved.
    pub active: u64,
    /// Resolved on the current calendar day of `now`'s timezone.
    pub resolved_today: u64,
}

/// Counts incidents per known category.
///
/// Every category is present in the output, in taxonomy order, even at
/// zero. Incidents whose type matches no category are not counted.
#[must_use]
pub fn compute_counts(incidents: &[Incident], categories: &[CategoryDef]) -> Vec<FacetBucket> {
    categories
        .iter()
        .map(|cat| FacetBucket {
            id: cat.id.to_string(),
            label: cat.label.to_string(),
            color: cat.color.to_string(),
            count: incidents
                .iter()
                .filter(|i| i.category_key() == cat.id)
                .count() as u64,
        })
        .collect()
}

/// The `n` most recently reported incidents, newest first.
///
/// Incidents with equal `reported_at` keep their input order.
#[must_use]
pub fn compute_recent(
    incidents: &[Incident],
    categories: &[CategoryDef],
    n: usize,
    now: DateTime<Utc>,
) -> Vec<RecentActivity> {
    let mut sorted: Vec<&Incident> = incidents.iter().collect();
    // stable, so ties stay in input order
    sorted.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));

    sorted
        .into_iter()
        .take(n)
        .map(|i| RecentActivity {
            incident_type: find_category(categories, &i.incident_type)
                .map_or_else(|| i.incident_type.clone(), |c| c.label.to_string()),
            location: i.location.clone(),
            relative_time: relative_time(i.reported_at, now),
            status_label: i.status.label().to_string(),
            status_color: i.status.color().to_string(),
        })
        .collect()
}

/// Total, active, and resolved-today counters.
///
/// `now` decides both the instant and the timezone whose calendar day
/// counts as "today"; pass `Local::now()` for the viewer's local day.
#[must_use]
pub fn compute_summary<Tz: TimeZone>(incidents: &[Incident], now: &DateTime<Tz>) -> Summary {
    let today = now.date_naive();
    let tz = now.timezone();

    incidents.iter().fold(Summary::default(), |mut acc, i| {
        acc.total += 1;
        if i.status == IncidentStatus::Resolved {
            let resolved_today = i
                .resolved_at
                .is_some_and(|at| at.with_timezone(&tz).date_naive() == today);
            if resolved_today {
                acc.resolved_today += 1;
            }
        } else {
            acc.active += 1;
        }
        acc
    })
}

/// Mean time from report to resolution over resolved incidents, in whole
/// minutes. `None` when nothing has been resolved.
///
/// Incidents resolved before they were reported (clock skew) are ignored.
#[must_use]
pub fn average_response_minutes(incidents: &[Incident]) -> Option<i64> {
    let (count, seconds) = incidents
        .iter()
        .filter(|i| i.status == IncidentStatus::Resolved)
        .filter_map(|i| i.resolved_at.map(|at| at.signed_duration_since(i.reported_at)))
        .filter(|elapsed| elapsed.num_seconds() >= 0)
        .fold((0_i64, 0_i64), |(count, seconds), elapsed| {
            (count + 1, seconds + elapsed.num_seconds())
        });
    (count > 0).then(|| seconds / count / 60)
}

/// Formats the age of `then` relative to `now` ("3 hours ago").
///
/// Timestamps in the future (clock skew) read as "just now".
#[must_use]
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        "just now".to_string()
    } else if hours < 1 {
        plural(minutes, "minute")
    } else if days < 1 {
        plural(hours, "hour")
    } else {
        plural(days, "day")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
