//! In-memory incident store seeded from a JSON file.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crisp_incident_models::{Incident, IncidentDetail, IncidentStatus, TimelineEntry};
use crisp_server_models::{IncidentQueryParams, StatusUpdate};
use tokio::sync::RwLock;

use crate::{IncidentStore, Predicate, StoreError};

/// Incident records held in memory.
///
/// The seed file is a JSON array of incident records; detail fields
/// (`title`, `description`, `trackingCode`, `timeline`) are optional.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<IncidentDetail>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(records: Vec<IncidentDetail>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Loads the store from a JSON file. A missing file gives an empty
    /// store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file exists but cannot be read or
    /// parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "Incident data file {} not found, starting empty",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let records: Vec<IncidentDetail> = serde_json::from_slice(&bytes)?;
        log::info!("Loaded {} incidents from {}", records.len(), path.display());
        Ok(Self::new(records))
    }

    /// Whether the store holds no incidents.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn query(
        &self,
        params: &IncidentQueryParams,
        now: DateTime<Utc>,
    ) -> Result<Vec<Incident>, StoreError> {
        let predicate = Predicate::compile(params, now)?;
        let records = self.records.read().await;

        let mut incidents: Vec<Incident> = records
            .iter()
            .map(|r| &r.incident)
            .filter(|i| predicate.matches(i))
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));

        log::debug!(
            "Incident query {params:?} matched {} of {}",
            incidents.len(),
            records.len()
        );
        Ok(incidents)
    }

    async fn all(&self) -> Result<Vec<Incident>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .map(|r| r.incident.clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<IncidentDetail>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.incident.id == id).map(|r| {
            let mut detail = r.clone();
            detail.timeline.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            detail
        }))
    }

    async fn update_status(
        &self,
        id: &str,
        status: IncidentStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusUpdate, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.incident.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        let previous = record.incident.status;
        record.incident.set_status(status, now);
        record.timeline.push(TimelineEntry {
            timestamp: now,
            status,
            note: None,
        });
        log::info!("Incident {id} moved from {previous} to {status}");

        Ok(StatusUpdate {
            id: record.incident.id.clone(),
            status: record.incident.status,
            resolved_at: record.incident.resolved_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn record(id: &str, incident_type: &str, status: IncidentStatus, age_days: i64) -> IncidentDetail {
        IncidentDetail {
            incident: Incident {
                id: id.to_string(),
                incident_type: incident_type.to_string(),
                status,
                location: format!("{id} Main St"),
                latitude: 40.7,
                longitude: -74.0,
                reported_at: now() - Duration::days(age_days),
                resolved_at: None,
            },
            title: None,
            description: None,
            tracking_code: None,
            timeline: Vec::new(),
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            record("a", "Theft", IncidentStatus::Received, 2),
            record("b", "noise", IncidentStatus::Resolved, 0),
            record("c", "theft", IncidentStatus::UnderInvestigation, 40),
            record("d", "Vandalism", IncidentStatus::Received, 10),
        ])
    }

    fn ids(incidents: &[Incident]) -> Vec<&str> {
        incidents.iter().map(|i| i.id.as_str()).collect()
    }

    #[tokio::test]
    async fn empty_params_return_everything_newest_first() {
        let got = store()
            .query(&IncidentQueryParams::default(), now())
            .await
            .unwrap();
        assert_eq!(ids(&got), ["b", "a", "d", "c"]);
    }

    #[tokio::test]
    async fn types_match_case_insensitively() {
        let params = IncidentQueryParams {
            types: vec!["theft".to_string()],
            ..IncidentQueryParams::default()
        };
        let got = store().query(&params, now()).await.unwrap();
        assert_eq!(ids(&got), ["a", "c"]);
    }

    #[tokio::test]
    async fn since_and_status_narrow_results() {
        let params = IncidentQueryParams {
            types: Vec::new(),
            status: Some("RECEIVED".to_string()),
            since: Some("7days".to_string()),
        };
        let got = store().query(&params, now()).await.unwrap();
        assert_eq!(ids(&got), ["a"]);

        let params = IncidentQueryParams {
            since: Some("30days".to_string()),
            ..IncidentQueryParams::default()
        };
        let got = store().query(&params, now()).await.unwrap();
        assert_eq!(ids(&got), ["b", "a", "d"]);
    }

    #[tokio::test]
    async fn resolving_sets_and_reopening_clears_resolved_at() {
        let store = store();
        let updated = store
            .update_status("a", IncidentStatus::Resolved, now())
            .await
            .unwrap();
        assert_eq!(updated.resolved_at, Some(now()));

        let later = now() + Duration::hours(1);
        let updated = store
            .update_status("a", IncidentStatus::UnderInvestigation, later)
            .await
            .unwrap();
        assert_eq!(updated.status, IncidentStatus::UnderInvestigation);
        assert_eq!(updated.resolved_at, None);

        let detail = store.get("a").await.unwrap().unwrap();
        assert_eq!(detail.timeline.len(), 2);
        assert_eq!(detail.timeline[0].timestamp, later);
    }

    #[tokio::test]
    async fn updating_unknown_id_fails() {
        assert!(matches!(
            store()
                .update_status("zzz", IncidentStatus::Resolved, now())
                .await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn missing_seed_file_gives_empty_store() {
        let store = MemoryStore::load("/nonexistent/crisp/incidents.json")
            .await
            .unwrap();
        assert!(store.is_empty().await);
    }
}
