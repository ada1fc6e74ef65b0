//! The location search box.
//!
//! [`LocationSearch`] owns the active search coordinate. A submission
//! either replaces it or produces a [`SearchNotice`]; a failure never
//! clears or changes it. Blank input does nothing at all.

use std::fmt;

use crisp_incident_models::Coordinate;

use crate::Geocoder;

/// Transient, non-blocking message shown after a failed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchNotice {
    /// Network or provider failure.
    ServiceError,
    /// The provider returned no candidates.
    NotFound,
    /// The first candidate had missing, non-numeric, or out-of-range
    /// coordinates.
    InvalidCoordinates,
}

impl fmt::Display for SearchNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ServiceError => "error searching for location",
            Self::NotFound => "location not found",
            Self::InvalidCoordinates => "invalid coordinates",
        })
    }
}

/// Result of one search submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Blank query; nothing was requested.
    Skipped,
    /// The coordinate was replaced.
    Found {
        coordinate: Coordinate,
        label: String,
    },
    /// The coordinate was left as it was.
    Failed(SearchNotice),
}

/// Search state for one map page.
pub struct LocationSearch<G> {
    geocoder: G,
    current: Option<Coordinate>,
}

impl<G: Geocoder> LocationSearch<G> {
    #[must_use]
    pub const fn new(geocoder: G) -> Self {
        Self {
            geocoder,
            current: None,
        }
    }

    /// The last successfully resolved coordinate.
    #[must_use]
    pub const fn current(&self) -> Option<Coordinate> {
        self.current
    }

    /// Forgets the active coordinate (navigating away from the map).
    pub const fn clear(&mut self) {
        self.current = None;
    }

    /// Resolves `query` and, on success, makes it the active coordinate.
    ///
    /// Only the first candidate is considered. Nothing is retried.
    pub async fn submit(&mut self, query: &str) -> SearchOutcome {
        let query = query.trim();
        if query.is_empty() {
            return SearchOutcome::Skipped;
        }

        let candidates = match self.geocoder.geocode(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::error!("Location search for {query:?} failed: {e}");
                return SearchOutcome::Failed(SearchNotice::ServiceError);
            }
        };

        let Some(first) = candidates.into_iter().next() else {
            log::info!("Location search for {query:?} found nothing");
            return SearchOutcome::Failed(SearchNotice::NotFound);
        };

        let coordinate = match (first.longitude, first.latitude) {
            (Some(lng), Some(lat)) => Coordinate::new(lng, lat),
            _ => return SearchOutcome::Failed(SearchNotice::InvalidCoordinates),
        };
        if !coordinate.is_valid() {
            log::warn!("Location search for {query:?} returned {coordinate:?}");
            return SearchOutcome::Failed(SearchNotice::InvalidCoordinates);
        }

        self.current = Some(coordinate);
        SearchOutcome::Found {
            coordinate,
            label: first.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::{Candidate, GeocodeError};

    #[derive(Default)]
    struct FakeGeocoder {
        replies: Mutex<Vec<Result<Vec<Candidate>, GeocodeError>>>,
        calls: AtomicUsize,
    }

    impl FakeGeocoder {
        fn reply(self: &Arc<Self>, reply: Result<Vec<Candidate>, GeocodeError>) {
            self.replies.lock().unwrap().push(reply);
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, _query: &str) -> Result<Vec<Candidate>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn candidate(lng: Option<f64>, lat: Option<f64>) -> Candidate {
        Candidate {
            label: "Brooklyn, NY".to_string(),
            latitude: lat,
            longitude: lng,
        }
    }

    async fn search_with_coordinate(
        fake: &Arc<FakeGeocoder>,
    ) -> LocationSearch<Arc<FakeGeocoder>> {
        let mut search = LocationSearch::new(Arc::clone(fake));
        fake.reply(Ok(vec![candidate(Some(-73.95), Some(40.65))]));
        assert!(matches!(
            search.submit("Brooklyn").await,
            SearchOutcome::Found { .. }
        ));
        search
    }

    #[tokio::test]
    async fn blank_query_is_a_no_op() {
        let fake = Arc::new(FakeGeocoder::default());
        let mut search = search_with_coordinate(&fake).await;
        assert_eq!(search.submit("   ").await, SearchOutcome::Skipped);
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(search.current(), Some(Coordinate::new(-73.95, 40.65)));
    }

    #[tokio::test]
    async fn first_candidate_wins() {
        let fake = Arc::new(FakeGeocoder::default());
        let mut search = LocationSearch::new(Arc::clone(&fake));
        fake.reply(Ok(vec![
            candidate(Some(1.0), Some(2.0)),
            candidate(Some(3.0), Some(4.0)),
        ]));
        let outcome = search.submit("  somewhere  ").await;
        assert_eq!(
            outcome,
            SearchOutcome::Found {
                coordinate: Coordinate::new(1.0, 2.0),
                label: "Brooklyn, NY".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn no_results_keeps_previous_coordinate() {
        let fake = Arc::new(FakeGeocoder::default());
        let mut search = search_with_coordinate(&fake).await;
        fake.reply(Ok(Vec::new()));
        let outcome = search.submit("Atlantis").await;
        assert_eq!(outcome, SearchOutcome::Failed(SearchNotice::NotFound));
        assert_eq!(outcome_message(&outcome), "location not found");
        assert_eq!(search.current(), Some(Coordinate::new(-73.95, 40.65)));
    }

    #[tokio::test]
    async fn service_error_keeps_previous_coordinate() {
        let fake = Arc::new(FakeGeocoder::default());
        let mut search = search_with_coordinate(&fake).await;
        fake.reply(Err(GeocodeError::RateLimited));
        assert_eq!(
            search.submit("Queens").await,
            SearchOutcome::Failed(SearchNotice::ServiceError)
        );
        assert_eq!(search.current(), Some(Coordinate::new(-73.95, 40.65)));
    }

    #[tokio::test]
    async fn malformed_coordinates_keep_previous_coordinate() {
        let fake = Arc::new(FakeGeocoder::default());
        let mut search = search_with_coordinate(&fake).await;

        fake.reply(Ok(vec![candidate(None, Some(40.0))]));
        assert_eq!(
            search.submit("Nowhere").await,
            SearchOutcome::Failed(SearchNotice::InvalidCoordinates)
        );

        fake.reply(Ok(vec![candidate(Some(f64::NAN), Some(40.0))]));
        assert_eq!(
            search.submit("Nowhere").await,
            SearchOutcome::Failed(SearchNotice::InvalidCoordinates)
        );
        assert_eq!(search.current(), Some(Coordinate::new(-73.95, 40.65)));
    }

    fn outcome_message(outcome: &SearchOutcome) -> String {
        match outcome {
            SearchOutcome::Failed(notice) => notice.to_string(),
            _ => String::new(),
        }
    }
}
