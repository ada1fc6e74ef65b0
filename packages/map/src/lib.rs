#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The incident map page.
//!
//! [`MapPage`] wires the pieces together: filter changes go to the
//! [`FilterStateManager`], each snapshot it publishes is pushed to the
//! active renderer and summarized for the sidebar, and successful location
//! searches move the camera.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use crisp_facets::{
    DEFAULT_RECENT_COUNT, FacetBucket, RecentActivity, Summary, compute_counts, compute_recent,
    compute_summary,
};
use crisp_filter::{FetchStatus, FilterSpec, FilterStateManager, FilterUpdate, IncidentGateway};
use crisp_geocoder::Geocoder;
use crisp_geocoder::search::{LocationSearch, SearchOutcome};
use crisp_incident_models::{CATEGORIES, CategoryDef, Coordinate, Incident};
use crisp_render::debug::DebugInfo;
use crisp_render::view::{ActiveMap, MapView};
use crisp_render::RenderError;
use serde::Serialize;
use tokio::sync::watch;

/// Everything the sidebar shows for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidebar {
    pub summary: Summary,
    pub buckets: Vec<FacetBucket>,
    pub recent: Vec<RecentActivity>,
    /// Shown while the incident feed keeps failing.
    pub notice: Option<String>,
}

/// Controller for the map page.
pub struct MapPage<G, S> {
    filters: FilterStateManager<G>,
    snapshots: watch::Receiver<Arc<[Incident]>>,
    search: LocationSearch<S>,
    map: ActiveMap,
    categories: &'static [CategoryDef],
}

impl<G, S> MapPage<G, S>
where
    G: IncidentGateway + 'static,
    S: Geocoder,
{
    #[must_use]
    pub fn new(filters: FilterStateManager<G>, geocoder: S, map: ActiveMap) -> Self {
        Self {
            snapshots: filters.subscribe(),
            filters,
            search: LocationSearch::new(geocoder),
            map,
            categories: CATEGORIES,
        }
    }

    /// Brings up the selected renderer and loads incidents for the
    /// current filters.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the renderer fails to initialize. The
    /// incident feed and the sidebar keep working in that case.
    pub async fn mount(&mut self) -> Result<(), RenderError> {
        let rendered = self.map.ensure_initialized().await;
        let fetch = self.filters.refresh();
        self.await_fetch(fetch).await;
        rendered
    }

    /// Applies a filter change and waits for its fetch to settle.
    pub async fn set_filter(&mut self, update: FilterUpdate) {
        let fetch = self.filters.set_filter(update);
        self.await_fetch(fetch).await;
    }

    /// Checks or unchecks one category.
    pub async fn toggle_type(&mut self, id: &str) {
        let update = self.filters.spec().toggle_type(id);
        self.set_filter(update).await;
    }

    #[must_use]
    pub fn spec(&self) -> FilterSpec {
        self.filters.spec()
    }

    /// The incident snapshot currently displayed.
    #[must_use]
    pub fn incidents(&self) -> Arc<[Incident]> {
        self.snapshots.borrow().clone()
    }

    /// Pushes a newly published snapshot to the renderer, if there is one.
    /// Returns whether anything was pushed.
    pub fn sync(&mut self) -> bool {
        if !self.snapshots.has_changed().unwrap_or(false) {
            return false;
        }
        let incidents = self.snapshots.borrow_and_update().clone();
        log::debug!("Rendering {} incidents", incidents.len());
        self.map.set_incidents(incidents);
        true
    }

    /// Resolves `query` and centers the map on the result.
    pub async fn search(&mut self, query: &str) -> SearchOutcome {
        let outcome = self.search.submit(query).await;
        if let SearchOutcome::Found { coordinate, label } = &outcome {
            log::info!("Centering map on {label}");
            self.map.fly_to(*coordinate);
        }
        outcome
    }

    /// The last search coordinate.
    #[must_use]
    pub const fn search_coords(&self) -> Option<Coordinate> {
        self.search.current()
    }

    /// Switches between the 2-D and 3-D map.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the newly selected engine fails to
    /// initialize.
    pub async fn switch_view(&mut self, view: MapView) -> Result<(), RenderError> {
        let incidents = self.incidents();
        let coords = self.search.current();
        self.map.switch_to(view, incidents, coords).await
    }

    #[must_use]
    pub const fn view(&self) -> MapView {
        self.map.view()
    }

    /// The container changed size (window resize, sidebar toggle).
    pub fn resize(&self) {
        self.map.resize();
    }

    /// Sidebar model for the displayed snapshot. `now` also picks the
    /// timezone whose calendar day counts as "today".
    #[must_use]
    pub fn sidebar<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Sidebar {
        let incidents = self.incidents();
        let notice = match self.filters.fetch_status() {
            FetchStatus::Ok => None,
            FetchStatus::Degraded {
                consecutive_failures,
                ..
            } => Some(format!(
                "Incident data could not be refreshed ({consecutive_failures} attempts failed)"
            )),
        };
        Sidebar {
            summary: compute_summary(&incidents, now),
            buckets: compute_counts(&incidents, self.categories),
            recent: compute_recent(
                &incidents,
                self.categories,
                DEFAULT_RECENT_COUNT,
                now.with_timezone(&Utc),
            ),
            notice,
        }
    }

    /// Debug overlay contents for the active renderer.
    #[must_use]
    pub fn debug_info(&self) -> Option<DebugInfo> {
        DebugInfo::capture(self.map.active(), self.search.current(), self.map.view())
    }

    /// The active renderer, for callers that need the engine handle.
    #[must_use]
    pub const fn map(&self) -> &ActiveMap {
        &self.map
    }

    /// Leaves the page: tears down both renderers and forgets the search.
    pub fn unmount(&mut self) {
        self.map.destroy();
        self.search.clear();
    }

    async fn await_fetch(&mut self, fetch: tokio::task::JoinHandle<()>) {
        if let Err(e) = fetch.await {
            log::error!("Incident fetch task failed: {e}");
        }
        self.sync();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, Local};
    use crisp_filter::GatewayError;
    use crisp_geocoder::{Candidate, GeocodeError};
    use crisp_incident_models::IncidentStatus;
    use crisp_render::RenderSynchronizer;
    use crisp_render::SurfaceSize;
    use crisp_render::globe::GlobeSurface;
    use crisp_render::headless::{HeadlessGlobeEngine, HeadlessSurface, HeadlessTileEngine};
    use crisp_render::synchronizer::POLL_INTERVAL;
    use crisp_render::tile::TileSurface;
    use crisp_server_models::IncidentQueryParams;

    use super::*;

    struct FakeGateway {
        incidents: Vec<Incident>,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl IncidentGateway for FakeGateway {
        async fn fetch(&self, params: &IncidentQueryParams) -> Result<Vec<Incident>, GatewayError> {
            if *self.fail.lock().unwrap() {
                return Err(GatewayError::Status { status: 503 });
            }
            Ok(self
                .incidents
                .iter()
                .filter(|i| params.types.is_empty() || params.types.contains(&i.category_key()))
                .cloned()
                .collect())
        }
    }

    struct FixedGeocoder;

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
            if query == "nowhere" {
                return Ok(Vec::new());
            }
            Ok(vec![Candidate {
                label: query.to_string(),
                latitude: Some(40.65),
                longitude: Some(-73.95),
            }])
        }
    }

    fn incident(id: &str, incident_type: &str, latitude: f64, hours_ago: i64) -> Incident {
        Incident {
            id: id.to_string(),
            incident_type: incident_type.to_string(),
            status: IncidentStatus::Received,
            location: format!("{id} Street"),
            latitude,
            longitude: -74.0,
            reported_at: Utc::now() - Duration::hours(hours_ago),
            resolved_at: None,
        }
    }

    fn page(
        fail: bool,
    ) -> (
        MapPage<Arc<FakeGateway>, FixedGeocoder>,
        Arc<FakeGateway>,
        HeadlessSurface,
        HeadlessSurface,
    ) {
        let gateway = Arc::new(FakeGateway {
            incidents: vec![
                incident("a", "theft", 40.7, 1),
                incident("b", "noise", 40.8, 2),
                incident("c", "theft", f64::NAN, 3),
            ],
            fail: Mutex::new(fail),
        });
        let tile = HeadlessTileEngine::new();
        let globe = HeadlessGlobeEngine::new();
        let (tile_surface, globe_surface) = (tile.surface(), globe.surface());
        tile_surface.set_container_size(SurfaceSize::new(800, 600));
        globe_surface.set_container_size(SurfaceSize::new(800, 600));

        let map = ActiveMap::new(
            Box::new(RenderSynchronizer::new(TileSurface::new(tile))),
            Box::new(RenderSynchronizer::new(GlobeSurface::new(
                globe,
                Some("token".to_string()),
            ))),
            MapView::Tile,
        );
        let filters = FilterStateManager::new(Arc::clone(&gateway), FilterSpec::default());
        (
            MapPage::new(filters, FixedGeocoder, map),
            gateway,
            tile_surface,
            globe_surface,
        )
    }

    async fn ready(page: &mut MapPage<Arc<FakeGateway>, FixedGeocoder>) {
        page.mount().await.unwrap();
        tokio::time::sleep(POLL_INTERVAL * 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reaches_renderer_and_sidebar() {
        let (mut page, _gateway, tile, _globe) = page(false);
        ready(&mut page).await;

        assert_eq!(tile.decoration_keys(), ["incident-a", "incident-b"]);

        let sidebar = page.sidebar(&Local::now());
        assert_eq!(sidebar.summary.total, 3);
        assert_eq!(sidebar.summary.active, 3);
        let theft = sidebar.buckets.iter().find(|b| b.id == "theft").unwrap();
        assert_eq!(theft.count, 2);
        assert_eq!(sidebar.recent.len(), 3);
        assert_eq!(sidebar.recent[0].location, "a Street");
        assert!(sidebar.notice.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn filter_change_replaces_decorations() {
        let (mut page, _gateway, tile, _globe) = page(false);
        ready(&mut page).await;

        page.toggle_type("noise").await;
        assert_eq!(page.spec().crime_types, ["noise"]);
        assert_eq!(tile.decoration_keys(), ["incident-b"]);

        page.toggle_type("noise").await;
        assert_eq!(tile.decoration_keys(), ["incident-a", "incident-b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn search_moves_camera_and_failures_keep_it() {
        let (mut page, _gateway, tile, _globe) = page(false);
        ready(&mut page).await;

        assert!(matches!(
            page.search("Brooklyn").await,
            SearchOutcome::Found { .. }
        ));
        assert!(matches!(
            page.search("nowhere").await,
            SearchOutcome::Failed(_)
        ));
        assert_eq!(page.search_coords(), Some(Coordinate::new(-73.95, 40.65)));
        assert_eq!(tile.fly_to_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_view_reprojects_snapshot_and_search() {
        let (mut page, _gateway, _tile, globe) = page(false);
        ready(&mut page).await;
        page.search("Brooklyn").await;

        page.switch_view(MapView::Globe).await.unwrap();
        tokio::time::sleep(POLL_INTERVAL * 2).await;

        assert_eq!(globe.decoration_keys(), ["incident-a", "incident-b"]);
        assert_eq!(globe.fly_to_calls().len(), 1);
        assert!(page.debug_info().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_fetch_failures_surface_a_notice() {
        let (mut page, _gateway, _tile, _globe) = page(true);
        ready(&mut page).await;
        page.set_filter(FilterUpdate::default()).await;
        page.set_filter(FilterUpdate::default()).await;

        let sidebar = page.sidebar(&Local::now());
        assert_eq!(sidebar.summary.total, 0);
        assert!(sidebar.notice.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_releases_renderers() {
        let (mut page, _gateway, tile, _globe) = page(false);
        ready(&mut page).await;
        page.search("Brooklyn").await;
        page.unmount();
        assert!(tile.is_destroyed());
        assert_eq!(page.search_coords(), None);
    }
}
