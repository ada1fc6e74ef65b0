//! The 3-D globe strategy.
//!
//! The globe needs an access token for its terrain service and loads the
//! terrain asynchronously before the viewer can be created. Incidents are
//! point entities keyed `incident-{id}`.

use async_trait::async_trait;
use crisp_incident_models::Coordinate;

use crate::{CameraPosition, DECORATION_PREFIX, Decoration, Engine, RenderError, SurfaceSize};

/// Camera height in meters used when centering on a search result.
pub const FLY_TO_HEIGHT: f64 = 5_000.0;

/// Size of an incident point in pixels.
pub const POINT_PIXEL_SIZE: f64 = 10.0;

/// Operations a globe library exposes.
#[async_trait]
pub trait GlobeEngine: Send + 'static {
    /// Authenticates with `access_token`, loads world terrain, and creates
    /// the viewer.
    async fn load_terrain(&mut self, access_token: &str) -> Result<(), RenderError>;

    fn canvas_size(&self) -> SurfaceSize;

    fn entity_ids(&self) -> Vec<String>;

    fn add_point_entity(
        &mut self,
        id: &str,
        position: Coordinate,
        color: &str,
        pixel_size: f64,
    ) -> Result<(), RenderError>;

    fn remove_entity(&mut self, id: &str) -> Result<(), RenderError>;

    fn fly_to(&mut self, position: Coordinate, height: f64) -> Result<(), RenderError>;

    fn resize(&mut self) -> Result<(), RenderError>;

    fn camera(&self) -> Option<CameraPosition>;

    fn destroy(&mut self);
}

/// [`Engine`] adapter for a [`GlobeEngine`].
pub struct GlobeSurface<G> {
    engine: G,
    access_token: Option<String>,
}

impl<G: GlobeEngine> GlobeSurface<G> {
    /// Without a non-blank `access_token` initialization fails with
    /// [`RenderError::MissingAccessToken`].
    #[must_use]
    pub const fn new(engine: G, access_token: Option<String>) -> Self {
        Self {
            engine,
            access_token,
        }
    }
}

#[async_trait]
impl<G: GlobeEngine> Engine for GlobeSurface<G> {
    fn name(&self) -> &'static str {
        "globe"
    }

    async fn init(&mut self) -> Result<(), RenderError> {
        let token = self
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(RenderError::MissingAccessToken)?
            .to_string();
        self.engine.load_terrain(&token).await
    }

    fn surface_size(&self) -> SurfaceSize {
        self.engine.canvas_size()
    }

    fn replace_decorations(&mut self, decorations: &[Decoration]) -> Result<(), RenderError> {
        let stale: Vec<String> = self
            .engine
            .entity_ids()
            .into_iter()
            .filter(|id| id.starts_with(DECORATION_PREFIX))
            .collect();
        for id in &stale {
            if let Err(e) = self.engine.remove_entity(id) {
                log::warn!("Failed to remove entity {id}: {e}");
            }
        }

        let mut failed = 0;
        for decoration in decorations {
            if let Err(e) = self.engine.add_point_entity(
                &decoration.key,
                decoration.coordinate,
                decoration.color,
                POINT_PIXEL_SIZE,
            ) {
                log::warn!("Failed to draw {}: {e}", decoration.key);
                failed += 1;
            }
        }

        if failed == 0 {
            Ok(())
        } else {
            Err(RenderError::engine(format!(
                "{failed} of {} incidents could not be drawn",
                decorations.len()
            )))
        }
    }

    fn fly_to(&mut self, target: Coordinate) -> Result<(), RenderError> {
        self.engine.fly_to(target, FLY_TO_HEIGHT)
    }

    fn resize(&mut self, _size: SurfaceSize) -> Result<(), RenderError> {
        self.engine.resize()
    }

    fn camera(&self) -> Option<CameraPosition> {
        self.engine.camera()
    }

    fn destroy(&mut self) {
        self.engine.destroy();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone as _, Utc};
    use crisp_incident_models::{Incident, IncidentStatus};

    use super::*;
    use crate::headless::HeadlessGlobeEngine;
    use crate::{MapRenderer, RenderState, RenderSynchronizer};

    #[tokio::test(start_paused = true)]
    async fn missing_token_fails_initialization() {
        let engine = HeadlessGlobeEngine::new();
        let surface = engine.surface();
        let renderer = RenderSynchronizer::new(GlobeSurface::new(engine, Some("  ".to_string())));

        assert_eq!(renderer.init().await, Err(RenderError::MissingAccessToken));
        assert_eq!(renderer.state(), RenderState::Failed);
        assert_eq!(surface.init_calls(), 0);
        assert!(surface.is_destroyed());
    }

    #[tokio::test(start_paused = true)]
    async fn flies_at_fixed_height_and_draws_points() {
        let engine = HeadlessGlobeEngine::new();
        let surface = engine.surface();
        surface.set_container_size(SurfaceSize::new(1280, 720));
        let renderer =
            RenderSynchronizer::new(GlobeSurface::new(engine, Some("token".to_string())));

        renderer.init().await.unwrap();
        let mut states = renderer.subscribe();
        states.wait_for(|s| *s == RenderState::Ready).await.unwrap();

        renderer.set_incidents(Arc::from(vec![Incident {
            id: "g1".to_string(),
            incident_type: "noise".to_string(),
            status: IncidentStatus::Resolved,
            location: String::new(),
            latitude: 40.7,
            longitude: -74.0,
            reported_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            resolved_at: None,
        }]));
        renderer.fly_to(Coordinate::new(-74.0, 40.7));

        assert_eq!(surface.decoration_keys(), ["incident-g1"]);
        let camera = renderer.camera().unwrap();
        assert_eq!(camera.height, Some(FLY_TO_HEIGHT));
        assert_eq!(camera.center, Coordinate::new(-74.0, 40.7));
    }

    /// Fails the first point entity it is asked to add.
    struct FirstPointFails {
        inner: HeadlessGlobeEngine,
        failed: bool,
    }

    #[async_trait]
    impl GlobeEngine for FirstPointFails {
        async fn load_terrain(&mut self, access_token: &str) -> Result<(), RenderError> {
            self.inner.load_terrain(access_token).await
        }

        fn canvas_size(&self) -> SurfaceSize {
            self.inner.canvas_size()
        }

        fn entity_ids(&self) -> Vec<String> {
            self.inner.entity_ids()
        }

        fn add_point_entity(
            &mut self,
            id: &str,
            position: Coordinate,
            color: &str,
            pixel_size: f64,
        ) -> Result<(), RenderError> {
            if !self.failed {
                self.failed = true;
                return Err(RenderError::engine(format!("cannot add entity {id}")));
            }
            self.inner.add_point_entity(id, position, color, pixel_size)
        }

        fn remove_entity(&mut self, id: &str) -> Result<(), RenderError> {
            self.inner.remove_entity(id)
        }

        fn fly_to(&mut self, position: Coordinate, height: f64) -> Result<(), RenderError> {
            self.inner.fly_to(position, height)
        }

        fn resize(&mut self) -> Result<(), RenderError> {
            self.inner.resize()
        }

        fn camera(&self) -> Option<CameraPosition> {
            self.inner.camera()
        }

        fn destroy(&mut self) {
            self.inner.destroy();
        }
    }

    #[tokio::test]
    async fn failed_point_does_not_stop_the_rest() {
        let inner = HeadlessGlobeEngine::new();
        let headless = inner.surface();
        let mut surface = GlobeSurface::new(
            FirstPointFails {
                inner,
                failed: false,
            },
            Some("token".to_string()),
        );
        surface.init().await.unwrap();

        let point = |id: &str| Decoration {
            key: format!("{DECORATION_PREFIX}{id}"),
            incident_id: id.to_string(),
            coordinate: Coordinate::new(-74.0, 40.7),
            color: "#22c55e",
            incident_type: "noise".to_string(),
            status: IncidentStatus::Resolved,
        };
        let all = [point("a"), point("b")];

        assert_eq!(
            surface.replace_decorations(&all),
            Err(RenderError::engine("1 of 2 incidents could not be drawn"))
        );
        assert_eq!(headless.decoration_keys(), ["incident-b"]);

        surface.replace_decorations(&all).unwrap();
        assert_eq!(headless.decoration_keys(), ["incident-a", "incident-b"]);
    }
}
