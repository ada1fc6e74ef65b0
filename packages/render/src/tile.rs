//! The 2-D tile map strategy.
//!
//! Every incident becomes a `GeoJSON` point source plus a circle layer
//! drawing it, both keyed `incident-{id}`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use crisp_incident_models::Coordinate;
use geojson::{Feature, Geometry, JsonObject, Value};

use crate::{CameraPosition, DECORATION_PREFIX, Decoration, Engine, RenderError, SurfaceSize};

/// Radius of an incident circle in pixels.
pub const CIRCLE_RADIUS: f64 = 6.0;

/// Zoom level used when centering on a search result.
pub const FLY_TO_ZOOM: f64 = 13.0;

/// Operations a tile map library exposes.
#[async_trait]
pub trait TileEngine: Send + 'static {
    /// Loads the map style. Sources and layers can only be added after.
    async fn load_style(&mut self) -> Result<(), RenderError>;

    fn container_size(&self) -> SurfaceSize;

    /// Ids of every layer in the current style.
    fn layer_ids(&self) -> Vec<String>;

    fn add_source(&mut self, id: &str, feature: Feature) -> Result<(), RenderError>;

    fn remove_source(&mut self, id: &str) -> Result<(), RenderError>;

    fn add_circle_layer(
        &mut self,
        id: &str,
        source: &str,
        radius: f64,
        color: &str,
    ) -> Result<(), RenderError>;

    fn remove_layer(&mut self, id: &str) -> Result<(), RenderError>;

    fn fly_to(&mut self, center: Coordinate, zoom: f64) -> Result<(), RenderError>;

    /// Re-reads the container size and redraws.
    fn resize(&mut self) -> Result<(), RenderError>;

    fn camera(&self) -> Option<CameraPosition>;

    /// Disposes of the map and everything attached to it.
    fn remove(&mut self);
}

/// Point feature for one decoration, with `type` and `status` properties.
#[must_use]
pub fn decoration_feature(decoration: &Decoration) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("incidentId".to_string(), decoration.incident_id.clone().into());
    properties.insert("type".to_string(), decoration.incident_type.clone().into());
    properties.insert("status".to_string(), decoration.status.as_ref().into());
    properties.insert("color".to_string(), decoration.color.into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![
            decoration.coordinate.longitude,
            decoration.coordinate.latitude,
        ]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// [`Engine`] adapter for a [`TileEngine`].
pub struct TileSurface<T> {
    engine: T,
    /// Decoration sources this surface added and has not removed yet.
    sources: BTreeSet<String>,
}

impl<T: TileEngine> TileSurface<T> {
    #[must_use]
    pub const fn new(engine: T) -> Self {
        Self {
            engine,
            sources: BTreeSet::new(),
        }
    }

    /// Removes every decoration layer in the style and every decoration
    /// source this surface still owns. Sources that fail to go away stay
    /// tracked for the next pass.
    fn clear_decorations(&mut self) {
        let layers: BTreeSet<String> = self
            .engine
            .layer_ids()
            .into_iter()
            .filter(|id| id.starts_with(DECORATION_PREFIX))
            .collect();
        let mut stale = std::mem::take(&mut self.sources);
        stale.extend(layers.iter().cloned());

        for id in stale {
            let removed = if layers.contains(&id) {
                self.engine.remove_layer(&id)
            } else {
                Ok(())
            };
            if let Err(e) = removed {
                log::warn!("Failed to remove layer {id}: {e}");
            }
            if let Err(e) = self.engine.remove_source(&id) {
                log::warn!("Failed to remove source {id}: {e}");
                self.sources.insert(id);
            }
        }
    }

    fn draw(&mut self, decoration: &Decoration) -> Result<(), RenderError> {
        let key = &decoration.key;
        self.engine.add_source(key, decoration_feature(decoration))?;
        self.sources.insert(key.clone());

        if let Err(e) = self
            .engine
            .add_circle_layer(key, key, CIRCLE_RADIUS, decoration.color)
        {
            match self.engine.remove_source(key) {
                Ok(()) => {
                    self.sources.remove(key);
                }
                Err(cleanup) => log::warn!("Failed to remove source {key}: {cleanup}"),
            }
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl<T: TileEngine> Engine for TileSurface<T> {
    fn name(&self) -> &'static str {
        "tile map"
    }

    async fn init(&mut self) -> Result<(), RenderError> {
        self.engine.load_style().await
    }

    fn surface_size(&self) -> SurfaceSize {
        self.engine.container_size()
    }

    fn replace_decorations(&mut self, decorations: &[Decoration]) -> Result<(), RenderError> {
        self.clear_decorations();

        let mut failed = 0;
        for decoration in decorations {
            if let Err(e) = self.draw(decoration) {
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
        self.engine.fly_to(target, FLY_TO_ZOOM)
    }

    fn resize(&mut self, _size: SurfaceSize) -> Result<(), RenderError> {
        self.engine.resize()
    }

    fn camera(&self) -> Option<CameraPosition> {
        self.engine.camera()
    }

    fn destroy(&mut self) {
        self.engine.remove();
    }
}
