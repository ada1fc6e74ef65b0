//! In-process engines without a display.
//!
//! They keep what a real engine would draw in memory, which lets the CLI
//! render a map to `GeoJSON` and lets tests observe exactly what the
//! synchronizer asked the engine to do. Both engines share their state
//! with a [`HeadlessSurface`] handle that stays usable after the engine
//! has been moved into a renderer.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use crisp_incident_models::Coordinate;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};

use crate::globe::GlobeEngine;
use crate::tile::TileEngine;
use crate::{CameraPosition, RenderError, SurfaceSize};

/// Base layer every style starts with; never an incident.
const BASE_LAYER: &str = "background";

/// Initial camera of the tile engine (New York, zoom 10).
const TILE_HOME: CameraPosition = CameraPosition {
    center: Coordinate::new(-74.0, 40.7),
    zoom: Some(10.0),
    height: None,
};

/// Initial camera of the globe engine.
const GLOBE_HOME: CameraPosition = CameraPosition {
    center: Coordinate::new(-74.0, 40.7),
    zoom: None,
    height: Some(15_000_000.0),
};

#[derive(Debug, Default)]
struct HeadlessState {
    container: SurfaceSize,
    viewport: SurfaceSize,
    loaded: bool,
    destroyed: bool,
    init_calls: u32,
    init_delay: Duration,
    init_failure: Option<String>,
    fail_operations: bool,
    resize_calls: u32,
    /// Tile sources not yet drawn by a layer.
    sources: BTreeMap<String, Feature>,
    /// Everything drawn, keyed by layer or entity id.
    drawn: BTreeMap<String, Feature>,
    camera: Option<CameraPosition>,
    fly_to_calls: Vec<CameraPosition>,
}

impl HeadlessState {
    fn check(&self) -> Result<(), RenderError> {
        if self.destroyed {
            return Err(RenderError::Destroyed);
        }
        if !self.loaded {
            return Err(RenderError::engine("engine not loaded"));
        }
        if self.fail_operations {
            return Err(RenderError::engine("operation rejected"));
        }
        Ok(())
    }

    fn fly_to(&mut self, camera: CameraPosition) -> Result<(), RenderError> {
        self.check()?;
        self.camera = Some(camera);
        self.fly_to_calls.push(camera);
        Ok(())
    }

    fn resize(&mut self) -> Result<(), RenderError> {
        self.check()?;
        self.viewport = self.container;
        self.resize_calls += 1;
        Ok(())
    }

    fn teardown(&mut self) {
        self.destroyed = true;
        self.loaded = false;
        self.sources.clear();
        self.drawn.clear();
        self.camera = None;
    }
}

/// Shared view into a headless engine's state.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessSurface {
    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the size of the (imaginary) container.
    pub fn set_container_size(&self, size: SurfaceSize) {
        self.lock().container = size;
    }

    /// Makes initialization take `delay`.
    pub fn set_init_delay(&self, delay: Duration) {
        self.lock().init_delay = delay;
    }

    /// Makes the next initialization fail with `message`.
    pub fn fail_init_with(&self, message: impl Into<String>) {
        self.lock().init_failure = Some(message.into());
    }

    /// Makes every drawing operation fail while `fail` is set.
    pub fn fail_operations(&self, fail: bool) {
        self.lock().fail_operations = fail;
    }

    #[must_use]
    pub fn init_calls(&self) -> u32 {
        self.lock().init_calls
    }

    #[must_use]
    pub fn resize_calls(&self) -> u32 {
        self.lock().resize_calls
    }

    /// Size the engine last laid itself out for.
    #[must_use]
    pub fn viewport(&self) -> SurfaceSize {
        self.lock().viewport
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    /// Every camera move applied so far, oldest first.
    #[must_use]
    pub fn fly_to_calls(&self) -> Vec<CameraPosition> {
        self.lock().fly_to_calls.clone()
    }

    #[must_use]
    pub fn camera(&self) -> Option<CameraPosition> {
        self.lock().camera
    }

    /// Keys of the drawn decorations, sorted.
    #[must_use]
    pub fn decoration_keys(&self) -> Vec<String> {
        self.lock().drawn.keys().cloned().collect()
    }

    /// The drawn decorations as a `FeatureCollection`.
    #[must_use]
    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.lock().drawn.values().cloned().collect(),
            foreign_members: None,
        }
    }

    /// The drawn decorations as a `GeoJSON` document.
    #[must_use]
    pub fn to_geojson_string(&self) -> String {
        GeoJson::from(self.to_feature_collection()).to_string()
    }

    async fn load(&self, home: CameraPosition) -> Result<(), RenderError> {
        let delay = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(RenderError::Destroyed);
            }
            state.init_calls += 1;
            state.init_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if let Some(message) = state.init_failure.take() {
            return Err(RenderError::Engine { message });
        }
        state.loaded = true;
        state.camera = Some(home);
        drop(state);
        Ok(())
    }
}

/// Headless stand-in for a tile map library.
#[derive(Debug, Default)]
pub struct HeadlessTileEngine {
    surface: HeadlessSurface,
}

impl HeadlessTileEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto this engine's state.
    #[must_use]
    pub fn surface(&self) -> HeadlessSurface {
        self.surface.clone()
    }
}

#[async_trait]
impl TileEngine for HeadlessTileEngine {
    async fn load_style(&mut self) -> Result<(), RenderError> {
        self.surface.load(TILE_HOME).await
    }

    fn container_size(&self) -> SurfaceSize {
        self.surface.lock().container
    }

    fn layer_ids(&self) -> Vec<String> {
        let state = self.surface.lock();
        if !state.loaded {
            return Vec::new();
        }
        std::iter::once(BASE_LAYER.to_string())
            .chain(state.drawn.keys().cloned())
            .collect()
    }

    fn add_source(&mut self, id: &str, feature: Feature) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.check()?;
        if state.sources.contains_key(id) || state.drawn.contains_key(id) {
            return Err(RenderError::engine(format!("source {id} already exists")));
        }
        state.sources.insert(id.to_string(), feature);
        drop(state);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.check()?;
        state.sources.remove(id);
        drop(state);
        Ok(())
    }

    fn add_circle_layer(
        &mut self,
        id: &str,
        source: &str,
        radius: f64,
        color: &str,
    ) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.check()?;
        if state.drawn.contains_key(id) {
            return Err(RenderError::engine(format!("layer {id} already exists")));
        }
        let mut feature = state
            .sources
            .remove(source)
            .ok_or_else(|| RenderError::engine(format!("no source {source}")))?;
        let properties = feature.properties.get_or_insert_with(JsonObject::new);
        properties.insert("circleRadius".to_string(), radius.into());
        properties.insert("circleColor".to_string(), color.into());
        state.drawn.insert(id.to_string(), feature);
        drop(state);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.check()?;
        state.drawn.remove(id);
        drop(state);
        Ok(())
    }

    fn fly_to(&mut self, center: Coordinate, zoom: f64) -> Result<(), RenderError> {
        self.surface.lock().fly_to(CameraPosition {
            center,
            zoom: Some(zoom),
            height: None,
        })
    }

    fn resize(&mut self) -> Result<(), RenderError> {
        self.surface.lock().resize()
    }

    fn camera(&self) -> Option<CameraPosition> {
        self.surface.lock().camera
    }

    fn remove(&mut self) {
        self.surface.lock().teardown();
    }
}

/// Headless stand-in for a globe library.
#[derive(Debug, Default)]
pub struct HeadlessGlobeEngine {
    surface: HeadlessSurface,
}

impl HeadlessGlobeEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle onto this engine's state.
    #[must_use]
    pub fn surface(&self) -> HeadlessSurface {
        self.surface.clone()
    }
}

#[async_trait]
impl GlobeEngine for HeadlessGlobeEngine {
    async fn load_terrain(&mut self, _access_token: &str) -> Result<(), RenderError> {
        self.surface.load(GLOBE_HOME).await
    }

    fn canvas_size(&self) -> SurfaceSize {
        self.surface.lock().container
    }

    fn entity_ids(&self) -> Vec<String> {
        self.surface.lock().drawn.keys().cloned().collect()
    }

    fn add_point_entity(
        &mut self,
        id: &str,
        position: Coordinate,
        color: &str,
        pixel_size: f64,
    ) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.check()?;
        if state.drawn.contains_key(id) {
            return Err(RenderError::engine(format!("entity {id} already exists")));
        }

        let mut properties = JsonObject::new();
        properties.insert("color".to_string(), color.into());
        properties.insert("pixelSize".to_string(), pixel_size.into());
        state.drawn.insert(
            id.to_string(),
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![
                    position.longitude,
                    position.latitude,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            },
        );
        drop(state);
        Ok(())
    }

    fn remove_entity(&mut self, id: &str) -> Result<(), RenderError> {
        let mut state = self.surface.lock();
        state.check()?;
        state.drawn.remove(id);
        drop(state);
        Ok(())
    }

    fn fly_to(&mut self, position: Coordinate, height: f64) -> Result<(), RenderError> {
        self.surface.lock().fly_to(CameraPosition {
            center: position,
            zoom: None,
            height: Some(height),
        })
    }

    fn resize(&mut self) -> Result<(), RenderError> {
        self.surface.lock().resize()
    }

    fn camera(&self) -> Option<CameraPosition> {
        self.surface.lock().camera
    }

    fn destroy(&mut self) {
        self.surface.lock().teardown();
    }
}
