#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Keeps a map rendering engine in sync with the incident feed and the
//! search box.
//!
//! Two engine strategies exist, a 2-D tile map ([`tile::TileSurface`]) and
//! a 3-D globe ([`globe::GlobeSurface`]). Both are driven by the same
//! [`synchronizer::RenderSynchronizer`], which owns the engine for its
//! whole lifetime and implements [`MapRenderer`]:
//!
//! - the engine is initialized at most once,
//! - readiness is detected by polling the render surface for a non-zero
//!   size, bounded by [`synchronizer::MAX_READY_POLLS`],
//! - camera commands issued before the engine is ready are held back and
//!   the latest one is applied once it is,
//! - incident decorations are replaced wholesale on every update,
//! - teardown cancels the poll and releases the engine.
//!
//! [`view::ActiveMap`] holds one renderer per strategy and forwards to
//! whichever the 2-D/3-D toggle selects.

pub mod debug;
pub mod globe;
pub mod headless;
pub mod synchronizer;
pub mod tile;
pub mod view;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use crisp_incident_models::{CategoryDef, Coordinate, Incident, IncidentStatus, color_for};
use strum_macros::{AsRefStr, Display};

pub use synchronizer::RenderSynchronizer;

/// Prefix of every decoration key placed on a surface.
pub const DECORATION_PREFIX: &str = "incident-";

/// Errors raised by rendering engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The 3-D engine needs an access token and none was configured.
    #[error("Missing access token for the globe engine")]
    MissingAccessToken,

    /// The engine reported a failure.
    #[error("Engine error: {message}")]
    Engine {
        /// Description from the engine.
        message: String,
    },

    /// The render surface never reported a usable size.
    #[error("Render surface not ready after {attempts} polls")]
    ReadinessTimeout {
        /// Number of polls made.
        attempts: u32,
    },

    /// The renderer was torn down.
    #[error("Renderer destroyed")]
    Destroyed,
}

impl RenderError {
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}

/// Lifecycle of a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RenderState {
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal. Initialization failed or the surface never became ready.
    Failed,
    /// Terminal. Engine resources have been released.
    Destroyed,
}

impl RenderState {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Destroyed)
    }
}

/// Render surface dimensions in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A surface with no area cannot be drawn on yet.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Where an engine's camera currently is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPosition {
    pub center: Coordinate,
    /// Tile zoom level, for 2-D engines.
    pub zoom: Option<f64>,
    /// Height above the ellipsoid in meters, for 3-D engines.
    pub height: Option<f64>,
}

/// One incident marker as placed on a surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoration {
    /// Surface-wide key, `incident-{id}`.
    pub key: String,
    pub incident_id: String,
    pub coordinate: Coordinate,
    pub color: &'static str,
    pub incident_type: String,
    pub status: IncidentStatus,
}

/// Turns an incident snapshot into decorations.
///
/// Incidents without finite coordinates are skipped, as are repeated ids
/// (the first one wins). Colors come from the category taxonomy with the
/// neutral color for unknown types.
#[must_use]
pub fn project(incidents: &[Incident], categories: &[CategoryDef]) -> Vec<Decoration> {
    let mut seen = BTreeSet::new();
    let mut skipped = 0_usize;

    let decorations: Vec<Decoration> = incidents
        .iter()
        .filter_map(|incident| {
            let Some(coordinate) = incident.coordinate() else {
                skipped += 1;
                return None;
            };
            if !seen.insert(incident.id.as_str()) {
                log::warn!("Duplicate incident id {} in snapshot", incident.id);
                return None;
            }
            Some(Decoration {
                key: format!("{DECORATION_PREFIX}{}", incident.id),
                incident_id: incident.id.clone(),
                coordinate,
                color: color_for(categories, &incident.incident_type),
                incident_type: incident.incident_type.clone(),
                status: incident.status,
            })
        })
        .collect();

    if skipped > 0 {
        log::debug!("Skipped {skipped} incidents without usable coordinates");
    }
    decorations
}

/// A rendering engine the synchronizer can drive.
///
/// Implemented by [`tile::TileSurface`] and [`globe::GlobeSurface`]. None
/// of the methods may panic; failures are returned and logged by the
/// caller.
#[async_trait]
pub trait Engine: Send + 'static {
    /// Short name for log messages.
    fn name(&self) -> &'static str;

    /// Prepares the engine (style download, terrain load, ...).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the engine cannot be brought up. This is
    /// terminal for the renderer.
    async fn init(&mut self) -> Result<(), RenderError>;

    /// Current size of the container the engine draws into.
    fn surface_size(&self) -> SurfaceSize;

    /// Removes every incident decoration and adds `decorations`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the engine rejects a change.
    fn replace_decorations(&mut self, decorations: &[Decoration]) -> Result<(), RenderError>;

    /// Moves the camera to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the engine rejects the move.
    fn fly_to(&mut self, target: Coordinate) -> Result<(), RenderError>;

    /// Redraws for a container of `size`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the engine fails to resize.
    fn resize(&mut self, size: SurfaceSize) -> Result<(), RenderError>;

    /// Current camera, if the engine can report one.
    fn camera(&self) -> Option<CameraPosition>;

    /// Releases every engine resource.
    fn destroy(&mut self);
}

/// The map interface the page talks to, independent of strategy.
#[async_trait]
pub trait MapRenderer: Send + Sync {
    /// Initializes the engine. Calls after the first are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the engine failed to initialize.
    async fn init(&self) -> Result<(), RenderError>;

    /// Replaces the rendered incidents with `incidents`.
    fn set_incidents(&self, incidents: Arc<[Incident]>);

    /// Centers the camera on `target`, now or once the engine is ready.
    fn fly_to(&self, target: Coordinate);

    /// Re-measures the container and resizes the engine if it changed.
    fn resize(&self);

    /// Tears the engine down. Terminal.
    fn destroy(&self);

    fn state(&self) -> RenderState;

    /// Current camera, while the engine is ready.
    fn camera(&self) -> Option<CameraPosition>;
}
