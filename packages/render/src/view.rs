//! The 2-D / 3-D toggle.

use std::sync::Arc;

use crisp_incident_models::{Coordinate, Incident};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{MapRenderer, RenderError, RenderState};

/// Which strategy the page shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum MapView {
    #[default]
    #[strum(serialize = "2d")]
    Tile,
    #[strum(serialize = "3d")]
    Globe,
}

impl MapView {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Tile => Self::Globe,
            Self::Globe => Self::Tile,
        }
    }
}

/// One renderer per strategy, with commands going to the selected one.
///
/// The inactive renderer is left as it is; it is initialized the first
/// time it is selected.
pub struct ActiveMap {
    tile: Box<dyn MapRenderer>,
    globe: Box<dyn MapRenderer>,
    view: MapView,
}

impl ActiveMap {
    #[must_use]
    pub fn new(tile: Box<dyn MapRenderer>, globe: Box<dyn MapRenderer>, view: MapView) -> Self {
        Self { tile, globe, view }
    }

    #[must_use]
    pub const fn view(&self) -> MapView {
        self.view
    }

    /// The renderer for the selected view.
    #[must_use]
    pub fn active(&self) -> &dyn MapRenderer {
        self.renderer(self.view)
    }

    #[must_use]
    pub fn renderer(&self, view: MapView) -> &dyn MapRenderer {
        match view {
            MapView::Tile => self.tile.as_ref(),
            MapView::Globe => self.globe.as_ref(),
        }
    }

    /// Initializes the selected renderer if it has not been yet.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the engine fails to initialize.
    pub async fn ensure_initialized(&self) -> Result<(), RenderError> {
        let renderer = self.active();
        if renderer.state() == RenderState::Uninitialized {
            renderer.init().await?;
        }
        Ok(())
    }

    /// Selects `view` and brings it up to date with `incidents` and the
    /// last search coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the newly selected engine fails to
    /// initialize. The selection still changes.
    pub async fn switch_to(
        &mut self,
        view: MapView,
        incidents: Arc<[Incident]>,
        search: Option<Coordinate>,
    ) -> Result<(), RenderError> {
        if view == self.view {
            return Ok(());
        }
        log::info!("Switching map view from {} to {view}", self.view);
        self.view = view;

        let renderer = self.active();
        renderer.set_incidents(incidents);
        if let Some(target) = search {
            renderer.fly_to(target);
        }
        self.ensure_initialized().await
    }

    pub fn set_incidents(&self, incidents: Arc<[Incident]>) {
        self.active().set_incidents(incidents);
    }

    pub fn fly_to(&self, target: Coordinate) {
        self.active().fly_to(target);
    }

    pub fn resize(&self) {
        self.active().resize();
    }

    /// Tears down both renderers.
    pub fn destroy(&self) {
        self.tile.destroy();
        self.globe.destroy();
    }
}
