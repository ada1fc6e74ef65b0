//! Camera debug overlay for the globe view.

use std::fmt;

use crisp_incident_models::Coordinate;

use crate::view::MapView;
use crate::{CameraPosition, MapRenderer};

/// A snapshot of the overlay's contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugInfo {
    pub search_coords: Option<Coordinate>,
    /// `None` while the engine is not ready to report its camera.
    pub camera: Option<CameraPosition>,
    pub view: MapView,
}

impl DebugInfo {
    /// Reads the camera from `renderer`. The overlay is only shown for the
    /// globe, so other views yield `None`.
    #[must_use]
    pub fn capture(
        renderer: &dyn MapRenderer,
        search_coords: Option<Coordinate>,
        view: MapView,
    ) -> Option<Self> {
        (view == MapView::Globe).then(|| Self {
            search_coords,
            camera: renderer.camera(),
            view,
        })
    }
}

impl fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.search_coords {
            Some(c) => writeln!(f, "Search Coords: {:.4}, {:.4}", c.longitude, c.latitude)?,
            None => writeln!(f, "Search Coords: None")?,
        }
        match self.camera {
            Some(camera) => {
                writeln!(
                    f,
                    "Camera Position: {:.4}, {:.4}",
                    camera.center.longitude, camera.center.latitude
                )?;
                match camera.height {
                    Some(height) => writeln!(f, "Camera Height: {height:.0}m")?,
                    None => writeln!(f, "Camera Height: n/a")?,
                }
            }
            None => {
                writeln!(f, "Camera Position: Loading...")?;
                writeln!(f, "Camera Height: Loading...")?;
            }
        }
        write!(f, "Map View: {}", self.view)
    }
}
