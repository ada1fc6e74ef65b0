#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the CRISP incident map.
//!
//! Runs the map page against a CRISP API server with headless render
//! engines: list incidents under a filter, print the sidebar, center the
//! map on a searched location, or export the rendered decorations as
//! `GeoJSON`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use crisp_filter::{
    DateRange, FilterSpec, FilterStateManager, FilterUpdate, HttpIncidentGateway, StatusFilter,
};
use crisp_geocoder::crisp::CrispSearch;
use crisp_geocoder::search::SearchOutcome;
use crisp_geocoder::service_registry::http_client;
use crisp_map::MapPage;
use crisp_render::globe::GlobeSurface;
use crisp_render::headless::{HeadlessGlobeEngine, HeadlessSurface, HeadlessTileEngine};
use crisp_render::tile::TileSurface;
use crisp_render::view::{ActiveMap, MapView};
use crisp_render::{RenderError, RenderState, RenderSynchronizer, SurfaceSize};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

/// Size of the headless map containers.
const VIEWPORT: SurfaceSize = SurfaceSize::new(1280, 800);

const READY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "crisp", about = "CRISP incident map driver")]
struct Cli {
    /// Base URL of the CRISP API server (overrides `CRISP_API_URL`)
    #[arg(long)]
    api_url: Option<String>,
    /// Map view to drive: `2d` (tile map) or `3d` (globe, needs
    /// `CESIUM_ION_TOKEN`)
    #[arg(long, default_value = "2d")]
    view: MapView,
    #[command(flatten)]
    filter: FilterArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct FilterArgs {
    /// Category id to include; repeat for several (e.g. `--type theft --type noise`)
    #[arg(long = "type", global = true)]
    types: Vec<String>,
    /// Time window: 24hours, 7days, 30days, 90days or custom
    #[arg(long, global = true)]
    range: Option<DateRange>,
    /// Status code (RECEIVED, `UNDER_INVESTIGATION`, RESOLVED) or "all"
    #[arg(long, global = true)]
    status: Option<StatusFilter>,
}

impl FilterArgs {
    fn to_spec(&self) -> FilterSpec {
        FilterSpec::default().merge(FilterUpdate {
            crime_types: Some(self.types.clone()),
            date_range: self.range,
            status: self.status,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the incidents matching the filters, newest first
    Incidents,
    /// Print the sidebar (summary, category counts, recent activity) as JSON
    Sidebar,
    /// Search for a location and center the map on it
    Search {
        /// Free-text location (address, city, landmark)
        query: String,
    },
    /// Export the rendered incident markers as a `GeoJSON` `FeatureCollection`
    Export {
        /// Output file. Prints to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

type Page = MapPage<HttpIncidentGateway, CrispSearch>;

/// A mounted page plus handles onto both headless engines.
struct Session {
    page: Page,
    tile: RenderSynchronizer<TileSurface<HeadlessTileEngine>>,
    globe: RenderSynchronizer<GlobeSurface<HeadlessGlobeEngine>>,
    tile_surface: HeadlessSurface,
    globe_surface: HeadlessSurface,
}

impl Session {
    async fn open(cli: &Cli) -> Result<Self, Box<dyn std::error::Error>> {
        let api_url = cli
            .api_url
            .clone()
            .or_else(|| std::env::var("CRISP_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = std::env::var("CESIUM_ION_TOKEN").ok();

        log::info!("Using CRISP API at {api_url}");

        let gateway = HttpIncidentGateway::new(&api_url)?;
        let geocoder = CrispSearch::new(http_client()?, &api_url);

        let tile_engine = HeadlessTileEngine::new();
        let globe_engine = HeadlessGlobeEngine::new();
        let tile_surface = tile_engine.surface();
        let globe_surface = globe_engine.surface();
        tile_surface.set_container_size(VIEWPORT);
        globe_surface.set_container_size(VIEWPORT);

        let tile = RenderSynchronizer::new(TileSurface::new(tile_engine));
        let globe = RenderSynchronizer::new(GlobeSurface::new(globe_engine, token));
        let map = ActiveMap::new(Box::new(tile.clone()), Box::new(globe.clone()), MapView::Tile);

        let mut page = MapPage::new(
            FilterStateManager::new(gateway, cli.filter.to_spec()),
            geocoder,
            map,
        );

        // The feed loads through the tile map, then the globe takes over.
        page.mount().await?;
        if cli.view != MapView::Tile {
            page.switch_view(cli.view).await?;
        }

        let session = Self {
            page,
            tile,
            globe,
            tile_surface,
            globe_surface,
        };
        session.wait_ready().await?;
        Ok(session)
    }

    fn active_surface(&self) -> &HeadlessSurface {
        match self.page.view() {
            MapView::Tile => &self.tile_surface,
            MapView::Globe => &self.globe_surface,
        }
    }

    async fn wait_ready(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut states = match self.page.view() {
            MapView::Tile => self.tile.subscribe(),
            MapView::Globe => self.globe.subscribe(),
        };
        let state = *tokio::time::timeout(
            READY_TIMEOUT,
            states.wait_for(|s| *s == RenderState::Ready || s.is_terminal()),
        )
        .await??;

        if state == RenderState::Ready {
            Ok(())
        } else {
            Err(RenderError::engine(format!("map ended up {state}")).into())
        }
    }

    fn close(mut self) {
        self.page.unmount();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let mut session = Session::open(&cli).await?;

    match &cli.command {
        Commands::Incidents => {
            let incidents = session.page.incidents();
            println!(
                "{:<12} {:<20} {:<20} {:<24} LOCATION",
                "ID", "TYPE", "STATUS", "REPORTED"
            );
            println!("{}", "-".repeat(100));
            for incident in incidents.iter() {
                println!(
                    "{:<12} {:<20} {:<20} {:<24} {}",
                    incident.id,
                    incident.incident_type,
                    incident.status.label(),
                    incident
                        .reported_at
                        .with_timezone(&Local)
                        .format("%Y-%m-%d %H:%M"),
                    incident.location,
                );
            }
            println!();
            println!("{} incidents", incidents.len());
        }
        Commands::Sidebar => {
            let sidebar = session.page.sidebar(&Local::now());
            println!("{}", serde_json::to_string_pretty(&sidebar)?);
        }
        Commands::Search { query } => match session.page.search(query).await {
            SearchOutcome::Skipped => println!("Nothing to search for."),
            SearchOutcome::Found { coordinate, label } => {
                println!(
                    "{label} ({:.5}, {:.5})",
                    coordinate.latitude, coordinate.longitude
                );
                if let Some(camera) = session.active_surface().camera() {
                    println!(
                        "Map centered on {:.5}, {:.5}",
                        camera.center.latitude, camera.center.longitude
                    );
                }
                if let Some(info) = session.page.debug_info() {
                    println!();
                    println!("{info}");
                }
            }
            SearchOutcome::Failed(notice) => {
                log::warn!("Search for {query:?} failed: {notice}");
                println!("{notice}");
            }
        },
        Commands::Export { output } => {
            session.page.sync();
            let geojson = session.active_surface().to_geojson_string();
            match output {
                Some(path) => {
                    tokio::fs::write(path, &geojson).await?;
                    log::info!(
                        "Wrote {} markers to {}",
                        session.active_surface().decoration_keys().len(),
                        path.display()
                    );
                }
                None => println!("{geojson}"),
            }
        }
    }

    session.close();
    Ok(())
}
