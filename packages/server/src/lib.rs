#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web REST gateway for the CRISP incident map.
//!
//! Serves filtered incident listings, single incidents with their
//! timeline, summary counters, the category taxonomy, a location search
//! proxy, and the moderator status update endpoint. Incidents are held in
//! a [`MemoryStore`] seeded from a JSON file.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use crisp_geocoder::Geocoder;
use crisp_geocoder::service_registry::select_geocoder;
use crisp_store::{IncidentStore, MemoryStore};

/// Default location of the incident seed file.
pub const DEFAULT_DATA_PATH: &str = "data/incidents.json";

/// Shared application state.
pub struct AppState {
    /// Incident storage.
    pub store: Arc<dyn IncidentStore>,
    /// Provider behind `/api/search`. `None` when no provider could be
    /// configured; search then answers 503.
    pub geocoder: Option<Arc<dyn Geocoder>>,
}

/// Server settings read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `BIND_ADDR`, default `127.0.0.1`.
    pub bind_addr: String,
    /// `PORT`, default `8080`.
    pub port: u16,
    /// `CRISP_DATA_PATH`, default [`DEFAULT_DATA_PATH`].
    pub data_path: PathBuf,
    /// `CRISP_GEOCODER`: a service id to force, otherwise the first usable
    /// service by priority.
    pub geocoder: Option<String>,
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_path: std::env::var("CRISP_DATA_PATH")
                .map_or_else(|_| PathBuf::from(DEFAULT_DATA_PATH), PathBuf::from),
            geocoder: std::env::var("CRISP_GEOCODER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Registers every API route under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(handlers::json_error))
            .app_data(web::QueryConfig::default().error_handler(handlers::query_error))
            .route("/health", web::get().to(handlers::health))
            .route("/categories", web::get().to(handlers::categories))
            .route("/incidents", web::get().to(handlers::incidents))
            .route("/incidents/{id}", web::get().to(handlers::incident))
            .route("/stats/summary", web::get().to(handlers::stats_summary))
            .route("/search", web::get().to(handlers::search))
            .route("/admin/reports", web::patch().to(handlers::update_report)),
    );
}

/// Starts the CRISP API server.
///
/// Loads the incident store, picks a geocoding provider, and runs the
/// Actix-Web HTTP server until shutdown. The caller provides the async
/// runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the seed file cannot be loaded,
/// or if the HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env();

    log::info!("Loading incidents from {}...", config.data_path.display());
    let store = MemoryStore::load(&config.data_path)
        .await
        .map_err(std::io::Error::other)?;

    let geocoder: Option<Arc<dyn Geocoder>> = match select_geocoder(config.geocoder.as_deref()) {
        Ok(geocoder) => Some(Arc::from(geocoder)),
        Err(e) => {
            log::error!("Location search disabled: {e}");
            None
        }
    };

    let state = web::Data::new(AppState {
        store: Arc::new(store),
        geocoder,
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}
