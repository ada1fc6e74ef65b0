//! Geocoding providers the server can use.
//!
//! Providers are described by TOML files under `services/` that are
//! bundled into the binary. [`select_geocoder`] picks the first one that
//! can actually be built, so a missing `OpenCage` key falls back to
//! Nominatim.

use std::time::Duration;

use serde::Deserialize;

use crate::nominatim::NominatimGeocoder;
use crate::opencage::OpenCageGeocoder;
use crate::{GeocodeError, Geocoder};

/// Timeout for a single geocoding request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"opencage"`, `"nominatim"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service may be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selection order. Lower values are tried first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// `OpenCage` forward geocoding API.
    OpenCage {
        /// API endpoint (e.g., `"https://api.opencagedata.com/geocode/v1/json"`).
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
        /// Maximum candidates per query.
        #[serde(default = "default_limit")]
        limit: u32,
    },
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// API base URL (e.g., `"https://nominatim.openstreetmap.org/search"`).
        base_url: String,
        /// Maximum candidates per query.
        #[serde(default = "default_limit")]
        limit: u32,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_limit() -> u32 {
    5
}

impl GeocodingService {
    /// Builds a client for this service.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::MissingApiKey`] if the service needs a key
    /// that is not set in the environment.
    pub fn build(&self, client: reqwest::Client) -> Result<Box<dyn Geocoder>, GeocodeError> {
        match &self.provider {
            ProviderConfig::OpenCage {
                base_url,
                api_key_env,
                limit,
            } => {
                let api_key = std::env::var(api_key_env)
                    .ok()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| GeocodeError::MissingApiKey {
                        env_var: api_key_env.clone(),
                    })?;
                Ok(Box::new(OpenCageGeocoder::new(
                    client, base_url, api_key, *limit,
                )))
            }
            ProviderConfig::Nominatim { base_url, limit } => {
                Ok(Box::new(NominatimGeocoder::new(client, base_url, *limit)))
            }
        }
    }
}

/// Provider configs bundled into the binary, keyed by file name.
const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("opencage", include_str!("../services/opencage.toml")),
    ("nominatim", include_str!("../services/nominatim.toml")),
];

/// Parses the bundled configs and returns the enabled ones, lowest
/// priority value first.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if a bundled config is malformed.
pub fn enabled_services() -> Result<Vec<GeocodingService>, GeocodeError> {
    let mut services = Vec::with_capacity(SERVICE_TOMLS.len());
    for (file, source) in SERVICE_TOMLS {
        let service: GeocodingService =
            toml::de::from_str(source).map_err(|e| GeocodeError::Parse {
                message: format!("geocoding service config {file}: {e}"),
            })?;
        if service.enabled {
            services.push(service);
        } else {
            log::debug!("Geocoding service {} is disabled", service.id);
        }
    }
    services.sort_by_key(|s| s.priority);
    Ok(services)
}

/// Builds the shared HTTP client used by geocoding providers.
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if the client cannot be constructed.
pub fn http_client() -> Result<reqwest::Client, GeocodeError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("crisp/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Picks a geocoder from the bundled services.
///
/// With `preferred` set, only that service id is considered. Otherwise
/// enabled services are tried in priority order and the first one whose
/// requirements (e.g. an API key) are met wins.
///
/// # Errors
///
/// Returns [`GeocodeError`] if no service can be built.
pub fn select_geocoder(preferred: Option<&str>) -> Result<Box<dyn Geocoder>, GeocodeError> {
    let services = enabled_services()?;
    let (service, geocoder) = choose(&services, preferred, &http_client()?)?;
    log::info!("Using geocoding service {}", service.name);
    Ok(geocoder)
}

fn choose<'a>(
    services: &'a [GeocodingService],
    preferred: Option<&str>,
    client: &reqwest::Client,
) -> Result<(&'a GeocodingService, Box<dyn Geocoder>), GeocodeError> {
    if let Some(id) = preferred {
        let service = services
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| GeocodeError::Parse {
                message: format!("Unknown or disabled geocoding service: {id}"),
            })?;
        return Ok((service, service.build(client.clone())?));
    }

    let mut last_error = None;
    for service in services {
        match service.build(client.clone()) {
            Ok(geocoder) => return Ok((service, geocoder)),
            Err(e) => {
                log::warn!("Skipping geocoding service {}: {e}", service.id);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| GeocodeError::Parse {
        message: "No geocoding services are enabled".to_string(),
    }))
}
