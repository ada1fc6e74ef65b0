//! HTTP handler functions for the CRISP API.

use actix_web::error::{InternalError, JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{Local, Utc};
use crisp_facets::{average_response_minutes, compute_summary};
use crisp_incident_models::CATEGORIES;
use crisp_server_models::{
    ApiCategory, ApiError, ApiHealth, ApiStatsSummary, IncidentQueryParams, IncidentResponse,
    IncidentsResponse, SearchQueryParams, SearchResponse, SearchResult, StatusUpdateRequest,
    StatusUpdateResponse,
};
use crisp_store::StoreError;

use crate::AppState;

fn error(status: actix_web::http::StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(ApiError {
        error: message.to_string(),
    })
}

/// Answers unparseable JSON bodies with an [`ApiError`] instead of
/// actix's plain-text default.
pub fn json_error(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    log::warn!("Rejected body for {} {}: {err}", req.method(), req.path());
    let response = error(
        actix_web::http::StatusCode::BAD_REQUEST,
        &format!("Invalid request body: {err}"),
    );
    InternalError::from_response(err, response).into()
}

/// Same as [`json_error`] for query strings.
pub fn query_error(err: QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    log::warn!("Rejected query {:?}: {err}", req.query_string());
    let response = error(
        actix_web::http::StatusCode::BAD_REQUEST,
        &format!("Invalid query string: {err}"),
    );
    InternalError::from_response(err, response).into()
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/categories`
///
/// Returns the incident category taxonomy used for filter facets.
pub async fn categories() -> HttpResponse {
    let categories: Vec<ApiCategory> = CATEGORIES.iter().map(ApiCategory::from).collect();
    HttpResponse::Ok().json(categories)
}

/// `GET /api/incidents?type=&type=&status=&since=`
///
/// `type` may repeat; each value is one category to include.
pub async fn incidents(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(req.query_string()) {
        Ok(pairs) => pairs,
        Err(e) => {
            log::warn!("Malformed incident query {:?}: {e}", req.query_string());
            return error(
                actix_web::http::StatusCode::BAD_REQUEST,
                "Malformed query string",
            );
        }
    };
    let params = IncidentQueryParams::from_pairs(pairs);

    match state.store.query(&params, Utc::now()).await {
        Ok(incidents) => HttpResponse::Ok().json(IncidentsResponse { incidents }),
        Err(StoreError::InvalidFilter { message }) => {
            error(actix_web::http::StatusCode::BAD_REQUEST, &message)
        }
        Err(e) => {
            log::error!("Failed to query incidents: {e}");
            error(
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to query incidents",
            )
        }
    }
}

/// `GET /api/incidents/{id}`
///
/// Returns one incident with its detail fields and timeline (newest
/// first).
pub async fn incident(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    match state.store.get(&id).await {
        Ok(Some(incident)) => HttpResponse::Ok().json(IncidentResponse { incident }),
        Ok(None) => error(actix_web::http::StatusCode::NOT_FOUND, "Not found"),
        Err(e) => {
            log::error!("Failed to load incident {id}: {e}");
            error(
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load incident",
            )
        }
    }
}

/// `GET /api/stats/summary`
///
/// Counters over every stored incident. "Resolved today" uses the
/// server's local calendar day.
pub async fn stats_summary(state: web::Data<AppState>) -> HttpResponse {
    match state.store.all().await {
        Ok(incidents) => {
            let summary = compute_summary(&incidents, &Local::now());
            HttpResponse::Ok().json(ApiStatsSummary {
                total_incidents: summary.total,
                active_alerts: summary.active,
                resolved_today: summary.resolved_today,
                response_time: average_response_minutes(&incidents)
                    .map(|minutes| format!("{minutes} min")),
            })
        }
        Err(e) => {
            log::error!("Failed to compute summary: {e}");
            error(
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to compute summary",
            )
        }
    }
}

/// `GET /api/search?query=`
///
/// Forwards to the configured geocoding provider. A blank query answers
/// with no results without calling the provider.
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchQueryParams>,
) -> HttpResponse {
    let query = params.query.as_deref().map_or("", str::trim);
    if query.is_empty() {
        return HttpResponse::Ok().json(SearchResponse {
            results: Vec::new(),
        });
    }

    let Some(geocoder) = &state.geocoder else {
        return error(
            actix_web::http::StatusCode::SERVICE_UNAVAILABLE,
            "Location search is not configured",
        );
    };

    match geocoder.geocode(query).await {
        Ok(candidates) => HttpResponse::Ok().json(SearchResponse {
            results: candidates
                .into_iter()
                .map(|c| SearchResult {
                    label: c.label,
                    lat: c.latitude,
                    lng: c.longitude,
                })
                .collect(),
        }),
        Err(e) => {
            log::error!("Location search for {query:?} failed: {e}");
            error(
                actix_web::http::StatusCode::BAD_GATEWAY,
                "Failed to search location",
            )
        }
    }
}

/// `PATCH /api/admin/reports` with body `{ "id": ..., "status": ... }`
///
/// Moves an incident to a new status. Resolving stamps `resolvedAt`,
/// any other status clears it.
pub async fn update_report(
    state: web::Data<AppState>,
    body: web::Json<StatusUpdateRequest>,
) -> HttpResponse {
    let StatusUpdateRequest { id, status } = body.into_inner();
    let (Some(id), Some(status)) = (id.filter(|id| !id.is_empty()), status) else {
        return error(
            actix_web::http::StatusCode::BAD_REQUEST,
            "id and status are required",
        );
    };

    match state.store.update_status(&id, status, Utc::now()).await {
        Ok(updated) => HttpResponse::Ok().json(StatusUpdateResponse { updated }),
        Err(StoreError::NotFound { .. }) => {
            error(actix_web::http::StatusCode::NOT_FOUND, "Report not found")
        }
        Err(e) => {
            log::error!("Failed to update report {id}: {e}");
            error(
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update report",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use actix_web::{App, test};
    use async_trait::async_trait;
    use chrono::Duration;
    use crisp_geocoder::{Candidate, GeocodeError, Geocoder};
    use crisp_incident_models::{Incident, IncidentDetail, IncidentStatus};
    use crisp_store::MemoryStore;
    use serde_json::Value;

    use super::*;
    use crate::configure;

    #[derive(Default)]
    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, query: &str) -> Result<Vec<Candidate>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "fail" {
                return Err(GeocodeError::RateLimited);
            }
            Ok(vec![Candidate {
                label: format!("{query}, NY"),
                latitude: Some(40.65),
                longitude: Some(-73.95),
            }])
        }
    }

    fn record(id: &str, incident_type: &str, status: IncidentStatus, hours_ago: i64) -> IncidentDetail {
        IncidentDetail {
            incident: Incident {
                id: id.to_string(),
                incident_type: incident_type.to_string(),
                status,
                location: "Main St".to_string(),
                latitude: 40.7,
                longitude: -74.0,
                reported_at: Utc::now() - Duration::hours(hours_ago),
                resolved_at: None,
            },
            title: Some(format!("Report {id}")),
            description: None,
            tracking_code: None,
            timeline: Vec::new(),
        }
    }

    fn state(geocoder: Option<Arc<CountingGeocoder>>) -> web::Data<AppState> {
        web::Data::new(AppState {
            store: Arc::new(MemoryStore::new(vec![
                record("1", "Theft", IncidentStatus::Received, 2),
                record("2", "noise", IncidentStatus::UnderInvestigation, 30),
                record("3", "theft", IncidentStatus::Received, 24 * 40),
            ])),
            geocoder: geocoder.map(|g| g as Arc<dyn Geocoder>),
        })
    }

    macro_rules! service {
        ($state:expr) => {
            test::init_service(App::new().app_data($state).configure(configure)).await
        };
    }

    fn ids(body: &Value) -> Vec<&str> {
        body["incidents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_str().unwrap())
            .collect()
    }

    #[actix_web::test]
    async fn lists_incidents_with_repeated_type_filters() {
        let app = service!(state(None));

        let req = test::TestRequest::get().uri("/api/incidents").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ids(&body), ["1", "2", "3"]);

        let req = test::TestRequest::get()
            .uri("/api/incidents?type=theft&type=noise&since=7days")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ids(&body), ["1", "2"]);

        let req = test::TestRequest::get()
            .uri("/api/incidents?type=theft&status=RECEIVED")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(ids(&body), ["1", "3"]);
    }

    #[actix_web::test]
    async fn unknown_status_filter_is_a_bad_request() {
        let app = service!(state(None));
        let req = test::TestRequest::get()
            .uri("/api/incidents?status=CLOSED")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn single_incident_and_missing_incident() {
        let app = service!(state(None));

        let req = test::TestRequest::get().uri("/api/incidents/1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["incident"]["id"], "1");
        assert_eq!(body["incident"]["title"], "Report 1");

        let req = test::TestRequest::get().uri("/api/incidents/404").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn summary_counts_every_incident() {
        let app = service!(state(None));
        let req = test::TestRequest::get().uri("/api/stats/summary").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["totalIncidents"], 3);
        assert_eq!(body["activeAlerts"], 3);
        assert_eq!(body["resolvedToday"], 0);
        assert!(body["responseTime"].is_null());
    }

    #[actix_web::test]
    async fn summary_reports_average_response_time() {
        let app = service!(state(None));
        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .set_json(serde_json::json!({ "id": "1", "status": "RESOLVED" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let req = test::TestRequest::get().uri("/api/stats/summary").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["responseTime"], "120 min");
    }

    #[actix_web::test]
    async fn malformed_bodies_get_a_json_error() {
        let app = service!(state(None));

        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .set_json(serde_json::json!({ "id": "1", "status": "CLOSED" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .insert_header(("content-type", "application/json"))
            .set_payload("{ not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn status_update_round_trip() {
        let app = service!(state(None));

        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .set_json(serde_json::json!({ "id": "1", "status": "RESOLVED" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["updated"]["status"], "RESOLVED");
        assert!(body["updated"]["resolvedAt"].is_string());

        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .set_json(serde_json::json!({ "id": "1", "status": "RECEIVED" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body["updated"]["resolvedAt"].is_null());

        let req = test::TestRequest::get().uri("/api/stats/summary").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["resolvedToday"], 0);
    }

    #[actix_web::test]
    async fn status_update_validation() {
        let app = service!(state(None));

        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .set_json(serde_json::json!({ "id": "1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let req = test::TestRequest::patch()
            .uri("/api/admin/reports")
            .set_json(serde_json::json!({ "id": "nope", "status": "RESOLVED" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn blank_search_does_not_call_the_provider() {
        let geocoder = Arc::new(CountingGeocoder::default());
        let app = service!(state(Some(Arc::clone(&geocoder))));

        let req = test::TestRequest::get().uri("/api/search?query=%20%20").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["results"], serde_json::json!([]));
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);

        let req = test::TestRequest::get().uri("/api/search?query=Brooklyn").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["results"][0]["label"], "Brooklyn, NY");
        assert_eq!(body["results"][0]["lng"], -73.95);
    }

    #[actix_web::test]
    async fn search_failures_map_to_gateway_errors() {
        let app = service!(state(Some(Arc::new(CountingGeocoder::default()))));
        let req = test::TestRequest::get().uri("/api/search?query=fail").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 502);

        let app = service!(state(None));
        let req = test::TestRequest::get().uri("/api/search?query=Queens").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn categories_and_health() {
        let app = service!(state(None));
        let req = test::TestRequest::get().uri("/api/categories").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), CATEGORIES.len());
        assert_eq!(body[0]["id"], "theft");

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["healthy"], true);
    }
}
