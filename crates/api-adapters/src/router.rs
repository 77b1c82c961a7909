//! Axum router configuration
//!
//! ```text
//! /
//! ├── /api/requests/*        - request lifecycle (hospitals, donors, banks)
//! ├── /api/donors/{id}       - donor profile
//! ├── /api/hospitals/{id}/*  - hospital dashboard
//! ├── /api/banks/*           - inventory and nearby banks
//! ├── /api/admin/alert-mode  - disaster wording switch
//! ├── /metrics               - Prometheus scrape
//! └── /health
//! ```

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use services::MatchingEngine;

use crate::handlers::*;
use crate::metrics::ApiMetrics;
use crate::middleware;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    pub fn new(engine: Arc<MatchingEngine>) -> Self {
        let metrics = ApiMetrics::new();
        metrics.set_disaster_mode(engine.alert_mode() == services::AlertMode::Disaster);
        Self { engine, metrics: Arc::new(metrics) }
    }
}

/// The complete router with tracing, request id and CORS layers applied.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .nest("/api/requests", request_router())
        .route("/api/donors/{id}", get(donor_profile))
        .route("/api/hospitals/{id}/dashboard", get(hospital_dashboard))
        .nest("/api/banks", bank_router())
        .route("/api/admin/alert-mode", get(alert_mode).put(switch_alert_mode))
        .route("/metrics", get(scrape_metrics))
        .route("/health", get(health))
        .with_state(state);
    middleware::with_standard_layers(router)
}

/// Routes:
/// - `POST /`                  - open a request and alert stage-1 donors
/// - `GET  /pending`           - pending requests, most urgent first
/// - `GET  /{id}`              - detail, with distance when `donor_id` is given
/// - `POST /{id}/escalate`     - widen the search radius
/// - `POST /{id}/responses`    - donor accept/decline
/// - `GET  /{id}/responses`    - responses as the owning hospital sees them
/// - `GET  /{id}/arrival`      - geofence check for a donor
/// - `POST /{id}/fulfill`      - settle against a blood bank's stock
/// - `POST /{id}/cancel`       - owning hospital withdraws the request
fn request_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request))
        .route("/pending", get(pending_requests))
        .route("/{id}", get(request_detail))
        .route("/{id}/escalate", post(escalate))
        .route("/{id}/responses", post(respond).get(responses))
        .route("/{id}/arrival", get(arrival))
        .route("/{id}/fulfill", post(fulfill))
        .route("/{id}/cancel", post(cancel))
}

fn bank_router() -> Router<AppState> {
    Router::new()
        .route("/nearby", get(nearby_banks))
        .route("/{id}/inventory", get(inventory).put(update_inventory))
}
