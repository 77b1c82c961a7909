//! # Handlers
//!
//! Each handler unpacks the HTTP request, calls one engine operation and
//! records the outcome. No matching logic lives here.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use domains::{BloodRequest, Coordinates, InventoryRecord, NewBloodRequest};
use services::{ArrivalCheck, DashboardStats, DonorProfileView, NearbyBank, RequestDetail, ResponseView};
use uuid::Uuid;

use crate::dto::{
    AlertModeBody, AlertModeView, BroadcastView, CancelBody, DonorQuery, FulfillBody, HospitalQuery, InventoryBody,
    PointQuery, RespondBody, ViewerQuery,
};
use crate::error::ApiError;
use crate::router::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Counts the outcome, then converts the engine error.
fn observe<T>(state: &AppState, operation: &str, result: domains::Result<T>) -> ApiResult<T> {
    match &result {
        Ok(_) => state.metrics.record(operation, "ok"),
        Err(e) => state.metrics.record(operation, e.code()),
    }
    result.map_err(ApiError::from)
}

fn observe_broadcast(
    state: &AppState,
    operation: &str,
    result: domains::Result<services::Broadcast>,
) -> ApiResult<BroadcastView> {
    let broadcast = observe(state, operation, result)?;
    state.metrics.record_dispatch(broadcast.delivered.len(), broadcast.failed.len());
    Ok(broadcast.into())
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn scrape_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let text = state
        .metrics
        .render()
        .map_err(|e| ApiError { status: 500, code: "metrics", message: e.to_string() })?;
    Ok(([(header::CONTENT_TYPE, "application/openmetrics-text; version=1.0.0; charset=utf-8")], text))
}

pub async fn create_request(
    State(state): State<AppState>,
    payload: Result<Json<NewBloodRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BroadcastView>)> {
    let Json(input) = payload?;
    let view = observe_broadcast(&state, "create_request", state.engine.create_request(input).await)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn escalate(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<BroadcastView>> {
    let Path(id) = id?;
    let view = observe_broadcast(&state, "escalate", state.engine.escalate(id).await)?;
    Ok(Json(view))
}

pub async fn respond(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RespondBody>, JsonRejection>,
) -> ApiResult<Json<BloodRequest>> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let request = observe(&state, "respond", state.engine.respond(id, body.donor_id, body.decision).await)?;
    Ok(Json(request))
}

pub async fn responses(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<HospitalQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ResponseView>>> {
    let Path(id) = id?;
    let Query(query) = query?;
    let views = observe(&state, "responses", state.engine.responses_for(id, query.hospital_id).await)?;
    Ok(Json(views))
}

pub async fn arrival(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DonorQuery>, QueryRejection>,
) -> ApiResult<Json<ArrivalCheck>> {
    let Path(id) = id?;
    let Query(query) = query?;
    let check = observe(&state, "check_arrival", state.engine.check_arrival(id, query.donor_id).await)?;
    Ok(Json(check))
}

pub async fn fulfill(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<FulfillBody>, JsonRejection>,
) -> ApiResult<Json<BloodRequest>> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let request = observe(&state, "fulfill", state.engine.fulfill(id, body.bank_id).await)?;
    Ok(Json(request))
}

pub async fn cancel(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CancelBody>, JsonRejection>,
) -> ApiResult<Json<BloodRequest>> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let request = observe(&state, "cancel", state.engine.cancel(id, body.hospital_id).await)?;
    Ok(Json(request))
}

pub async fn request_detail(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ViewerQuery>, QueryRejection>,
) -> ApiResult<Json<RequestDetail>> {
    let Path(id) = id?;
    let Query(query) = query?;
    let detail = observe(&state, "request_detail", state.engine.request_detail(id, query.donor_id).await)?;
    Ok(Json(detail))
}

pub async fn pending_requests(State(state): State<AppState>) -> ApiResult<Json<Vec<BloodRequest>>> {
    let pending = observe(&state, "pending_requests", state.engine.pending_requests().await)?;
    Ok(Json(pending))
}

pub async fn donor_profile(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<DonorProfileView>> {
    let Path(id) = id?;
    let profile = observe(&state, "donor_profile", state.engine.donor_profile(id).await)?;
    Ok(Json(profile))
}

pub async fn hospital_dashboard(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<DashboardStats>> {
    let Path(id) = id?;
    let stats = observe(&state, "hospital_dashboard", state.engine.hospital_dashboard(id).await)?;
    Ok(Json(stats))
}

pub async fn inventory(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Vec<InventoryRecord>>> {
    let Path(id) = id?;
    let records = observe(&state, "inventory", state.engine.inventory(id).await)?;
    Ok(Json(records))
}

pub async fn update_inventory(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<InventoryBody>, JsonRejection>,
) -> ApiResult<Json<InventoryRecord>> {
    let Path(id) = id?;
    let Json(body) = payload?;
    let record = observe(
        &state,
        "update_inventory",
        state.engine.update_inventory(id, body.blood_type, body.units).await,
    )?;
    Ok(Json(record))
}

pub async fn nearby_banks(
    State(state): State<AppState>,
    query: Result<Query<PointQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<NearbyBank>>> {
    let Query(point) = query?;
    let origin = Coordinates::new(point.lat, point.lng).map_err(ApiError::from)?;
    let banks = observe(&state, "nearby_banks", state.engine.nearby_blood_banks(origin).await)?;
    Ok(Json(banks))
}

pub async fn alert_mode(State(state): State<AppState>) -> Json<AlertModeView> {
    Json(AlertModeView { mode: state.engine.alert_mode() })
}

pub async fn switch_alert_mode(
    State(state): State<AppState>,
    payload: Result<Json<AlertModeBody>, JsonRejection>,
) -> ApiResult<Json<AlertModeView>> {
    let Json(body) = payload?;
    let mode = observe(&state, "switch_alert_mode", state.engine.switch_alert_mode(body.admin_id, body.mode).await)?;
    state.metrics.set_disaster_mode(mode == services::AlertMode::Disaster);
    Ok(Json(AlertModeView { mode }))
}
