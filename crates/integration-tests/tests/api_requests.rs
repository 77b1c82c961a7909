//! HTTP surface over the shared fixture world: alerts recorded by the
//! notifier, the manual clock and state changes visible through the API.

use api_adapters::{build_router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use domains::geo::offset_north;
use domains::{BloodType, RequestStatus};
use integration_tests::{email_of, World, DELHI};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(world: &World) -> Router {
    build_router(AppState::new(world.engine.clone()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn disaster_alert_escalation_and_arrival_over_http() {
    let world = World::new();
    let app = app(&world);
    let hospital = world.hospital("City General", DELHI);
    let near = world.donor_at("Near", BloodType::ONeg, DELHI, 0.2);
    let mid = world.donor_at("Mid", BloodType::ONeg, DELHI, 12.0);
    let admin = world.admin("Root");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/admin/alert-mode",
        Some(json!({ "admin_id": admin, "mode": "disaster" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, created) = send(
        &app,
        "POST",
        "/api/requests",
        Some(json!({ "hospital_id": hospital, "blood_type": "O-", "units": 1, "urgency": "high" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["notified"], json!([near]));
    assert_eq!(created["request"]["search_radius_km"], 10.0);
    let id = created["request"]["id"].as_str().unwrap().to_owned();
    assert_eq!(
        world.notifier.sent_to(&email_of("Near"))[0].subject,
        "EMERGENCY BLOOD ALERT - DISASTER MODE"
    );

    let (status, widened) = send(&app, "POST", &format!("/api/requests/{id}/escalate"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(widened["notified"], json!([mid]));
    assert_eq!(widened["request"]["search_stage"], 2);

    let (status, check) = send(&app, "GET", &format!("/api/requests/{id}/arrival?donor_id={near}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["arrived"], true);

    let (status, body) = send(&app, "GET", &format!("/api/requests/{id}/arrival?donor_id={mid}"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "outside_geofence");

    let (status, detail) = send(&app, "GET", &format!("/api/requests/{id}?donor_id={mid}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!((detail["distance_km"].as_f64().unwrap() - 12.0).abs() < 1e-6);
}

#[tokio::test]
async fn settlement_conflicts_map_to_409() {
    let world = World::new();
    let app = app(&world);
    let hospital = world.hospital("City General", DELHI);
    let bank = world.blood_bank("Red Cross", offset_north(DELHI, 3.0));

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/banks/{bank}/inventory"),
        Some(json!({ "blood_type": "B-", "units": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let id = world.open(hospital, BloodType::BNeg, 2).await.request.id;
    let (status, body) =
        send(&app, "POST", &format!("/api/requests/{id}/fulfill"), Some(json!({ "bank_id": bank }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");

    let (status, cancelled) =
        send(&app, "POST", &format!("/api/requests/{id}/cancel"), Some(json!({ "hospital_id": hospital }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(world.stored(id).await.status, RequestStatus::Cancelled);

    let (status, body) =
        send(&app, "POST", &format!("/api/requests/{id}/cancel"), Some(json!({ "hospital_id": hospital }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_cancelled");

    let (status, body) = send(&app, "POST", &format!("/api/requests/{id}/escalate"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "request_not_available");
    assert_eq!(world.units(bank, BloodType::BNeg).await, 1);
}
