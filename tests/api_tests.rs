//! HTTP API tests driven through the router with `oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use hazard_edge::{
    create_app, ActuatorCommand, ActuatorController, AppState, DeviceLink, ReadingStore,
    SimulatedDevice, WebConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApi {
    app: Router,
    store: ReadingStore,
    device: Option<Arc<SimulatedDevice>>,
}

async fn api(with_device: bool) -> TestApi {
    let store = ReadingStore::in_memory("readings").await.unwrap();
    let config = WebConfig::default().with_feed_interval(Duration::from_millis(10));
    let mut state = AppState::new(config.feed_service(store.clone()), &config);

    let device = with_device.then(|| Arc::new(SimulatedDevice::default()));
    if let Some(device) = &device {
        let link = DeviceLink::new(device.clone());
        state = state.with_actuator(Arc::new(ActuatorController::new(link)));
    }

    TestApi {
        app: create_app(&config, state),
        store,
        device,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn empty_store_returns_empty_list() {
    let api = api(false).await;
    let (status, body) = send(&api.app, get("/readings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn ingest_round_trip() {
    let api = api(false).await;
    let payload = json!({"LPG": 12.5, "CH4": 30, "CO": 4, "Temperature": 26.1});

    let (status, body) = send(&api.app, post_json("/readings", payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");

    let (status, body) = send(&api.app, get("/readings")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"lpg": 12.5, "ch4": 30.0, "co": 4.0, "temp": 26.1}])
    );
}

#[tokio::test]
async fn incomplete_payload_is_rejected_without_write() {
    let api = api(false).await;
    let payload = json!({"LPG": 12.5, "CH4": 30, "CO": 4});

    let (status, body) = send(&api.app, post_json("/readings", payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "error");
    assert_eq!(api.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_numeric_payload_is_rejected() {
    let api = api(false).await;
    let payload = json!({"LPG": "lots", "CH4": 30, "CO": 4, "Temperature": 20});

    let (status, _) = send(&api.app, post_json("/readings", payload)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(api.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn unparsable_body_gets_error_status() {
    let api = api(false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/readings")
        .header("content-type", "application/json")
        .body(Body::from("LPG:1,CH4:2"))
        .unwrap();

    let (status, body) = send(&api.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["detail"].is_string());
    assert_eq!(api.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn missing_content_type_gets_error_status() {
    let api = api(false).await;
    let request = Request::builder()
        .method("POST")
        .uri("/readings")
        .body(Body::from(r#"{"LPG":1,"CH4":2,"CO":3,"Temperature":4}"#))
        .unwrap();

    let (status, body) = send(&api.app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn invalid_command_has_no_side_effects() {
    let api = api(true).await;

    let (status, body) = send(&api.app, get("/response_system/explode")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"status": "invalid"}));

    let device = api.device.as_ref().unwrap();
    assert!(device.commands().await.is_empty());
}

#[tokio::test]
async fn engage_reaches_the_device() {
    let api = api(true).await;

    let (status, body) = send(&api.app, get("/response_system/engage")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "engaged"}));

    let (_, body) = send(&api.app, get("/response_system")).await;
    assert_eq!(body, json!({"status": "engaged"}));

    let (status, _) = send(&api.app, get("/response_system/disengage")).await;
    assert_eq!(status, StatusCode::OK);

    let device = api.device.as_ref().unwrap();
    assert_eq!(
        device.commands().await,
        vec![ActuatorCommand::Engage, ActuatorCommand::Disengage]
    );
}

#[tokio::test]
async fn actuator_without_device_is_unavailable() {
    let api = api(false).await;
    let (status, body) = send(&api.app, get("/response_system/engage")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"status": "unavailable"}));
}

#[tokio::test]
async fn health_reports_store_and_actuator() {
    let api = api(true).await;
    let (status, body) = send(&api.app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "ok");
    assert_eq!(body["actuator"], "unknown");
    assert_eq!(body["subscribers"], 0);
}

#[tokio::test]
async fn stream_emits_sentinel_until_data_exists() {
    let api = api(false).await;
    let response = api.app.clone().oneshot(get("/readings/stream")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/x-ndjson"
    );

    let mut body = response.into_body().into_data_stream();
    let chunk = body.next().await.unwrap().unwrap();
    let frame: Value = serde_json::from_slice(&chunk).unwrap();
    assert_eq!(
        frame,
        json!({"lpg": null, "ch4": null, "co": null, "temp": null})
    );
}
