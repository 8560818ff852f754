//! Integration tests for the HTTP API
//!
//! Tests API endpoints against a live controller with scripted mocks

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use proctor0::core::create_router;
use proctor0::types::SessionState;
use serde_json::Value;
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_health_endpoint() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, _task) = spawn_session(&service, &camera);
    wait_until(&handle, |s| s.connectivity.connected).await;

    let response = create_router(handle)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["session_state"], "SETUP");
    assert_eq!(json["service_connected"], true);
}

#[tokio::test(start_paused = true)]
async fn test_session_snapshot_shape() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, _task) = spawn_session(&service, &camera);
    wait_until(&handle, |s| s.connectivity.server_calibration_step.is_some()).await;

    let response = create_router(handle)
        .oneshot(Request::builder().uri("/session").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_state"], "SETUP");
    assert_eq!(json["connectivity"]["connected"], true);
    assert_eq!(json["connectivity"]["calibrated_on_server"], false);
    assert_eq!(json["connectivity"]["tracking_started"], false);
    assert_eq!(json["monitoring"]["running"], false);
    assert_eq!(json["camera_ready"], false);
    assert!(json["calibration"].is_null());
    assert!(json["messages"].is_array());
}

#[tokio::test(start_paused = true)]
async fn test_start_calibration_accepted() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, _task) = spawn_session(&service, &camera);
    let app = create_router(handle.clone());

    let response = app.oneshot(post("/session/calibration/start")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert!(json["session_state"].is_string());

    let snap = wait_until(&handle, |s| s.session_state == SessionState::Calibrating).await;
    assert_eq!(snap.calibration.unwrap().total_steps, 5);
}

#[tokio::test(start_paused = true)]
async fn test_full_calibration_flow() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, _task) = spawn_session(&service, &camera);
    let app = create_router(handle.clone());

    app.clone().oneshot(post("/session/calibration/start")).await.unwrap();
    wait_until(&handle, |s| s.camera_ready).await;

    for step in 1..5u32 {
        let response = app.clone().oneshot(post("/session/calibration/step")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        wait_until(&handle, |s| {
            s.calibration.as_ref().is_some_and(|p| p.current_step == step)
        })
        .await;
    }

    app.clone().oneshot(post("/session/calibration/step")).await.unwrap();
    wait_until(&handle, |s| s.monitoring.running).await;

    let response = app.clone().oneshot(post("/session/monitoring/pause")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let snap = wait_until(&handle, |s| !s.monitoring.running).await;
    assert_eq!(snap.session_state, SessionState::Monitoring);

    app.oneshot(post("/session/monitoring/resume")).await.unwrap();
    wait_until(&handle, |s| s.monitoring.running).await;
}

#[tokio::test(start_paused = true)]
async fn test_skip_endpoint_refused_when_uncalibrated() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, _task) = spawn_session(&service, &camera);
    wait_until(&handle, |s| s.connectivity.server_calibration_step.is_some()).await;

    let response = create_router(handle.clone())
        .oneshot(post("/session/monitoring/skip"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let snap = wait_until(&handle, |s| !s.messages.is_empty()).await;
    assert_eq!(snap.session_state, SessionState::Setup);
    assert_eq!(
        snap.message_texts(),
        vec!["Please complete calibration before monitoring"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_intent_after_shutdown_is_unavailable() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, task) = spawn_session(&service, &camera);
    let app = create_router(handle.clone());

    handle.shutdown();
    task.await.unwrap();

    let response = app.oneshot(post("/session/calibration/start")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("closed"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_route() {
    let service = MockService::new();
    let camera = MockCamera::new();
    let (handle, _task) = spawn_session(&service, &camera);

    let response = create_router(handle)
        .oneshot(Request::builder().uri("/session/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
