//! HTTP + WebSocket API for Proctor-0
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /session - Current snapshot
//! - POST /session/calibration/start - Start (or restart) calibration
//! - POST /session/calibration/step - Submit the current camera frame
//! - POST /session/monitoring/skip - Skip to monitoring when already calibrated
//! - POST /session/monitoring/pause - Pause the monitoring loop
//! - POST /session/monitoring/resume - Resume the monitoring loop
//! - WS /ws - Live snapshots; accepts text commands

use axum::{
    extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::SessionHandle;
use crate::types::{Intent, SessionSnapshot};

/// App state
pub struct AppState {
    pub session: SessionHandle,
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub session_state: String,
    pub service_connected: bool,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Create the API router
pub fn create_router(session: SessionHandle) -> Router {
    let state = Arc::new(AppState { session });

    Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session))
        .route("/session/calibration/start", post(start_calibration))
        .route("/session/calibration/step", post(submit_step))
        .route("/session/monitoring/skip", post(skip_to_monitoring))
        .route("/session/monitoring/pause", post(pause_monitoring))
        .route("/session/monitoring/resume", post(resume_monitoring))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.session.snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        session_state: snapshot.session_state.to_string(),
        service_connected: snapshot.connectivity.connected,
    })
}

/// Get current snapshot
async fn get_session(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

async fn start_calibration(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    forward(&state, Intent::StartCalibration).await
}

async fn submit_step(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    forward(&state, Intent::SubmitCalibrationFrame).await
}

async fn skip_to_monitoring(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    forward(&state, Intent::SkipToMonitoring).await
}

async fn pause_monitoring(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    forward(&state, Intent::PauseMonitoring).await
}

async fn resume_monitoring(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    forward(&state, Intent::ResumeMonitoring).await
}

/// Queue an intent. The controller applies it asynchronously, so the
/// answer is 202 with the snapshot as of queueing.
async fn forward(state: &AppState, intent: Intent) -> axum::response::Response {
    debug!(intent = ?intent, "API intent");
    match state.session.send(intent).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(state.session.snapshot())).into_response(),
        Err(e) => {
            warn!(error = %e, "Intent rejected, session closed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { error: e.to_string() }),
            )
                .into_response()
        }
    }
}

/// WebSocket handler for live snapshots
async fn websocket_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let session = state.session.clone();
    ws.on_upgrade(move |socket| handle_websocket(socket, session))
}

/// Push the current snapshot, then one per publish. Text frames from the
/// client are read as commands ("start", "next", ...).
async fn handle_websocket(socket: WebSocket, session: SessionHandle) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = session.subscribe();

    let mut send_task = tokio::spawn(async move {
        loop {
            let json = match serde_json::to_string(&*rx.borrow_and_update()) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Snapshot serialization failed");
                    break;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => match Intent::from_command(&text) {
                    Some(intent) => {
                        if session.send(intent).await.is_err() {
                            break;
                        }
                    }
                    None => debug!(command = %text, "Unknown WebSocket command"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!("WebSocket client disconnected");
}

/// Run the API server
pub async fn run_server(addr: &str, session: SessionHandle) -> crate::Result<()> {
    let router = create_router(session);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "API listening");
    println!("👁 Proctor-0 API running on {}", addr);
    println!("  GET  /health                      - Health check");
    println!("  GET  /session                     - Current snapshot");
    println!("  POST /session/calibration/start   - Start calibration");
    println!("  POST /session/calibration/step    - Submit calibration frame");
    println!("  POST /session/monitoring/skip     - Skip to monitoring");
    println!("  POST /session/monitoring/pause    - Pause monitoring");
    println!("  POST /session/monitoring/resume   - Resume monitoring");
    println!("  WS   /ws                          - Live snapshots");
    axum::serve(listener, router).await?;
    Ok(())
}
