//! HTTP control API for the gesture session.
//!
//! This module exposes the session controller to a local UI:
//! - Gesture registry reads and bulk edits
//! - Recording, single-shot capture and training
//! - Monitoring toggle and per-frame processing via POST /api/frame
//!
//! # Architecture
//!
//! ```text
//! UI ──→ /api/* ──→ SessionController ──→ RegistrySync ──→ data directory
//!                          ↓
//!                 [Decision + Dispatch]
//! ```

use crate::capture::ReplayRecord;
use crate::config::Config;
use crate::core::classifier::{ClassifierError, TrainingReport};
use crate::dispatch::{dispatcher_for, ActionDispatcher};
use crate::registry::{
    BulkEditOutcome, GestureAction, GestureEntry, GestureEntryInput, ModelStatus, RegistryError,
};
use crate::session::{
    ControlMode, FrameStatus, RecordingProgress, RecordingRequest, SessionController, SessionError,
};
use axum::{
    extract::State,
    http::{request::Parts, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Agent configuration; its data path holds the persisted state
    pub config: Config,
}

impl ServerConfig {
    pub fn new(port: u16, config: Config) -> Self {
        Self { port, config }
    }
}

/// Shared server state
pub struct ServerState {
    controller: Mutex<SessionController<Box<dyn ActionDispatcher>>>,
}

impl ServerState {
    /// Load persisted state and reconcile it. Configured action commands
    /// are run for triggered gestures.
    pub fn new(config: &ServerConfig) -> Result<Self, SessionError> {
        let dispatcher = dispatcher_for(&config.config.actions, false);
        let (controller, boot) = SessionController::open(&config.config, dispatcher)?;
        tracing::info!(pruned = boot.pruned, status = %boot.status, "Loaded gesture state");
        Ok(Self {
            controller: Mutex::new(controller),
        })
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let (status, code) = match &e {
            SessionError::NotSynced(_) => (StatusCode::CONFLICT, "MODEL_NOT_SYNCED"),
            SessionError::RecordingActive => (StatusCode::CONFLICT, "RECORDING_ACTIVE"),
            SessionError::NotRecording => (StatusCode::CONFLICT, "NOT_RECORDING"),
            SessionError::NoHand(_) => (StatusCode::BAD_REQUEST, "NO_HAND"),
            SessionError::Registry(RegistryError::Storage(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
            }
            SessionError::Registry(_) => (StatusCode::BAD_REQUEST, "INVALID_GESTURE"),
            SessionError::Training(ClassifierError::InsufficientData) => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_DATA")
            }
            SessionError::Training(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRAINING_FAILED"),
        };
        api_error(status, code, e)
    }
}

/// Registry listing
#[derive(Debug, Serialize, Deserialize)]
pub struct GesturesResponse {
    pub gestures: Vec<GestureEntry>,
    pub actions: Vec<GestureAction>,
}

/// Monitoring state after a toggle
#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub monitoring: bool,
    pub mode: ControlMode,
}

/// Samples committed by a stopped recording or a capture
#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub saved: usize,
    pub training: Option<TrainingReport>,
    pub message: String,
}

/// Single-shot capture from one landmark set
#[derive(Debug, Deserialize)]
pub struct CaptureBody {
    #[serde(flatten)]
    pub request: RecordingRequest,
    #[serde(flatten)]
    pub frame: ReplayRecord,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/gestures
async fn list_gestures(State(state): State<Arc<ServerState>>) -> Json<GesturesResponse> {
    let controller = state.controller.lock().await;
    Json(GesturesResponse {
        gestures: controller.sync().registry().entries().to_vec(),
        actions: GestureAction::ALL.to_vec(),
    })
}

/// POST /api/gestures
///
/// Replaces the whole registry; samples of removed gestures are deleted.
async fn replace_gestures(
    State(state): State<Arc<ServerState>>,
    Json(inputs): Json<Vec<GestureEntryInput>>,
) -> Result<Json<BulkEditOutcome>, ApiError> {
    let state = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || {
        state.controller.blocking_lock().replace_registry(inputs)
    })
    .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "TASK_FAILED", e))??;
    Ok(Json(outcome))
}

/// POST /api/record
async fn start_recording(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<RecordingRequest>,
) -> Result<Json<RecordingProgress>, ApiError> {
    let progress = state.controller.lock().await.start_recording(request)?;
    Ok(Json(progress))
}

/// POST /api/record/cancel
async fn cancel_recording(State(state): State<Arc<ServerState>>) -> Result<StatusCode, ApiError> {
    state.controller.lock().await.cancel_recording()?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/record/stop
async fn stop_recording(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<CommitResponse>, ApiError> {
    let state = Arc::clone(&state);
    let outcome =
        tokio::task::spawn_blocking(move || state.controller.blocking_lock().stop_recording())
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "TASK_FAILED", e))??;

    let response = match outcome {
        None => CommitResponse {
            saved: 0,
            training: None,
            message: "No samples captured.".to_string(),
        },
        Some(commit) => CommitResponse {
            saved: commit.added,
            message: match &commit.training {
                Ok(_) => format!("Saved {} samples for '{}'.", commit.added, commit.entry.label),
                Err(e) => format!("Saved {} samples, but training failed: {e}", commit.added),
            },
            training: commit.training.ok(),
        },
    };
    Ok(Json(response))
}

/// POST /api/capture
async fn capture_single(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<CommitResponse>, ApiError> {
    let Some(hand) = body
        .frame
        .landmarks
        .map(|l| l.into_keypoints())
        .filter(|k| k.is_complete())
    else {
        return Err(SessionError::NoHand(Vec::new()).into());
    };

    let state = Arc::clone(&state);
    let request = body.request;
    let capture = tokio::task::spawn_blocking(move || {
        state
            .controller
            .blocking_lock()
            .capture_single(request, &hand)
    })
    .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "TASK_FAILED", e))??;

    let commit = capture.commit;
    Ok(Json(CommitResponse {
        saved: commit.added,
        message: format!("Saved {} samples for '{}'.", commit.added, commit.entry.label),
        training: commit.training.ok(),
    }))
}

/// POST /api/train
async fn train(State(state): State<Arc<ServerState>>) -> Result<Json<TrainingReport>, ApiError> {
    let state = Arc::clone(&state);
    let report = tokio::task::spawn_blocking(move || state.controller.blocking_lock().train())
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "TASK_FAILED", e))??;
    Ok(Json(report))
}

/// GET /api/model_status
async fn model_status(State(state): State<Arc<ServerState>>) -> Json<ModelStatus> {
    Json(state.controller.lock().await.model_status())
}

/// POST /api/toggle_control
async fn toggle_control(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<ControlResponse>, ApiError> {
    let mut controller = state.controller.lock().await;
    let monitoring = controller.toggle_monitoring()?;
    Ok(Json(ControlResponse {
        monitoring,
        mode: controller.mode(),
    }))
}

/// POST /api/frame
///
/// Processes one frame of landmarks; `{"landmarks": null}` means no hand.
async fn process_frame(
    State(state): State<Arc<ServerState>>,
    Json(frame): Json<ReplayRecord>,
) -> Result<Json<FrameStatus>, ApiError> {
    let landmarks = frame.landmarks.map(|l| l.into_keypoints());
    let state = Arc::clone(&state);
    let status = tokio::task::spawn_blocking(move || {
        state
            .controller
            .blocking_lock()
            .process_frame(landmarks.as_ref(), Instant::now())
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, "TASK_FAILED", e))?;
    Ok(Json(status))
}

/// Whether `origin` is localhost or 127.0.0.1 on any port.
fn is_local_origin(origin: &str) -> bool {
    let Some(authority) = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
    else {
        return false;
    };
    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };
    let port_ok = port.map_or(true, |p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    matches!(host, "localhost" | "127.0.0.1") && port_ok
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config).map_err(|e| anyhow::anyhow!("{e}"))?);

    let app = Router::new()
        .route("/health", get(health))
        .route("/api/gestures", get(list_gestures).post(replace_gestures))
        .route("/api/record", post(start_recording))
        .route("/api/record/cancel", post(cancel_recording))
        .route("/api/record/stop", post(stop_recording))
        .route("/api/capture", post(capture_single))
        .route("/api/train", post(train))
        .route("/api/model_status", get(model_status))
        .route("/api/toggle_control", post(toggle_control))
        .route("/api/frame", post(process_frame))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _: &Parts| {
                    origin.to_str().map(is_local_origin).unwrap_or(false)
                }))
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Gesture control API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_origins_on_any_port() {
        assert!(is_local_origin("http://localhost"));
        assert!(is_local_origin("http://localhost:5173"));
        assert!(is_local_origin("http://127.0.0.1:3000"));
        assert!(is_local_origin("https://localhost:8443"));
    }

    #[test]
    fn test_remote_origins_rejected() {
        assert!(!is_local_origin("http://example.com"));
        assert!(!is_local_origin("http://localhost.example.com"));
        assert!(!is_local_origin("http://127.0.0.1.evil:80"));
        assert!(!is_local_origin("http://localhost:"));
        assert!(!is_local_origin("file://localhost"));
        assert!(!is_local_origin("null"));
    }
}
