//! # REST API
//!
//! Builds the axum router that exposes the chain over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                       | Description                      |
//! |--------|----------------------------|----------------------------------|
//! | GET    | `/health`                  | Liveness probe                   |
//! | GET    | `/status`                  | Height, algorithm, version       |
//! | POST   | `/blocks`                  | Append `{"payload": "..."}`      |
//! | GET    | `/blocks/:height`          | Block by height                  |
//! | GET    | `/blocks/:height/validate` | Verdict for one block            |
//! | GET    | `/chain/validate`          | Full-chain validation report     |
//!
//! The engine is synchronous and may block on disk, so every engine call
//! runs on tokio's blocking pool.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use linkchain_protocol::crypto::{HashAlgorithm, Hasher};
use linkchain_protocol::storage::{
    Block, ChainEngine, ChainError, ChainResult, FailureKind, SledStore,
};

use crate::metrics::SharedMetrics;

/// The engine a node serves: sled on disk, algorithm chosen at startup.
pub type NodeEngine = ChainEngine<SledStore, HashAlgorithm>;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The chain this node serves.
    pub engine: Arc<NodeEngine>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/blocks", post(append_handler))
        .route("/blocks/:height", get(block_by_height_handler))
        .route("/blocks/:height/validate", get(validate_block_handler))
        .route("/chain/validate", get(validate_chain_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Body of `POST /blocks`.
#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    pub payload: String,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Digest algorithm the chain was created with.
    pub hash_algorithm: String,
    /// Height of the tip; `null` for an empty chain.
    pub height: Option<u64>,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /blocks/:height/validate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockValidationResponse {
    pub height: u64,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

/// Response payload for `GET /chain/validate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChainValidationResponse {
    pub valid: bool,
    pub checked: u64,
    pub failures: BTreeMap<u64, FailureKind>,
}

/// Standard error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error description.
    pub error: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything a handler can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Chain(ChainError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Chain(ChainError::ConcurrentAppendConflict { .. }) => StatusCode::CONFLICT,
            ApiError::Chain(ChainError::StoreUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Chain(ChainError::ChainCorruption { .. })
            | ApiError::Chain(ChainError::IncompatibleStore(_))
            | ApiError::Chain(ChainError::Serialization { .. })
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run an engine call on the blocking pool.
async fn with_engine<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&NodeEngine) -> ChainResult<T> + Send + 'static,
{
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| ApiError::Internal(format!("engine task failed: {e}")))?
        .map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
///
/// Does not touch the store; that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: current height and chain settings.
async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let height = with_engine(&state, |engine| engine.height()).await?;
    state.metrics.set_height(height);

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        hash_algorithm: state.engine.hasher().algorithm().to_string(),
        height,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// `POST /blocks`: append a block and return it with `201 Created`.
///
/// A lost race against another writer is `409 Conflict`; the client may
/// simply retry.
async fn append_handler(
    State(state): State<AppState>,
    Json(req): Json<AppendRequest>,
) -> Result<(StatusCode, Json<Block>), ApiError> {
    let started = Instant::now();
    let result = with_engine(&state, move |engine| engine.append(req.payload)).await;
    state
        .metrics
        .append_latency_seconds
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(block) => {
            state.metrics.blocks_appended_total.inc();
            state.metrics.set_height(Some(block.height));
            Ok((StatusCode::CREATED, Json(block)))
        }
        Err(e) => {
            if matches!(e, ApiError::Chain(ChainError::ConcurrentAppendConflict { .. })) {
                state.metrics.append_conflicts_total.inc();
            }
            Err(e)
        }
    }
}

/// `GET /blocks/:height`: the stored block, exactly as persisted.
async fn block_by_height_handler(
    Path(height): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<Block>, ApiError> {
    let block = with_engine(&state, move |engine| engine.get_block(height)).await?;
    Ok(Json(block))
}

/// `GET /blocks/:height/validate`: verdict for a single block.
///
/// `404` if nothing is stored at `height`. A missing or unreadable
/// predecessor makes the block's link unverifiable, which is reported as
/// a failure rather than an error.
async fn validate_block_handler(
    Path(height): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<BlockValidationResponse>, ApiError> {
    state.metrics.validations_total.inc();

    let failure = with_engine(&state, move |engine| engine.check_block(height)).await?;

    if failure.is_some() {
        state.metrics.invalid_blocks_detected_total.inc();
    }
    Ok(Json(BlockValidationResponse {
        height,
        valid: failure.is_none(),
        failure,
    }))
}

/// `GET /chain/validate`: validate every height from genesis to the tip.
///
/// Always `200` when the pass completes; tampering shows up in the body.
async fn validate_chain_handler(
    State(state): State<AppState>,
) -> Result<Json<ChainValidationResponse>, ApiError> {
    state.metrics.validations_total.inc();

    let report = with_engine(&state, |engine| engine.validate_chain()).await?;
    state
        .metrics
        .invalid_blocks_detected_total
        .inc_by(report.failures.len() as u64);

    Ok(Json(ChainValidationResponse {
        valid: report.is_valid(),
        checked: report.checked,
        failures: report.failures,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
