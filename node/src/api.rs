//! # REST API
//!
//! Builds the axum router that exposes the voting session over HTTP. All
//! handlers share [`AppState`] through axum's `State` extractor and call
//! into one [`CommitPipeline`].
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/health`             | Liveness probe                       |
//! | GET    | `/status`             | Session snapshot                     |
//! | POST   | `/signup`             | Register with an eligibility token   |
//! | POST   | `/eligibility`        | Set or clear the eligibility token   |
//! | POST   | `/select`             | Select a vote target                 |
//! | POST   | `/pending/increment`  | Raise the pending vote weight        |
//! | POST   | `/pending/decrement`  | Lower the pending vote weight        |
//! | POST   | `/cart`               | Add the pending vote to the cart     |
//! | DELETE | `/cart/:index`        | Withdraw a cart intent               |
//! | POST   | `/keychange`          | Queue a key change                   |
//! | POST   | `/commit`             | Publish the cart as one round        |
//! | GET    | `/committed`          | Committed vote log                   |
//! | GET    | `/api/image`          | Image catalog                        |
//!
//! Errors come back as `{ "error": "..." }` with a status derived from the
//! [`VoteError`] variant.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use quadvote_protocol::{
    CommitPipeline, CommitReport, SessionSnapshot, SignUpState, VoteError, VoteIntent,
};

use crate::images::{ImageCatalog, ImageDescriptor};
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    /// Network the devnet coordinator reports.
    pub network_id: u64,
    pub pipeline: Arc<CommitPipeline>,
    pub metrics: SharedMetrics,
    pub images: Arc<ImageCatalog>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API router with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/signup", post(signup_handler))
        .route("/eligibility", post(eligibility_handler))
        .route("/select", post(select_handler))
        .route("/pending/increment", post(increment_handler))
        .route("/pending/decrement", post(decrement_handler))
        .route("/cart", post(add_to_cart_handler))
        .route("/cart/:index", delete(remove_from_cart_handler))
        .route("/keychange", post(keychange_handler))
        .route("/commit", post(commit_handler))
        .route("/committed", get(committed_handler))
        .route("/api/image", get(images_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpRequest {
    pub eligibility_token: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EligibilityRequest {
    /// `null` clears the credential.
    pub eligibility_token: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectRequest {
    pub target_id: u64,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub network_id: u64,
    /// A sign-up or commit round is outstanding.
    pub busy: bool,
    #[serde(flatten)]
    pub session: SessionSnapshot,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignUpResponse {
    #[serde(flatten)]
    pub state: SignUpState,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SelectResponse {
    pub selected: bool,
    pub target_id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub changed: bool,
    pub weight: u64,
    pub cost: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CartResponse {
    pub cart_size: usize,
    pub balance: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// A [`VoteError`] on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError(VoteError);

impl From<VoteError> for ApiError {
    fn from(e: VoteError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VoteError::InsufficientCredits { .. }
            | VoteError::InvalidWeight(_)
            | VoteError::NoTargetSelected
            | VoteError::IntentNotFound(_)
            | VoteError::Overflow => StatusCode::BAD_REQUEST,
            VoteError::NetworkRejected { .. } | VoteError::NotSignedUp => StatusCode::FORBIDDEN,
            VoteError::Busy | VoteError::DuplicateIntent(_) => StatusCode::CONFLICT,
            VoteError::SubmissionFailure { .. } | VoteError::Protocol(_) => {
                StatusCode::BAD_GATEWAY
            }
            VoteError::IdentityMissing
            | VoteError::SerializationFailure { .. }
            | VoteError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, %status, "request rejected");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: 200 while the process is up.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        network_id: state.network_id,
        busy: state.pipeline.is_busy(),
        session: state.pipeline.snapshot(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `POST /signup`: registers the voter. The token used to sign up also
/// becomes the eligibility credential.
async fn signup_handler(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> ApiResult<SignUpResponse> {
    let sign_up = state.pipeline.sign_up(req.eligibility_token).await?;
    state.pipeline.set_eligibility(Some(req.eligibility_token));
    state.metrics.signups_total.inc();
    state.metrics.observe(&state.pipeline);
    Ok(Json(SignUpResponse {
        state: sign_up,
        balance: state.pipeline.balance(),
    }))
}

async fn eligibility_handler(
    State(state): State<AppState>,
    Json(req): Json<EligibilityRequest>,
) -> Json<SessionSnapshot> {
    state.pipeline.set_eligibility(req.eligibility_token);
    Json(state.pipeline.snapshot())
}

/// `POST /select`: ignored (`selected: false`) unless the voter is
/// eligible and signed up.
async fn select_handler(
    State(state): State<AppState>,
    Json(req): Json<SelectRequest>,
) -> Json<SelectResponse> {
    let selected = state.pipeline.select_target(req.target_id);
    Json(SelectResponse {
        selected,
        target_id: state.pipeline.snapshot().selected_target,
    })
}

async fn increment_handler(State(state): State<AppState>) -> Json<PendingResponse> {
    let changed = state.pipeline.increment_pending();
    Json(pending_response(&state.pipeline, changed))
}

async fn decrement_handler(State(state): State<AppState>) -> Json<PendingResponse> {
    let changed = state.pipeline.decrement_pending();
    Json(pending_response(&state.pipeline, changed))
}

fn pending_response(pipeline: &CommitPipeline, changed: bool) -> PendingResponse {
    let snapshot = pipeline.snapshot();
    PendingResponse {
        changed,
        weight: snapshot.pending_weight,
        cost: snapshot.pending_cost,
    }
}

/// `POST /cart`: adds the selected target at the pending weight.
async fn add_to_cart_handler(State(state): State<AppState>) -> ApiResult<CartResponse> {
    let cart_size = state.pipeline.add_pending_vote()?;
    state.metrics.observe(&state.pipeline);
    Ok(Json(CartResponse {
        cart_size,
        balance: state.pipeline.balance(),
    }))
}

async fn remove_from_cart_handler(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<VoteIntent> {
    let removed = state.pipeline.remove_from_cart(index)?;
    state.metrics.observe(&state.pipeline);
    Ok(Json(removed))
}

async fn keychange_handler(State(state): State<AppState>) -> ApiResult<CartResponse> {
    let cart_size = state.pipeline.stage_key_change()?;
    state.metrics.observe(&state.pipeline);
    Ok(Json(CartResponse {
        cart_size,
        balance: state.pipeline.balance(),
    }))
}

/// `POST /commit`: publishes the cart. Per-intent failures are part of a
/// 200 response; only round-level errors map to an error status.
async fn commit_handler(State(state): State<AppState>) -> ApiResult<CommitReport> {
    let started = Instant::now();
    let report = state.pipeline.commit_cart().await?;
    state
        .metrics
        .commit_round_seconds
        .observe(started.elapsed().as_secs_f64());
    state.metrics.record_commit(&report);
    state.metrics.observe(&state.pipeline);
    Ok(Json(report))
}

async fn committed_handler(State(state): State<AppState>) -> Json<Vec<VoteIntent>> {
    Json(state.pipeline.committed())
}

async fn images_handler(State(state): State<AppState>) -> Json<Vec<ImageDescriptor>> {
    Json(state.images.images().to_vec())
}
