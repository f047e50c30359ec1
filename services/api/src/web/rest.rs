//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints. Every endpoint
//! answers with the JSON envelope from [`crate::web::protocol`]; the user id
//! travels in the path or body because authentication is handled upstream.

use crate::web::protocol::{
    self, Envelope, RecordAttemptRequest, SessionWordRequest, StartSessionRequest,
    SubscribeResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;
use vocab_core::domain::WordProgressPatch;
use vocab_core::ports::{PortError, PortResult};

/// Builds the application router over the shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/practice/attempts", post(record_attempt_handler))
        .route("/practice/sessions", post(start_session_handler))
        .route(
            "/practice/sessions/{session_id}",
            get(session_detail_handler),
        )
        .route(
            "/practice/sessions/{session_id}/words",
            post(record_session_word_handler),
        )
        .route(
            "/practice/sessions/{session_id}/end",
            post(end_session_handler),
        )
        .route("/achievements", get(achievement_catalog_handler))
        .route("/users/{user_id}/daily-words", get(daily_words_handler))
        .route("/users/{user_id}/stats", get(user_stats_handler))
        .route("/users/{user_id}/sessions", get(user_sessions_handler))
        .route(
            "/users/{user_id}/achievements",
            get(user_achievements_handler),
        )
        .route(
            "/users/{user_id}/achievements/progress",
            get(achievement_progress_handler),
        )
        .route(
            "/users/{user_id}/words/{word_id}/progress",
            get(word_progress_handler).patch(update_progress_handler),
        )
        .route(
            "/users/{user_id}/lists/{list_id}/subscribe",
            post(subscribe_handler),
        )
        .with_state(state)
}

/// Translates a port result into an enveloped response. The full error text
/// (which may carry driver and schema detail) goes to the logs only; the
/// envelope always carries a clean domain message.
fn respond<T: Serialize>(
    message: &str,
    result: PortResult<T>,
) -> (StatusCode, Json<Envelope<T>>) {
    match result {
        Ok(payload) => (StatusCode::OK, Json(Envelope::ok(message, payload))),
        Err(e) => {
            let (status, code, body) = match &e {
                PortError::NotFound(_) => {
                    warn!("not found: {e}");
                    (
                        StatusCode::NOT_FOUND,
                        protocol::NOT_FOUND,
                        "The requested resource was not found",
                    )
                }
                PortError::Conflict(_) => {
                    warn!("conflict: {e}");
                    (
                        StatusCode::CONFLICT,
                        protocol::DUPLICATE_INSERTION,
                        "The resource already exists",
                    )
                }
                PortError::Store(_) | PortError::Invariant(_) => {
                    error!("request failed: {e}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        protocol::SERVER_ERROR,
                        "An unexpected error occurred",
                    )
                }
            };
            (status, Json(Envelope::err(body.to_string(), code)))
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Record one practice attempt; updates mastery first, then the streak.
async fn record_attempt_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RecordAttemptRequest>,
) -> impl axum::response::IntoResponse {
    let result = state
        .service
        .record_practice_attempt(req.user_id, req.word_id, req.was_correct)
        .await;
    respond("Attempt recorded", result)
}

/// Today's practice set: ordered, bounded by the daily goal.
async fn daily_words_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_daily_words(user_id).await;
    respond("Daily words retrieved", result)
}

/// The read-only stats aggregate.
async fn user_stats_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_user_stats(user_id).await;
    respond("Stats retrieved", result)
}

async fn word_progress_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, word_id)): Path<(i64, i64)>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_word_progress(user_id, word_id).await;
    respond("Progress retrieved", result)
}

/// Explicit partial override of a progress row.
async fn update_progress_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, word_id)): Path<(i64, i64)>,
    Json(patch): Json<WordProgressPatch>,
) -> impl axum::response::IntoResponse {
    let result = state
        .service
        .apply_direct_update(user_id, word_id, &patch)
        .await;
    respond("Progress updated", result)
}

/// Subscribe to a list; progress rows for its words are bulk-initialized
/// atomically with the subscription.
async fn subscribe_handler(
    State(state): State<Arc<AppState>>,
    Path((user_id, list_id)): Path<(i64, i64)>,
) -> impl axum::response::IntoResponse {
    let result = state
        .service
        .subscribe_to_list(user_id, list_id)
        .await
        .map(|initialized_words| SubscribeResponse {
            list_id,
            initialized_words,
        });
    respond("Subscribed to list", result)
}

async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSessionRequest>,
) -> impl axum::response::IntoResponse {
    let result = state
        .service
        .start_practice_session(req.user_id, &req.session_type)
        .await;
    respond("Practice session started", result)
}

async fn record_session_word_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SessionWordRequest>,
) -> impl axum::response::IntoResponse {
    let result = state
        .service
        .record_session_word(session_id, req.word_id, req.was_correct, req.time_taken)
        .await;
    respond("Session word recorded", result)
}

async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> impl axum::response::IntoResponse {
    let result = state.service.end_practice_session(session_id).await;
    respond("Practice session ended", result)
}

async fn session_detail_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_practice_session(session_id).await;
    respond("Practice session retrieved", result)
}

/// The user's session history, most recently started first.
async fn user_sessions_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_practice_sessions(user_id).await;
    respond("Practice sessions retrieved", result)
}

async fn achievement_catalog_handler(
    State(state): State<Arc<AppState>>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_achievement_catalog().await;
    respond("Achievements retrieved", result)
}

async fn user_achievements_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_user_achievements(user_id).await;
    respond("User achievements retrieved", result)
}

/// The whole catalog flagged with whether the user has earned each entry.
async fn achievement_progress_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> impl axum::response::IntoResponse {
    let result = state.service.get_achievement_progress(user_id).await;
    respond("Achievement progress retrieved", result)
}
