//! HTTP route handlers.

pub mod cache;
pub mod chat;
pub mod finetune;
pub mod prompts;
pub mod sessions;

use crate::state::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use promptguard_core::PromptGuardError;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authenticated owner identity, injected by the upstream auth layer as the
/// `x-owner-id` header. Authentication itself is out of scope here; this
/// extractor only refuses requests that arrive without an identity.
pub struct OwnerId(pub Uuid);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-owner-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
            .map(OwnerId)
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "missing or invalid x-owner-id header".to_string(),
            ))
    }
}

/// Map core errors onto HTTP status codes with terse public messages.
/// Internal failures stay internal; details go to the log, not the client.
pub fn error_response(err: PromptGuardError) -> (StatusCode, String) {
    match err {
        PromptGuardError::PromptNotFound(session_type) => (
            StatusCode::NOT_FOUND,
            format!("no active prompt for session type '{}'", session_type),
        ),
        PromptGuardError::SessionNotFound(_) | PromptGuardError::RecordNotFound(_) => {
            (StatusCode::NOT_FOUND, "not found".to_string())
        }
        PromptGuardError::UnauthorizedAccess => {
            (StatusCode::FORBIDDEN, "forbidden".to_string())
        }
        PromptGuardError::ProviderUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "provider unavailable".to_string(),
        ),
        PromptGuardError::Validation(errors) => {
            (StatusCode::UNPROCESSABLE_ENTITY, errors.join("; "))
        }
        err => {
            tracing::error!(target: "promptguard::api", "Internal error: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

/// Build the API router shared by the binary and the integration tests.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/sessions", post(sessions::create))
        .route("/api/sessions", get(sessions::list))
        .route("/api/sessions/{agent_id}", get(sessions::get))
        .route("/api/sessions/{agent_id}", delete(sessions::end))
        .route("/api/sessions/{agent_id}/history", get(sessions::history))
        .route("/api/sessions/{agent_id}/stats", get(sessions::stats))
        .route("/api/sessions/{agent_id}/chat", post(chat::chat))
        .route("/api/sessions/{agent_id}/chat/stream", post(chat::chat_stream))
        .route("/api/sessions/{agent_id}/score", post(chat::score))
        .route("/api/prompts", post(prompts::create))
        .route("/api/prompts", get(prompts::list))
        .route("/api/prompts/{id}", put(prompts::update))
        .route("/api/cache/stats", get(cache::stats))
        .route("/api/cache/invalidate", post(cache::invalidate))
        .route("/api/finetune/prepare", post(finetune::prepare))
        .route("/api/finetune/pending", get(finetune::pending))
        .route("/api/finetune/{id}/review", post(finetune::review))
        .route("/api/finetune/export", post(finetune::export))
        .with_state(state)
}
