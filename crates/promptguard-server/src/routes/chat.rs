//! Chat routes: buffered and streaming delivery.

use crate::routes::{error_response, OwnerId};
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use promptguard_core::{AuthenticityReport, ChatCallOptions};
use promptguard_types::ChatResponse;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Cacheable task type; absent for plain conversation.
    #[serde(default)]
    pub cache_task: Option<String>,
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let response = state
        .orchestrator
        .chat_with_options(
            agent_id,
            &req.message,
            owner_id,
            ChatCallOptions {
                cache_task: req.cache_task,
            },
        )
        .await
        .map_err(error_response)?;
    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct ScoreRequest {
    /// Reference content to analyze.
    pub content: String,
}

/// Structured credibility scoring for submitted reference content.
pub async fn score(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<AuthenticityReport>, (StatusCode, String)> {
    let report = state
        .orchestrator
        .score_reference(agent_id, &req.content, owner_id)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

/// Stream the sanitized response as newline-delimited JSON chunks.
/// Client disconnect drops the body stream, which cancels chunk emission;
/// the ledger entry was finalized before the first chunk.
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, String)> {
    let rx = state
        .orchestrator
        .chat_stream(
            agent_id,
            &req.message,
            owner_id,
            ChatCallOptions {
                cache_task: req.cache_task,
            },
        )
        .await
        .map_err(error_response)?;

    let stream = ReceiverStream::new(rx).map(|chunk| {
        let mut line = serde_json::to_string(&chunk).unwrap_or_default();
        line.push('\n');
        Ok::<_, Infallible>(line)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(stream))
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            )
        })
}
