//! Session lifecycle, history, and stats routes.

use crate::routes::{error_response, OwnerId};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use promptguard_core::PromptGuardError;
use promptguard_types::{
    ChatSession, HistoryEntry, InteractionStats, SessionStatus, SessionSummary,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub session_type: String,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Json<SessionSummary>, (StatusCode, String)> {
    // Creating a session requires an active prompt for the type; failing
    // here beats failing on the first chat message.
    state
        .catalog
        .get_active(&req.session_type)
        .map_err(error_response)?;

    let session = ChatSession::new(
        owner_id,
        req.session_type,
        req.idle_timeout_secs
            .unwrap_or(state.config.default_idle_timeout_secs),
    );
    state.sessions.insert(&session).map_err(error_response)?;

    info!(
        target: "promptguard::api",
        "Created session {} for type {}",
        session.agent_id, session.session_type
    );
    Ok(Json(SessionSummary::from(&session)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
) -> Result<Json<Vec<SessionSummary>>, (StatusCode, String)> {
    let sessions = state
        .sessions
        .list_for_owner(owner_id)
        .map_err(error_response)?;
    Ok(Json(sessions))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<SessionSummary>, (StatusCode, String)> {
    let session = resolve_owned(&state, agent_id, owner_id)?;
    Ok(Json(SessionSummary::from(&session)))
}

pub async fn end(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let session = resolve_owned(&state, agent_id, owner_id)?;
    state
        .sessions
        .set_status(session.id, SessionStatus::Ended)
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, (StatusCode, String)> {
    let session = resolve_owned(&state, agent_id, owner_id)?;
    let entries = state
        .ledger
        .history(session.id, query.limit)
        .map_err(error_response)?;
    Ok(Json(entries))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    OwnerId(owner_id): OwnerId,
    Path(agent_id): Path<Uuid>,
) -> Result<Json<InteractionStats>, (StatusCode, String)> {
    let session = resolve_owned(&state, agent_id, owner_id)?;
    let stats = state.ledger.stats(session.id).map_err(error_response)?;
    Ok(Json(stats))
}

/// Resolve a session by agent handle and enforce ownership.
fn resolve_owned(
    state: &AppState,
    agent_id: Uuid,
    owner_id: Uuid,
) -> Result<ChatSession, (StatusCode, String)> {
    let session = state
        .sessions
        .get_by_agent(agent_id)
        .map_err(error_response)?
        .ok_or_else(|| error_response(PromptGuardError::SessionNotFound(agent_id)))?;
    if session.owner_id != owner_id {
        return Err(error_response(PromptGuardError::UnauthorizedAccess));
    }
    Ok(session)
}
