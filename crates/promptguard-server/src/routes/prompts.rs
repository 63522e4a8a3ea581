//! Prompt administration routes.
//!
//! These routes register and activate prompt versions. Responses are
//! summaries only; neither ciphertext nor plaintext is ever echoed, and no
//! route exposes decryption.

use crate::routes::error_response;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use promptguard_core::PromptPatch;
use promptguard_types::{ModelConfig, PromptSummary};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreatePromptRequest {
    pub session_type: String,
    /// Plaintext system prompt; encrypted before it touches storage.
    pub prompt: String,
    #[serde(default)]
    pub model_preference: Option<String>,
    #[serde(default)]
    pub model_config: Option<ModelConfig>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<PromptSummary>), (StatusCode, String)> {
    let prompt = state
        .catalog
        .create(
            &req.session_type,
            &req.prompt,
            req.model_preference,
            req.model_config.unwrap_or_default(),
        )
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(PromptSummary::from(&prompt))))
}

#[derive(Deserialize)]
pub struct ListPromptsQuery {
    #[serde(default)]
    pub session_type: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPromptsQuery>,
) -> Result<Json<Vec<PromptSummary>>, (StatusCode, String)> {
    let prompts = state
        .catalog
        .list(query.session_type.as_deref())
        .map_err(error_response)?;
    Ok(Json(prompts))
}

#[derive(Deserialize)]
pub struct UpdatePromptRequest {
    #[serde(default)]
    pub model_preference: Option<String>,
    #[serde(default)]
    pub model_config: Option<ModelConfig>,
    #[serde(default)]
    pub activate: bool,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePromptRequest>,
) -> Result<Json<PromptSummary>, (StatusCode, String)> {
    let prompt = state
        .catalog
        .update(
            id,
            PromptPatch {
                model_preference: req.model_preference,
                model_config: req.model_config,
                activate: req.activate,
            },
        )
        .map_err(error_response)?;
    Ok(Json(PromptSummary::from(&prompt)))
}
