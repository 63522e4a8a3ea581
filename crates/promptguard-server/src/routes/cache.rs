//! Cache observability routes.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use promptguard_core::CacheStats;
use serde::Deserialize;
use std::sync::Arc;

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

#[derive(Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub task_type: Option<String>,
}

pub async fn invalidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvalidateRequest>,
) -> StatusCode {
    state.cache.invalidate(req.task_type.as_deref());
    StatusCode::NO_CONTENT
}
