//! Dataset curation routes: prepare, review, export.
//!
//! Pending records are served without their stored training payload so the
//! embedded system prompt never leaves through a listing; reviewers see
//! the sanitized exchange via the interaction, and only the export path
//! reads the payload back.

use crate::routes::error_response;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use promptguard_core::{EligibilityCriteria, ExportOptions, ExportReport, ReviewDecision};
use promptguard_types::{ExportFormat, FinetuneRecord, ReviewStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct PrepareRequest {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct PrepareResponse {
    pub created: usize,
}

pub async fn prepare(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PrepareRequest>,
) -> Result<Json<PrepareResponse>, (StatusCode, String)> {
    let created = state
        .curator
        .prepare(&EligibilityCriteria {
            since: req.since,
            session_id: None,
            limit: req.limit,
        })
        .map_err(error_response)?;
    Ok(Json(PrepareResponse { created }))
}

/// Review listing view of a record, without the stored training payload.
#[derive(Serialize)]
pub struct PendingRecord {
    pub id: Uuid,
    pub interaction_id: Uuid,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

impl From<FinetuneRecord> for PendingRecord {
    fn from(record: FinetuneRecord) -> Self {
        Self {
            id: record.id,
            interaction_id: record.interaction_id,
            status: record.status,
            created_at: record.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct PendingQuery {
    #[serde(default = "default_pending_limit")]
    pub limit: u32,
}

fn default_pending_limit() -> u32 {
    100
}

pub async fn pending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Vec<PendingRecord>>, (StatusCode, String)> {
    let records = state
        .curator
        .list_pending(query.limit)
        .map_err(error_response)?;
    Ok(Json(records.into_iter().map(PendingRecord::from).collect()))
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub feedback: Option<String>,
    pub include: bool,
    #[serde(default)]
    pub corrected_response: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub status: ReviewStatus,
    pub included_in_training: bool,
    pub quality_rating: Option<u8>,
}

pub async fn review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, (StatusCode, String)> {
    let record = state
        .curator
        .review(
            id,
            ReviewDecision {
                rating: req.rating,
                feedback: req.feedback,
                include: req.include,
                corrected_response: req.corrected_response,
                tags: req.tags,
            },
        )
        .map_err(error_response)?;
    Ok(Json(ReviewResponse {
        id: record.id,
        status: record.status,
        included_in_training: record.included_in_training,
        quality_rating: record.quality_rating,
    }))
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    #[serde(default)]
    pub min_quality: Option<u8>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exclude_negative: bool,
    #[serde(default)]
    pub exported_by: Option<String>,
}

pub async fn export(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportReport>, (StatusCode, String)> {
    let report = state
        .curator
        .export(&ExportOptions {
            format: req.format,
            min_quality: req.min_quality,
            since: req.since,
            until: req.until,
            exclude_negative: req.exclude_negative,
            output_dir: state.config.export_dir.clone(),
            exported_by: req.exported_by,
        })
        .map_err(error_response)?;
    Ok(Json(report))
}
