//! Fine-tuning dataset types.
//!
//! A finetune record is created per eligible interaction during curation,
//! mutated only by human review, and annotated (never deleted) on export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review status of a finetune record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Created by curation, awaiting human review.
    PendingReview,
    /// Approved for inclusion in exports.
    Approved,
    /// Rejected by review.
    Rejected,
}

/// One message of a training conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMessage {
    /// "system", "user", or "assistant".
    pub role: String,
    /// Message content.
    pub content: String,
}

/// The stored training payload for one record.
///
/// The system message here is the decrypted prompt in effect at the time
/// of the interaction. It exists only inside this stored payload and the
/// export files; no read API other than export surfaces it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingData {
    pub messages: Vec<TrainingMessage>,
}

/// An export this record was included in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStamp {
    /// Export snapshot identifier.
    pub export_id: Uuid,
    /// When the export ran.
    pub exported_at: DateTime<Utc>,
    /// Format the record was rendered in.
    pub format: ExportFormat,
}

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// OpenAI chat-messages JSONL.
    Openai,
    /// Anthropic Human/Assistant transcript JSONL.
    Anthropic,
    /// Generic prompt/completion JSONL.
    Jsonl,
}

impl ExportFormat {
    /// File-name friendly label.
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Openai => "openai",
            ExportFormat::Anthropic => "anthropic",
            ExportFormat::Jsonl => "jsonl",
        }
    }
}

/// A curated fine-tuning record, one-to-one with an interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinetuneRecord {
    /// Unique identifier.
    pub id: Uuid,
    /// The interaction this record was curated from.
    pub interaction_id: Uuid,
    /// Reviewer rating, 1..=5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_rating: Option<u8>,
    /// Whether the record is included in training exports.
    pub included_in_training: bool,
    /// Review workflow status.
    pub status: ReviewStatus,
    /// Stored training conversation.
    pub training_data: TrainingData,
    /// Free-form reviewer feedback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_feedback: Option<String>,
    /// Reviewer-corrected response replacing the original on export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_response: Option<String>,
    /// Reviewer-assigned tags, aggregated into export statistics.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Exports this record appeared in, append-only.
    #[serde(default)]
    pub export_history: Vec<ExportStamp>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last reviewed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl FinetuneRecord {
    /// Create a pending-review record for an interaction.
    pub fn pending(interaction_id: Uuid, training_data: TrainingData) -> Self {
        Self {
            id: Uuid::new_v4(),
            interaction_id,
            quality_rating: None,
            included_in_training: false,
            status: ReviewStatus::PendingReview,
            training_data,
            reviewer_feedback: None,
            corrected_response: None,
            tags: Vec::new(),
            export_history: Vec::new(),
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    /// Whether this record passes an export's quality floor.
    pub fn meets_quality_floor(&self, floor: Option<u8>) -> bool {
        match (floor, self.quality_rating) {
            (None, _) => true,
            (Some(floor), Some(rating)) => rating >= floor,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record_defaults() {
        let record = FinetuneRecord::pending(Uuid::new_v4(), TrainingData::default());
        assert_eq!(record.status, ReviewStatus::PendingReview);
        assert!(!record.included_in_training);
        assert!(record.export_history.is_empty());
    }

    #[test]
    fn test_quality_floor() {
        let mut record = FinetuneRecord::pending(Uuid::new_v4(), TrainingData::default());
        assert!(record.meets_quality_floor(None));
        assert!(!record.meets_quality_floor(Some(3)));

        record.quality_rating = Some(4);
        assert!(record.meets_quality_floor(Some(3)));
        assert!(!record.meets_quality_floor(Some(5)));
    }
}
