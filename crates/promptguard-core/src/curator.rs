//! Fine-tuning dataset curation.
//!
//! Runs offline from the request path: joins eligible ledger entries that
//! lack a record, embeds the decrypted prompt into the stored training
//! payload (the only place plaintext is ever persisted, and only ever read
//! back by the export path), tracks human review, and writes reviewed
//! snapshots as JSONL plus a sidecar metadata file. Export annotates
//! records with a history stamp; it never deletes or mutates their content.

use crate::{
    EligibilityCriteria, InteractionLedger, PromptCatalog, PromptGuardError, Result,
};
use chrono::{DateTime, Utc};
use promptguard_types::{
    ExportFormat, ExportStamp, FinetuneRecord, Interaction, ReviewStatus, TrainingData,
    TrainingMessage,
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// A reviewer's verdict on one pending record.
#[derive(Debug, Clone)]
pub struct ReviewDecision {
    /// Quality rating, 1..=5.
    pub rating: u8,
    /// Free-form feedback.
    pub feedback: Option<String>,
    /// Whether to include the record in training exports.
    pub include: bool,
    /// Replacement assistant response used on export.
    pub corrected_response: Option<String>,
    /// Tags aggregated into export statistics.
    pub tags: Vec<String>,
}

/// Options for one export snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Output format adapter.
    pub format: ExportFormat,
    /// Minimum quality rating, inclusive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<u8>,
    /// Only records reviewed at or after this time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Only records reviewed before this time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Drop records rated 2 or below.
    #[serde(default)]
    pub exclude_negative: bool,
    /// Directory the snapshot files are written into.
    pub output_dir: PathBuf,
    /// Recorded in the sidecar metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_by: Option<String>,
}

/// Statistics included in the sidecar metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportStats {
    pub record_count: usize,
    /// Count of records per quality rating.
    pub quality_distribution: BTreeMap<u8, usize>,
    /// Count of records per reviewer tag.
    pub tag_frequency: BTreeMap<String, usize>,
}

/// Result of one export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub export_id: Uuid,
    pub file_path: PathBuf,
    pub metadata_path: PathBuf,
    pub record_count: usize,
    pub stats: ExportStats,
}

/// Mines the ledger into reviewed fine-tuning datasets.
pub struct DatasetCurator {
    conn: Mutex<Connection>,
    ledger: Arc<InteractionLedger>,
    catalog: Arc<PromptCatalog>,
}

impl DatasetCurator {
    /// Open or create the record store at the given path.
    pub fn open(
        path: &Path,
        ledger: Arc<InteractionLedger>,
        catalog: Arc<PromptCatalog>,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, ledger, catalog)
    }

    /// Create a curator from an existing connection.
    pub fn from_connection(
        conn: Connection,
        ledger: Arc<InteractionLedger>,
        catalog: Arc<PromptCatalog>,
    ) -> Result<Self> {
        let curator = Self {
            conn: Mutex::new(conn),
            ledger,
            catalog,
        };
        curator.init_schema()?;
        Ok(curator)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS finetune_records (
                id TEXT PRIMARY KEY,
                interaction_id TEXT NOT NULL UNIQUE,
                quality_rating INTEGER,
                included_in_training INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending_review',
                training_data TEXT NOT NULL,
                reviewer_feedback TEXT,
                corrected_response TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                export_history TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                reviewed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_finetune_status
                ON finetune_records(status);
            "#,
        )?;
        Ok(())
    }

    // =========================================================================
    // Curation
    // =========================================================================

    /// Create pending-review records for eligible interactions that lack
    /// one. Returns how many records were created.
    pub fn prepare(&self, criteria: &EligibilityCriteria) -> Result<usize> {
        let candidates = self.ledger.list_eligible(criteria)?;
        let mut created = 0usize;

        for interaction in candidates {
            if self.record_for_interaction(interaction.id)?.is_some() {
                continue;
            }
            let training_data = self.build_training_data(&interaction)?;
            let record = FinetuneRecord::pending(interaction.id, training_data);
            self.insert(&record)?;
            created += 1;
        }

        if created > 0 {
            info!(target: "promptguard::curator", "Prepared {} records for review", created);
        }
        Ok(created)
    }

    /// Assemble the stored training conversation for one interaction.
    ///
    /// The system message is the decrypted prompt version in effect at the
    /// time. Prompt rows are superseded rather than deleted, so the version
    /// referenced by the interaction is still exactly what ran.
    fn build_training_data(&self, interaction: &Interaction) -> Result<TrainingData> {
        let prompt_id = interaction
            .prompt_id
            .ok_or(PromptGuardError::RecordNotFound(interaction.id))?;
        let system_prompt = self.catalog.decrypt_for(prompt_id)?;

        Ok(TrainingData {
            messages: vec![
                TrainingMessage {
                    role: "system".to_string(),
                    content: system_prompt,
                },
                TrainingMessage {
                    role: "user".to_string(),
                    content: interaction.user_input.clone(),
                },
                TrainingMessage {
                    role: "assistant".to_string(),
                    content: interaction.ai_response.clone(),
                },
            ],
        })
    }

    /// Apply a human review to a pending record.
    pub fn review(&self, record_id: Uuid, decision: ReviewDecision) -> Result<FinetuneRecord> {
        if !(1..=5).contains(&decision.rating) {
            return Err(PromptGuardError::Validation(vec![format!(
                "rating must be within 1..=5, got {}",
                decision.rating
            )]));
        }

        let mut record = self
            .get(record_id)?
            .ok_or(PromptGuardError::RecordNotFound(record_id))?;

        record.quality_rating = Some(decision.rating);
        record.reviewer_feedback = decision.feedback;
        record.corrected_response = decision.corrected_response;
        record.tags = decision.tags;
        record.included_in_training = decision.include;
        record.status = if decision.include {
            ReviewStatus::Approved
        } else {
            ReviewStatus::Rejected
        };
        record.reviewed_at = Some(Utc::now());

        self.persist_review(&record)?;

        // Reviews feed back into ledger quality on the 0..=1 scale.
        self.ledger
            .set_quality_score(record.interaction_id, decision.rating as f64 / 5.0)?;

        Ok(record)
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Write one export snapshot and stamp every exported record.
    pub fn export(&self, options: &ExportOptions) -> Result<ExportReport> {
        let records = self.select_exportable(options)?;
        let export_id = Uuid::new_v4();
        let exported_at = Utc::now();

        std::fs::create_dir_all(&options.output_dir)?;
        let stem = format!("finetune_{}_{}", options.format.label(), export_id);
        let file_path = options.output_dir.join(format!("{}.jsonl", stem));
        let metadata_path = options.output_dir.join(format!("{}_metadata.json", stem));

        let mut stats = ExportStats::default();
        {
            let file = std::fs::File::create(&file_path)?;
            let mut writer = BufWriter::new(file);
            for record in &records {
                let line = render_record(record, options.format)?;
                writeln!(writer, "{}", line)?;

                stats.record_count += 1;
                if let Some(rating) = record.quality_rating {
                    *stats.quality_distribution.entry(rating).or_insert(0) += 1;
                }
                for tag in &record.tags {
                    *stats.tag_frequency.entry(tag.clone()).or_insert(0) += 1;
                }
            }
            writer.flush()?;
        }

        let metadata = serde_json::json!({
            "exported_at": exported_at.to_rfc3339(),
            "exported_by": options.exported_by,
            "options": options,
            "statistics": stats,
        });
        std::fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        let stamp = ExportStamp {
            export_id,
            exported_at,
            format: options.format,
        };
        for record in &records {
            self.append_export_stamp(record.id, &stamp)?;
        }

        info!(
            target: "promptguard::curator",
            "Exported {} records to {}",
            stats.record_count,
            file_path.display()
        );

        Ok(ExportReport {
            export_id,
            file_path,
            metadata_path,
            record_count: stats.record_count,
            stats,
        })
    }

    /// Records passing the export filters, oldest first.
    fn select_exportable(&self, options: &ExportOptions) -> Result<Vec<FinetuneRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM finetune_records
            WHERE included_in_training = 1
              AND status = 'approved'
              AND (?1 IS NULL OR reviewed_at >= ?1)
              AND (?2 IS NULL OR reviewed_at < ?2)
            ORDER BY created_at ASC
            "#,
        )?;
        let records = stmt
            .query_map(
                params![
                    options.since.map(|t| t.to_rfc3339()),
                    options.until.map(|t| t.to_rfc3339()),
                ],
                row_to_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records
            .into_iter()
            .filter(|r| r.meets_quality_floor(options.min_quality))
            .filter(|r| !options.exclude_negative || r.quality_rating.map_or(false, |q| q > 2))
            .collect())
    }

    // =========================================================================
    // Record CRUD
    // =========================================================================

    fn insert(&self, record: &FinetuneRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO finetune_records (
                id, interaction_id, quality_rating, included_in_training, status,
                training_data, reviewer_feedback, corrected_response, tags,
                export_history, created_at, reviewed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                record.id.to_string(),
                record.interaction_id.to_string(),
                record.quality_rating,
                record.included_in_training as i32,
                status_to_string(record.status),
                serde_json::to_string(&record.training_data)?,
                record.reviewer_feedback,
                record.corrected_response,
                serde_json::to_string(&record.tags)?,
                serde_json::to_string(&record.export_history)?,
                record.created_at.to_rfc3339(),
                record.reviewed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn persist_review(&self, record: &FinetuneRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE finetune_records SET
                quality_rating = ?1,
                included_in_training = ?2,
                status = ?3,
                reviewer_feedback = ?4,
                corrected_response = ?5,
                tags = ?6,
                reviewed_at = ?7
            WHERE id = ?8
            "#,
            params![
                record.quality_rating,
                record.included_in_training as i32,
                status_to_string(record.status),
                record.reviewer_feedback,
                record.corrected_response,
                serde_json::to_string(&record.tags)?,
                record.reviewed_at.map(|t| t.to_rfc3339()),
                record.id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn append_export_stamp(&self, record_id: Uuid, stamp: &ExportStamp) -> Result<()> {
        let mut record = self
            .get(record_id)?
            .ok_or(PromptGuardError::RecordNotFound(record_id))?;
        record.export_history.push(stamp.clone());

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE finetune_records SET export_history = ?1 WHERE id = ?2",
            params![
                serde_json::to_string(&record.export_history)?,
                record_id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Get a record by id.
    pub fn get(&self, id: Uuid) -> Result<Option<FinetuneRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT * FROM finetune_records WHERE id = ?1",
                params![id.to_string()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Get the record curated from an interaction, if any.
    pub fn record_for_interaction(&self, interaction_id: Uuid) -> Result<Option<FinetuneRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT * FROM finetune_records WHERE interaction_id = ?1",
                params![interaction_id.to_string()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Pending-review records, oldest first.
    pub fn list_pending(&self, limit: u32) -> Result<Vec<FinetuneRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM finetune_records WHERE status = 'pending_review' ORDER BY created_at ASC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Render one record as a JSONL line in the requested format. The
/// corrected response, when present, replaces the original assistant turn.
fn render_record(record: &FinetuneRecord, format: ExportFormat) -> Result<String> {
    let messages = &record.training_data.messages;
    let find = |role: &str| {
        messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    };
    let system = find("system");
    let user = find("user");
    let assistant = record
        .corrected_response
        .as_deref()
        .unwrap_or_else(|| find("assistant"));

    let line = match format {
        ExportFormat::Openai => serde_json::json!({
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
                { "role": "assistant", "content": assistant },
            ]
        }),
        ExportFormat::Anthropic => serde_json::json!({
            "prompt": format!("{}\n\nHuman: {}\n\nAssistant:", system, user),
            "completion": format!(" {}", assistant),
        }),
        ExportFormat::Jsonl => serde_json::json!({
            "prompt": format!("{}\n\n{}", system, user),
            "completion": assistant,
        }),
    };
    Ok(line.to_string())
}

fn status_to_string(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::PendingReview => "pending_review",
        ReviewStatus::Approved => "approved",
        ReviewStatus::Rejected => "rejected",
    }
}

fn string_to_status(s: &str) -> ReviewStatus {
    match s {
        "approved" => ReviewStatus::Approved,
        "rejected" => ReviewStatus::Rejected,
        _ => ReviewStatus::PendingReview,
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<FinetuneRecord> {
    let id: String = row.get("id")?;
    let interaction_id: String = row.get("interaction_id")?;
    let quality_rating: Option<i64> = row.get("quality_rating")?;
    let included_in_training: i64 = row.get("included_in_training")?;
    let status: String = row.get("status")?;
    let training_data: String = row.get("training_data")?;
    let reviewer_feedback: Option<String> = row.get("reviewer_feedback")?;
    let corrected_response: Option<String> = row.get("corrected_response")?;
    let tags: String = row.get("tags")?;
    let export_history: String = row.get("export_history")?;
    let created_at: String = row.get("created_at")?;
    let reviewed_at: Option<String> = row.get("reviewed_at")?;

    Ok(FinetuneRecord {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        interaction_id: Uuid::parse_str(&interaction_id).unwrap_or_default(),
        quality_rating: quality_rating.map(|r| r as u8),
        included_in_training: included_in_training != 0,
        status: string_to_status(&status),
        training_data: serde_json::from_str(&training_data).unwrap_or_default(),
        reviewer_feedback,
        corrected_response,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        export_history: serde_json::from_str(&export_history).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
        reviewed_at: reviewed_at.map(|s| parse_timestamp(&s)),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewInteraction, SecretStore};
    use promptguard_types::{ModelConfig, TokenUsage};

    struct Fixture {
        curator: DatasetCurator,
        ledger: Arc<InteractionLedger>,
        prompt_id: Uuid,
    }

    fn fixture() -> Fixture {
        let secrets = Arc::new(SecretStore::from_hex_key(&"ab".repeat(32)).unwrap());
        let catalog = Arc::new(
            PromptCatalog::from_connection(Connection::open_in_memory().unwrap(), secrets).unwrap(),
        );
        let ledger = Arc::new(
            InteractionLedger::from_connection(Connection::open_in_memory().unwrap()).unwrap(),
        );
        let prompt = catalog
            .create(
                "reference_coach",
                "You are a reference coach.",
                None,
                ModelConfig::default(),
            )
            .unwrap();
        let curator = DatasetCurator::from_connection(
            Connection::open_in_memory().unwrap(),
            ledger.clone(),
            catalog,
        )
        .unwrap();
        Fixture {
            curator,
            ledger,
            prompt_id: prompt.id,
        }
    }

    fn log_scored(fx: &Fixture, input: &str, response: &str, score: f64) -> Uuid {
        let interaction = fx
            .ledger
            .log(NewInteraction {
                session_id: Uuid::new_v4(),
                prompt_id: Some(fx.prompt_id),
                prompt_hash: "hash".into(),
                encrypted_prompt: None,
                user_input: input.into(),
                ai_response: response.into(),
                model_used: "claude-sonnet-4".into(),
                token_usage: TokenUsage { input: 10, output: 20 },
                success: true,
                output_flag: None,
            })
            .unwrap();
        fx.ledger.set_quality_score(interaction.id, score).unwrap();
        interaction.id
    }

    fn approve(fx: &Fixture, record_id: Uuid, rating: u8) -> FinetuneRecord {
        fx.curator
            .review(
                record_id,
                ReviewDecision {
                    rating,
                    feedback: None,
                    include: true,
                    corrected_response: None,
                    tags: vec!["coaching".into()],
                },
            )
            .unwrap()
    }

    #[test]
    fn test_prepare_creates_records_once() {
        let fx = fixture();
        log_scored(&fx, "how do I ask?", "politely", 0.9);
        log_scored(&fx, "too low", "skip me", 0.5);

        let created = fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        assert_eq!(created, 1);

        // Second run finds nothing new.
        let created = fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        assert_eq!(created, 0);
    }

    #[test]
    fn test_prepared_record_embeds_decrypted_prompt() {
        let fx = fixture();
        log_scored(&fx, "how do I ask?", "politely", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();

        let pending = fx.curator.list_pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        let system = &pending[0].training_data.messages[0];
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are a reference coach.");
    }

    #[test]
    fn test_review_approves_and_backfills_quality() {
        let fx = fixture();
        let interaction_id = log_scored(&fx, "q", "a", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        let pending = fx.curator.list_pending(10).unwrap();

        let reviewed = approve(&fx, pending[0].id, 4);
        assert_eq!(reviewed.status, ReviewStatus::Approved);
        assert!(reviewed.included_in_training);
        assert_eq!(reviewed.quality_rating, Some(4));

        let interaction = fx.ledger.get(interaction_id).unwrap().unwrap();
        assert!((interaction.quality_score.unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_review_rejects_out_of_range_rating() {
        let fx = fixture();
        log_scored(&fx, "q", "a", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        let pending = fx.curator.list_pending(10).unwrap();

        let result = fx.curator.review(
            pending[0].id,
            ReviewDecision {
                rating: 6,
                feedback: None,
                include: true,
                corrected_response: None,
                tags: Vec::new(),
            },
        );
        assert!(matches!(result, Err(PromptGuardError::Validation(_))));
    }

    #[test]
    fn test_export_filters_and_counts_match_file() {
        let fx = fixture();
        log_scored(&fx, "q1", "a1", 0.9);
        log_scored(&fx, "q2", "a2", 0.9);
        log_scored(&fx, "q3", "a3", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        let pending = fx.curator.list_pending(10).unwrap();

        approve(&fx, pending[0].id, 5);
        approve(&fx, pending[1].id, 3);
        // Third record stays pending and must not export.

        let dir = tempfile::tempdir().unwrap();
        let report = fx
            .curator
            .export(&ExportOptions {
                format: ExportFormat::Openai,
                min_quality: Some(4),
                since: None,
                until: None,
                exclude_negative: false,
                output_dir: dir.path().to_path_buf(),
                exported_by: Some("reviewer@test".into()),
            })
            .unwrap();

        assert_eq!(report.record_count, 1);
        let contents = std::fs::read_to_string(&report.file_path).unwrap();
        assert_eq!(contents.lines().count(), report.record_count);

        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["messages"][0]["role"], "system");
        assert_eq!(first["messages"][2]["content"], "a1");

        let metadata: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&report.metadata_path).unwrap()).unwrap();
        assert_eq!(metadata["statistics"]["record_count"], 1);
        assert_eq!(metadata["statistics"]["tag_frequency"]["coaching"], 1);
    }

    #[test]
    fn test_export_stamps_history_without_deleting() {
        let fx = fixture();
        log_scored(&fx, "q", "a", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        let pending = fx.curator.list_pending(10).unwrap();
        approve(&fx, pending[0].id, 5);

        let dir = tempfile::tempdir().unwrap();
        let options = ExportOptions {
            format: ExportFormat::Jsonl,
            min_quality: None,
            since: None,
            until: None,
            exclude_negative: false,
            output_dir: dir.path().to_path_buf(),
            exported_by: None,
        };

        let first = fx.curator.export(&options).unwrap();
        let second = fx.curator.export(&options).unwrap();
        assert_eq!(first.record_count, 1);
        assert_eq!(second.record_count, 1);

        let record = fx.curator.get(pending[0].id).unwrap().unwrap();
        assert_eq!(record.export_history.len(), 2);
        assert_ne!(first.export_id, second.export_id);
    }

    #[test]
    fn test_anthropic_and_generic_formats() {
        let fx = fixture();
        log_scored(&fx, "how?", "like this", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        let pending = fx.curator.list_pending(10).unwrap();
        approve(&fx, pending[0].id, 5);

        let dir = tempfile::tempdir().unwrap();
        let report = fx
            .curator
            .export(&ExportOptions {
                format: ExportFormat::Anthropic,
                min_quality: None,
                since: None,
                until: None,
                exclude_negative: false,
                output_dir: dir.path().to_path_buf(),
                exported_by: None,
            })
            .unwrap();

        let contents = std::fs::read_to_string(&report.file_path).unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        let prompt = line["prompt"].as_str().unwrap();
        assert!(prompt.contains("\n\nHuman: how?"));
        assert!(prompt.ends_with("Assistant:"));
        assert_eq!(line["completion"], " like this");
    }

    #[test]
    fn test_corrected_response_replaces_assistant_turn() {
        let fx = fixture();
        log_scored(&fx, "q", "rough answer", 0.9);
        fx.curator.prepare(&EligibilityCriteria::default()).unwrap();
        let pending = fx.curator.list_pending(10).unwrap();

        fx.curator
            .review(
                pending[0].id,
                ReviewDecision {
                    rating: 4,
                    feedback: Some("tightened wording".into()),
                    include: true,
                    corrected_response: Some("polished answer".into()),
                    tags: Vec::new(),
                },
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let report = fx
            .curator
            .export(&ExportOptions {
                format: ExportFormat::Openai,
                min_quality: None,
                since: None,
                until: None,
                exclude_negative: false,
                output_dir: dir.path().to_path_buf(),
                exported_by: None,
            })
            .unwrap();

        let contents = std::fs::read_to_string(&report.file_path).unwrap();
        assert!(contents.contains("polished answer"));
        assert!(!contents.contains("rough answer"));
    }
}
