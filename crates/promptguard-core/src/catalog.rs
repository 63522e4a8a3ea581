//! Versioned registry of encrypted system prompts.
//!
//! One active version per session type. Creating or activating a version
//! deactivates its siblings inside the same transaction, so there is no
//! window with two active rows. Decryption is crate-private; nothing
//! outside the core can reach plaintext through this type.

use crate::{PromptGuardError, Result, SecretStore};
use chrono::{DateTime, Utc};
use promptguard_types::{EncryptedPrompt, ModelConfig, PromptSummary};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// Fields an administrative update may patch on a prompt version.
#[derive(Debug, Clone, Default)]
pub struct PromptPatch {
    /// Replace the preferred model.
    pub model_preference: Option<String>,
    /// Replace the generation options.
    pub model_config: Option<ModelConfig>,
    /// Make this version the active one for its session type.
    pub activate: bool,
}

/// SQLite-backed prompt registry built on the secret store.
pub struct PromptCatalog {
    conn: Mutex<Connection>,
    secrets: Arc<SecretStore>,
}

impl PromptCatalog {
    /// Open or create the catalog at the given database path.
    pub fn open(path: &Path, secrets: Arc<SecretStore>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn, secrets)
    }

    /// Create a catalog from an existing connection.
    pub fn from_connection(conn: Connection, secrets: Arc<SecretStore>) -> Result<Self> {
        let catalog = Self {
            conn: Mutex::new(conn),
            secrets,
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS prompts (
                id TEXT PRIMARY KEY,
                session_type TEXT NOT NULL,
                version INTEGER NOT NULL,
                ciphertext TEXT NOT NULL,
                prompt_hash TEXT NOT NULL,
                model_preference TEXT,
                model_config TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_prompts_type_version
                ON prompts(session_type, version);
            CREATE INDEX IF NOT EXISTS idx_prompts_active
                ON prompts(session_type, is_active);
            "#,
        )?;
        Ok(())
    }

    /// Encrypt and register a new prompt version, making it active.
    ///
    /// Version is `max(existing) + 1` per session type. Prior versions are
    /// deactivated in the same transaction.
    pub fn create(
        &self,
        session_type: &str,
        plaintext: &str,
        model_preference: Option<String>,
        model_config: ModelConfig,
    ) -> Result<EncryptedPrompt> {
        let config_errors = model_config.validate();
        if !config_errors.is_empty() {
            return Err(PromptGuardError::Validation(config_errors));
        }

        let ciphertext = self.secrets.encrypt(plaintext)?;
        let prompt_hash = EncryptedPrompt::hash_plaintext(plaintext);
        let now = Utc::now();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let next_version: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM prompts WHERE session_type = ?1",
                params![session_type],
                |row| row.get(0),
            )?;

        tx.execute(
            "UPDATE prompts SET is_active = 0, updated_at = ?1 WHERE session_type = ?2 AND is_active = 1",
            params![now.to_rfc3339(), session_type],
        )?;

        let prompt = EncryptedPrompt {
            id: Uuid::new_v4(),
            session_type: session_type.to_string(),
            version: next_version as u32,
            ciphertext,
            prompt_hash,
            model_preference,
            model_config,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        tx.execute(
            r#"
            INSERT INTO prompts (
                id, session_type, version, ciphertext, prompt_hash,
                model_preference, model_config, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)
            "#,
            params![
                prompt.id.to_string(),
                prompt.session_type,
                prompt.version,
                prompt.ciphertext,
                prompt.prompt_hash,
                prompt.model_preference,
                serde_json::to_string(&prompt.model_config)?,
                prompt.created_at.to_rfc3339(),
                prompt.updated_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;
        info!(
            target: "promptguard::catalog",
            "Registered prompt version {} for session type {}",
            prompt.version, prompt.session_type
        );
        Ok(prompt)
    }

    /// Get the active prompt for a session type.
    pub fn get_active(&self, session_type: &str) -> Result<EncryptedPrompt> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM prompts WHERE session_type = ?1 AND is_active = 1",
            params![session_type],
            row_to_prompt,
        )
        .optional()?
        .ok_or_else(|| PromptGuardError::PromptNotFound(session_type.to_string()))
    }

    /// Get a prompt version by id.
    pub fn get(&self, id: Uuid) -> Result<Option<EncryptedPrompt>> {
        let conn = self.conn.lock().unwrap();
        let prompt = conn
            .query_row(
                "SELECT * FROM prompts WHERE id = ?1",
                params![id.to_string()],
                row_to_prompt,
            )
            .optional()?;
        Ok(prompt)
    }

    /// Patch a prompt version. Activation deactivates siblings atomically.
    pub fn update(&self, id: Uuid, patch: PromptPatch) -> Result<EncryptedPrompt> {
        if let Some(config) = &patch.model_config {
            let errors = config.validate();
            if !errors.is_empty() {
                return Err(PromptGuardError::Validation(errors));
            }
        }

        let now = Utc::now();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut prompt = tx
            .query_row(
                "SELECT * FROM prompts WHERE id = ?1",
                params![id.to_string()],
                row_to_prompt,
            )
            .optional()?
            .ok_or(PromptGuardError::RecordNotFound(id))?;

        if let Some(preference) = patch.model_preference {
            prompt.model_preference = Some(preference);
        }
        if let Some(config) = patch.model_config {
            prompt.model_config = config;
        }
        if patch.activate {
            tx.execute(
                "UPDATE prompts SET is_active = 0, updated_at = ?1 WHERE session_type = ?2 AND is_active = 1",
                params![now.to_rfc3339(), prompt.session_type],
            )?;
            prompt.is_active = true;
        }
        prompt.updated_at = now;

        tx.execute(
            r#"
            UPDATE prompts SET
                model_preference = ?1,
                model_config = ?2,
                is_active = ?3,
                updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                prompt.model_preference,
                serde_json::to_string(&prompt.model_config)?,
                prompt.is_active as i32,
                prompt.updated_at.to_rfc3339(),
                prompt.id.to_string(),
            ],
        )?;

        tx.commit()?;
        Ok(prompt)
    }

    /// List prompt versions, optionally scoped to a session type.
    /// Summaries never carry ciphertext.
    pub fn list(&self, session_type: Option<&str>) -> Result<Vec<PromptSummary>> {
        let conn = self.conn.lock().unwrap();
        let collect = |query: &str, params: &[&dyn rusqlite::ToSql]| -> Result<Vec<PromptSummary>> {
            let mut stmt = conn.prepare(query)?;
            let summaries = stmt
                .query_map(params, |row| row_to_prompt(row).map(|p| PromptSummary::from(&p)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(summaries)
        };

        match session_type {
            Some(session_type) => collect(
                "SELECT * FROM prompts WHERE session_type = ?1 ORDER BY version DESC",
                &[&session_type],
            ),
            None => collect(
                "SELECT * FROM prompts ORDER BY session_type ASC, version DESC",
                &[],
            ),
        }
    }

    /// Decrypt the plaintext of a prompt version.
    ///
    /// Privileged: reachable only inside this crate (the orchestrator and
    /// the dataset curator). Never routed through any public surface.
    pub(crate) fn decrypt_for(&self, id: Uuid) -> Result<String> {
        let prompt = self.get(id)?.ok_or(PromptGuardError::RecordNotFound(id))?;
        self.secrets.decrypt(&prompt.ciphertext)
    }
}

fn row_to_prompt(row: &rusqlite::Row) -> rusqlite::Result<EncryptedPrompt> {
    let id: String = row.get("id")?;
    let session_type: String = row.get("session_type")?;
    let version: i64 = row.get("version")?;
    let ciphertext: String = row.get("ciphertext")?;
    let prompt_hash: String = row.get("prompt_hash")?;
    let model_preference: Option<String> = row.get("model_preference")?;
    let model_config: String = row.get("model_config")?;
    let is_active: i64 = row.get("is_active")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(EncryptedPrompt {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        session_type,
        version: version as u32,
        ciphertext,
        prompt_hash,
        model_preference,
        model_config: serde_json::from_str(&model_config).unwrap_or_default(),
        is_active: is_active != 0,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
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

    fn test_catalog() -> PromptCatalog {
        let secrets = Arc::new(SecretStore::from_hex_key(&"ab".repeat(32)).unwrap());
        let conn = Connection::open_in_memory().unwrap();
        PromptCatalog::from_connection(conn, secrets).unwrap()
    }

    #[test]
    fn test_create_assigns_monotonic_versions() {
        let catalog = test_catalog();
        let v1 = catalog
            .create("reference_coach", "be helpful", None, ModelConfig::default())
            .unwrap();
        let v2 = catalog
            .create("reference_coach", "be more helpful", None, ModelConfig::default())
            .unwrap();
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
    }

    #[test]
    fn test_new_version_deactivates_prior() {
        let catalog = test_catalog();
        let v1 = catalog
            .create("reference_coach", "one", None, ModelConfig::default())
            .unwrap();
        let v2 = catalog
            .create("reference_coach", "two", None, ModelConfig::default())
            .unwrap();

        let active = catalog.get_active("reference_coach").unwrap();
        assert_eq!(active.id, v2.id);

        let v1_reloaded = catalog.get(v1.id).unwrap().unwrap();
        assert!(!v1_reloaded.is_active);

        let active_count = catalog
            .list(Some("reference_coach"))
            .unwrap()
            .iter()
            .filter(|p| p.is_active)
            .count();
        assert_eq!(active_count, 1);
    }

    #[test]
    fn test_get_active_missing_type() {
        let catalog = test_catalog();
        assert!(matches!(
            catalog.get_active("verification"),
            Err(PromptGuardError::PromptNotFound(_))
        ));
    }

    #[test]
    fn test_ciphertext_is_not_plaintext_and_decrypts() {
        let catalog = test_catalog();
        let prompt = catalog
            .create("reference_coach", "You are a reference coach.", None, ModelConfig::default())
            .unwrap();
        assert!(!prompt.ciphertext.contains("reference coach"));
        assert_eq!(
            catalog.decrypt_for(prompt.id).unwrap(),
            "You are a reference coach."
        );
    }

    #[test]
    fn test_update_activate_swaps_single_active() {
        let catalog = test_catalog();
        let v1 = catalog
            .create("reference_coach", "one", None, ModelConfig::default())
            .unwrap();
        let _v2 = catalog
            .create("reference_coach", "two", None, ModelConfig::default())
            .unwrap();

        let reactivated = catalog
            .update(
                v1.id,
                PromptPatch {
                    activate: true,
                    ..PromptPatch::default()
                },
            )
            .unwrap();
        assert!(reactivated.is_active);
        assert_eq!(catalog.get_active("reference_coach").unwrap().id, v1.id);
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let catalog = test_catalog();
        let bad = ModelConfig {
            temperature: 2.0,
            ..ModelConfig::default()
        };
        assert!(matches!(
            catalog.create("reference_coach", "x", None, bad),
            Err(PromptGuardError::Validation(_))
        ));
    }
}
