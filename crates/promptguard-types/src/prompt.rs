//! Encrypted system prompt types.
//!
//! System prompts are stored encrypted at rest and versioned per session
//! type. The plaintext only ever exists transiently inside the core; these
//! types carry ciphertext and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed model configuration attached to a prompt version.
///
/// Replaces free-form metadata maps with an explicit set of recognized
/// options so invalid configurations are rejected before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Sampling temperature, 0.0..=1.0.
    pub temperature: f32,
    /// Maximum output tokens, 1..=200_000.
    pub max_tokens: u32,
    /// Stop sequences passed to the provider.
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            stop_sequences: Vec::new(),
        }
    }
}

impl ModelConfig {
    /// Validate option ranges. Returns human-readable field errors.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.temperature) {
            errors.push(format!(
                "temperature must be within 0.0..=1.0, got {}",
                self.temperature
            ));
        }
        if self.max_tokens == 0 || self.max_tokens > 200_000 {
            errors.push(format!(
                "max_tokens must be within 1..=200000, got {}",
                self.max_tokens
            ));
        }
        errors
    }
}

/// A versioned, encrypted system prompt.
///
/// At most one version per session type is active at a time; activating a
/// version deactivates its siblings atomically. Rows are superseded, never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPrompt {
    /// Unique identifier for this prompt version.
    pub id: Uuid,
    /// Session type this prompt serves (e.g. "reference_coach").
    pub session_type: String,
    /// Monotonic version number within the session type (1, 2, 3, ...).
    pub version: u32,
    /// Encrypted prompt blob produced by the secret store.
    pub ciphertext: String,
    /// SHA-256 hash of the plaintext, for change tracking without decryption.
    pub prompt_hash: String,
    /// Preferred model for this prompt version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preference: Option<String>,
    /// Generation options for this prompt version.
    pub model_config: ModelConfig,
    /// Whether this is the active version for its session type.
    pub is_active: bool,
    /// When this version was created.
    pub created_at: DateTime<Utc>,
    /// When this version was last updated.
    pub updated_at: DateTime<Utc>,
}

impl EncryptedPrompt {
    /// Compute the content hash stored alongside a prompt version.
    pub fn hash_plaintext(plaintext: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(plaintext.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Summary view of a prompt version for admin listings.
///
/// Deliberately omits the ciphertext so listings can be serialized to
/// clients without carrying encrypted payloads around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSummary {
    pub id: Uuid,
    pub session_type: String,
    pub version: u32,
    pub model_preference: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&EncryptedPrompt> for PromptSummary {
    fn from(prompt: &EncryptedPrompt) -> Self {
        Self {
            id: prompt.id,
            session_type: prompt.session_type.clone(),
            version: prompt.version,
            model_preference: prompt.model_preference.clone(),
            is_active: prompt.is_active,
            created_at: prompt.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_validate_ranges() {
        assert!(ModelConfig::default().validate().is_empty());

        let bad = ModelConfig {
            temperature: 1.5,
            max_tokens: 0,
            stop_sequences: Vec::new(),
        };
        let errors = bad.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("temperature"));
        assert!(errors[1].contains("max_tokens"));
    }

    #[test]
    fn test_summary_has_no_ciphertext() {
        let prompt = EncryptedPrompt {
            id: Uuid::new_v4(),
            session_type: "reference_coach".into(),
            version: 1,
            ciphertext: "opaque".into(),
            prompt_hash: EncryptedPrompt::hash_plaintext("hello"),
            model_preference: None,
            model_config: ModelConfig::default(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let summary = PromptSummary::from(&prompt);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("opaque"));
    }
}
