//! Interaction audit types.
//!
//! One row per prompt/response exchange. Rows are append-only and store
//! only sanitized text; the system prompt appears as a hash (and optionally
//! as a secret-store blob for training use), never as plaintext.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token counts reported by the provider for one exchange.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the assembled request.
    pub input: u64,
    /// Tokens in the generated response.
    pub output: u64,
}

impl TokenUsage {
    /// Total tokens across input and output.
    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

/// A single logged prompt/response exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Unique identifier for this interaction.
    pub id: Uuid,
    /// Session this interaction belongs to.
    pub session_id: Uuid,
    /// Prompt version in effect at the time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<Uuid>,
    /// Sanitized user input.
    pub user_input: String,
    /// Sanitized assistant response.
    pub ai_response: String,
    /// Model that produced the response.
    pub model_used: String,
    /// Token usage for this exchange.
    pub token_usage: TokenUsage,
    /// Cost in USD for this exchange.
    pub cost_usd: f64,
    /// Whether the input or output tripped a security heuristic.
    pub flagged: bool,
    /// Reason the interaction was flagged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_reason: Option<String>,
    /// Quality score 0.0..=1.0 assigned during review, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Whether the exchange completed successfully.
    pub success: bool,
    /// SHA-256 hash of the system prompt plaintext in effect.
    pub prompt_hash: String,
    /// Secret-store blob of the full prompt, kept for training only.
    #[serde(skip_serializing)]
    pub encrypted_prompt: Option<String>,
    /// When the interaction was logged.
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics for a session's interactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionStats {
    /// Number of interactions.
    pub interaction_count: u64,
    /// Interactions that completed successfully.
    pub success_count: u64,
    /// Interactions flagged by a security heuristic.
    pub flagged_count: u64,
    /// Total input tokens.
    pub total_input_tokens: u64,
    /// Total output tokens.
    pub total_output_tokens: u64,
    /// Total cost in USD.
    pub total_cost_usd: f64,
    /// First interaction timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_interaction_at: Option<DateTime<Utc>>,
    /// Last interaction timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interaction_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_prompt_never_serialized() {
        let interaction = Interaction {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            prompt_id: None,
            user_input: "hi".into(),
            ai_response: "hello".into(),
            model_used: "claude-sonnet".into(),
            token_usage: TokenUsage { input: 3, output: 5 },
            cost_usd: 0.0001,
            flagged: false,
            flag_reason: None,
            quality_score: None,
            success: true,
            prompt_hash: "abc123".into(),
            encrypted_prompt: Some("ciphertext-blob".into()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&interaction).unwrap();
        assert!(!json.contains("ciphertext-blob"));
        assert!(!json.contains("encrypted_prompt"));
    }
}
