//! Provider gateway seam.
//!
//! The core treats LLM vendors as a single external collaborator behind
//! this trait: one call per attempt, no retry and no vendor fallback here.
//! Retry and cross-vendor ordering belong to the gateway implementation.

use crate::Result;
use async_trait::async_trait;
use promptguard_types::{ModelConfig, TokenUsage};
use serde::{Deserialize, Serialize};

/// Options for one completion attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Requested model, gateway default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature, 0.0..=1.0.
    pub temperature: f32,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

impl CompletionOptions {
    /// Build options from a prompt version's stored configuration.
    pub fn from_model_config(model_preference: Option<String>, config: &ModelConfig) -> Self {
        Self {
            model: model_preference,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop_sequences: config.stop_sequences.clone(),
        }
    }

    /// Canonical form used in cache fingerprints.
    pub fn fingerprint_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// What the gateway returns for one completed attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// Raw response text. Must pass the safety filter before leaving the core.
    pub content: String,
    /// Token accounting for the attempt.
    pub token_usage: TokenUsage,
    /// Cost in USD as reported by the gateway.
    pub cost_usd: f64,
    /// Model that actually served the request.
    pub model: String,
}

/// External LLM gateway. One async call per attempt; failures surface as
/// [`PromptGuardError::ProviderUnavailable`](crate::PromptGuardError::ProviderUnavailable).
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn execute(&self, full_prompt: &str, options: &CompletionOptions) -> Result<GatewayResponse>;
}
