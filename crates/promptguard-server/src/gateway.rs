//! HTTP client for the external provider gateway.
//!
//! The gateway owns vendor SDKs, retry, and cross-vendor fallback. This
//! client performs exactly one request per attempt and maps every
//! transport or protocol failure to `ProviderUnavailable` without echoing
//! raw payloads into the error.

use async_trait::async_trait;
use promptguard_core::{CompletionOptions, GatewayResponse, PromptGuardError, ProviderGateway};
use promptguard_types::TokenUsage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    content: String,
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cost_usd: f64,
    model: String,
}

/// Reqwest-backed [`ProviderGateway`] implementation.
pub struct HttpProviderGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProviderGateway {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }
}

#[async_trait]
impl ProviderGateway for HttpProviderGateway {
    async fn execute(
        &self,
        full_prompt: &str,
        options: &CompletionOptions,
    ) -> promptguard_core::Result<GatewayResponse> {
        let request = ExecuteRequest {
            prompt: full_prompt,
            model: options.model.as_deref(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stop_sequences: options.stop_sequences.clone(),
        };

        let response = self
            .client
            .post(format!("{}/v1/execute", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "promptguard::chat", "Gateway request failed: {}", e);
                PromptGuardError::ProviderUnavailable("gateway unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(target: "promptguard::chat", "Gateway returned {}", status);
            return Err(PromptGuardError::ProviderUnavailable(format!(
                "gateway returned {}",
                status
            )));
        }

        let body: ExecuteResponse = response.json().await.map_err(|_| {
            PromptGuardError::ProviderUnavailable("gateway returned malformed response".to_string())
        })?;

        Ok(GatewayResponse {
            content: body.content,
            token_usage: TokenUsage {
                input: body.input_tokens,
                output: body.output_tokens,
            },
            cost_usd: body.cost_usd,
            model: body.model,
        })
    }
}
