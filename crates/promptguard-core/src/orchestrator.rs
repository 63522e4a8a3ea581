//! Chat orchestration across the catalog, cache, gateway, filter, and ledger.
//!
//! The hidden prompt (decrypted system prompt + user message) exists only
//! as a stack-local value inside one call. It is never stored in shared
//! state, returned, or logged; the only durable trace is its hash and,
//! when training capture is enabled, a secret-store blob.

use crate::{
    validate_authenticity, AuthenticityReport, CachedResponse, CompletionOptions, GatewayResponse,
    InteractionLedger, NewInteraction, PromptCatalog, PromptGuardError, ProviderGateway,
    ResponseCache, Result, SafetyFilter, SecretStore, SessionStore,
};
use promptguard_types::{ChatChunk, ChatResponse, ChatSession, EncryptedPrompt, SessionStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cache task type for credibility scoring calls. Scoring is stateless
/// per submission, so identical submissions can share a cached verdict.
const SCORING_TASK: &str = "reference_scoring";

/// Streamed chunk size in characters.
const STREAM_CHUNK_CHARS: usize = 80;

/// Depth of the streaming channel; the producer pauses when the consumer
/// falls this far behind.
const STREAM_BUFFER_CHUNKS: usize = 16;

/// Per-call options for one chat exchange.
#[derive(Debug, Clone, Default)]
pub struct ChatCallOptions {
    /// Cache task type. Responses for cacheable task types are served from
    /// and written to the response cache; plain conversation stays uncached.
    pub cache_task: Option<String>,
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Capture the full hidden prompt, encrypted, on each ledger row for
    /// later training use.
    pub capture_prompt_for_training: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            capture_prompt_for_training: true,
        }
    }
}

/// Runs the chat pipeline end to end and returns only sanitized payloads.
pub struct ChatOrchestrator {
    catalog: Arc<PromptCatalog>,
    sessions: Arc<SessionStore>,
    ledger: Arc<InteractionLedger>,
    cache: Arc<ResponseCache>,
    gateway: Arc<dyn ProviderGateway>,
    safety: SafetyFilter,
    secrets: Arc<SecretStore>,
    config: OrchestratorConfig,
}

impl ChatOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<PromptCatalog>,
        sessions: Arc<SessionStore>,
        ledger: Arc<InteractionLedger>,
        cache: Arc<ResponseCache>,
        gateway: Arc<dyn ProviderGateway>,
        safety: SafetyFilter,
        secrets: Arc<SecretStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            catalog,
            sessions,
            ledger,
            cache,
            gateway,
            safety,
            secrets,
            config,
        }
    }

    /// Run one chat exchange and return the sanitized result.
    pub async fn chat(
        &self,
        agent_id: Uuid,
        user_message: &str,
        owner_id: Uuid,
    ) -> Result<ChatResponse> {
        self.chat_with_options(agent_id, user_message, owner_id, ChatCallOptions::default())
            .await
    }

    /// Run one chat exchange with per-call options.
    pub async fn chat_with_options(
        &self,
        agent_id: Uuid,
        user_message: &str,
        owner_id: Uuid,
        options: ChatCallOptions,
    ) -> Result<ChatResponse> {
        let session = self.authorize(agent_id, owner_id)?;
        let prompt = self.resolve_prompt(&session)?;

        // Decrypted plaintext lives on this stack frame only.
        let system_prompt = self.catalog.decrypt_for(prompt.id)?;
        let full_prompt = format!("{}\n\n{}", system_prompt, user_message);

        let completion =
            CompletionOptions::from_model_config(prompt.model_preference.clone(), &prompt.model_config);

        let raw = self
            .execute_via_cache(&full_prompt, &completion, options.cache_task.as_deref())
            .await?;

        let (message, output_flag) = self.filter_output(&raw.content);

        let encrypted_prompt = if self.config.capture_prompt_for_training {
            Some(self.secrets.encrypt(&full_prompt)?)
        } else {
            None
        };

        let interaction = self.ledger.log(NewInteraction {
            session_id: session.id,
            prompt_id: Some(prompt.id),
            prompt_hash: prompt.prompt_hash.clone(),
            encrypted_prompt,
            user_input: user_message.to_string(),
            ai_response: message.clone(),
            model_used: raw.model.clone(),
            token_usage: raw.token_usage,
            success: true,
            output_flag,
        })?;

        self.sessions
            .record_usage(session.id, raw.token_usage.total(), interaction.cost_usd)?;

        debug!(
            target: "promptguard::chat",
            "Completed interaction {} on session {} ({} tokens)",
            interaction.id, session.agent_id, raw.token_usage.total()
        );

        Ok(ChatResponse {
            message,
            interaction_id: interaction.id,
            tokens_used: raw.token_usage.total(),
            model_used: raw.model,
        })
    }

    /// Run one chat exchange and stream the sanitized result as ordered
    /// chunks, terminated by a chunk carrying the interaction id.
    ///
    /// Validation and the ledger write happen before the first chunk is
    /// emitted, so a consumer that disconnects mid-stream cancels delivery
    /// without losing the audit record.
    pub async fn chat_stream(
        &self,
        agent_id: Uuid,
        user_message: &str,
        owner_id: Uuid,
        options: ChatCallOptions,
    ) -> Result<mpsc::Receiver<ChatChunk>> {
        let response = self
            .chat_with_options(agent_id, user_message, owner_id, options)
            .await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
        tokio::spawn(async move {
            let chars: Vec<char> = response.message.chars().collect();
            for window in chars.chunks(STREAM_CHUNK_CHARS) {
                let chunk = ChatChunk::content(window.iter().collect());
                if tx.send(chunk).await.is_err() {
                    // Consumer went away; the ledger entry is already final.
                    debug!(target: "promptguard::chat", "Stream cancelled by consumer");
                    return;
                }
            }
            let _ = tx.send(ChatChunk::terminal(response.interaction_id)).await;
        });
        Ok(rx)
    }

    /// Score submitted reference content against the session's prompt and
    /// return the validated structured report.
    ///
    /// The provider must answer with the authenticity schema; a response
    /// that fails validation is discarded and surfaces as field errors,
    /// though the failed exchange is still audited.
    pub async fn score_reference(
        &self,
        agent_id: Uuid,
        content: &str,
        owner_id: Uuid,
    ) -> Result<AuthenticityReport> {
        let session = self.authorize(agent_id, owner_id)?;
        let prompt = self.resolve_prompt(&session)?;

        let system_prompt = self.catalog.decrypt_for(prompt.id)?;
        let full_prompt = format!("{}\n\n{}", system_prompt, content);

        let completion =
            CompletionOptions::from_model_config(prompt.model_preference.clone(), &prompt.model_config);
        let raw = self
            .execute_via_cache(&full_prompt, &completion, Some(SCORING_TASK))
            .await?;

        let encrypted_prompt = if self.config.capture_prompt_for_training {
            Some(self.secrets.encrypt(&full_prompt)?)
        } else {
            None
        };

        let outcome = self
            .safety
            .parse_structured::<AuthenticityReport, _>(&raw.content, validate_authenticity);

        let Some(report) = outcome.data else {
            let failed = self.ledger.log(NewInteraction {
                session_id: session.id,
                prompt_id: Some(prompt.id),
                prompt_hash: prompt.prompt_hash.clone(),
                encrypted_prompt,
                user_input: content.to_string(),
                ai_response: String::new(),
                model_used: raw.model.clone(),
                token_usage: raw.token_usage,
                success: false,
                output_flag: Some(format!(
                    "structured response rejected: {}",
                    outcome.errors.join("; ")
                )),
            })?;
            self.sessions
                .record_usage(session.id, raw.token_usage.total(), failed.cost_usd)?;
            return Err(PromptGuardError::Validation(outcome.errors));
        };

        // Bound list sizes and scrub the free-text fields before the
        // report leaves the core.
        let mut value = serde_json::to_value(&report)?;
        self.safety.cap_arrays(&mut value);
        let mut report: AuthenticityReport = serde_json::from_value(value)?;
        report.reasoning = self.safety.sanitize_text(&report.reasoning);

        let interaction = self.ledger.log(NewInteraction {
            session_id: session.id,
            prompt_id: Some(prompt.id),
            prompt_hash: prompt.prompt_hash.clone(),
            encrypted_prompt,
            user_input: content.to_string(),
            ai_response: serde_json::to_string(&report)?,
            model_used: raw.model.clone(),
            token_usage: raw.token_usage,
            success: true,
            output_flag: None,
        })?;

        self.sessions
            .record_usage(session.id, raw.token_usage.total(), interaction.cost_usd)?;

        Ok(report)
    }

    /// Resolve and authorize the session addressed by a public agent handle.
    fn authorize(&self, agent_id: Uuid, owner_id: Uuid) -> Result<ChatSession> {
        let session = self
            .sessions
            .get_by_agent(agent_id)?
            .ok_or(PromptGuardError::SessionNotFound(agent_id))?;

        if session.owner_id != owner_id {
            warn!(
                target: "promptguard::chat",
                "Owner mismatch on session {}", agent_id
            );
            return Err(PromptGuardError::UnauthorizedAccess);
        }

        let now = chrono::Utc::now();
        if session.status != SessionStatus::Active {
            return Err(PromptGuardError::SessionNotFound(agent_id));
        }
        if session.is_expired(now) {
            self.sessions.set_status(session.id, SessionStatus::Expired)?;
            return Err(PromptGuardError::SessionNotFound(agent_id));
        }

        Ok(session)
    }

    /// Resolve the active prompt for a session, pinning it on first use.
    fn resolve_prompt(&self, session: &ChatSession) -> Result<EncryptedPrompt> {
        let prompt = self.catalog.get_active(&session.session_type)?;
        if session.active_prompt_id != Some(prompt.id) {
            self.sessions.set_active_prompt(session.id, prompt.id)?;
        }
        Ok(prompt)
    }

    /// Invoke the gateway, going through the cache for cacheable task types.
    async fn execute_via_cache(
        &self,
        full_prompt: &str,
        completion: &CompletionOptions,
        cache_task: Option<&str>,
    ) -> Result<GatewayResponse> {
        let Some(task_type) = cache_task else {
            return self.gateway.execute(full_prompt, completion).await;
        };

        let options_key = completion.fingerprint_key();
        if let Some(cached) = self.cache.get(task_type, full_prompt, &options_key) {
            return Ok(GatewayResponse {
                content: cached.content,
                token_usage: cached.token_usage,
                cost_usd: cached.cost_usd,
                model: cached.model,
            });
        }

        let response = self.gateway.execute(full_prompt, completion).await?;
        self.cache.set(
            task_type,
            full_prompt,
            &options_key,
            CachedResponse {
                content: response.content.clone(),
                model: response.model.clone(),
                token_usage: response.token_usage,
                cost_usd: response.cost_usd,
            },
        );
        Ok(response)
    }

    /// Sanitize provider output and run the advisory detectors.
    fn filter_output(&self, raw_content: &str) -> (String, Option<String>) {
        let message = self.safety.sanitize_text(raw_content);

        let mut reasons = Vec::new();
        if self.safety.detect_exfiltration(&message) {
            reasons.push("possible data exfiltration in response".to_string());
        }
        let pii = self.safety.detect_pii(&message);
        if pii.detected {
            reasons.push(format!("PII detected in response: {:?}", pii.types));
        }

        if reasons.is_empty() {
            (message, None)
        } else {
            info!(
                target: "promptguard::safety",
                "Response flagged for review: {}",
                reasons.join("; ")
            );
            (message, Some(reasons.join("; ")))
        }
    }
}
