//! Secure prompt and response orchestration core.
//!
//! Stores system prompts encrypted at rest, assembles hidden prompts for
//! LLM calls, caches responses, validates and sanitizes everything a
//! provider returns, audits each exchange, and curates fine-tuning
//! datasets. Nothing exported from this crate can carry a decrypted
//! system prompt across the API boundary.

mod cache;
mod catalog;
mod curator;
mod db;
mod error;
mod ledger;
mod orchestrator;
mod provider;
mod safety;
mod secrets;

pub use cache::{CacheConfig, CacheStats, CachedResponse, ResponseCache};
pub use catalog::{PromptCatalog, PromptPatch};
pub use curator::{DatasetCurator, ExportOptions, ExportReport, ExportStats, ReviewDecision};
pub use db::SessionStore;
pub use error::PromptGuardError;
pub use ledger::{EligibilityCriteria, InteractionLedger, NewInteraction};
pub use orchestrator::{ChatCallOptions, ChatOrchestrator, OrchestratorConfig};
pub use provider::{CompletionOptions, GatewayResponse, ProviderGateway};
pub use safety::{
    redact_sensitive, validate_authenticity, AuthenticityReport, Confidence, ParseOutcome,
    PiiScan, PiiType, SafetyFilter, ScoreBreakdown,
};
pub use secrets::SecretStore;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, PromptGuardError>;
