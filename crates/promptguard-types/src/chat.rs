//! Client-facing chat payloads.
//!
//! These are the only shapes that cross the trust boundary. None of them
//! has a field capable of holding a system prompt or provider raw payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a history entry.
///
/// Two variants only. A `system` row cannot be represented, so prompt
/// material can never leak through the history surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// The session owner's message.
    User,
    /// The sanitized assistant response.
    Assistant,
}

/// The sanitized result of one chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Sanitized assistant text.
    pub message: String,
    /// Ledger entry for this exchange.
    pub interaction_id: Uuid,
    /// Total tokens consumed (input + output).
    pub tokens_used: u64,
    /// Model that produced the response.
    pub model_used: String,
}

/// One chunk of a streamed chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Text fragment. Empty on the terminal chunk.
    pub chunk: String,
    /// Whether this is the terminal chunk.
    pub done: bool,
    /// Ledger entry id, present only on the terminal chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<Uuid>,
}

impl ChatChunk {
    /// A content chunk.
    pub fn content(chunk: String) -> Self {
        Self {
            chunk,
            done: false,
            interaction_id: None,
        }
    }

    /// The terminal chunk carrying the interaction id.
    pub fn terminal(interaction_id: Uuid) -> Self {
        Self {
            chunk: String::new(),
            done: true,
            interaction_id: Some(interaction_id),
        }
    }
}

/// One entry of the conversation history surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who said it (user or assistant only).
    pub role: ChatRole,
    /// Sanitized message content.
    pub content: String,
    /// When the exchange was logged.
    pub timestamp: DateTime<Utc>,
}
