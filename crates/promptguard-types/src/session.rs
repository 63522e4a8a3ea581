//! Chat session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session status in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is active and accepting chat messages.
    Active,
    /// Session was explicitly ended by its owner.
    Ended,
    /// Session lapsed past its idle timeout.
    Expired,
}

/// A chat session bound to one owner and one session type.
///
/// The `agent_id` is the only identifier ever exposed to clients; the
/// internal `id` and `owner_id` stay server side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    /// Internal session ID.
    pub id: Uuid,
    /// Opaque public handle clients use to address the session.
    pub agent_id: Uuid,
    /// Owning user. Only this user may use the session.
    pub owner_id: Uuid,
    /// Session type selecting the prompt/behavior profile.
    pub session_type: String,
    /// Prompt version resolved when the session was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_prompt_id: Option<Uuid>,
    /// Number of completed interactions.
    pub interaction_count: u64,
    /// Total tokens consumed across interactions.
    pub total_tokens: u64,
    /// Total cost in USD across interactions.
    pub total_cost_usd: f64,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub last_activity_at: DateTime<Utc>,
    /// Idle timeout in seconds before the session expires.
    pub idle_timeout_secs: u64,
    /// Current status.
    pub status: SessionStatus,
}

impl ChatSession {
    /// Create a new active session for an owner.
    pub fn new(owner_id: Uuid, session_type: String, idle_timeout_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            owner_id,
            session_type,
            active_prompt_id: None,
            interaction_count: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            created_at: now,
            last_activity_at: now,
            idle_timeout_secs,
            status: SessionStatus::Active,
        }
    }

    /// Whether the session has lapsed past its idle timeout.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.last_activity_at);
        idle.num_seconds() >= 0 && idle.num_seconds() as u64 > self.idle_timeout_secs
    }

    /// Whether the session can accept a chat message right now.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired(now)
    }
}

/// Summary view of a session for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub agent_id: Uuid,
    pub session_type: String,
    pub interaction_count: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl From<&ChatSession> for SessionSummary {
    fn from(session: &ChatSession) -> Self {
        Self {
            agent_id: session.agent_id,
            session_type: session.session_type.clone(),
            interaction_count: session.interaction_count,
            total_tokens: session.total_tokens,
            total_cost_usd: session.total_cost_usd,
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            status: session.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_honors_idle_timeout() {
        let mut session = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 60);
        let now = Utc::now();
        assert!(!session.is_expired(now));

        session.last_activity_at = now - chrono::Duration::seconds(61);
        assert!(session.is_expired(now));
        assert!(!session.is_usable(now));
    }

    #[test]
    fn test_summary_omits_owner() {
        let session = ChatSession::new(Uuid::new_v4(), "verification".into(), 900);
        let summary = SessionSummary::from(&session);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains(&session.owner_id.to_string()));
        assert!(!json.contains(&session.id.to_string()));
        assert!(json.contains(&session.agent_id.to_string()));
    }
}
