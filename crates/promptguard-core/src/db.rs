//! SQLite persistence for chat sessions.

use crate::Result;
use chrono::{DateTime, Utc};
use promptguard_types::{ChatSession, SessionStatus, SessionSummary};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// SQLite-backed store for chat sessions.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open or create the session store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create a SessionStore from an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL UNIQUE,
                owner_id TEXT NOT NULL,
                session_type TEXT NOT NULL,
                active_prompt_id TEXT,
                interaction_count INTEGER NOT NULL DEFAULT 0,
                total_tokens INTEGER NOT NULL DEFAULT 0,
                total_cost_usd REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL,
                last_activity_at TEXT NOT NULL,
                idle_timeout_secs INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active'
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_owner_id
                ON sessions(owner_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status
                ON sessions(status);
            "#,
        )?;
        Ok(())
    }

    /// Insert a new session.
    pub fn insert(&self, session: &ChatSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sessions (
                id, agent_id, owner_id, session_type, active_prompt_id,
                interaction_count, total_tokens, total_cost_usd,
                created_at, last_activity_at, idle_timeout_secs, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                session.id.to_string(),
                session.agent_id.to_string(),
                session.owner_id.to_string(),
                session.session_type,
                session.active_prompt_id.map(|id| id.to_string()),
                session.interaction_count as i64,
                session.total_tokens as i64,
                session.total_cost_usd,
                session.created_at.to_rfc3339(),
                session.last_activity_at.to_rfc3339(),
                session.idle_timeout_secs as i64,
                status_to_string(session.status),
            ],
        )?;
        Ok(())
    }

    /// Get a session by internal id.
    pub fn get(&self, id: Uuid) -> Result<Option<ChatSession>> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                "SELECT * FROM sessions WHERE id = ?1",
                params![id.to_string()],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Get a session by its public agent handle.
    pub fn get_by_agent(&self, agent_id: Uuid) -> Result<Option<ChatSession>> {
        let conn = self.conn.lock().unwrap();
        let session = conn
            .query_row(
                "SELECT * FROM sessions WHERE agent_id = ?1",
                params![agent_id.to_string()],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// List sessions belonging to an owner, newest first.
    pub fn list_for_owner(&self, owner_id: Uuid) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM sessions WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let summaries = stmt
            .query_map(params![owner_id.to_string()], |row| {
                row_to_session(row).map(|s| SessionSummary::from(&s))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }

    /// Record the prompt version a session resolved on first use.
    pub fn set_active_prompt(&self, id: Uuid, prompt_id: Uuid) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET active_prompt_id = ?1 WHERE id = ?2",
            params![prompt_id.to_string(), id.to_string()],
        )?;
        Ok(())
    }

    /// Fold one completed interaction into the session counters.
    ///
    /// A single increment statement, so concurrent chats on the same
    /// session never lose updates.
    pub fn record_usage(&self, id: Uuid, tokens: u64, cost_usd: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE sessions SET
                interaction_count = interaction_count + 1,
                total_tokens = total_tokens + ?1,
                total_cost_usd = total_cost_usd + ?2,
                last_activity_at = ?3
            WHERE id = ?4
            "#,
            params![tokens as i64, cost_usd, Utc::now().to_rfc3339(), id.to_string()],
        )?;
        Ok(())
    }

    /// Update a session's lifecycle status.
    pub fn set_status(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sessions SET status = ?1 WHERE id = ?2",
            params![status_to_string(status), id.to_string()],
        )?;
        Ok(())
    }

    /// Mark every idle-lapsed active session as expired. Returns the count.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Result<u32> {
        let lapsed: Vec<Uuid> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare("SELECT * FROM sessions WHERE status = 'active'")?;
            let sessions = stmt
                .query_map([], row_to_session)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            sessions
                .into_iter()
                .filter(|s| s.is_expired(now))
                .map(|s| s.id)
                .collect()
        };

        for id in &lapsed {
            self.set_status(*id, SessionStatus::Expired)?;
        }
        if !lapsed.is_empty() {
            info!(target: "promptguard::session", "Expired {} idle sessions", lapsed.len());
        }
        Ok(lapsed.len() as u32)
    }
}

fn status_to_string(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Active => "active",
        SessionStatus::Ended => "ended",
        SessionStatus::Expired => "expired",
    }
}

fn string_to_status(s: &str) -> SessionStatus {
    match s {
        "ended" => SessionStatus::Ended,
        "expired" => SessionStatus::Expired,
        _ => SessionStatus::Active,
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<ChatSession> {
    let id: String = row.get("id")?;
    let agent_id: String = row.get("agent_id")?;
    let owner_id: String = row.get("owner_id")?;
    let session_type: String = row.get("session_type")?;
    let active_prompt_id: Option<String> = row.get("active_prompt_id")?;
    let interaction_count: i64 = row.get("interaction_count")?;
    let total_tokens: i64 = row.get("total_tokens")?;
    let total_cost_usd: f64 = row.get("total_cost_usd")?;
    let created_at: String = row.get("created_at")?;
    let last_activity_at: String = row.get("last_activity_at")?;
    let idle_timeout_secs: i64 = row.get("idle_timeout_secs")?;
    let status: String = row.get("status")?;

    Ok(ChatSession {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        agent_id: Uuid::parse_str(&agent_id).unwrap_or_default(),
        owner_id: Uuid::parse_str(&owner_id).unwrap_or_default(),
        session_type,
        active_prompt_id: active_prompt_id.and_then(|s| Uuid::parse_str(&s).ok()),
        interaction_count: interaction_count as u64,
        total_tokens: total_tokens as u64,
        total_cost_usd,
        created_at: parse_timestamp(&created_at),
        last_activity_at: parse_timestamp(&last_activity_at),
        idle_timeout_secs: idle_timeout_secs as u64,
        status: string_to_status(&status),
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

    fn test_store() -> SessionStore {
        SessionStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_insert_and_lookup_by_agent() {
        let store = test_store();
        let session = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 900);
        store.insert(&session).unwrap();

        let found = store.get_by_agent(session.agent_id).unwrap().unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.owner_id, session.owner_id);

        assert!(store.get_by_agent(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_agent_id_unique() {
        let store = test_store();
        let session = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 900);
        store.insert(&session).unwrap();

        let mut duplicate = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 900);
        duplicate.agent_id = session.agent_id;
        assert!(store.insert(&duplicate).is_err());
    }

    #[test]
    fn test_record_usage_increments_counters() {
        let store = test_store();
        let session = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 900);
        store.insert(&session).unwrap();

        store.record_usage(session.id, 120, 0.01).unwrap();
        store.record_usage(session.id, 80, 0.02).unwrap();

        let reloaded = store.get(session.id).unwrap().unwrap();
        assert_eq!(reloaded.interaction_count, 2);
        assert_eq!(reloaded.total_tokens, 200);
        assert!((reloaded.total_cost_usd - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_expire_idle_only_touches_lapsed_sessions() {
        let store = test_store();
        let fresh = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 900);
        store.insert(&fresh).unwrap();

        let mut stale = ChatSession::new(Uuid::new_v4(), "reference_coach".into(), 60);
        stale.last_activity_at = Utc::now() - chrono::Duration::seconds(120);
        store.insert(&stale).unwrap();

        let expired = store.expire_idle(Utc::now()).unwrap();
        assert_eq!(expired, 1);
        assert_eq!(
            store.get(stale.id).unwrap().unwrap().status,
            SessionStatus::Expired
        );
        assert_eq!(
            store.get(fresh.id).unwrap().unwrap().status,
            SessionStatus::Active
        );
    }
}
