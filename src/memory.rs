//! Session-scoped conversation memory.
//!
//! The engine consumes two storage capabilities: a [`MessageStore`]
//! (append-only turn log per session) and a [`SessionStore`] (session
//! metadata, read plus `updated_at` touch). [`SessionMemory`] is the
//! thin adapter the supervisor works through: load recent context,
//! persist the user turn before heavy work, persist the assistant turn
//! after synthesis.
//!
//! `created_at` is authoritative for ordering and strictly monotonic
//! within a session: appends clamp to `max(existing) + 1` when the
//! wall clock stalls or steps backwards.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End-user turn.
    User,
    /// Engine response turn.
    Assistant,
    /// Injected system context.
    System,
}

impl MessageRole {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parses a stored role string. Unknown values read as `System`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            _ => Self::System,
        }
    }
}

/// One persisted message.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    /// Author role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// Milliseconds since epoch; strictly monotonic per session.
    pub created_at: i64,
}

/// Session metadata as stored by the host.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Opaque session identifier.
    pub session_id: String,
    /// Owning user, when authenticated.
    pub user_id: Option<i64>,
    /// Creation time (ms since epoch).
    pub created_at: i64,
    /// Last activity time (ms since epoch).
    pub updated_at: i64,
    /// Session time-to-live in seconds, when bounded.
    pub ttl_seconds: Option<i64>,
}

/// Append-only message log per session.
pub trait MessageStore: Send + Sync {
    /// Appends one message, returning its row id. Atomic per message.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on write failure.
    fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<i64, EngineError>;

    /// Returns the most recent `limit` messages in `created_at` order
    /// (oldest first).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on read failure.
    fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>, EngineError>;
}

/// Session metadata store. The engine only reads and touches
/// `updated_at`; session lifecycle belongs to the host.
pub trait SessionStore: Send + Sync {
    /// Fetches session metadata, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on read failure.
    fn get(&self, session_id: &str) -> Result<Option<SessionInfo>, EngineError>;

    /// Updates `updated_at` for the session, creating the row when the
    /// host has not registered it yet.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on write failure.
    fn touch(&self, session_id: &str) -> Result<(), EngineError>;
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Sqlite-backed implementation of both storage capabilities.
///
/// One connection behind a mutex; the mutex also serializes appends,
/// which is what makes the monotonic-clamp read-modify-write safe.
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on connection or schema failure.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store (tests, ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on schema failure.
    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), EngineError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id  TEXT PRIMARY KEY,
                user_id     INTEGER,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL,
                ttl_seconds INTEGER
            );
            CREATE TABLE IF NOT EXISTS messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session
                ON messages(session_id, created_at);",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Storage(rusqlite::Error::InvalidQuery))
    }
}

impl MessageStore for SqliteMemoryStore {
    fn append(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<i64, EngineError> {
        let conn = self.lock()?;
        let last: Option<i64> = conn
            .query_row(
                "SELECT MAX(created_at) FROM messages WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let created_at = now_millis().max(last.map_or(i64::MIN, |l| l + 1));
        conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.as_str(), content, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<StoredMessage>, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT role, content, created_at FROM (
                 SELECT role, content, created_at FROM messages
                 WHERE session_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2
             ) ORDER BY created_at ASC",
        )?;
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![session_id, limit_i64], |row| {
            Ok(StoredMessage {
                role: MessageRole::parse(&row.get::<_, String>(0)?),
                content: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(EngineError::from)
    }
}

impl SessionStore for SqliteMemoryStore {
    fn get(&self, session_id: &str) -> Result<Option<SessionInfo>, EngineError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT session_id, user_id, created_at, updated_at, ttl_seconds
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| {
                Ok(SessionInfo {
                    session_id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                    ttl_seconds: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(EngineError::from)
    }

    fn touch(&self, session_id: &str) -> Result<(), EngineError> {
        let now = now_millis();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (session_id, created_at, updated_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(session_id) DO UPDATE SET updated_at = ?2",
            params![session_id, now],
        )?;
        Ok(())
    }
}

/// The supervisor's view over session storage.
#[derive(Clone)]
pub struct SessionMemory {
    messages: Arc<dyn MessageStore>,
    sessions: Arc<dyn SessionStore>,
    recent_limit: usize,
}

impl SessionMemory {
    /// Creates the adapter over host-supplied stores.
    #[must_use]
    pub fn new(
        messages: Arc<dyn MessageStore>,
        sessions: Arc<dyn SessionStore>,
        recent_limit: usize,
    ) -> Self {
        Self {
            messages,
            sessions,
            recent_limit,
        }
    }

    /// Convenience constructor over one combined sqlite store.
    #[must_use]
    pub fn from_store(store: Arc<SqliteMemoryStore>, recent_limit: usize) -> Self {
        Self {
            messages: Arc::clone(&store) as Arc<dyn MessageStore>,
            sessions: store as Arc<dyn SessionStore>,
            recent_limit,
        }
    }

    /// Touches the session timestamp and loads recent context.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on store failure.
    pub fn begin_turn(&self, session_id: &str) -> Result<Vec<StoredMessage>, EngineError> {
        self.sessions.touch(session_id)?;
        self.messages.recent(session_id, self.recent_limit)
    }

    /// Persists the user turn. Called before any heavy work so the
    /// message survives later failures.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on store failure.
    pub fn record_user(&self, session_id: &str, content: &str) -> Result<i64, EngineError> {
        self.messages.append(session_id, MessageRole::User, content)
    }

    /// Persists the assistant turn.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on store failure.
    pub fn record_assistant(&self, session_id: &str, content: &str) -> Result<i64, EngineError> {
        self.messages
            .append(session_id, MessageRole::Assistant, content)
    }

    /// Reads session info for the turn (user id, ttl).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on store failure.
    pub fn session_info(&self, session_id: &str) -> Result<Option<SessionInfo>, EngineError> {
        self.sessions.get(session_id)
    }
}

impl std::fmt::Debug for SessionMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMemory")
            .field("recent_limit", &self.recent_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<SqliteMemoryStore> {
        Arc::new(SqliteMemoryStore::in_memory().unwrap_or_else(|e| unreachable!("{e}")))
    }

    #[test]
    fn test_append_and_recent_order() {
        let s = store();
        s.append("s1", MessageRole::User, "질문1").unwrap_or_default();
        s.append("s1", MessageRole::Assistant, "답변1").unwrap_or_default();
        s.append("s1", MessageRole::User, "질문2").unwrap_or_default();
        let recent = s.recent("s1", 10).unwrap_or_default();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "질문1");
        assert_eq!(recent[2].content, "질문2");
    }

    #[test]
    fn test_created_at_strictly_monotonic() {
        let s = store();
        for i in 0..20 {
            s.append("s1", MessageRole::User, &format!("m{i}"))
                .unwrap_or_default();
        }
        let recent = s.recent("s1", 20).unwrap_or_default();
        for pair in recent.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }

    #[test]
    fn test_recent_respects_limit_keeping_newest() {
        let s = store();
        for i in 0..5 {
            s.append("s1", MessageRole::User, &format!("m{i}"))
                .unwrap_or_default();
        }
        let recent = s.recent("s1", 2).unwrap_or_default();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
    }

    #[test]
    fn test_sessions_isolated() {
        let s = store();
        s.append("s1", MessageRole::User, "a").unwrap_or_default();
        s.append("s2", MessageRole::User, "b").unwrap_or_default();
        let recent = s.recent("s1", 10).unwrap_or_default();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "a");
    }

    #[test]
    fn test_touch_upserts_and_updates() {
        let s = store();
        assert!(s.get("s1").unwrap_or_default().is_none());
        s.touch("s1").unwrap_or_default();
        let first = s.get("s1").unwrap_or_default().unwrap_or_else(|| unreachable!());
        s.touch("s1").unwrap_or_default();
        let second = s.get("s1").unwrap_or_default().unwrap_or_else(|| unreachable!());
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_session_memory_turn_cycle() {
        let memory = SessionMemory::from_store(store(), 10);
        let context = memory.begin_turn("s1").unwrap_or_default();
        assert!(context.is_empty());
        memory.record_user("s1", "전세금 인상 한도?").unwrap_or_default();
        memory.record_assistant("s1", "20분의 1입니다.").unwrap_or_default();
        let context = memory.begin_turn("s1").unwrap_or_default();
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].role, MessageRole::User);
        assert_eq!(context[1].role, MessageRole::Assistant);
        assert!(context[0].created_at < context[1].created_at);
    }
}
