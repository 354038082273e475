//! Step timing and coarse turn checkpoints.
//!
//! The supervisor records one checkpoint per node so a host can see
//! how far a turn progressed and how long each step took. Recording is
//! best-effort: a failed write is logged and never aborts the turn.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::warn;

use crate::error::EngineError;

/// One recorded step of a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnCheckpoint {
    /// Session the turn belongs to.
    pub session_id: String,
    /// Node name (`initialize`, `plan`, `execute`, ...).
    pub step: String,
    /// Step status at record time (`ok`, `failed`, `cancelled`).
    pub status: String,
    /// Milliseconds from turn start to this record.
    pub elapsed_ms: u64,
    /// Wall-clock record time (ms since epoch).
    pub recorded_at: i64,
}

/// Checkpoint persistence capability.
pub trait CheckpointStore: Send + Sync {
    /// Persists one checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on write failure; callers
    /// treat this as best-effort.
    fn record(&self, checkpoint: &TurnCheckpoint) -> Result<(), EngineError>;

    /// Returns the most recent checkpoint for a session, when any.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on read failure.
    fn latest(&self, session_id: &str) -> Result<Option<TurnCheckpoint>, EngineError>;
}

/// In-memory store (tests, hosts that do not persist checkpoints).
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    by_session: Mutex<HashMap<String, Vec<TurnCheckpoint>>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All checkpoints recorded for a session, in record order.
    #[must_use]
    pub fn all(&self, session_id: &str) -> Vec<TurnCheckpoint> {
        self.by_session
            .lock()
            .ok()
            .and_then(|map| map.get(session_id).cloned())
            .unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn record(&self, checkpoint: &TurnCheckpoint) -> Result<(), EngineError> {
        if let Ok(mut map) = self.by_session.lock() {
            map.entry(checkpoint.session_id.clone())
                .or_default()
                .push(checkpoint.clone());
        }
        Ok(())
    }

    fn latest(&self, session_id: &str) -> Result<Option<TurnCheckpoint>, EngineError> {
        Ok(self
            .by_session
            .lock()
            .ok()
            .and_then(|map| map.get(session_id).and_then(|v| v.last().cloned())))
    }
}

/// Sqlite-backed checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
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

    /// Opens an in-memory store.
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
            "CREATE TABLE IF NOT EXISTS checkpoints (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL,
                step        TEXT NOT NULL,
                status      TEXT NOT NULL,
                elapsed_ms  INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_checkpoints_session
                ON checkpoints(session_id, id);",
        )?;
        Ok(())
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn record(&self, checkpoint: &TurnCheckpoint) -> Result<(), EngineError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| EngineError::Storage(rusqlite::Error::InvalidQuery))?;
        conn.execute(
            "INSERT INTO checkpoints (session_id, step, status, elapsed_ms, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                checkpoint.session_id,
                checkpoint.step,
                checkpoint.status,
                i64::try_from(checkpoint.elapsed_ms).unwrap_or(i64::MAX),
                checkpoint.recorded_at,
            ],
        )?;
        Ok(())
    }

    fn latest(&self, session_id: &str) -> Result<Option<TurnCheckpoint>, EngineError> {
        use rusqlite::OptionalExtension;
        let conn = self
            .conn
            .lock()
            .map_err(|_| EngineError::Storage(rusqlite::Error::InvalidQuery))?;
        conn.query_row(
            "SELECT session_id, step, status, elapsed_ms, recorded_at
             FROM checkpoints WHERE session_id = ?1
             ORDER BY id DESC LIMIT 1",
            params![session_id],
            |row| {
                Ok(TurnCheckpoint {
                    session_id: row.get(0)?,
                    step: row.get(1)?,
                    status: row.get(2)?,
                    elapsed_ms: u64::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                    recorded_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(EngineError::from)
    }
}

/// Tracks per-step durations within one turn and writes checkpoints.
pub struct StepTimer<'a> {
    session_id: &'a str,
    turn_started: Instant,
    store: &'a dyn CheckpointStore,
}

impl<'a> StepTimer<'a> {
    /// Starts timing a turn.
    #[must_use]
    pub fn new(session_id: &'a str, store: &'a dyn CheckpointStore) -> Self {
        Self {
            session_id,
            turn_started: Instant::now(),
            store,
        }
    }

    /// Milliseconds since the turn started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.turn_started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Records a checkpoint for a completed step. Best-effort.
    pub fn checkpoint(&self, step: &str, status: &str) {
        let checkpoint = TurnCheckpoint {
            session_id: self.session_id.to_string(),
            step: step.to_string(),
            status: status.to_string(),
            elapsed_ms: self.elapsed_ms(),
            recorded_at: now_millis(),
        };
        if let Err(e) = self.store.record(&checkpoint) {
            warn!(step, error = %e, "checkpoint write failed");
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
