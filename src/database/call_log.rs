//! Call Log Database
//!
//! SQLite-Datenbank für den Verlauf der Call-Sessions. Dient als
//! Persistenz-Kollaborator, der Statusmeldungen best-effort entgegennimmt.

use crate::session::CallStatus;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Call session not found: {0}")]
    SessionNotFound(Uuid),
}

// ============================================================================
// SESSION NOTIFIER
// ============================================================================

/// Statusmeldung einer Session an die Persistenz
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStatusUpdate {
    pub session_id: Uuid,
    pub initiator: String,
    pub receiver: String,
    pub status: CallStatus,
    pub elapsed_seconds: u64,
    pub switch_fired: bool,
    pub extensions: u32,
}

/// Fire-and-forget Persistenz für den Call-Status
///
/// Fehler werden nur geloggt und blockieren nie das lokale Aufräumen.
pub trait SessionNotifier: Send + Sync {
    fn notify_call_status(&self, update: CallStatusUpdate) -> BoxFuture<'static, ()>;
}

// ============================================================================
// CALL RECORD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub initiator: String,
    pub receiver: String,
    pub status: String,
    pub elapsed_seconds: i64,
    pub switch_fired: bool,
    pub extensions: i64,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// ============================================================================
// DATABASE
// ============================================================================

/// SQLite-Datenbank für Call-Sessions (Thread-safe durch Mutex)
pub struct CallLogDatabase {
    conn: Mutex<Connection>,
}

impl CallLogDatabase {
    /// Öffnet oder erstellt die Datenbank
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening call log at {:?}", path);

        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// In-Memory Datenbank (Tests und Sessions ohne Verlauf)
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS call_sessions (
                id TEXT PRIMARY KEY,
                initiator TEXT NOT NULL,
                receiver TEXT NOT NULL,
                status TEXT NOT NULL,
                elapsed_seconds INTEGER NOT NULL DEFAULT 0,
                switch_fired INTEGER NOT NULL DEFAULT 0,
                extensions INTEGER NOT NULL DEFAULT 0,
                started_at TEXT,
                ended_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE INDEX IF NOT EXISTS idx_call_sessions_created ON call_sessions(created_at)
            "#,
            [],
        )?;

        Ok(())
    }

    /// Schreibt den aktuellen Status einer Session
    ///
    /// `started_at` wird beim ersten `connected` gesetzt, `ended_at` beim Ende.
    /// Ein beendeter Eintrag bleibt beendet, auch wenn ältere Meldungen später eintreffen.
    pub fn record_status(&self, update: &CallStatusUpdate) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO call_sessions
                (id, initiator, receiver, status, elapsed_seconds, switch_fired, extensions,
                 started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                    CASE WHEN ?4 = 'connected' THEN datetime('now') END,
                    CASE WHEN ?4 = 'ended' THEN datetime('now') END)
            ON CONFLICT(id) DO UPDATE SET
                status = CASE WHEN call_sessions.status = 'ended' THEN call_sessions.status
                              ELSE excluded.status END,
                elapsed_seconds = MAX(elapsed_seconds, excluded.elapsed_seconds),
                switch_fired = MAX(switch_fired, excluded.switch_fired),
                extensions = MAX(extensions, excluded.extensions),
                started_at = COALESCE(started_at, excluded.started_at),
                ended_at = COALESCE(ended_at, excluded.ended_at),
                updated_at = datetime('now')
            "#,
            params![
                update.session_id.to_string(),
                update.initiator,
                update.receiver,
                update.status.as_str(),
                update.elapsed_seconds as i64,
                update.switch_fired as i32,
                update.extensions as i64,
            ],
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> SqliteResult<CallRecord> {
        Ok(CallRecord {
            id: row.get(0)?,
            initiator: row.get(1)?,
            receiver: row.get(2)?,
            status: row.get(3)?,
            elapsed_seconds: row.get(4)?,
            switch_fired: row.get::<_, i32>(5)? != 0,
            extensions: row.get(6)?,
            started_at: row.get(7)?,
            ended_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    /// Holt eine Session anhand ihrer ID
    pub fn get_session(&self, id: Uuid) -> Result<CallRecord, DatabaseError> {
        let conn = self.conn.lock();
        conn.query_row(
            r#"
            SELECT id, initiator, receiver, status, elapsed_seconds, switch_fired, extensions,
                   started_at, ended_at, created_at, updated_at
            FROM call_sessions
            WHERE id = ?1
            "#,
            params![id.to_string()],
            Self::row_to_record,
        )
        .optional()?
        .ok_or(DatabaseError::SessionNotFound(id))
    }

    /// Letzte Sessions, neueste zuerst
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<CallRecord>, DatabaseError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, initiator, receiver, status, elapsed_seconds, switch_fired, extensions,
                   started_at, ended_at, created_at, updated_at
            FROM call_sessions
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;

        let records = stmt
            .query_map(params![limit as i64], Self::row_to_record)?
            .collect::<SqliteResult<Vec<CallRecord>>>()?;

        Ok(records)
    }
}

/// Schreibt Statusmeldungen im Blocking-Pool, Fehler werden nur geloggt
impl SessionNotifier for Arc<CallLogDatabase> {
    fn notify_call_status(&self, update: CallStatusUpdate) -> BoxFuture<'static, ()> {
        let db = Arc::clone(self);
        Box::pin(async move {
            let session_id = update.session_id;
            let result = tokio::task::spawn_blocking(move || db.record_status(&update)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Failed to record call status for {}: {}", session_id, e),
                Err(e) => tracing::warn!("Call status task for {} failed: {}", session_id, e),
            }
        })
    }
}

impl std::fmt::Debug for CallLogDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallLogDatabase").finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: Uuid, status: CallStatus, elapsed: u64) -> CallStatusUpdate {
        CallStatusUpdate {
            session_id: id,
            initiator: "alice".to_string(),
            receiver: "bob".to_string(),
            status,
            elapsed_seconds: elapsed,
            switch_fired: elapsed >= 900,
            extensions: 0,
        }
    }

    #[test]
    fn test_record_lifecycle() {
        let db = CallLogDatabase::open_in_memory().unwrap();
        let id = Uuid::new_v4();

        db.record_status(&update(id, CallStatus::Connecting, 0)).unwrap();
        let record = db.get_session(id).unwrap();
        assert_eq!(record.status, "connecting");
        assert!(record.started_at.is_none());

        db.record_status(&update(id, CallStatus::Connected, 0)).unwrap();
        db.record_status(&update(id, CallStatus::Ended, 950)).unwrap();

        let record = db.get_session(id).unwrap();
        assert_eq!(record.status, "ended");
        assert_eq!(record.elapsed_seconds, 950);
        assert!(record.switch_fired);
        assert!(record.started_at.is_some());
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_elapsed_never_decreases() {
        let db = CallLogDatabase::open_in_memory().unwrap();
        let id = Uuid::new_v4();

        db.record_status(&update(id, CallStatus::Connected, 120)).unwrap();
        db.record_status(&update(id, CallStatus::Connecting, 60)).unwrap();
        assert_eq!(db.get_session(id).unwrap().elapsed_seconds, 120);
    }

    #[test]
    fn test_ended_is_final() {
        let db = CallLogDatabase::open_in_memory().unwrap();
        let id = Uuid::new_v4();

        db.record_status(&update(id, CallStatus::Ended, 30)).unwrap();
        db.record_status(&update(id, CallStatus::Connected, 30)).unwrap();
        assert_eq!(db.get_session(id).unwrap().status, "ended");
    }

    #[test]
    fn test_missing_session() {
        let db = CallLogDatabase::open_in_memory().unwrap();
        assert!(matches!(
            db.get_session(Uuid::new_v4()),
            Err(DatabaseError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_recent_sessions() {
        let db = CallLogDatabase::open_in_memory().unwrap();
        for _ in 0..3 {
            db.record_status(&update(Uuid::new_v4(), CallStatus::Ended, 10)).unwrap();
        }
        assert_eq!(db.recent_sessions(2).unwrap().len(), 2);
        assert_eq!(db.recent_sessions(10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_notifier_writes_in_background() {
        let db = Arc::new(CallLogDatabase::open_in_memory().unwrap());
        let id = Uuid::new_v4();

        db.notify_call_status(update(id, CallStatus::Connected, 0)).await;
        assert_eq!(db.get_session(id).unwrap().status, "connected");
    }
}
