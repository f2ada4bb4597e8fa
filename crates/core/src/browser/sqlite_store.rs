//! SQLite-backed session store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::engine::StorageState;
use super::session::Session;
use super::store::{SessionStore, StoreError};

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                site TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                last_used_at TEXT NOT NULL,
                valid INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<(Session, String)> {
        let site: String = row.get(0)?;
        let state_json: String = row.get(1)?;
        let created_at: String = row.get(2)?;
        let expires_at: String = row.get(3)?;
        let last_used_at: String = row.get(4)?;
        let valid: bool = row.get(5)?;

        let session = Session {
            site,
            state: StorageState::default(),
            created_at: parse_timestamp(&created_at),
            // Unparseable expiry means expired (epoch).
            expires_at: DateTime::parse_from_rfc3339(&expires_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
            last_used_at: parse_timestamp(&last_used_at),
            valid,
        };
        Ok((session, state_json))
    }

    fn hydrate((mut session, state_json): (Session, String)) -> Result<Session, StoreError> {
        session.state = serde_json::from_str(&state_json)?;
        Ok(session)
    }
}

/// Fixed-width UTC timestamps, so text order is time order.
fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, site: &str) -> Result<Option<Session>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT site, state, created_at, expires_at, last_used_at, valid
                 FROM sessions WHERE site = ?1",
                params![site],
                Self::row_to_session,
            )
            .optional()?;
        row.map(Self::hydrate).transpose()
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        let state_json = serde_json::to_string(&session.state)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (site, state, created_at, expires_at, last_used_at, valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(site) DO UPDATE SET
                state = excluded.state,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at,
                last_used_at = excluded.last_used_at,
                valid = excluded.valid",
            params![
                session.site,
                state_json,
                format_timestamp(&session.created_at),
                format_timestamp(&session.expires_at),
                format_timestamp(&session.last_used_at),
                session.valid,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, site: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE site = ?1", params![site])?;
        Ok(deleted > 0)
    }

    fn list(&self) -> Result<Vec<Session>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT site, state, created_at, expires_at, last_used_at, valid
             FROM sessions ORDER BY site",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Self::hydrate).collect()
    }

    fn touch(&self, site: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE site = ?2",
            params![format_timestamp(&at), site],
        )?;
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let purged = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![format_timestamp(&now)],
        )?;
        Ok(purged)
    }
}
