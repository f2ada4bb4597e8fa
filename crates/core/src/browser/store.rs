//! Session storage trait.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::session::Session;

/// Errors from session storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Durable storage for sessions, one per site.
pub trait SessionStore: Send + Sync {
    /// Load the session for a site, expired or not.
    fn load(&self, site: &str) -> Result<Option<Session>, StoreError>;

    /// Insert or replace the session for its site.
    fn save(&self, session: &Session) -> Result<(), StoreError>;

    /// Delete a site's session. Returns whether one existed.
    fn delete(&self, site: &str) -> Result<bool, StoreError>;

    /// All stored sessions, ordered by site.
    fn list(&self) -> Result<Vec<Session>, StoreError>;

    /// Refresh `last_used_at` without changing anything else.
    fn touch(&self, site: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete every session that expired before `now`. Returns the count.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}
