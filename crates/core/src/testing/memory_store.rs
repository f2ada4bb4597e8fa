//! In-memory session store for testing.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::browser::{Session, SessionStore, StoreError};

/// SessionStore backed by a map, keyed by site.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<BTreeMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, site: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions().get(site).cloned())
    }

    fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.sessions()
            .insert(session.site.clone(), session.clone());
        Ok(())
    }

    fn delete(&self, site: &str) -> Result<bool, StoreError> {
        Ok(self.sessions().remove(site).is_some())
    }

    fn list(&self) -> Result<Vec<Session>, StoreError> {
        Ok(self.sessions().values().cloned().collect())
    }

    fn touch(&self, site: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(session) = self.sessions().get_mut(site) {
            session.last_used_at = at;
        }
        Ok(())
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        Ok(before - sessions.len())
    }
}
