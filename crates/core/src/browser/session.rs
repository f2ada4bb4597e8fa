//! Persisted authenticated sessions.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::engine::StorageState;

/// Saved login state for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub site: String,
    pub state: StorageState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Cleared when the site rejected the session.
    pub valid: bool,
}

impl Session {
    /// A fresh session created by a successful login.
    pub fn new(site: impl Into<String>, state: StorageState, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            site: site.into(),
            state,
            created_at: now,
            expires_at: now + ttl,
            last_used_at: now,
            valid: true,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Valid and not expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.valid && !self.is_expired(now)
    }
}

/// Per-site authentication state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    SessionLoaded { valid: bool },
    Authenticating,
    Authenticated,
    SessionSaved,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NoSession => "no_session",
            SessionState::SessionLoaded { valid: true } => "session_loaded_valid",
            SessionState::SessionLoaded { valid: false } => "session_loaded_expired",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::SessionSaved => "session_saved",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_expiry() {
        let session = Session::new("nytimes", StorageState::default(), Duration::hours(1));
        let now = Utc::now();
        assert!(session.is_usable(now));
        assert!(session.is_expired(now + Duration::hours(2)));
        assert!(!session.is_usable(now + Duration::hours(2)));
    }

    #[test]
    fn test_invalidated_session_is_unusable() {
        let mut session = Session::new("nytimes", StorageState::default(), Duration::hours(1));
        session.valid = false;
        assert!(!session.is_usable(Utc::now()));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(
            SessionState::SessionLoaded { valid: false }.to_string(),
            "session_loaded_expired"
        );
        assert_eq!(SessionState::Authenticating.as_str(), "authenticating");
    }
}
