//! Browser engine abstraction.
//!
//! Sources and login handlers only talk to [`BrowserContext`]; which engine
//! sits behind it is decided once, when the session manager is built.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::captcha::CaptchaChallenge;
use super::stealth::StealthProfile;
use crate::source::extract::html_to_text;

/// Errors from driving a browser context.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// A cookie as persisted in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix timestamp (seconds); None for session cookies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires.map(|exp| exp <= now_unix).unwrap_or(false)
    }

    /// Whether the cookie should be sent to `host` + `path`.
    pub fn matches(&self, host: &str, path: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let host = host.to_ascii_lowercase();
        let domain_ok = host == domain || host.ends_with(&format!(".{}", domain));
        domain_ok && path.starts_with(&self.path)
    }
}

/// Serializable browser state: everything needed to resume a login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
}

impl StorageState {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.local_storage.is_empty()
    }
}

/// A loaded page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub html: String,
}

impl Page {
    pub fn new(url: impl Into<String>, status: u16, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            html: html.into(),
        }
    }

    /// Visible text, one block per line.
    pub fn text(&self) -> String {
        html_to_text(&self.html)
    }

    /// Case-insensitive search in the raw HTML.
    pub fn contains(&self, needle: &str) -> bool {
        self.html
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

/// A form POST.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub action: String,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// One isolated browsing context (cookie jar, storage, fingerprint).
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Apply fingerprint masking; done once, before the first navigation.
    async fn apply_stealth(&self, profile: &StealthProfile) -> Result<(), BrowserError>;

    async fn goto(&self, url: &str) -> Result<Page, BrowserError>;

    async fn submit_form(&self, form: &FormSubmission) -> Result<Page, BrowserError>;

    /// Hand a solved CAPTCHA token to the page.
    async fn inject_captcha_token(
        &self,
        challenge: &CaptchaChallenge,
        token: &str,
    ) -> Result<(), BrowserError>;

    async fn add_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError>;

    /// Snapshot of the current cookies and storage.
    async fn storage_state(&self) -> Result<StorageState, BrowserError>;
}

/// Factory for browser contexts.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Open a fresh context, optionally seeded from saved state.
    async fn new_context(
        &self,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserContext>, BrowserError>;
}
