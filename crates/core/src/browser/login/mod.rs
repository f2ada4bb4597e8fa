//! Per-site login handlers.

mod newspapers;
mod nytimes;

pub use newspapers::NewspapersLogin;
pub use nytimes::NytimesLogin;

use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::captcha::{CaptchaGuard, ChallengeType, SolverError};
use super::engine::{BrowserContext, BrowserError, FormSubmission, Page};
use super::store::StoreError;
use crate::source::SourceError;

/// Errors from authenticating against a site.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No login handler for site {0}")]
    UnknownSite(String),

    #[error("No credentials configured for site {0}")]
    MissingCredentials(String),

    #[error("Credentials rejected by {site}: {reason}")]
    InvalidCredentials { site: String, reason: String },

    #[error("CAPTCHA solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("CAPTCHA solving failed: {0}")]
    Solver(#[source] SolverError),

    #[error("CAPTCHA failed: {0}")]
    Captcha(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AuthError> for SourceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::SolverUnavailable(msg) => SourceError::SolverUnavailable(msg),
            AuthError::Solver(SolverError::Timeout(d)) => SourceError::Timeout(d),
            AuthError::Solver(SolverError::Http(msg)) => SourceError::Connection(msg),
            AuthError::Solver(
                e @ (SolverError::NotConfigured(_) | SolverError::InsufficientBalance),
            ) => SourceError::SolverUnavailable(e.to_string()),
            AuthError::Solver(e @ SolverError::Api { .. }) => SourceError::Http(e.to_string()),
            AuthError::Captcha(msg) => SourceError::Http(msg),
            AuthError::Browser(BrowserError::Timeout(d)) => SourceError::Timeout(d),
            AuthError::Browser(other) => SourceError::Connection(other.to_string()),
            AuthError::Store(other) => SourceError::Http(other.to_string()),
            other => SourceError::Authentication(other.to_string()),
        }
    }
}

/// Site account credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Knows how to log into one site and how to tell whether that worked.
#[async_trait]
pub trait SiteLoginHandler: Send + Sync {
    fn site_id(&self) -> &str;

    /// Perform a fresh login in `ctx`.
    async fn login(
        &self,
        ctx: &dyn BrowserContext,
        credentials: &Credentials,
        captcha: &CaptchaGuard,
    ) -> Result<(), AuthError>;

    /// Liveness probe for a restored session.
    async fn is_logged_in(&self, ctx: &dyn BrowserContext) -> Result<bool, AuthError>;

    /// Whether a page shows the site's logged-out state.
    fn page_indicates_logged_out(&self, page: &Page) -> bool;
}

/// A classic username/password form login.
///
/// Concrete handlers only fill in URLs, field names and page markers.
#[derive(Debug, Clone)]
pub struct FormLogin {
    pub site: String,
    pub login_url: String,
    /// Form action; defaults to the login page URL.
    pub action_url: Option<String>,
    pub username_field: String,
    pub password_field: String,
    pub extra_fields: Vec<(String, String)>,
    /// Page that only renders for logged-in users.
    pub probe_url: String,
    pub logged_in_markers: Vec<String>,
    pub logged_out_markers: Vec<String>,
    pub failure_markers: Vec<String>,
}

static HIDDEN_INPUT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']hidden["'][^>]*>"#).ok());
static NAME_ATTR: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)\sname\s*=\s*["']([^"']*)["']"#).ok());
static VALUE_ATTR: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?i)\svalue\s*=\s*["']([^"']*)["']"#).ok());

/// Hidden form inputs (CSRF tokens and the like) on a page.
pub(crate) fn hidden_inputs(html: &str) -> Vec<(String, String)> {
    let (Some(input), Some(name), Some(value)) =
        (HIDDEN_INPUT.as_ref(), NAME_ATTR.as_ref(), VALUE_ATTR.as_ref())
    else {
        return Vec::new();
    };
    input
        .find_iter(html)
        .filter_map(|tag| {
            let tag = tag.as_str();
            let name = name.captures(tag)?.get(1)?.as_str().to_string();
            let value = value
                .captures(tag)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

impl FormLogin {
    fn build_form(&self, login_page: &Page, credentials: &Credentials) -> FormSubmission {
        let mut form = FormSubmission::new(
            self.action_url
                .clone()
                .unwrap_or_else(|| login_page.url.clone()),
        );
        for (name, value) in hidden_inputs(&login_page.html) {
            if name != self.username_field && name != self.password_field {
                form = form.field(name, value);
            }
        }
        for (name, value) in &self.extra_fields {
            form = form.field(name.clone(), value.clone());
        }
        form.field(self.username_field.clone(), credentials.username.clone())
            .field(self.password_field.clone(), credentials.password.clone())
    }

    fn contains_any(page: &Page, markers: &[String]) -> bool {
        let html = page.html.to_lowercase();
        markers.iter().any(|m| html.contains(&m.to_lowercase()))
    }

    pub async fn login(
        &self,
        ctx: &dyn BrowserContext,
        credentials: &Credentials,
        captcha: &CaptchaGuard,
    ) -> Result<(), AuthError> {
        debug!(site = %self.site, url = %self.login_url, "Opening login page");
        let page = ctx.goto(&self.login_url).await?;
        let (page, _) = captcha.resolve(ctx, page).await?;

        let form = self.build_form(&page, credentials);
        let mut result = ctx.submit_form(&form).await?;

        let (after, solved) = captcha.resolve(ctx, result).await?;
        result = after;
        if let Some(challenge) = solved {
            if challenge.kind.challenge_type() != ChallengeType::ManagedChallenge {
                info!(site = %self.site, "Resubmitting login form with CAPTCHA token");
                result = ctx.submit_form(&form).await?;
            }
        }

        if Self::contains_any(&result, &self.failure_markers) {
            return Err(AuthError::InvalidCredentials {
                site: self.site.clone(),
                reason: "site reported a login error".to_string(),
            });
        }
        if result.status >= 400 {
            return Err(AuthError::InvalidCredentials {
                site: self.site.clone(),
                reason: format!("login returned HTTP {}", result.status),
            });
        }
        if self.page_indicates_logged_out(&result) {
            return Err(AuthError::InvalidCredentials {
                site: self.site.clone(),
                reason: "still logged out after submitting credentials".to_string(),
            });
        }
        Ok(())
    }

    pub async fn is_logged_in(&self, ctx: &dyn BrowserContext) -> Result<bool, AuthError> {
        let page = ctx.goto(&self.probe_url).await?;
        Ok(page.status < 400 && !self.page_indicates_logged_out(&page))
    }

    pub fn page_indicates_logged_out(&self, page: &Page) -> bool {
        let login_path = reqwest::Url::parse(&self.login_url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        if login_path.len() > 1 {
            if let Ok(url) = reqwest::Url::parse(&page.url) {
                if url.path().starts_with(&login_path) {
                    return true;
                }
            }
        }
        if Self::contains_any(page, &self.logged_in_markers) {
            return false;
        }
        Self::contains_any(page, &self.logged_out_markers)
    }
}
