//! Mock browser engine for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::browser::{
    BrowserContext, BrowserEngine, BrowserError, CaptchaChallenge, FormSubmission, Page,
    StealthProfile, StorageState, StoredCookie,
};

/// Cookie name the mock treats as the login session.
pub const SESSION_COOKIE: &str = "session";

/// Body served when a context's session cookie has been rejected.
pub const LOGGED_OUT_HTML: &str = "<p>Please log in to continue.</p>";

#[derive(Debug, Default)]
struct EngineState {
    pages: HashMap<String, String>,
    rejected: HashSet<String>,
    contexts_opened: usize,
    visited: Vec<String>,
    forms: Vec<FormSubmission>,
    tokens: Vec<(String, String)>,
}

/// Mock implementation of the BrowserEngine trait.
///
/// Pages are served from a fixed url-to-html table; unknown urls return a
/// 404. A context whose `session` cookie value was passed to
/// [`reject_session`](Self::reject_session) sees a logged-out page on every
/// navigation.
///
/// # Example
///
/// ```rust,ignore
/// use mortem_core::testing::MockBrowserEngine;
///
/// let engine = Arc::new(MockBrowserEngine::new());
/// engine.set_page("https://site.test/search?q=x", "<p>x died of a stroke</p>");
/// engine.reject_session("stale-cookie");
/// ```
#[derive(Debug, Default)]
pub struct MockBrowserEngine {
    state: Arc<Mutex<EngineState>>,
}

impl MockBrowserEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_page(&self, url: &str, html: &str) {
        self.state().pages.insert(url.to_string(), html.to_string());
    }

    /// Treat contexts carrying this session cookie value as logged out.
    pub fn reject_session(&self, cookie_value: &str) {
        self.state().rejected.insert(cookie_value.to_string());
    }

    pub fn contexts_opened(&self) -> usize {
        self.state().contexts_opened
    }

    /// Every url passed to `goto`, in order.
    pub fn visited(&self) -> Vec<String> {
        self.state().visited.clone()
    }

    pub fn submitted_forms(&self) -> Vec<FormSubmission> {
        self.state().forms.clone()
    }

    /// `(response field, token)` pairs injected by CAPTCHA handling.
    pub fn injected_tokens(&self) -> Vec<(String, String)> {
        self.state().tokens.clone()
    }
}

#[async_trait]
impl BrowserEngine for MockBrowserEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn new_context(
        &self,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserContext>, BrowserError> {
        self.state().contexts_opened += 1;
        Ok(Box::new(MockBrowserContext {
            engine: self.state.clone(),
            storage: Mutex::new(state.cloned().unwrap_or_default()),
            profile: Mutex::new(None),
        }))
    }
}

/// Context handed out by [`MockBrowserEngine`].
#[derive(Debug)]
pub struct MockBrowserContext {
    engine: Arc<Mutex<EngineState>>,
    storage: Mutex<StorageState>,
    profile: Mutex<Option<StealthProfile>>,
}

impl MockBrowserContext {
    fn engine(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn storage(&self) -> std::sync::MutexGuard<'_, StorageState> {
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session_rejected(&self, engine: &EngineState) -> bool {
        self.storage()
            .cookies
            .iter()
            .any(|c| c.name == SESSION_COOKIE && engine.rejected.contains(&c.value))
    }
}

#[async_trait]
impl BrowserContext for MockBrowserContext {
    async fn apply_stealth(&self, profile: &StealthProfile) -> Result<(), BrowserError> {
        *self.profile.lock().unwrap_or_else(|e| e.into_inner()) = Some(profile.clone());
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<Page, BrowserError> {
        let mut engine = self.engine();
        engine.visited.push(url.to_string());
        if self.session_rejected(&engine) {
            return Ok(Page::new(url, 200, LOGGED_OUT_HTML));
        }
        Ok(match engine.pages.get(url) {
            Some(html) => Page::new(url, 200, html.clone()),
            None => Page::new(url, 404, "<h1>Not Found</h1>"),
        })
    }

    async fn submit_form(&self, form: &FormSubmission) -> Result<Page, BrowserError> {
        let mut engine = self.engine();
        engine.forms.push(form.clone());
        Ok(match engine.pages.get(&form.action) {
            Some(html) => Page::new(form.action.clone(), 200, html.clone()),
            None => Page::new(form.action.clone(), 200, "<p>ok</p>"),
        })
    }

    async fn inject_captcha_token(
        &self,
        challenge: &CaptchaChallenge,
        token: &str,
    ) -> Result<(), BrowserError> {
        self.engine().tokens.push((
            challenge.kind.response_field().to_string(),
            token.to_string(),
        ));
        Ok(())
    }

    async fn add_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError> {
        let mut storage = self.storage();
        for cookie in cookies {
            storage
                .cookies
                .retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
            storage.cookies.push(cookie.clone());
        }
        Ok(())
    }

    async fn storage_state(&self) -> Result<StorageState, BrowserError> {
        Ok(self.storage().clone())
    }
}
