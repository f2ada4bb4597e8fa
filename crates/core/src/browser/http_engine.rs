//! Plain HTTP browser engine.
//!
//! Drives sites with `reqwest`, tracking cookies by hand so the jar can be
//! exported into a [`StorageState`] and restored later. No JavaScript.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{header, redirect, Client, Method, StatusCode, Url};
use tracing::{debug, trace};

use super::captcha::CaptchaChallenge;
use super::engine::{
    BrowserContext, BrowserEngine, BrowserError, FormSubmission, Page, StorageState, StoredCookie,
};
use super::stealth::StealthProfile;

const MAX_REDIRECTS: usize = 10;

/// Engine producing [`HttpContext`]s.
pub struct HttpBrowserEngine {
    timeout: Duration,
}

impl HttpBrowserEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl BrowserEngine for HttpBrowserEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn new_context(
        &self,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserContext>, BrowserError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(self.timeout)
            .build()
            .map_err(|e| BrowserError::Engine(e.to_string()))?;
        let context = HttpContext {
            client,
            timeout: self.timeout,
            state: Mutex::new(ContextState::from_storage(state)),
        };
        Ok(Box::new(context))
    }
}

#[derive(Default)]
struct ContextState {
    cookies: Vec<StoredCookie>,
    local_storage: BTreeMap<String, String>,
    headers: Vec<(&'static str, String)>,
    profile: Option<StealthProfile>,
    /// Fields added to the next form submission (CAPTCHA tokens).
    pending_fields: Vec<(String, String)>,
    referer: Option<String>,
}

impl ContextState {
    fn from_storage(state: Option<&StorageState>) -> Self {
        let mut ctx = Self::default();
        if let Some(state) = state {
            ctx.local_storage = state.local_storage.clone();
            ctx.merge_cookies(state.cookies.iter().cloned());
        }
        ctx
    }

    fn merge_cookies(&mut self, cookies: impl IntoIterator<Item = StoredCookie>) {
        let now = unix_now();
        for cookie in cookies {
            self.cookies.retain(|c| {
                !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path)
            });
            if !cookie.is_expired(now) {
                self.cookies.push(cookie);
            }
        }
    }

    fn cookie_header(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        let now = unix_now();
        let secure = url.scheme() == "https";
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now) && (secure || !c.secure) && c.matches(host, url.path()))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One cookie jar plus fingerprint headers.
pub struct HttpContext {
    client: Client,
    timeout: Duration,
    state: Mutex<ContextState>,
}

impl HttpContext {
    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        form: Option<Vec<(String, String)>>,
    ) -> Result<Page, BrowserError> {
        let mut current =
            Url::parse(url).map_err(|e| BrowserError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut method = method;
        let mut form = form;

        for _ in 0..=MAX_REDIRECTS {
            let mut builder = self.client.request(method.clone(), current.clone());
            {
                let state = self.state();
                for (name, value) in &state.headers {
                    builder = builder.header(*name, value);
                }
                if let Some(cookies) = state.cookie_header(&current) {
                    builder = builder.header(header::COOKIE, cookies);
                }
                if let Some(referer) = &state.referer {
                    builder = builder.header(header::REFERER, referer);
                }
            }
            if let Some(fields) = &form {
                builder = builder.form(fields);
            }

            trace!(method = %method, url = %current, "HTTP navigation");
            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    BrowserError::Timeout(self.timeout)
                } else {
                    BrowserError::Navigation {
                        url: current.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

            let host = current.host_str().unwrap_or_default().to_string();
            let received: Vec<StoredCookie> = response
                .cookies()
                .map(|c| {
                    let expires = c
                        .max_age()
                        .map(|age| unix_now() + age.as_secs() as i64)
                        .or_else(|| {
                            c.expires().map(|t| {
                                t.duration_since(UNIX_EPOCH)
                                    .map(|d| d.as_secs() as i64)
                                    .unwrap_or(0)
                            })
                        });
                    StoredCookie {
                        name: c.name().to_string(),
                        value: c.value().to_string(),
                        domain: c.domain().unwrap_or(&host).to_string(),
                        path: c.path().unwrap_or("/").to_string(),
                        expires,
                        secure: c.secure(),
                        http_only: c.http_only(),
                    }
                })
                .collect();
            self.state().merge_cookies(received);

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| BrowserError::Navigation {
                        url: current.to_string(),
                        message: format!("{} without Location", status),
                    })?;
                let next = current.join(location).map_err(|e| {
                    BrowserError::InvalidUrl(format!("{}: {}", location, e))
                })?;
                if !matches!(
                    status,
                    StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
                ) {
                    method = Method::GET;
                    form = None;
                }
                debug!(from = %current, to = %next, status = status.as_u16(), "Following redirect");
                current = next;
                continue;
            }

            let html = response.text().await.map_err(|e| BrowserError::Navigation {
                url: current.to_string(),
                message: e.to_string(),
            })?;
            self.state().referer = Some(current.to_string());
            return Ok(Page::new(current.to_string(), status.as_u16(), html));
        }

        Err(BrowserError::Navigation {
            url: url.to_string(),
            message: format!("more than {} redirects", MAX_REDIRECTS),
        })
    }
}

#[async_trait]
impl BrowserContext for HttpContext {
    async fn apply_stealth(&self, profile: &StealthProfile) -> Result<(), BrowserError> {
        let mut state = self.state();
        state.headers = profile.headers();
        state.profile = Some(profile.clone());
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<Page, BrowserError> {
        self.request(Method::GET, url, None).await
    }

    async fn submit_form(&self, form: &FormSubmission) -> Result<Page, BrowserError> {
        let (profile, mut fields) = {
            let mut state = self.state();
            (state.profile.clone(), std::mem::take(&mut state.pending_fields))
        };
        if let Some(profile) = profile {
            profile.human_delay().await;
        }
        let mut all = form.fields.clone();
        all.append(&mut fields);
        self.request(Method::POST, &form.action, Some(all)).await
    }

    async fn inject_captcha_token(
        &self,
        challenge: &CaptchaChallenge,
        token: &str,
    ) -> Result<(), BrowserError> {
        let mut state = self.state();
        let field = challenge.kind.response_field().to_string();
        state.pending_fields.retain(|(name, _)| *name != field);
        state.pending_fields.push((field, token.to_string()));
        Ok(())
    }

    async fn add_cookies(&self, cookies: &[StoredCookie]) -> Result<(), BrowserError> {
        self.state().merge_cookies(cookies.iter().cloned());
        Ok(())
    }

    async fn storage_state(&self) -> Result<StorageState, BrowserError> {
        let state = self.state();
        let now = unix_now();
        Ok(StorageState {
            cookies: state
                .cookies
                .iter()
                .filter(|c| !c.is_expired(now))
                .cloned()
                .collect(),
            local_storage: state.local_storage.clone(),
        })
    }
}
