//! Mock site login handler for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::mock_browser::SESSION_COOKIE;
use crate::browser::{
    AuthError, BrowserContext, CaptchaGuard, Credentials, Page, SiteLoginHandler, StoredCookie,
};

/// Mock implementation of the SiteLoginHandler trait.
///
/// A successful login sets the cookie `session=<site>-<n>` on `<site>.test`,
/// where `n` counts logins. The liveness probe loads `https://<site>.test/account`
/// and reports logged out when the page says "please log in".
///
/// Tracks how many logins overlapped, so tests can assert that logins for
/// one site are serialized.
#[derive(Debug)]
pub struct MockLoginHandler {
    site: String,
    delay: Option<Duration>,
    fail: AtomicBool,
    logins: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockLoginHandler {
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            delay: None,
            fail: AtomicBool::new(false),
            logins: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold each login open for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make subsequent logins fail with bad credentials.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of login attempts, failed ones included.
    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Most logins ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn probe_url(&self) -> String {
        format!("https://{}.test/account", self.site)
    }
}

#[async_trait]
impl SiteLoginHandler for MockLoginHandler {
    fn site_id(&self) -> &str {
        &self.site
    }

    async fn login(
        &self,
        ctx: &dyn BrowserContext,
        _credentials: &Credentials,
        _captcha: &CaptchaGuard,
    ) -> Result<(), AuthError> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let result = if self.fail.load(Ordering::SeqCst) {
            Err(AuthError::InvalidCredentials {
                site: self.site.clone(),
                reason: "mock rejection".to_string(),
            })
        } else {
            let cookie = StoredCookie::new(
                SESSION_COOKIE,
                format!("{}-{}", self.site, n),
                format!("{}.test", self.site),
            );
            ctx.add_cookies(&[cookie]).await.map_err(AuthError::from)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn is_logged_in(&self, ctx: &dyn BrowserContext) -> Result<bool, AuthError> {
        let page = ctx.goto(&self.probe_url()).await?;
        Ok(!self.page_indicates_logged_out(&page))
    }

    fn page_indicates_logged_out(&self, page: &Page) -> bool {
        page.contains("please log in")
    }
}
