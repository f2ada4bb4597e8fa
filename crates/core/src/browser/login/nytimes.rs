//! New York Times login.

use async_trait::async_trait;

use super::{AuthError, Credentials, FormLogin, SiteLoginHandler};
use crate::browser::captcha::CaptchaGuard;
use crate::browser::engine::{BrowserContext, Page};

pub const SITE_ID: &str = "nytimes";

pub struct NytimesLogin {
    form: FormLogin,
}

impl NytimesLogin {
    pub fn new() -> Self {
        Self::with_base_urls("https://myaccount.nytimes.com", "https://www.nytimes.com")
    }

    /// Point the handler at other hosts (staging, tests).
    pub fn with_base_urls(account_base: &str, site_base: &str) -> Self {
        let account = account_base.trim_end_matches('/');
        let site = site_base.trim_end_matches('/');
        Self {
            form: FormLogin {
                site: SITE_ID.to_string(),
                login_url: format!("{}/auth/login", account),
                action_url: Some(format!("{}/svc/lire_ui/login", account)),
                username_field: "email".to_string(),
                password_field: "password".to_string(),
                extra_fields: vec![("remember_me".to_string(), "Y".to_string())],
                probe_url: format!("{}/account", site),
                logged_in_markers: vec!["log out".to_string(), "\"isLoggedIn\":true".to_string()],
                logged_out_markers: vec![
                    "\"isLoggedIn\":false".to_string(),
                    "log in".to_string(),
                    "subscribe for".to_string(),
                ],
                failure_markers: vec![
                    "incorrect password".to_string(),
                    "we couldn't log you in".to_string(),
                ],
            },
        }
    }
}

impl Default for NytimesLogin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SiteLoginHandler for NytimesLogin {
    fn site_id(&self) -> &str {
        SITE_ID
    }

    async fn login(
        &self,
        ctx: &dyn BrowserContext,
        credentials: &Credentials,
        captcha: &CaptchaGuard,
    ) -> Result<(), AuthError> {
        self.form.login(ctx, credentials, captcha).await
    }

    async fn is_logged_in(&self, ctx: &dyn BrowserContext) -> Result<bool, AuthError> {
        self.form.is_logged_in(ctx).await
    }

    fn page_indicates_logged_out(&self, page: &Page) -> bool {
        self.form.page_indicates_logged_out(page)
    }
}
