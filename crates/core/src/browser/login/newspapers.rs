//! Newspapers.com login.

use async_trait::async_trait;

use super::{AuthError, Credentials, FormLogin, SiteLoginHandler};
use crate::browser::captcha::CaptchaGuard;
use crate::browser::engine::{BrowserContext, Page};

pub const SITE_ID: &str = "newspapers";

pub struct NewspapersLogin {
    form: FormLogin,
}

impl NewspapersLogin {
    pub fn new() -> Self {
        Self::with_base_url("https://www.newspapers.com")
    }

    /// Point the handler at another host (staging, tests).
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            form: FormLogin {
                site: SITE_ID.to_string(),
                login_url: format!("{}/signin/", base),
                action_url: None,
                username_field: "email".to_string(),
                password_field: "password".to_string(),
                extra_fields: Vec::new(),
                probe_url: format!("{}/account/", base),
                logged_in_markers: vec!["sign out".to_string(), "/signout".to_string()],
                logged_out_markers: vec![
                    "sign in to view".to_string(),
                    "start free trial".to_string(),
                    "/signin/".to_string(),
                ],
                failure_markers: vec![
                    "incorrect email or password".to_string(),
                    "invalid email or password".to_string(),
                ],
            },
        }
    }
}

impl Default for NewspapersLogin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SiteLoginHandler for NewspapersLogin {
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
