//! Per-site session lifecycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::captcha::CaptchaGuard;
use super::engine::{BrowserContext, BrowserEngine, Page, StorageState};
use super::login::{AuthError, Credentials, SiteLoginHandler};
use super::session::{Session, SessionState};
use super::stealth::{StealthConfig, StealthProfile};
use super::store::SessionStore;
use crate::metrics;

/// How [`SessionManager::acquire`] treats a stored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    /// Restore the stored session when it is still good.
    Reuse,
    /// Ignore sessions older than this call and log in again.
    ForceFresh,
}

/// Hands out authenticated browser contexts, one login per site at a time.
///
/// Restores share a per-site read lock. Logins take the write lock and check
/// the store again once they hold it, so a caller that waited behind another
/// login reuses that session instead of logging in twice.
pub struct SessionManager {
    engine: Arc<dyn BrowserEngine>,
    store: Arc<dyn SessionStore>,
    handlers: HashMap<String, Arc<dyn SiteLoginHandler>>,
    credentials: HashMap<String, Credentials>,
    captcha: CaptchaGuard,
    stealth: StealthConfig,
    ttl: Duration,
    probe_on_restore: bool,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl SessionManager {
    pub fn new(engine: Arc<dyn BrowserEngine>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            engine,
            store,
            handlers: HashMap::new(),
            credentials: HashMap::new(),
            captcha: CaptchaGuard::disabled(),
            stealth: StealthConfig::default(),
            ttl: Duration::hours(168),
            probe_on_restore: true,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn SiteLoginHandler>) -> Self {
        self.handlers.insert(handler.site_id().to_string(), handler);
        self
    }

    pub fn with_credentials(mut self, site: impl Into<String>, credentials: Credentials) -> Self {
        self.credentials.insert(site.into(), credentials);
        self
    }

    pub fn with_captcha(mut self, captcha: CaptchaGuard) -> Self {
        self.captcha = captcha;
        self
    }

    pub fn with_stealth(mut self, stealth: StealthConfig) -> Self {
        self.stealth = stealth;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether restored sessions are checked against the site before use.
    pub fn with_probe_on_restore(mut self, probe: bool) -> Self {
        self.probe_on_restore = probe;
        self
    }

    pub fn has_site(&self, site: &str) -> bool {
        self.handlers.contains_key(site)
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Whether `page` shows the site's logged-out state.
    pub fn page_indicates_logged_out(&self, site: &str, page: &Page) -> bool {
        self.handlers
            .get(site)
            .map(|h| h.page_indicates_logged_out(page))
            .unwrap_or(false)
    }

    fn site_lock(&self, site: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(site.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn handler(&self, site: &str) -> Result<Arc<dyn SiteLoginHandler>, AuthError> {
        self.handlers
            .get(site)
            .cloned()
            .ok_or_else(|| AuthError::UnknownSite(site.to_string()))
    }

    /// Get a logged-in context for `site`.
    pub async fn acquire(
        &self,
        site: &str,
        mode: AcquireMode,
    ) -> Result<Box<dyn BrowserContext>, AuthError> {
        let handler = self.handler(site)?;
        let lock = self.site_lock(site);
        let requested_at = Utc::now();

        if mode == AcquireMode::Reuse {
            let _read = lock.read().await;
            if let Some(ctx) = self.restore(handler.as_ref(), None).await? {
                return Ok(ctx);
            }
        }

        let _write = lock.write().await;
        // Someone may have logged in while we waited.
        let newer_than = match mode {
            AcquireMode::Reuse => None,
            AcquireMode::ForceFresh => Some(requested_at),
        };
        if let Some(ctx) = self.restore(handler.as_ref(), newer_than).await? {
            return Ok(ctx);
        }
        self.login(handler.as_ref()).await
    }

    /// Try the stored session. `newer_than` skips sessions created earlier.
    async fn restore(
        &self,
        handler: &dyn SiteLoginHandler,
        newer_than: Option<DateTime<Utc>>,
    ) -> Result<Option<Box<dyn BrowserContext>>, AuthError> {
        let site = handler.site_id();
        let now = Utc::now();

        let Some(mut session) = self.store.load(site)? else {
            transition(site, SessionState::NoSession);
            record_restore(site, "missing");
            return Ok(None);
        };
        if newer_than.is_some_and(|t| session.created_at < t) {
            debug!(site, "Stored session predates forced login");
            return Ok(None);
        }
        if !session.is_usable(now) {
            transition(site, SessionState::SessionLoaded { valid: false });
            record_restore(site, "expired");
            return Ok(None);
        }

        let ctx = self.new_context(Some(&session.state)).await?;
        // A session saved by the login we waited on needs no probe.
        if self.probe_on_restore
            && newer_than.is_none()
            && !handler.is_logged_in(ctx.as_ref()).await?
        {
            warn!(site, "Stored session rejected by site");
            session.valid = false;
            self.store.save(&session)?;
            transition(site, SessionState::SessionLoaded { valid: false });
            record_restore(site, "probe_failed");
            return Ok(None);
        }

        transition(site, SessionState::SessionLoaded { valid: true });
        record_restore(site, "reused");
        self.store.touch(site, now)?;
        Ok(Some(ctx))
    }

    async fn login(
        &self,
        handler: &dyn SiteLoginHandler,
    ) -> Result<Box<dyn BrowserContext>, AuthError> {
        let site = handler.site_id();
        let credentials = self
            .credentials
            .get(site)
            .ok_or_else(|| AuthError::MissingCredentials(site.to_string()))?;

        transition(site, SessionState::Authenticating);
        let ctx = self.new_context(None).await?;
        if let Err(e) = handler.login(ctx.as_ref(), credentials, &self.captcha).await {
            warn!(site, error = %e, "Login failed");
            metrics::LOGINS.with_label_values(&[site, "failure"]).inc();
            return Err(e);
        }
        metrics::LOGINS.with_label_values(&[site, "success"]).inc();
        transition(site, SessionState::Authenticated);

        let state = ctx.storage_state().await?;
        let session = Session::new(site, state, self.ttl);
        self.store.save(&session)?;
        transition(site, SessionState::SessionSaved);
        info!(site, expires_at = %session.expires_at, "Saved new session");
        Ok(ctx)
    }

    async fn new_context(
        &self,
        state: Option<&StorageState>,
    ) -> Result<Box<dyn BrowserContext>, AuthError> {
        let ctx = self.engine.new_context(state).await?;
        ctx.apply_stealth(&StealthProfile::random(&self.stealth)).await?;
        Ok(ctx)
    }

    /// Mark the stored session for `site` as rejected.
    ///
    /// Only a session created no later than `seen_at` is touched; one saved by
    /// a newer login is left alone.
    pub async fn invalidate(&self, site: &str, seen_at: DateTime<Utc>) -> Result<(), AuthError> {
        let lock = self.site_lock(site);
        let _write = lock.write().await;
        let Some(mut session) = self.store.load(site)? else {
            return Ok(());
        };
        if session.created_at > seen_at {
            debug!(site, "Session was replaced after it was rejected, keeping it");
            return Ok(());
        }
        if session.valid {
            session.valid = false;
            self.store.save(&session)?;
            info!(site, "Invalidated session");
        }
        Ok(())
    }

    /// Delete every expired session. Returns how many were removed.
    pub fn cleanup_expired(&self) -> Result<usize, AuthError> {
        let purged = self.store.purge_expired(Utc::now())?;
        if purged > 0 {
            info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }
}

fn transition(site: &str, state: SessionState) {
    info!(site, state = %state, "Session state");
}

fn record_restore(site: &str, outcome: &str) {
    metrics::SESSION_RESTORES
        .with_label_values(&[site, outcome])
        .inc();
}
