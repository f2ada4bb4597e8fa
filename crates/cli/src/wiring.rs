//! Builds the runtime object graph from a validated [`Config`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use mortem_core::browser::{
    CaptchaGuard, CaptchaSolver, HttpBrowserEngine, NewspapersLogin, NytimesLogin,
    SessionManager, SessionStore, SqliteSessionStore, TaskApiSolver,
};
use mortem_core::{BrowserConfig, Config, Orchestrator, ProviderDeps, SourceBackend, SourceRegistry};

/// Open the session database named by the config (or the default one).
pub fn open_session_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    let path = config
        .browser
        .as_ref()
        .map(|b| b.sessions_db.clone())
        .unwrap_or_else(|| BrowserConfig::default().sessions_db);
    let store = SqliteSessionStore::new(&path)
        .with_context(|| format!("Failed to open session store {:?}", path))?;
    Ok(Arc::new(store))
}

/// Session manager for authenticated sources, if any are configured.
pub fn build_session_manager(config: &Config) -> Result<Option<Arc<SessionManager>>> {
    let needs_browser = config
        .sources
        .iter()
        .any(|s| matches!(s.backend, SourceBackend::Browser { .. }));
    let Some(browser) = config.browser.as_ref().filter(|_| needs_browser) else {
        return Ok(None);
    };

    let solver: Option<Arc<dyn CaptchaSolver>> = match &config.captcha {
        Some(captcha) => {
            let solver =
                TaskApiSolver::new(captcha).context("Failed to create CAPTCHA solver")?;
            info!(provider = captcha.provider.as_str(), "CAPTCHA solver configured");
            Some(Arc::new(solver))
        }
        None => {
            info!("No CAPTCHA solver configured");
            None
        }
    };
    let min_balance = config.captcha.as_ref().map_or(0.0, |c| c.min_balance);

    let engine = Arc::new(HttpBrowserEngine::new(Duration::from_secs(
        browser.navigation_timeout_secs,
    )));
    let mut manager = SessionManager::new(engine, open_session_store(config)?)
        .with_handler(Arc::new(NytimesLogin::new()))
        .with_handler(Arc::new(NewspapersLogin::new()))
        .with_captcha(CaptchaGuard::new(solver, min_balance))
        .with_stealth(browser.stealth.clone())
        .with_ttl(chrono::Duration::hours(browser.session_ttl_hours as i64))
        .with_probe_on_restore(browser.probe_on_restore);
    for (site, credentials) in &browser.credentials {
        manager = manager.with_credentials(site.clone(), credentials.clone());
    }
    Ok(Some(Arc::new(manager)))
}

/// Instantiate every configured source and the orchestrator around them.
pub fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let deps = ProviderDeps {
        retry: config.retry.clone(),
        sessions: build_session_manager(config)?,
    };
    let registry = SourceRegistry::from_descriptors(&config.sources, &deps)
        .context("Failed to build sources")?;
    Ok(Orchestrator::new(Arc::new(registry), config.policy.clone()))
}
