//! Paywalled site search through an authenticated browser session.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use super::extract::extract_causes;
use super::http::truncate;
use super::{FetchContext, SourceCategory, SourceError, SourceFinding, SourceProvider};
use crate::browser::{AcquireMode, Page, SessionManager};
use crate::candidate::Candidate;

const PAYLOAD_CHARS: usize = 4000;

pub struct BrowserSource {
    id: String,
    category: SourceCategory,
    site: String,
    /// Search page template with `{name}` and `{death_year}` placeholders.
    search_url: String,
    sessions: Arc<SessionManager>,
}

impl BrowserSource {
    pub fn new(
        id: impl Into<String>,
        category: SourceCategory,
        site: impl Into<String>,
        search_url: impl Into<String>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            site: site.into(),
            search_url: search_url.into(),
            sessions,
        }
    }

    fn search_url_for(&self, candidate: &Candidate) -> String {
        let year = candidate
            .death_year()
            .map(|y| y.to_string())
            .unwrap_or_default();
        self.search_url
            .replace("{name}", &urlencoding::encode(&candidate.name))
            .replace("{death_year}", &year)
    }

    async fn search(&self, url: &str, mode: AcquireMode) -> Result<Page, SourceError> {
        let ctx = self.sessions.acquire(&self.site, mode).await?;
        debug!(source = %self.id, url, "Opening search page");
        ctx.goto(url)
            .await
            .map_err(|e| SourceError::from(crate::browser::AuthError::from(e)))
    }
}

#[async_trait]
impl SourceProvider for BrowserSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        _ctx: &FetchContext,
    ) -> Result<Option<SourceFinding>, SourceError> {
        let url = self.search_url_for(candidate);
        // Any session this search reuses already exists at this point.
        let started_at = Utc::now();
        let mut page = self.search(&url, AcquireMode::Reuse).await?;

        if self.sessions.page_indicates_logged_out(&self.site, &page) {
            warn!(source = %self.id, site = %self.site, "Session dropped mid-run, logging in again");
            self.sessions.invalidate(&self.site, started_at).await?;
            page = self.search(&url, AcquireMode::ForceFresh).await?;
            if self.sessions.page_indicates_logged_out(&self.site, &page) {
                return Err(SourceError::Authentication(format!(
                    "{} still logged out after a fresh login",
                    self.site
                )));
            }
        }

        if page.status == 404 {
            return Ok(None);
        }
        if page.status >= 400 {
            return Err(SourceError::Api {
                status: page.status,
                message: truncate(&page.text(), 200),
            });
        }

        let text = page.text();
        let causes = extract_causes(&text, Some(&candidate.name));
        if causes.is_empty() {
            return Ok(None);
        }
        Ok(Some(SourceFinding::from_candidates(
            causes,
            truncate(&text, PAYLOAD_CHARS),
            Some(page.url),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{Credentials, Session, SessionStore, StorageState, StoredCookie};
    use crate::testing::{MemorySessionStore, MockBrowserEngine, MockLoginHandler};
    use chrono::{Duration, NaiveDate};

    const SEARCH: &str = "https://nytimes.test/search?q={name}&year={death_year}";
    const RESOLVED: &str = "https://nytimes.test/search?q=Jane%20Doe&year=2023";

    fn candidate() -> Candidate {
        Candidate::new("c1", "Jane Doe")
            .with_death_date(NaiveDate::from_ymd_opt(2023, 5, 2).unwrap())
    }

    fn setup(
        engine: Arc<MockBrowserEngine>,
        store: Arc<MemorySessionStore>,
        handler: Arc<MockLoginHandler>,
    ) -> BrowserSource {
        let sessions = SessionManager::new(engine, store)
            .with_handler(handler)
            .with_credentials("nytimes", Credentials::new("me", "pw"))
            .with_probe_on_restore(false)
            .with_stealth(crate::browser::StealthConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
                ..Default::default()
            });
        BrowserSource::new(
            "nyt",
            SourceCategory::Paid,
            "nytimes",
            SEARCH,
            Arc::new(sessions),
        )
    }

    #[test]
    fn test_search_url_template() {
        let source = setup(
            Arc::new(MockBrowserEngine::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MockLoginHandler::new("nytimes")),
        );
        assert_eq!(source.search_url_for(&candidate()), RESOLVED);
        assert_eq!(
            source.search_url_for(&Candidate::new("c2", "Bob")),
            "https://nytimes.test/search?q=Bob&year="
        );
    }

    #[tokio::test]
    async fn test_fetch_extracts_causes() {
        let engine = Arc::new(MockBrowserEngine::new());
        engine.set_page(
            RESOLVED,
            "<p>Jane Doe died of pancreatic cancer at her home, her family said.</p>",
        );
        let handler = Arc::new(MockLoginHandler::new("nytimes"));
        let source = setup(engine, Arc::new(MemorySessionStore::new()), handler.clone());

        let finding = source
            .fetch(&candidate(), &FetchContext::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.cause.as_deref(), Some("pancreatic cancer"));
        assert_eq!(finding.url.as_deref(), Some(RESOLVED));
        assert_eq!(handler.login_count(), 1);
    }

    #[tokio::test]
    async fn test_logged_out_page_forces_one_fresh_login() {
        let engine = Arc::new(MockBrowserEngine::new());
        engine.set_page(RESOLVED, "<p>Jane Doe died of pneumonia.</p>");
        engine.reject_session("stale");

        let store = Arc::new(MemorySessionStore::new());
        let state = StorageState {
            cookies: vec![StoredCookie::new("session", "stale", "nytimes.test")],
            ..StorageState::default()
        };
        store
            .save(&Session::new("nytimes", state, Duration::hours(24)))
            .unwrap();

        let handler = Arc::new(MockLoginHandler::new("nytimes"));
        let source = setup(engine, store.clone(), handler.clone());

        let finding = source
            .fetch(&candidate(), &FetchContext::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.cause.as_deref(), Some("pneumonia"));
        assert_eq!(handler.login_count(), 1);
        let saved = store.load("nytimes").unwrap().unwrap();
        assert!(saved.valid);
        assert_ne!(saved.state.cookies[0].value, "stale");
    }

    #[tokio::test]
    async fn test_still_logged_out_is_auth_failure() {
        let engine = Arc::new(MockBrowserEngine::new());
        engine.set_page(RESOLVED, "<p>Please log in to read this article.</p>");
        let handler = Arc::new(MockLoginHandler::new("nytimes"));
        let source = setup(engine, Arc::new(MemorySessionStore::new()), handler.clone());

        let err = source
            .fetch(&candidate(), &FetchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Authentication(_)));
        assert_eq!(handler.login_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_page_is_not_found() {
        let engine = Arc::new(MockBrowserEngine::new());
        let source = setup(
            engine,
            Arc::new(MemorySessionStore::new()),
            Arc::new(MockLoginHandler::new("nytimes")),
        );
        assert!(source
            .fetch(&candidate(), &FetchContext::default())
            .await
            .unwrap()
            .is_none());
    }
}
