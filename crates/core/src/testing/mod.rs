//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam (sources, browser engine, site logins,
//! LLM clients, CAPTCHA solvers, session storage), so the orchestrator and
//! browser subsystem can be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use mortem_core::testing::{fixtures, MockProvider};
//!
//! let provider = Arc::new(MockProvider::found("wikidata", "stroke", 0.9));
//! let mut registry = SourceRegistry::new();
//! registry.register(descriptor, provider.clone())?;
//!
//! let orchestrator = Orchestrator::new(Arc::new(registry), PolicyConfig::default());
//! let decisions = orchestrator
//!     .run(vec![fixtures::candidate("c1")], &RunConfiguration::default())
//!     .await?;
//! ```

mod memory_store;
mod mock_browser;
mod mock_captcha;
mod mock_llm;
mod mock_login;
mod mock_provider;

pub use memory_store::MemorySessionStore;
pub use mock_browser::{MockBrowserContext, MockBrowserEngine, LOGGED_OUT_HTML, SESSION_COOKIE};
pub use mock_captcha::MockCaptchaSolver;
pub use mock_llm::MockLlmClient;
pub use mock_login::MockLoginHandler;
pub use mock_provider::MockProvider;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::NaiveDate;

    use crate::candidate::Candidate;
    use crate::source::{SourceBackend, SourceCategory, SourceDescriptor};

    /// A named candidate with no dates or popularity.
    pub fn candidate(id: &str) -> Candidate {
        Candidate::new(id, "Jane Doe")
    }

    /// A candidate with a known death date and popularity.
    pub fn deceased(id: &str, name: &str, died: NaiveDate, popularity: f64) -> Candidate {
        Candidate::new(id, name)
            .with_death_date(died)
            .with_popularity(popularity)
    }

    /// A descriptor for a mock provider; the backend is never instantiated.
    pub fn descriptor(id: &str, category: SourceCategory, priority: i32) -> SourceDescriptor {
        SourceDescriptor::new(
            id,
            SourceBackend::Wikipedia {
                api_base: "https://en.wikipedia.org/w/api.php".to_string(),
            },
        )
        .with_category(category)
        .with_priority(priority)
    }
}
