pub mod browser;
pub mod candidate;
pub mod config;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod parser;
pub mod source;
pub mod testing;

pub use browser::{
    AuthError, Credentials, HttpBrowserEngine, SessionManager, SessionStore, SqliteSessionStore,
};
pub use candidate::Candidate;
pub use config::{
    load_config, load_config_from_str, resolve_secrets, validate_config, BrowserConfig, Config,
    ConfigError, SanitizedConfig,
};
pub use orchestrator::{
    DecisionSink, EnrichmentDecision, Orchestrator, OrchestratorError, PolicyConfig,
    RunConfiguration, RunSummary, TerminationReason,
};
pub use source::{
    FailureKind, ProviderDeps, SourceBackend, SourceCategory, SourceDescriptor, SourceError,
    SourceProvider, SourceRegistry, SourceResult,
};
