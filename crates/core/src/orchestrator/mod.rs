//! Enrichment orchestrator.
//!
//! For each candidate the orchestrator:
//! - applies the run's pre-filters (popularity, recent deaths)
//! - calls eligible sources in order: free, then paid, then AI
//! - scores every result against the acceptance policy
//! - stops or keeps probing per `stop_on_match`
//!
//! and emits exactly one [`EnrichmentDecision`].

mod config;
mod policy;
mod runner;
mod types;

pub use config::{PolicyConfig, RunConfiguration, SourceCategories};
pub use policy::{AcceptancePolicy, Rejection, Verdict};
pub use runner::Orchestrator;
pub use types::{
    DecisionSink, EnrichmentDecision, OrchestratorError, RunSummary, TerminationReason,
};
