//! Language model clients used by AI sources.

mod client;
mod config;

pub use client::{
    CompletionRequest, CompletionResponse, Dialect, HttpLlmClient, LlmClient, LlmError, LlmUsage,
};
pub use config::{build_client, LlmConfig, LlmProvider};
