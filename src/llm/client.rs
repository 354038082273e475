//! Pluggable LLM client trait and factory.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. This keeps all planning and
//! synthesis logic decoupled from any particular LLM vendor; tests
//! inject scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::config::SupervisorConfig;
use crate::error::EngineError;

/// Trait for LLM client backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls,
/// retries) for a specific provider while presenting a uniform
/// interface to the engine. When `json_mode` is requested the response
/// content must be parseable JSON; a single malformed response
/// triggers the caller's one-retry-then-fallback policy.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Client name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ApiRequest`] on API failures or timeouts.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, EngineError>;
}

/// Creates an [`LlmClient`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default) — OpenAI-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`EngineError::UnsupportedProvider`] for unknown provider names.
pub fn create_client(config: &SupervisorConfig) -> Result<Arc<dyn LlmClient>, EngineError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(super::providers::OpenAiClient::new(config))),
        other => Err(EngineError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
