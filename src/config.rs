//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::EngineError;

/// Default maximum teams executing concurrently.
const DEFAULT_MAX_TEAM_PARALLELISM: usize = 3;
/// Default maximum tools executing concurrently within a team.
const DEFAULT_MAX_TOOL_PARALLELISM: usize = 3;
/// Default per-tool timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
/// Default per-team timeout in seconds.
const DEFAULT_TEAM_TIMEOUT_SECS: u64 = 60;
/// Default per-turn timeout in seconds.
const DEFAULT_TURN_TIMEOUT_SECS: u64 = 180;
/// Default intent-classifier max tokens. Bounded small: the classifier
/// emits one compact JSON object.
const DEFAULT_INTENT_MAX_TOKENS: u32 = 500;
/// Default planner (team selection) max tokens.
const DEFAULT_PLAN_MAX_TOKENS: u32 = 1024;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 4096;
/// Default number of recent messages loaded for context.
const DEFAULT_RECENT_MESSAGES: usize = 10;
/// Default maximum query length in bytes.
const DEFAULT_MAX_QUERY_LEN: usize = 4_000;
/// Default search result limit per tool call.
const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Configuration for the supervisor engine.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for intent classification (planning stage 1).
    pub intent_model: String,
    /// Model for team selection, tool planning, and decide calls.
    pub planner_model: String,
    /// Model for the final synthesis call.
    pub synthesizer_model: String,
    /// Maximum tokens for intent classification responses.
    pub intent_max_tokens: u32,
    /// Maximum tokens for planning responses.
    pub plan_max_tokens: u32,
    /// Maximum tokens for synthesis responses.
    pub synthesizer_max_tokens: u32,
    /// Maximum teams executing concurrently in parallel/mixed mode.
    pub max_team_parallelism: usize,
    /// Maximum tools executing concurrently within one team.
    pub max_tool_parallelism: usize,
    /// Per-tool timeout. A timed-out tool is recorded failed; the team
    /// continues.
    pub tool_timeout: Duration,
    /// Per-team timeout. A timed-out team is recorded failed; the turn
    /// continues.
    pub team_timeout: Duration,
    /// Per-turn timeout. Exceeding it fails the turn with partial
    /// results preserved.
    pub turn_timeout: Duration,
    /// Messages of session history loaded for planning context.
    pub recent_messages: usize,
    /// Maximum accepted query length in bytes.
    pub max_query_len: usize,
    /// Default search result limit per retrieval call.
    pub search_limit: usize,
    /// Directory containing prompt template files.
    ///
    /// When set, system prompts load from markdown files in this
    /// directory, falling back to compiled-in defaults for any missing
    /// files.
    pub prompt_dir: Option<PathBuf>,
}

impl SupervisorConfig {
    /// Creates a new builder for `SupervisorConfig`.
    #[must_use]
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`SupervisorConfig`].
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    intent_model: Option<String>,
    planner_model: Option<String>,
    synthesizer_model: Option<String>,
    intent_max_tokens: Option<u32>,
    plan_max_tokens: Option<u32>,
    synthesizer_max_tokens: Option<u32>,
    max_team_parallelism: Option<usize>,
    max_tool_parallelism: Option<usize>,
    tool_timeout: Option<Duration>,
    team_timeout: Option<Duration>,
    turn_timeout: Option<Duration>,
    recent_messages: Option<usize>,
    max_query_len: Option<usize>,
    search_limit: Option<usize>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl SupervisorConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("JIBSA_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("JIBSA_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("JIBSA_BASE_URL"))
                .ok();
        }
        if self.intent_model.is_none() {
            self.intent_model = std::env::var("JIBSA_INTENT_MODEL").ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("JIBSA_PLANNER_MODEL").ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("JIBSA_SYNTHESIZER_MODEL").ok();
        }
        if self.max_team_parallelism.is_none() {
            self.max_team_parallelism = env_parse("JIBSA_MAX_TEAM_PARALLELISM");
        }
        if self.max_tool_parallelism.is_none() {
            self.max_tool_parallelism = env_parse("JIBSA_MAX_TOOL_PARALLELISM");
        }
        if self.tool_timeout.is_none() {
            self.tool_timeout = env_parse("JIBSA_TOOL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.team_timeout.is_none() {
            self.team_timeout = env_parse("JIBSA_TEAM_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.turn_timeout.is_none() {
            self.turn_timeout = env_parse("JIBSA_TURN_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.recent_messages.is_none() {
            self.recent_messages = env_parse("JIBSA_RECENT_MESSAGES");
        }
        if self.search_limit.is_none() {
            self.search_limit = env_parse("JIBSA_SEARCH_LIMIT");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("JIBSA_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the intent classifier model.
    #[must_use]
    pub fn intent_model(mut self, model: impl Into<String>) -> Self {
        self.intent_model = Some(model.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets the maximum concurrent teams.
    #[must_use]
    pub const fn max_team_parallelism(mut self, n: usize) -> Self {
        self.max_team_parallelism = Some(n);
        self
    }

    /// Sets the maximum concurrent tools per team.
    #[must_use]
    pub const fn max_tool_parallelism(mut self, n: usize) -> Self {
        self.max_tool_parallelism = Some(n);
        self
    }

    /// Sets the per-tool timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, d: Duration) -> Self {
        self.tool_timeout = Some(d);
        self
    }

    /// Sets the per-team timeout.
    #[must_use]
    pub const fn team_timeout(mut self, d: Duration) -> Self {
        self.team_timeout = Some(d);
        self
    }

    /// Sets the per-turn timeout.
    #[must_use]
    pub const fn turn_timeout(mut self, d: Duration) -> Self {
        self.turn_timeout = Some(d);
        self
    }

    /// Sets the number of history messages loaded for context.
    #[must_use]
    pub const fn recent_messages(mut self, n: usize) -> Self {
        self.recent_messages = Some(n);
        self
    }

    /// Sets the maximum accepted query length.
    #[must_use]
    pub const fn max_query_len(mut self, n: usize) -> Self {
        self.max_query_len = Some(n);
        self
    }

    /// Sets the default search result limit.
    #[must_use]
    pub const fn search_limit(mut self, n: usize) -> Self {
        self.search_limit = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`SupervisorConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<SupervisorConfig, EngineError> {
        let api_key = self.api_key.ok_or(EngineError::ApiKeyMissing)?;

        Ok(SupervisorConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            intent_model: self
                .intent_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            planner_model: self
                .planner_model
                .unwrap_or_else(|| "gpt-5-mini-2025-08-07".to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| "gpt-5.2-2025-12-11".to_string()),
            intent_max_tokens: self.intent_max_tokens.unwrap_or(DEFAULT_INTENT_MAX_TOKENS),
            plan_max_tokens: self.plan_max_tokens.unwrap_or(DEFAULT_PLAN_MAX_TOKENS),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZER_MAX_TOKENS),
            max_team_parallelism: self
                .max_team_parallelism
                .unwrap_or(DEFAULT_MAX_TEAM_PARALLELISM)
                .max(1),
            max_tool_parallelism: self
                .max_tool_parallelism
                .unwrap_or(DEFAULT_MAX_TOOL_PARALLELISM)
                .max(1),
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            team_timeout: self
                .team_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TEAM_TIMEOUT_SECS)),
            turn_timeout: self
                .turn_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TURN_TIMEOUT_SECS)),
            recent_messages: self.recent_messages.unwrap_or(DEFAULT_RECENT_MESSAGES),
            max_query_len: self.max_query_len.unwrap_or(DEFAULT_MAX_QUERY_LEN),
            search_limit: self.search_limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            prompt_dir: self.prompt_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SupervisorConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.max_team_parallelism, DEFAULT_MAX_TEAM_PARALLELISM);
        assert_eq!(config.tool_timeout, Duration::from_secs(30));
        assert_eq!(config.team_timeout, Duration::from_secs(60));
        assert_eq!(config.turn_timeout, Duration::from_secs(180));
        assert_eq!(config.recent_messages, 10);
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = SupervisorConfig::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = SupervisorConfig::builder()
            .api_key("key")
            .provider("custom")
            .intent_model("small-model")
            .max_team_parallelism(2)
            .tool_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "custom");
        assert_eq!(config.intent_model, "small-model");
        assert_eq!(config.max_team_parallelism, 2);
        assert_eq!(config.tool_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parallelism_floor_is_one() {
        let config = SupervisorConfig::builder()
            .api_key("key")
            .max_team_parallelism(0)
            .max_tool_parallelism(0)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.max_team_parallelism, 1);
        assert_eq!(config.max_tool_parallelism, 1);
    }
}
