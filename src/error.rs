//! Error types for the supervisor engine.
//!
//! One taxonomy covers the whole pipeline. The containment policy lives
//! with the callers: tool errors are folded into team results, team
//! errors are folded into the turn state, and only input validation,
//! missing configuration, and store connectivity surface to the caller
//! as `Err`.

use thiserror::Error;

/// Errors produced by the supervisor engine and its capabilities.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The query failed input validation. Nothing was persisted.
    #[error("input rejected: {reason}")]
    InputRejected {
        /// Why the input was rejected.
        reason: String,
    },

    /// Intent classification or team selection failed beyond recovery.
    #[error("planning failed: {message}")]
    Planning {
        /// Description of the planning failure.
        message: String,
    },

    /// An LLM response could not be parsed against its schema.
    #[error("failed to parse LLM response: {message}")]
    ResponseParse {
        /// Description of the parse failure.
        message: String,
        /// The raw response content for diagnostics.
        content: String,
    },

    /// An LLM API request failed (transport, auth, rate limit).
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error description from the transport layer.
        message: String,
        /// HTTP status code when available.
        status: Option<u16>,
    },

    /// No API key was configured for the LLM client.
    #[error("no API key configured (set OPENAI_API_KEY or JIBSA_API_KEY)")]
    ApiKeyMissing,

    /// The configured LLM provider name is not supported.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unknown provider name.
        name: String,
    },

    /// A tool invocation failed.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Name of the failing tool.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// Query embedding failed. Fatal for the enclosing search call.
    #[error("embedding failed: {message}")]
    Embedding {
        /// Description of the embedding failure.
        message: String,
    },

    /// Underlying metadata/message store failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Final synthesis failed after successful aggregation.
    #[error("synthesis failed: {message}")]
    Synthesis {
        /// Description of the synthesis failure.
        message: String,
    },

    /// An operation exceeded its deadline.
    #[error("operation timed out after {seconds}s")]
    Timeout {
        /// The deadline that was exceeded, in seconds.
        seconds: u64,
    },

    /// The turn was cancelled externally.
    #[error("turn cancelled")]
    Cancelled,

    /// Corpus ingestion failure (I/O or malformed records).
    #[error("corpus ingestion failed: {message}")]
    Ingest {
        /// Description of the ingestion failure.
        message: String,
    },
}

impl EngineError {
    /// Returns `true` for errors that a team executor must contain
    /// rather than propagate (everything except programming errors).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ApiKeyMissing | Self::UnsupportedProvider { .. })
    }
}
