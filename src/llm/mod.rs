//! LLM client abstraction.
//!
//! Provider-agnostic request/response types plus the [`LlmClient`]
//! capability trait. The engine never imports an SDK type outside
//! `providers/`; everything upstream works against [`ChatRequest`] and
//! [`ChatResponse`].

pub mod client;
pub mod json;
pub mod message;
pub mod providers;

pub use client::{LlmClient, create_client};
pub use json::parse_json_response;
pub use message::{
    ChatMessage, ChatRequest, ChatResponse, Role, TokenMeter, TokenUsage, system_message,
    user_message,
};
