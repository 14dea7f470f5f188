//! Inference provider abstractions for warden-runtime.
//!
//! This module defines the trait every inference backend implements and
//! includes a Bedrock provider (feature `bedrock`) and an offline canned
//! provider.
//!
//! ## Guardrails
//!
//! An [`InferenceRequest`] cannot be built without a [`GuardrailConfig`], so
//! every provider call carries a non-empty guardrail identifier.
//!
//! ## Security
//!
//! Providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use warden_core::{GuardrailConfig, PromptRequest};

mod canned;
mod factory;
pub mod secrets;

#[cfg(feature = "bedrock")]
mod bedrock;

pub use canned::{CannedProvider, CannedProviderFactory};
pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "bedrock")]
pub use bedrock::{BedrockProvider, BedrockProviderFactory};

/// Errors from inference providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Guardrail {guardrail_id} intervened")]
    GuardrailIntervened { guardrail_id: String },

    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// The content-safety system rejected the request or response.
    pub fn is_blocked(&self) -> bool {
        matches!(self, ProviderError::GuardrailIntervened { .. })
    }
}

/// One guarded inference call.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Fully rendered prompt
    pub prompt: String,

    /// Guardrail applied to the call
    pub guardrail: GuardrailConfig,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Prompt branch, for logging
    pub branch: &'static str,
}

impl InferenceRequest {
    pub fn new(prompt: &PromptRequest, guardrail: GuardrailConfig) -> Self {
        Self {
            prompt: prompt.render(),
            guardrail,
            max_tokens: prompt.max_tokens,
            branch: prompt.branch.as_str(),
        }
    }
}

/// A chat message in the provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "user" or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an inference call.
#[derive(Debug, Clone)]
pub struct InferenceResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from an inference call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Inference backend.
///
/// This is the ONLY place a model is called, and always with the
/// request's guardrail.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Invoke the model with the request's guardrail applied.
    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Get provider name for logs.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // Simple estimate: ~4 chars per token
        (text.len() / 4) as u32
    }
}
