//! Offline provider for local runs and demos.
//!
//! Never calls a model. The reply names the guardrail and prompt branch the
//! request would have been sent with, so the policy decisions are visible
//! end to end without credentials.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::{
    factory::ProviderFactory, InferenceProvider, InferenceRequest, InferenceResponse,
    ProviderError, TokenUsage,
};

#[derive(Debug, Clone, Default)]
pub struct CannedProvider {
    /// Fixed reply; when unset the provider describes the request instead
    reply: Option<String>,
}

impl CannedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }
}

#[async_trait]
impl InferenceProvider for CannedProvider {
    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let content = self.reply.clone().unwrap_or_else(|| {
            format!(
                "[canned] guardrail={} version={} branch={} max_tokens={}",
                request.guardrail.guardrail_id,
                request.guardrail.guardrail_version,
                request.branch,
                request.max_tokens
            )
        });

        Ok(InferenceResponse {
            usage: TokenUsage {
                prompt_tokens: self.estimate_tokens(&request.prompt),
                completion_tokens: self.estimate_tokens(&content),
            },
            content,
            model: "canned".to_string(),
            stop_reason: Some("end_turn".to_string()),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "canned"
    }
}

/// ## Configuration Format
/// ```json
/// { "reply": "Fixed answer" }   // Optional
/// ```
pub struct CannedProviderFactory;

impl ProviderFactory for CannedProviderFactory {
    fn provider_type(&self) -> &'static str {
        "canned"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn InferenceProvider>, ProviderError> {
        self.validate_config(config)?;
        let provider = match config["reply"].as_str() {
            Some(reply) => CannedProvider::with_reply(reply),
            None => CannedProvider::new(),
        };
        Ok(Arc::new(provider))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !config["reply"].is_null() && !config["reply"].is_string() {
            return Err(ProviderError::NotConfigured(
                "canned 'reply' must be a string".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Offline provider that describes the guarded request"
    }
}
