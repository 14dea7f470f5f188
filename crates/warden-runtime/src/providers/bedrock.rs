//! Amazon Bedrock provider.
//!
//! Calls the `InvokeModel` runtime API with the guardrail identifier and
//! version sent as request headers, so the content-safety system screens
//! both the prompt and the completion.
//!
//! ## Security
//!
//! Authenticates with a Bedrock API key held in an [`ApiCredential`]. See the
//! [`secrets`](super::secrets) module for details.

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, InferenceProvider, InferenceRequest, InferenceResponse, ProviderError,
    TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Environment variable holding the Bedrock API key.
pub const BEDROCK_API_KEY_ENV: &str = "AWS_BEARER_TOKEN_BEDROCK";

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_REGION: &str = "us-east-1";

const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
const GUARDRAIL_ID_HEADER: &str = "X-Amzn-Bedrock-GuardrailIdentifier";
const GUARDRAIL_VERSION_HEADER: &str = "X-Amzn-Bedrock-GuardrailVersion";
const GUARDRAIL_INTERVENED: &str = "INTERVENED";

/// Bedrock runtime provider.
pub struct BedrockProvider {
    credential: ApiCredential,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl std::fmt::Debug for BedrockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockProvider")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

/// Regional runtime endpoint.
pub fn regional_endpoint(region: &str) -> String {
    format!("https://bedrock-runtime.{}.amazonaws.com", region)
}

impl BedrockProvider {
    pub fn new(api_key: impl Into<String>, region: &str) -> Self {
        Self {
            credential: ApiCredential::new(
                api_key,
                CredentialSource::Programmatic,
                "Bedrock API key",
            ),
            endpoint: regional_endpoint(region),
            model: DEFAULT_MODEL_ID.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Create from JSON configuration with environment fallback for the key.
    ///
    /// Recognised keys: `api_key`, `region`, `endpoint`, `model`, `timeout_secs`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            BEDROCK_API_KEY_ENV,
            "Bedrock API key",
        )?;

        let region = config["region"].as_str().unwrap_or(DEFAULT_REGION);
        let endpoint = config["endpoint"]
            .as_str()
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| regional_endpoint(region));

        Ok(Self {
            credential,
            endpoint,
            model: config["model"]
                .as_str()
                .unwrap_or(DEFAULT_MODEL_ID)
                .to_string(),
            timeout: config["timeout_secs"]
                .as_u64()
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(30)),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn invoke_url(&self) -> String {
        format!(
            "{}/model/{}/invoke",
            self.endpoint,
            self.model.replace(':', "%3A")
        )
    }

    fn get_client(&self) -> Result<&'static reqwest::Client, ProviderError> {
        static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
        if let Some(client) = CLIENT.get() {
            return Ok(client);
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;
        Ok(CLIENT.get_or_init(|| client))
    }
}

/// InvokeModel body for Anthropic models.
#[derive(Debug, Serialize)]
struct BedrockRequest {
    anthropic_version: &'static str,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct BedrockResponse {
    #[serde(default)]
    content: Vec<ContentBlockResponse>,
    #[serde(default)]
    model: Option<String>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: BedrockUsage,
    #[serde(rename = "amazon-bedrock-guardrailAction", default)]
    guardrail_action: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockResponse {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BedrockUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct BedrockError {
    #[serde(alias = "Message")]
    message: String,
}

#[async_trait]
impl InferenceProvider for BedrockProvider {
    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let client = self.get_client()?;

        let body = BedrockRequest {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: request.max_tokens,
            messages: vec![ChatMessage::user(request.prompt.clone())],
        };

        // SECURITY: Only expose the credential here, at the point of use
        let response = client
            .post(self.invoke_url())
            .bearer_auth(self.credential.expose())
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .header(GUARDRAIL_ID_HEADER, request.guardrail.guardrail_id.as_str())
            .header(
                GUARDRAIL_VERSION_HEADER,
                request.guardrail.guardrail_version.as_str(),
            )
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let message = response
                .json::<BedrockError>()
                .await
                .map(|e| e.message)
                .unwrap_or_else(|e| e.to_string());

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: BedrockResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        if body.guardrail_action.as_deref() == Some(GUARDRAIL_INTERVENED) {
            return Err(ProviderError::GuardrailIntervened {
                guardrail_id: request.guardrail.guardrail_id.to_string(),
            });
        }

        let content = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(ProviderError::ParseError(
                "response contained no text content".to_string(),
            ));
        }

        Ok(InferenceResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model.unwrap_or_else(|| self.model.clone()),
            stop_reason: body.stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}

/// Factory for creating Bedrock providers from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "api_key": "...",                  // Optional, falls back to AWS_BEARER_TOKEN_BEDROCK
///   "region": "us-east-1",             // Optional
///   "endpoint": "https://...",         // Optional, overrides the regional endpoint
///   "model": "anthropic.claude-3-sonnet-20240229-v1:0",
///   "timeout_secs": 30
/// }
/// ```
pub struct BedrockProviderFactory;

impl ProviderFactory for BedrockProviderFactory {
    fn provider_type(&self) -> &'static str {
        "bedrock"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn InferenceProvider>, ProviderError> {
        self.validate_config(config)?;
        Ok(Arc::new(BedrockProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(config, "api_key", BEDROCK_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Bedrock API key required: set 'api_key' in config or {} env",
                BEDROCK_API_KEY_ENV
            )));
        }

        if let Some(url) = config["endpoint"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "endpoint must start with http:// or https://".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "model": DEFAULT_MODEL_ID,
            "region": DEFAULT_REGION,
            "timeout_secs": 30
        })
    }

    fn description(&self) -> &'static str {
        "Amazon Bedrock InvokeModel with guardrails"
    }
}
