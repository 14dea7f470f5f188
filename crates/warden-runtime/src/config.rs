//! Runtime configuration.
//!
//! Loaded from YAML, with defaults for every field and a small set of
//! environment overrides. Guardrail identifiers resolve environment first,
//! then the config file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use warden_core::guardrails::{
    CatalogError, GuardrailCatalog, GuardrailKey, DEFAULT_GUARDRAIL_VERSION, GUARDRAIL_VERSION_ENV,
};
use warden_core::ConversationWindow;

/// Overrides `inference.model`.
pub const MODEL_ID_ENV: &str = "WARDEN_MODEL_ID";

/// Overrides `limits.max_query_chars`.
pub const MAX_QUERY_CHARS_ENV: &str = "WARDEN_MAX_QUERY_CHARS";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Guardrail configuration error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Missing component: {0}")]
    Missing(&'static str),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub guardrails: GuardrailsConfig,
}

/// Request size limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_query_chars: usize,
    pub max_user_id_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_query_chars: 1000,
            max_user_id_chars: warden_core::profile::MAX_USER_ID_CHARS,
        }
    }
}

/// Conversation history settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Turns included in a follow-up prompt
    pub lookback_turns: usize,

    /// Characters of each past answer included in a follow-up prompt
    pub excerpt_chars: usize,

    /// How long a conversation is kept after its last turn
    #[serde(with = "duration_str")]
    pub ttl: Duration,

    /// Oldest turns are dropped beyond this count
    pub max_turns_per_conversation: usize,

    /// Capacity of the in-memory history store
    pub max_conversations: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            lookback_turns: warden_core::context::DEFAULT_LOOKBACK_TURNS,
            excerpt_chars: warden_core::context::DEFAULT_EXCERPT_CHARS,
            ttl: Duration::from_secs(24 * 60 * 60),
            max_turns_per_conversation: 50,
            max_conversations: 10_000,
        }
    }
}

impl HistoryConfig {
    pub fn window(&self) -> ConversationWindow {
        ConversationWindow::new(self.lookback_turns, self.excerpt_chars)
    }
}

/// Inference provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Registered provider type, e.g. "bedrock" or "canned"
    pub provider: String,

    pub model: String,

    pub region: String,

    /// Custom endpoint, defaults to the regional Bedrock runtime endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: "bedrock".to_string(),
            model: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl InferenceConfig {
    /// Provider configuration handed to a provider factory.
    pub fn provider_config(&self) -> serde_json::Value {
        let mut config = serde_json::json!({
            "model": self.model,
            "region": self.region,
            "timeout_secs": self.timeout.as_secs(),
        });
        if let Some(endpoint) = &self.endpoint {
            config["endpoint"] = serde_json::Value::String(endpoint.clone());
        }
        config
    }
}

/// Guardrail identifiers and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailsConfig {
    pub version: String,

    /// Identifiers keyed by segment name (`child`, `teen`, `healthcare_provider`,
    /// `healthcare_patient`, `adult_general`, `default`)
    pub ids: BTreeMap<String, String>,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_GUARDRAIL_VERSION.to_string(),
            ids: BTreeMap::new(),
        }
    }
}

impl GuardrailsConfig {
    /// Build the catalog, reading identifiers from the process environment first.
    pub fn catalog(&self) -> Result<GuardrailCatalog, CatalogError> {
        self.catalog_with_env(|name| std::env::var(name).ok())
    }

    /// Build the catalog with an explicit environment lookup.
    pub fn catalog_with_env<F>(&self, env: F) -> Result<GuardrailCatalog, CatalogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let catalog = GuardrailCatalog::from_lookup(|key: GuardrailKey| {
            env(key.env_var())
                .filter(|value| !value.trim().is_empty())
                .or_else(|| self.ids.get(key.config_key()).cloned())
        })?;
        Ok(catalog.with_version(self.version.clone()))
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an explicit environment lookup.
    pub fn apply_overrides_from<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        if let Some(model) = lookup(MODEL_ID_ENV) {
            self.inference.model = model.trim().to_string();
        }

        if let Some(raw) = lookup(MAX_QUERY_CHARS_ENV) {
            self.limits.max_query_chars =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        field: "limits.max_query_chars",
                        reason: format!("{} ({}={})", e, MAX_QUERY_CHARS_ENV, raw),
                    })?;
        }

        if let Some(version) = lookup(GUARDRAIL_VERSION_ENV) {
            self.guardrails.version = version.trim().to_string();
        }

        self.validate()
    }

    /// Check values that would make the service unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_query_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_query_chars",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.limits.max_user_id_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_user_id_chars",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.history.lookback_turns > self.history.max_turns_per_conversation {
            return Err(ConfigError::InvalidValue {
                field: "history.lookback_turns",
                reason: format!(
                    "cannot exceed history.max_turns_per_conversation ({})",
                    self.history.max_turns_per_conversation
                ),
            });
        }

        // Providers receive the timeout in whole seconds.
        if self.inference.timeout < Duration::from_secs(1) {
            return Err(ConfigError::InvalidValue {
                field: "inference.timeout",
                reason: "must be at least 1s".to_string(),
            });
        }
        if self.inference.timeout.subsec_nanos() != 0 {
            return Err(ConfigError::InvalidValue {
                field: "inference.timeout",
                reason: "must be a whole number of seconds".to_string(),
            });
        }

        if self.guardrails.version.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "guardrails.version",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Serde adapter for durations written like `30s` or `24h`.
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}
