//! Query service: the request pipeline around the policy engine.
//!
//! One `ask` call runs, in order:
//! 1. validate the request
//! 2. fetch the profile (the only lookup allowed to fail the request)
//! 3. fetch recent turns for a follow-up, degrading to no history
//! 4. plan with [`PolicyEngine`]: normalize, classify, select guardrail, compose prompt
//! 5. invoke inference with the selected guardrail, under a timeout
//! 6. record the interaction, best-effort
//! 7. append the turn when the exchange completed, best-effort
//!
//! Blocked and failed inference never surface as errors: the caller gets a
//! refusal or an apology and the attempted guardrail is still recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use warden_core::{
    AgeGroup, ConversationTurn, GuardrailConfig, PolicyEngine, PolicyPlan,
};

use crate::audit::{AuditSink, InteractionOutcome, InteractionRecord, TracingAuditSink};
use crate::config::{ConfigError, LimitsConfig, RuntimeConfig};
use crate::providers::{InferenceProvider, InferenceRequest, ProviderError};
use crate::store::{HistoryStore, MemoryHistoryStore, ProfileStore, StoreError};

/// Returned when inference fails for any reason other than a guardrail intervention.
pub const APOLOGY_MESSAGE: &str =
    "I apologize, but I'm unable to process your request at this time.";

/// Returned when the guardrail blocks the request or the completion.
pub const REFUSAL_MESSAGE: &str = "I'm sorry, but I can't help with that request. \
     Please try rephrasing your question or ask about a different topic.";

/// Clock used for age computation, timestamps and generated conversation ids.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Errors surfaced to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("Profile store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP-style status for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidInput(_) => 400,
            ServiceError::ProfileNotFound(_) => 404,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Message safe to show the caller. Internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::InvalidInput(reason) => reason.clone(),
            ServiceError::ProfileNotFound(_) => "User profile not found".to_string(),
            ServiceError::Unavailable(_) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            ServiceError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Authenticated caller identity, supplied out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub user_agent: Option<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_agent: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub query: String,

    /// Set for follow-ups; a new id is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl AskRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Parse a JSON body. A malformed body is invalid input.
    pub fn from_json(body: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(body)
            .map_err(|e| ServiceError::InvalidInput(format!("Malformed request body: {}", e)))
    }

    /// Conversation id when one was supplied and is not blank.
    fn follow_up_id(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub response: String,
    pub conversation_id: String,
    pub original_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_query: Option<String>,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub user_id: String,
    pub age_group: AgeGroup,
    pub role: String,
    pub industry: String,
    pub device: String,
    pub guardrail_applied: bool,
    pub guardrail_config: GuardrailConfig,
    pub grammar_corrected: bool,
    pub timestamp: DateTime<Utc>,
    pub outcome: InteractionOutcome,
}

/// Handles `ask` requests against injected collaborators.
pub struct QueryService {
    engine: PolicyEngine,
    provider: Arc<dyn InferenceProvider>,
    profiles: Arc<dyn ProfileStore>,
    history: Arc<dyn HistoryStore>,
    audit: Arc<dyn AuditSink>,
    limits: LimitsConfig,
    inference_timeout: Duration,
    clock: Clock,
}

impl QueryService {
    pub fn builder() -> QueryServiceBuilder {
        QueryServiceBuilder::new()
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Answer one query for `caller`.
    pub async fn ask(
        &self,
        caller: &Caller,
        request: AskRequest,
    ) -> Result<AskResponse, ServiceError> {
        let user_id = self.validate(caller, &request)?;

        let profile = match self.profiles.get_profile(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => return Err(ServiceError::ProfileNotFound(user_id.to_string())),
            Err(StoreError::Unavailable(reason)) => {
                tracing::error!(user_id = %user_id, error = %reason, "Profile lookup failed");
                return Err(ServiceError::Unavailable(reason));
            }
            Err(StoreError::Corrupt(reason)) => {
                tracing::error!(user_id = %user_id, error = %reason, "Profile record is corrupt");
                return Err(ServiceError::Internal(reason));
            }
        };

        let history = match request.follow_up_id() {
            Some(conversation_id) => self.recent_turns(conversation_id).await,
            None => Vec::new(),
        };

        let now = (self.clock)();
        let plan = self.engine.plan_with_user_agent(
            &profile,
            &request.query,
            &history,
            now,
            caller.user_agent.as_deref(),
        );

        tracing::debug!(
            user_id = %user_id,
            age_group = %plan.context.age_group,
            role = %plan.context.role,
            industry = %plan.context.industry,
            rule = plan.guardrail.rule_id,
            guardrail_id = %plan.guardrail.config.guardrail_id,
            branch = %plan.prompt.branch,
            history_turns = history.len(),
            "Request planned"
        );

        let (response, outcome) = self.infer(&plan).await;

        let conversation_id = request
            .follow_up_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}", user_id, now.timestamp()));

        let record = InteractionRecord::from_plan(
            user_id,
            &conversation_id,
            &plan,
            &response,
            outcome,
            now,
        );
        if let Err(e) = self.audit.record(&record).await {
            tracing::warn!(
                interaction_id = %record.interaction_id,
                error = %e,
                "Audit write failed, continuing"
            );
        }

        if outcome == InteractionOutcome::Completed {
            let turn = ConversationTurn::new(&plan.original_query, &response, now);
            if let Err(e) = self.history.append_turn(&conversation_id, turn).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to store conversation turn"
                );
            }
        }

        Ok(Self::respond(user_id, conversation_id, plan, response, outcome, now))
    }

    /// Check request limits, returning the trimmed caller id used for the
    /// rest of the pipeline.
    fn validate<'a>(
        &self,
        caller: &'a Caller,
        request: &AskRequest,
    ) -> Result<&'a str, ServiceError> {
        let user_id = caller.user_id.trim();
        if user_id.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Caller identity is missing".to_string(),
            ));
        }
        if user_id.chars().count() > self.limits.max_user_id_chars {
            return Err(ServiceError::InvalidInput(format!(
                "User id exceeds {} characters",
                self.limits.max_user_id_chars
            )));
        }

        if request.query.trim().is_empty() {
            return Err(ServiceError::InvalidInput("Query is required".to_string()));
        }
        if request.query.chars().count() > self.limits.max_query_chars {
            return Err(ServiceError::InvalidInput(format!(
                "Query exceeds {} characters",
                self.limits.max_query_chars
            )));
        }

        Ok(user_id)
    }

    async fn recent_turns(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        let limit = self.engine.window().max_turns();
        match self.history.get_recent_turns(conversation_id, limit).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "History lookup failed, continuing without context"
                );
                Vec::new()
            }
        }
    }

    /// Invoke inference with the planned guardrail. Never returns an error:
    /// interventions become a refusal, everything else an apology.
    async fn infer(&self, plan: &PolicyPlan) -> (String, InteractionOutcome) {
        let request = InferenceRequest::new(&plan.prompt, plan.guardrail.config.clone());

        let result = match tokio::time::timeout(
            self.inference_timeout,
            self.provider.invoke(&request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.inference_timeout)),
        };

        match result {
            Ok(response) => {
                tracing::debug!(
                    provider = self.provider.name(),
                    model = %response.model,
                    tokens = response.usage.total(),
                    "Inference completed"
                );
                (response.content, InteractionOutcome::Completed)
            }
            Err(e) if e.is_blocked() => {
                tracing::info!(
                    guardrail_id = %plan.guardrail.config.guardrail_id,
                    rule = plan.guardrail.rule_id,
                    "Guardrail intervened"
                );
                (REFUSAL_MESSAGE.to_string(), InteractionOutcome::Blocked)
            }
            Err(e) => {
                tracing::error!(
                    provider = self.provider.name(),
                    guardrail_id = %plan.guardrail.config.guardrail_id,
                    error = %e,
                    "Inference failed"
                );
                (APOLOGY_MESSAGE.to_string(), InteractionOutcome::Degraded)
            }
        }
    }

    fn respond(
        user_id: &str,
        conversation_id: String,
        plan: PolicyPlan,
        response: String,
        outcome: InteractionOutcome,
        timestamp: DateTime<Utc>,
    ) -> AskResponse {
        let grammar_corrected = plan.grammar_corrected();
        AskResponse {
            response,
            conversation_id,
            corrected_query: grammar_corrected.then(|| plan.normalized_query.clone()),
            metadata: ResponseMetadata {
                user_id: user_id.to_string(),
                age_group: plan.context.age_group,
                role: plan.context.role.to_string(),
                industry: plan.context.industry.to_string(),
                device: plan.context.device.to_string(),
                guardrail_applied: true,
                guardrail_config: plan.guardrail.config,
                grammar_corrected,
                timestamp,
                outcome,
            },
            original_query: plan.original_query,
        }
    }
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("provider", &self.provider.name())
            .field("limits", &self.limits)
            .field("inference_timeout", &self.inference_timeout)
            .finish()
    }
}

/// Builder for [`QueryService`].
pub struct QueryServiceBuilder {
    engine: Option<PolicyEngine>,
    provider: Option<Arc<dyn InferenceProvider>>,
    profiles: Option<Arc<dyn ProfileStore>>,
    history: Option<Arc<dyn HistoryStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    config: RuntimeConfig,
    clock: Option<Clock>,
}

impl QueryServiceBuilder {
    pub fn new() -> Self {
        Self {
            engine: None,
            provider: None,
            profiles: None,
            history: None,
            audit: None,
            config: RuntimeConfig::default(),
            clock: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a prebuilt engine instead of building one from the config's guardrails.
    pub fn engine(mut self, engine: PolicyEngine) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn InferenceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the service.
    ///
    /// Fails when no provider or profile store is set, or when the guardrail
    /// catalog has no default identifier. History defaults to an in-memory
    /// store and audit to the tracing sink.
    pub fn build(self) -> Result<QueryService, ConfigError> {
        let provider = self.provider.ok_or(ConfigError::Missing("inference provider"))?;
        let profiles = self.profiles.ok_or(ConfigError::Missing("profile store"))?;

        let window = self.config.history.window();
        let engine = match self.engine {
            Some(engine) => engine,
            None => PolicyEngine::new(self.config.guardrails.catalog()?).with_window(window),
        };

        let history = self.history.unwrap_or_else(|| {
            Arc::new(MemoryHistoryStore::new(
                self.config.history.max_conversations,
                self.config.history.max_turns_per_conversation,
                self.config.history.ttl,
            ))
        });

        Ok(QueryService {
            engine,
            provider,
            profiles,
            history,
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink::new())),
            limits: self.config.limits,
            inference_timeout: self.config.inference.timeout,
            clock: self.clock.unwrap_or_else(|| Arc::new(Utc::now)),
        })
    }
}

impl Default for QueryServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::CannedProvider;
    use crate::store::MemoryProfileStore;
    use warden_core::{GuardrailCatalog, GuardrailId, UserProfile};

    fn service() -> QueryService {
        let profiles = MemoryProfileStore::new()
            .with_profile(&UserProfile::new("user-1"))
            .unwrap();
        QueryService::builder()
            .engine(PolicyEngine::new(GuardrailCatalog::new(
                GuardrailId::new("gr-default").unwrap(),
            )))
            .provider(Arc::new(CannedProvider::with_reply("ok")))
            .profiles(Arc::new(profiles))
            .build()
            .unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(ServiceError::ProfileNotFound("x".into()).status_code(), 404);
        assert_eq!(ServiceError::Unavailable("x".into()).status_code(), 503);
        assert_eq!(ServiceError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = ServiceError::Internal("dynamodb table users-prod missing".into());
        assert!(!err.public_message().contains("dynamodb"));
        let err = ServiceError::Unavailable("connection refused 10.0.0.4".into());
        assert!(!err.public_message().contains("10.0.0.4"));
    }

    #[test]
    fn test_malformed_body_is_invalid_input() {
        let err = AskRequest::from_json("{\"question\": 1}").unwrap_err();
        assert_eq!(err.status_code(), 400);

        let ok = AskRequest::from_json(r#"{"query": "hi", "conversation_id": "c-1"}"#).unwrap();
        assert_eq!(ok.follow_up_id(), Some("c-1"));
    }

    #[test]
    fn test_blank_conversation_id_treated_as_absent() {
        assert_eq!(AskRequest::new("hi").with_conversation("  ").follow_up_id(), None);
    }

    #[test]
    fn test_builder_requires_provider() {
        let result = QueryService::builder()
            .profiles(Arc::new(MemoryProfileStore::new()))
            .build();
        assert!(matches!(result, Err(ConfigError::Missing("inference provider"))));
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized_queries() {
        let service = service();
        let caller = Caller::new("user-1");

        let empty = service.ask(&caller, AskRequest::new("   ")).await;
        assert!(matches!(empty, Err(ServiceError::InvalidInput(_))));

        let long = service.ask(&caller, AskRequest::new("a".repeat(1001))).await;
        assert!(matches!(long, Err(ServiceError::InvalidInput(_))));

        let exact = service.ask(&caller, AskRequest::new("a".repeat(1000))).await;
        assert!(exact.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_missing_caller() {
        let result = service().ask(&Caller::new(""), AskRequest::new("hi")).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_rejects_oversized_user_id() {
        let result = service()
            .ask(&Caller::new("u".repeat(101)), AskRequest::new("hi"))
            .await;
        let err = result.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_padded_user_id_is_trimmed_everywhere() {
        let reply = service()
            .ask(&Caller::new("  user-1 \n"), AskRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(reply.metadata.user_id, "user-1");
        assert!(reply.conversation_id.starts_with("user-1-"));
    }

    #[tokio::test]
    async fn test_unknown_user_not_found() {
        let result = service()
            .ask(&Caller::new("nobody"), AskRequest::new("hi"))
            .await;
        assert_eq!(result.unwrap_err().status_code(), 404);
    }
}
