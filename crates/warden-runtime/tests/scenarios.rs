//! End-to-end pipeline scenarios with in-memory collaborators and a
//! scripted inference fake.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use warden_core::{
    AgeGroup, ConversationTurn, GuardrailCatalog, GuardrailId, PolicyEngine, ProtectionLevel,
    Segment, UserProfile,
};
use warden_runtime::providers::TokenUsage;
use warden_runtime::{
    AskRequest, AuditSink, Caller, HistoryStore, InferenceProvider, InferenceRequest,
    InferenceResponse, InteractionOutcome, InteractionRecord, MemoryAuditSink,
    MemoryHistoryStore, MemoryProfileStore, ProfileStore, ProviderError, QueryService,
    RuntimeConfig, ServiceError, StoreError, APOLOGY_MESSAGE, REFUSAL_MESSAGE,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

enum Script {
    Reply(&'static str),
    Intervene,
    Fail,
    Hang,
}

/// Plays back scripted outcomes and remembers every request it saw.
struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    seen: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<InferenceRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        self.seen.lock().push(request.clone());
        let next = self.script.lock().pop_front().unwrap_or(Script::Reply("ok"));

        match next {
            Script::Reply(text) => Ok(InferenceResponse {
                content: text.to_string(),
                usage: TokenUsage::default(),
                model: "scripted".to_string(),
                stop_reason: Some("end_turn".to_string()),
            }),
            Script::Intervene => Err(ProviderError::GuardrailIntervened {
                guardrail_id: request.guardrail.guardrail_id.to_string(),
            }),
            Script::Fail => Err(ProviderError::ApiError {
                status: 500,
                message: "model exploded".to_string(),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::HttpError("unreachable".to_string()))
            }
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct DownProfiles;

#[async_trait]
impl ProfileStore for DownProfiles {
    async fn get_profile(&self, _user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

struct DownHistory;

#[async_trait]
impl HistoryStore for DownHistory {
    async fn get_recent_turns(
        &self,
        _conversation_id: &str,
        _limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        Err(StoreError::Unavailable("history offline".to_string()))
    }

    async fn append_turn(
        &self,
        _conversation_id: &str,
        _turn: ConversationTurn,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("history offline".to_string()))
    }
}

struct DownAudit;

#[async_trait]
impl AuditSink for DownAudit {
    async fn record(&self, _record: &InteractionRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("audit table missing".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn full_catalog() -> GuardrailCatalog {
    let id = |raw: &str| GuardrailId::new(raw).unwrap();
    GuardrailCatalog::new(id("gr-default"))
        .with_segment(Segment::Child, id("gr-child"))
        .with_segment(Segment::Teen, id("gr-teen"))
        .with_segment(Segment::HealthcareProvider, id("gr-clinical"))
        .with_segment(Segment::HealthcarePatient, id("gr-patient"))
        .with_segment(Segment::AdultGeneral, id("gr-adult"))
}

fn profiles() -> Arc<MemoryProfileStore> {
    let store = MemoryProfileStore::new();
    for profile in [
        UserProfile::new("student-123")
            .with_role("student")
            .with_industry("education")
            .with_birth_date("2010-03-15"),
        UserProfile::new("doctor-1")
            .with_role("provider")
            .with_industry("healthcare")
            .with_birth_date("1978-11-02"),
        UserProfile::new("no-birthday").with_role("employee"),
        UserProfile::new("kid-7")
            .with_role("student")
            .with_birth_date("2017-01-20"),
    ] {
        store.insert(&profile).unwrap();
    }
    Arc::new(store)
}

struct Harness {
    service: QueryService,
    provider: Arc<ScriptedProvider>,
    audit: Arc<MemoryAuditSink>,
    history: Arc<MemoryHistoryStore>,
}

fn harness_with(catalog: GuardrailCatalog, script: Vec<Script>) -> Harness {
    let provider = ScriptedProvider::new(script);
    let audit = Arc::new(MemoryAuditSink::new());
    let history = Arc::new(MemoryHistoryStore::default());

    let service = QueryService::builder()
        .engine(PolicyEngine::new(catalog))
        .provider(provider.clone())
        .profiles(profiles())
        .history(history.clone())
        .audit(audit.clone())
        .clock(Arc::new(now))
        .build()
        .unwrap();

    Harness {
        service,
        provider,
        audit,
        history,
    }
}

fn harness(script: Vec<Script>) -> Harness {
    harness_with(full_catalog(), script)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn teen_student_gets_corrected_query_and_teen_guardrail() {
    let h = harness(vec![Script::Reply("Gravity pulls things together.")]);

    let reply = h
        .service
        .ask(&Caller::new("student-123"), AskRequest::new("wat is gravity"))
        .await
        .unwrap();

    assert_eq!(reply.corrected_query.as_deref(), Some("What is gravity?"));
    assert_eq!(reply.original_query, "wat is gravity");
    assert!(reply.metadata.grammar_corrected);
    assert!(reply.metadata.guardrail_applied);
    assert_eq!(reply.metadata.age_group, AgeGroup::Teen);
    assert_eq!(reply.metadata.guardrail_config.guardrail_id.as_str(), "gr-teen");
    assert_eq!(
        reply.metadata.guardrail_config.protection_level,
        ProtectionLevel::Balanced
    );

    let sent = &h.provider.requests()[0];
    assert_eq!(sent.branch, "teen_student");
    assert_eq!(sent.guardrail.guardrail_id.as_str(), "gr-teen");
    assert!(sent.prompt.contains("What is gravity?"));
}

#[tokio::test]
async fn healthcare_provider_gets_clinical_guardrail() {
    let h = harness(vec![Script::Reply("First-line therapy includes...")]);

    let reply = h
        .service
        .ask(
            &Caller::new("doctor-1"),
            AskRequest::new("explain hypertension treatment"),
        )
        .await
        .unwrap();

    let config = &reply.metadata.guardrail_config;
    assert_eq!(config.guardrail_id.as_str(), "gr-clinical");
    assert_eq!(config.protection_level, ProtectionLevel::Clinical);
    assert_eq!(h.provider.requests()[0].branch, "healthcare_provider");
    assert_eq!(h.audit.records()[0].rule_id, "G3");
}

#[tokio::test]
async fn missing_birth_date_defaults_to_adult_standard() {
    let h = harness(vec![]);

    let reply = h
        .service
        .ask(&Caller::new("no-birthday"), AskRequest::new("How do tides work?"))
        .await
        .unwrap();

    assert_eq!(reply.metadata.age_group, AgeGroup::Adult);
    assert_eq!(
        reply.metadata.guardrail_config.protection_level,
        ProtectionLevel::Standard
    );
    assert_eq!(reply.metadata.guardrail_config.guardrail_id.as_str(), "gr-adult");
    assert!(!reply.metadata.grammar_corrected);
    assert!(reply.corrected_query.is_none());
}

#[tokio::test]
async fn missing_child_guardrail_falls_back_to_default() {
    let catalog = GuardrailCatalog::new(GuardrailId::new("gr-default").unwrap());
    let h = harness_with(catalog, vec![]);

    let reply = h
        .service
        .ask(&Caller::new("kid-7"), AskRequest::new("why is the sky blue"))
        .await
        .unwrap();

    assert_eq!(reply.metadata.age_group, AgeGroup::Child);
    assert_eq!(reply.metadata.guardrail_config.guardrail_id.as_str(), "gr-default");
    assert_eq!(
        reply.metadata.guardrail_config.protection_level,
        ProtectionLevel::Maximum
    );

    let record = &h.audit.records()[0];
    assert_eq!(record.rule_id, "G1");
    assert!(record.guardrail_fallback);
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follow_up_includes_previous_turn() {
    let h = harness(vec![
        Script::Reply("Gravity pulls things together."),
        Script::Reply("Because it has more mass."),
    ]);
    let caller = Caller::new("student-123");

    let first = h
        .service
        .ask(&caller, AskRequest::new("wat is gravity"))
        .await
        .unwrap();
    assert_eq!(
        first.conversation_id,
        format!("student-123-{}", now().timestamp())
    );
    assert_eq!(h.history.turn_count(&first.conversation_id).await, 1);

    h.service
        .ask(
            &caller,
            AskRequest::new("why is it stronger on jupiter").with_conversation(&first.conversation_id),
        )
        .await
        .unwrap();

    let second = &h.provider.requests()[1];
    assert!(second.prompt.starts_with("Previous conversation:\n"));
    assert!(second.prompt.contains("Q: wat is gravity"));
    assert!(second.prompt.contains("A: Gravity pulls things together."));
    assert_eq!(h.history.turn_count(&first.conversation_id).await, 2);
}

#[tokio::test]
async fn first_request_has_no_history_preamble() {
    let h = harness(vec![]);
    h.service
        .ask(&Caller::new("student-123"), AskRequest::new("What is an atom?"))
        .await
        .unwrap();

    assert!(!h.provider.requests()[0].prompt.contains("Previous conversation"));
}

// ---------------------------------------------------------------------------
// Failure paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn guardrail_intervention_returns_refusal_and_skips_history() {
    let h = harness(vec![Script::Intervene]);

    let reply = h
        .service
        .ask(&Caller::new("kid-7"), AskRequest::new("tell me something scary"))
        .await
        .unwrap();

    assert_eq!(reply.response, REFUSAL_MESSAGE);
    assert_eq!(reply.metadata.outcome, InteractionOutcome::Blocked);
    assert_eq!(h.audit.records()[0].outcome, InteractionOutcome::Blocked);
    assert_eq!(h.history.turn_count(&reply.conversation_id).await, 0);
}

#[tokio::test]
async fn inference_failure_degrades_to_apology() {
    let h = harness(vec![Script::Fail]);

    let reply = h
        .service
        .ask(&Caller::new("doctor-1"), AskRequest::new("dosage guidance"))
        .await
        .unwrap();

    assert_eq!(reply.response, APOLOGY_MESSAGE);
    assert_eq!(reply.metadata.outcome, InteractionOutcome::Degraded);

    let record = &h.audit.records()[0];
    assert_eq!(record.guardrail_id, "gr-clinical");
    assert_eq!(record.outcome, InteractionOutcome::Degraded);
}

#[tokio::test(start_paused = true)]
async fn inference_timeout_degrades_to_apology() {
    let h = harness(vec![Script::Hang]);

    let reply = h
        .service
        .ask(&Caller::new("student-123"), AskRequest::new("what is light?"))
        .await
        .unwrap();

    assert_eq!(reply.response, APOLOGY_MESSAGE);
    assert_eq!(reply.metadata.outcome, InteractionOutcome::Degraded);
}

#[tokio::test]
async fn unavailable_profile_store_is_503() {
    let service = QueryService::builder()
        .engine(PolicyEngine::new(full_catalog()))
        .provider(ScriptedProvider::new(vec![]))
        .profiles(Arc::new(DownProfiles))
        .build()
        .unwrap();

    let err = service
        .ask(&Caller::new("student-123"), AskRequest::new("hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Unavailable(_)));
    assert_eq!(err.status_code(), 503);
    assert!(!err.public_message().contains("connection refused"));
}

#[tokio::test]
async fn corrupt_profile_is_internal_error() {
    let store = MemoryProfileStore::new();
    store.insert_record("broken", serde_json::json!({"role": "student"}));

    let service = QueryService::builder()
        .engine(PolicyEngine::new(full_catalog()))
        .provider(ScriptedProvider::new(vec![]))
        .profiles(Arc::new(store))
        .build()
        .unwrap();

    let err = service
        .ask(&Caller::new("broken"), AskRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn non_string_profile_fields_degrade_to_adult_default() {
    let store = MemoryProfileStore::new();
    store.insert_record(
        "u1",
        serde_json::json!({"user_id": "u1", "birth_date": 20120314, "role": 7}),
    );

    let service = QueryService::builder()
        .engine(PolicyEngine::new(full_catalog()))
        .provider(ScriptedProvider::new(vec![Script::Reply("Tides follow the moon.")]))
        .profiles(Arc::new(store))
        .clock(Arc::new(now))
        .build()
        .unwrap();

    let reply = service
        .ask(&Caller::new("u1"), AskRequest::new("How do tides work?"))
        .await
        .unwrap();

    assert_eq!(reply.metadata.age_group, AgeGroup::Adult);
    assert_eq!(reply.metadata.guardrail_config.guardrail_id.as_str(), "gr-adult");
}

#[tokio::test]
async fn history_and_audit_failures_do_not_block_response() {
    let provider = ScriptedProvider::new(vec![Script::Reply("Still answered.")]);
    let service = QueryService::builder()
        .engine(PolicyEngine::new(full_catalog()))
        .provider(provider.clone())
        .profiles(profiles())
        .history(Arc::new(DownHistory))
        .audit(Arc::new(DownAudit))
        .build()
        .unwrap();

    let reply = service
        .ask(
            &Caller::new("student-123"),
            AskRequest::new("what is friction?").with_conversation("conv-9"),
        )
        .await
        .unwrap();

    assert_eq!(reply.response, "Still answered.");
    assert_eq!(reply.conversation_id, "conv-9");
    assert!(!provider.requests()[0].prompt.contains("Previous conversation"));
}

#[tokio::test]
async fn service_built_from_config_uses_config_guardrails() {
    let config = RuntimeConfig::from_yaml(
        r#"
guardrails:
  version: "3"
  ids:
    default: gr-config-default
    teen: gr-config-teen
"#,
    )
    .unwrap();

    let provider = ScriptedProvider::new(vec![]);
    let service = QueryService::builder()
        .config(config)
        .provider(provider.clone())
        .profiles(profiles())
        .build()
        .unwrap();

    service
        .ask(&Caller::new("student-123"), AskRequest::new("what is a cell?"))
        .await
        .unwrap();

    let sent = &provider.requests()[0];
    assert_eq!(sent.guardrail.guardrail_version, "3");
    // Environment may supply a teen id; either way it is never empty.
    assert!(!sent.guardrail.guardrail_id.as_str().is_empty());
}
