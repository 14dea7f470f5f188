//! Audit recording.
//!
//! One [`InteractionRecord`] is produced per request that reached inference,
//! whatever the outcome. Recording is best-effort: a failing sink is logged
//! and never blocks the response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use warden_core::types::{truncate_chars, STORED_QUERY_MAX_CHARS};
use warden_core::{AgeGroup, PolicyPlan};

/// How an interaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionOutcome {
    /// The model answered
    Completed,
    /// The guardrail intervened and a refusal was returned
    Blocked,
    /// Inference failed and an apology was returned
    Degraded,
}

impl InteractionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionOutcome::Completed => "completed",
            InteractionOutcome::Blocked => "blocked",
            InteractionOutcome::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for InteractionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts recorded about one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,

    /// Query as received, bounded in length
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_query: Option<String>,

    pub response_length: usize,
    pub age_group: AgeGroup,
    pub role: String,
    pub industry: String,
    pub device: String,
    pub guardrail_id: String,
    pub guardrail_version: String,
    pub rule_id: String,
    pub guardrail_fallback: bool,
    pub prompt_branch: String,
    pub outcome: InteractionOutcome,
}

impl InteractionRecord {
    /// Build a record from a request plan and its outcome.
    pub fn from_plan(
        user_id: &str,
        conversation_id: &str,
        plan: &PolicyPlan,
        response: &str,
        outcome: InteractionOutcome,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            interaction_id: format!("{}-{}", user_id, timestamp.timestamp_millis()),
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            timestamp,
            query: truncate_chars(&plan.original_query, STORED_QUERY_MAX_CHARS).to_string(),
            corrected_query: plan
                .grammar_corrected()
                .then(|| truncate_chars(&plan.normalized_query, STORED_QUERY_MAX_CHARS).to_string()),
            response_length: response.chars().count(),
            age_group: plan.context.age_group,
            role: plan.context.role.to_string(),
            industry: plan.context.industry.to_string(),
            device: plan.context.device.to_string(),
            guardrail_id: plan.guardrail.config.guardrail_id.to_string(),
            guardrail_version: plan.guardrail.config.guardrail_version.clone(),
            rule_id: plan.guardrail.rule_id.to_string(),
            guardrail_fallback: plan.guardrail.fallback,
            prompt_branch: plan.prompt.branch.to_string(),
            outcome,
        }
    }
}

/// Destination for interaction records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &InteractionRecord) -> Result<(), StoreError>;
}

/// Writes each record as a structured `tracing` event on target `warden::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &InteractionRecord) -> Result<(), StoreError> {
        tracing::info!(
            target: "warden::audit",
            interaction_id = %record.interaction_id,
            user_id = %record.user_id,
            conversation_id = %record.conversation_id,
            age_group = %record.age_group,
            role = %record.role,
            industry = %record.industry,
            guardrail_id = %record.guardrail_id,
            guardrail_version = %record.guardrail_version,
            rule = %record.rule_id,
            guardrail_fallback = record.guardrail_fallback,
            outcome = %record.outcome,
            response_length = record.response_length,
            "Interaction recorded"
        );
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<InteractionRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<InteractionRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &InteractionRecord) -> Result<(), StoreError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use warden_core::{GuardrailCatalog, GuardrailId, PolicyEngine, UserProfile};

    fn plan(query: &str) -> PolicyPlan {
        let engine = PolicyEngine::new(GuardrailCatalog::new(GuardrailId::new("gr-default").unwrap()));
        let profile = UserProfile::new("patient-789")
            .with_role("patient")
            .with_industry("healthcare");
        engine.plan(&profile, query, &[], Utc::now())
    }

    #[test]
    fn test_record_from_plan() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let record = InteractionRecord::from_plan(
            "patient-789",
            "patient-789-1740823200",
            &plan("whats a normal blood pressure"),
            "Around 120/80.",
            InteractionOutcome::Completed,
            at,
        );

        assert_eq!(record.interaction_id, format!("patient-789-{}", at.timestamp_millis()));
        assert_eq!(record.corrected_query.as_deref(), Some("What is a normal blood pressure?"));
        assert_eq!(record.rule_id, "G4");
        assert!(record.guardrail_fallback);
        assert_eq!(record.guardrail_id, "gr-default");
        assert_eq!(record.prompt_branch, "healthcare_patient");
        assert_eq!(record.response_length, 14);
    }

    #[test]
    fn test_long_query_truncated() {
        let long = "a".repeat(STORED_QUERY_MAX_CHARS + 10);
        let record = InteractionRecord::from_plan(
            "u",
            "c",
            &plan(&long),
            "",
            InteractionOutcome::Degraded,
            Utc::now(),
        );
        assert_eq!(record.query.chars().count(), STORED_QUERY_MAX_CHARS);
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemoryAuditSink::new();
        let record = InteractionRecord::from_plan(
            "u",
            "c",
            &plan("hello"),
            "hi",
            InteractionOutcome::Blocked,
            Utc::now(),
        );

        sink.record(&record).await.unwrap();
        TracingAuditSink::new().record(&record).await.unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0].outcome, InteractionOutcome::Blocked);
    }
}
