//! Property tests for the full `ask` pipeline: any store record with a
//! user id yields a response under a configured guardrail, classified the
//! same way the core classifier would, with exactly one audit record.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

use warden_core::classifier::resolve_age_group;
use warden_core::guardrails::Segment;
use warden_core::{AgeGroup, GuardrailCatalog, GuardrailId, PolicyEngine};
use warden_runtime::providers::CannedProvider;
use warden_runtime::{
    AskRequest, Caller, InteractionOutcome, MemoryAuditSink, MemoryProfileStore, QueryService,
};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Birth dates as a store might hold them, including unusable ones.
fn arb_birth_date() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        (1930i32..2025, 1u32..13, 1u32..29)
            .prop_map(|(y, m, d)| Some(json!(format!("{y:04}-{m:02}-{d:02}")))),
        "[a-z0-9/ -]{0,12}".prop_map(|s| Some(json!(s))),
        (19_000_000i64..21_000_000).prop_map(|n| Some(json!(n))),
        Just(Some(Value::Null)),
        Just(None),
    ]
}

fn arb_free_text() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(Some(json!("student"))),
        Just(Some(json!("teacher"))),
        Just(Some(json!("provider"))),
        Just(Some(json!("patient"))),
        Just(Some(json!("education"))),
        Just(Some(json!("healthcare"))),
        ".{0,16}".prop_map(|s| Some(json!(s))),
        any::<i32>().prop_map(|n| Some(json!(n))),
        Just(None),
    ]
}

fn arb_query() -> impl Strategy<Value = String> {
    "[a-zA-Z?]{1,12}( [a-zA-Z0-9?.,]{1,10}){0,8}"
}

/// A catalog with a random subset of segments configured, plus the ids used.
fn arb_catalog() -> impl Strategy<Value = (GuardrailCatalog, BTreeSet<String>)> {
    prop::collection::vec(any::<bool>(), Segment::ALL.len()).prop_map(|present| {
        let mut ids = BTreeSet::from(["gr-default".to_string()]);
        let mut catalog = GuardrailCatalog::new(GuardrailId::new("gr-default").unwrap());
        for (segment, on) in Segment::ALL.iter().zip(present) {
            if on {
                let id = format!("gr-{}", segment.config_key());
                ids.insert(id.clone());
                catalog = catalog.with_segment(*segment, GuardrailId::new(id).unwrap());
            }
        }
        (catalog, ids)
    })
}

fn record(
    birth_date: Option<Value>,
    role: Option<Value>,
    industry: Option<Value>,
) -> Value {
    let mut record = json!({ "user_id": "u1" });
    for (key, value) in [("birth_date", birth_date), ("role", role), ("industry", industry)] {
        if let Some(value) = value {
            record[key] = value;
        }
    }
    record
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn ask_always_answers_under_a_configured_guardrail(
        birth_date in arb_birth_date(),
        role in arb_free_text(),
        industry in arb_free_text(),
        query in arb_query(),
        configured in arb_catalog(),
    ) {
        let (catalog, ids) = configured;
        let expected_age = match birth_date.as_ref().and_then(Value::as_str) {
            Some(raw) => resolve_age_group(Some(raw), now()).age_group,
            None => AgeGroup::Adult,
        };

        let store = MemoryProfileStore::new();
        store.insert_record("u1", record(birth_date, role, industry));
        let audit = Arc::new(MemoryAuditSink::new());

        let service = QueryService::builder()
            .engine(PolicyEngine::new(catalog))
            .provider(Arc::new(CannedProvider::with_reply("ok")))
            .profiles(Arc::new(store))
            .audit(audit.clone())
            .clock(Arc::new(now))
            .build()
            .unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let reply = runtime
            .block_on(service.ask(&Caller::new("u1"), AskRequest::new(query)))
            .unwrap();

        let guardrail_id = reply.metadata.guardrail_config.guardrail_id.as_str();
        prop_assert!(!guardrail_id.is_empty());
        prop_assert!(ids.contains(guardrail_id), "unexpected guardrail {}", guardrail_id);
        prop_assert!(reply.metadata.guardrail_applied);
        prop_assert_eq!(reply.metadata.age_group, expected_age);

        let records = audit.records();
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(records[0].guardrail_id.as_str(), guardrail_id);
        prop_assert_eq!(records[0].outcome, InteractionOutcome::Completed);
    }
}
