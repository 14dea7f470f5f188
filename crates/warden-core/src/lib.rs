//! # warden-core
//!
//! Deterministic policy engine for audience-aware AI queries.
//!
//! For every request this crate answers two questions:
//! - Which content-safety guardrail MUST wrap the inference call?
//! - Which prompt template shapes tone, length and vocabulary?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same profile, time and query always yield the same plan
//! 2. **No I/O**: classification, selection and composition are pure functions
//! 3. **Never unguarded**: every plan carries a non-empty guardrail identifier
//! 4. **Auditable**: guardrail and prompt choices come from ordered rule tables
//!
//! ## Example
//!
//! ```rust,ignore
//! use warden_core::{GuardrailCatalog, PolicyEngine, UserProfile};
//!
//! let engine = PolicyEngine::new(GuardrailCatalog::from_env()?);
//! let profile = UserProfile::from_yaml_file("student.yaml")?;
//! let plan = engine.plan(&profile, "wat is gravity", &[], chrono::Utc::now());
//!
//! println!("{} -> {}", plan.guardrail.rule_id, plan.guardrail.config.guardrail_id);
//! println!("{}", plan.prompt.render());
//! ```

pub mod classifier;
pub mod context;
pub mod grammar;
pub mod guardrails;
pub mod profile;
pub mod prompts;
pub mod types;

// Re-export main types at crate root
pub use classifier::ContextClassifier;
pub use context::ConversationWindow;
pub use guardrails::{
    CatalogError, Compliance, GuardrailCatalog, GuardrailConfig, GuardrailId, GuardrailSelection,
    GuardrailSelector, ProtectionLevel, Segment,
};
pub use profile::{ProfileError, UserProfile};
pub use prompts::{PromptBranch, PromptComposer, PromptRequest};
pub use types::{
    AgeGroup, ClassifiedContext, ConversationTurn, Device, Industry, ProfileAttributes, Role,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything decided for one request before inference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyPlan {
    /// Query as received
    pub original_query: String,
    /// Query after grammar normalization
    pub normalized_query: String,
    pub context: ClassifiedContext,
    pub guardrail: GuardrailSelection,
    pub prompt: PromptRequest,
}

impl PolicyPlan {
    /// Normalization changed the query.
    pub fn grammar_corrected(&self) -> bool {
        self.original_query != self.normalized_query
    }
}

/// Classifier, guardrail selector and prompt composer wired together.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    classifier: ContextClassifier,
    selector: GuardrailSelector,
    composer: PromptComposer,
}

impl PolicyEngine {
    pub fn new(catalog: GuardrailCatalog) -> Self {
        Self {
            classifier: ContextClassifier::new(),
            selector: GuardrailSelector::new(catalog),
            composer: PromptComposer::new(),
        }
    }

    /// Use a custom conversation lookback window.
    pub fn with_window(mut self, window: ConversationWindow) -> Self {
        self.composer = PromptComposer::with_window(window);
        self
    }

    pub fn catalog(&self) -> &GuardrailCatalog {
        self.selector.catalog()
    }

    pub fn window(&self) -> &ConversationWindow {
        self.composer.window()
    }

    /// Plan a request: normalize, classify, select guardrail, compose prompt.
    pub fn plan(
        &self,
        profile: &UserProfile,
        query: &str,
        history: &[ConversationTurn],
        now: DateTime<Utc>,
    ) -> PolicyPlan {
        self.plan_with_user_agent(profile, query, history, now, None)
    }

    /// Like [`PolicyEngine::plan`], detecting the device from a User-Agent
    /// when the profile has none.
    pub fn plan_with_user_agent(
        &self,
        profile: &UserProfile,
        query: &str,
        history: &[ConversationTurn],
        now: DateTime<Utc>,
        user_agent: Option<&str>,
    ) -> PolicyPlan {
        let normalized_query = grammar::normalize(query);
        let context = self
            .classifier
            .classify_with_user_agent(profile, now, user_agent);
        let guardrail = self.selector.select(&context);
        let prompt = self.composer.compose(&normalized_query, &context, history);

        PolicyPlan {
            original_query: query.to_string(),
            normalized_query,
            context,
            guardrail,
            prompt,
        }
    }
}
