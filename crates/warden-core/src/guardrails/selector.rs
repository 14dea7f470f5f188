//! Guardrail Selector
//!
//! Maps a classified context to exactly one guardrail configuration using an
//! ordered rule table evaluated first-match-wins:
//!
//! | Rule | Matches | Segment | Protection |
//! |------|---------|---------|------------|
//! | G1 | age group child | child | maximum, COPPA |
//! | G2 | age group teen | teen | balanced, educational |
//! | G3 | healthcare + provider | healthcare_provider | clinical, HIPAA |
//! | G4 | healthcare + patient | healthcare_patient | medical safety |
//! | G5 | anything | adult_general | standard |
//!
//! Selection never yields an empty identifier. A segment without a
//! configured identifier gets the catalog default and the anomaly is logged.

use serde::{Deserialize, Serialize};

use super::catalog::{GuardrailCatalog, GuardrailId, Segment};
use crate::types::{AgeGroup, ClassifiedContext, Role};

/// How strictly the guardrail filters content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionLevel {
    Maximum,
    Balanced,
    Clinical,
    MedicalSafety,
    Standard,
}

/// Regulation a guardrail is tagged for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compliance {
    #[serde(rename = "COPPA")]
    Coppa,
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "Patient_Safety")]
    PatientSafety,
}

/// The guardrail to apply to one inference call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailConfig {
    pub guardrail_id: GuardrailId,
    pub guardrail_version: String,
    pub protection_level: ProtectionLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<Compliance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// One row of the selection table.
pub struct GuardrailRule {
    /// Stable identifier recorded in audits (e.g. "G1")
    pub id: &'static str,
    pub segment: Segment,
    pub description: &'static str,
    pub protection_level: ProtectionLevel,
    pub compliance: Option<Compliance>,
    pub context: Option<&'static str>,
    predicate: fn(&ClassifiedContext) -> bool,
}

impl GuardrailRule {
    pub fn matches(&self, context: &ClassifiedContext) -> bool {
        (self.predicate)(context)
    }
}

impl std::fmt::Debug for GuardrailRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardrailRule")
            .field("id", &self.id)
            .field("segment", &self.segment)
            .field("description", &self.description)
            .finish()
    }
}

/// Selection table in priority order. The last rule matches everything.
pub static GUARDRAIL_RULES: [GuardrailRule; 5] = [
    GuardrailRule {
        id: "G1",
        segment: Segment::Child,
        description: "Child users get maximum protection",
        protection_level: ProtectionLevel::Maximum,
        compliance: Some(Compliance::Coppa),
        context: None,
        predicate: |ctx| ctx.age_group == AgeGroup::Child,
    },
    GuardrailRule {
        id: "G2",
        segment: Segment::Teen,
        description: "Teen users get balanced educational protection",
        protection_level: ProtectionLevel::Balanced,
        compliance: None,
        context: Some("educational"),
        predicate: |ctx| ctx.age_group == AgeGroup::Teen,
    },
    GuardrailRule {
        id: "G3",
        segment: Segment::HealthcareProvider,
        description: "Healthcare providers get clinical compliance",
        protection_level: ProtectionLevel::Clinical,
        compliance: Some(Compliance::Hipaa),
        context: None,
        predicate: |ctx| ctx.is_healthcare() && ctx.role == Role::Provider,
    },
    GuardrailRule {
        id: "G4",
        segment: Segment::HealthcarePatient,
        description: "Healthcare patients get diagnostic and treatment advice blocked",
        protection_level: ProtectionLevel::MedicalSafety,
        compliance: Some(Compliance::PatientSafety),
        context: None,
        predicate: |ctx| ctx.is_healthcare() && ctx.role == Role::Patient,
    },
    GuardrailRule {
        id: "G5",
        segment: Segment::AdultGeneral,
        description: "Everyone else gets standard protection",
        protection_level: ProtectionLevel::Standard,
        compliance: None,
        context: Some("general"),
        predicate: |_| true,
    },
];

/// First rule that matches `context`.
pub fn matching_rule(context: &ClassifiedContext) -> &'static GuardrailRule {
    let fallback = &GUARDRAIL_RULES[GUARDRAIL_RULES.len() - 1];
    GUARDRAIL_RULES
        .iter()
        .find(|rule| rule.matches(context))
        .unwrap_or(fallback)
}

/// Result of selecting a guardrail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailSelection {
    pub config: GuardrailConfig,
    pub rule_id: &'static str,
    pub segment: Segment,
    /// The segment had no identifier and the default was substituted
    pub fallback: bool,
}

/// The Guardrail Selector.
#[derive(Debug, Clone)]
pub struct GuardrailSelector {
    catalog: GuardrailCatalog,
}

impl GuardrailSelector {
    pub fn new(catalog: GuardrailCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &GuardrailCatalog {
        &self.catalog
    }

    /// Select the guardrail for a context.
    pub fn select(&self, context: &ClassifiedContext) -> GuardrailSelection {
        let rule = matching_rule(context);

        let (guardrail_id, fallback) = match self.catalog.resolve(rule.segment) {
            Some(id) => (id.clone(), false),
            None => {
                let default = self.catalog.default_id().clone();
                tracing::warn!(
                    anomaly = "guardrail_misconfigured",
                    rule = rule.id,
                    segment = %rule.segment,
                    env_var = rule.segment.env_var(),
                    default = %default,
                    "Guardrail identifier missing for segment, applying default guardrail"
                );
                (default, true)
            }
        };

        tracing::debug!(
            rule = rule.id,
            segment = %rule.segment,
            guardrail_id = %guardrail_id,
            "Selected guardrail"
        );

        GuardrailSelection {
            config: GuardrailConfig {
                guardrail_id,
                guardrail_version: self.catalog.version().to_string(),
                protection_level: rule.protection_level,
                compliance: rule.compliance,
                context: rule.context.map(str::to_string),
            },
            rule_id: rule.id,
            segment: rule.segment,
            fallback,
        }
    }
}
