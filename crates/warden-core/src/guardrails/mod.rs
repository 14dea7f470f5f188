//! Guardrail selection.
//!
//! Every request gets exactly one guardrail. Context decides which one,
//! never whether one is applied.

mod catalog;
mod selector;

pub use catalog::{
    CatalogError, GuardrailCatalog, GuardrailId, GuardrailKey, Segment,
    DEFAULT_GUARDRAIL_VERSION, GUARDRAIL_VERSION_ENV,
};
pub use selector::{
    matching_rule, Compliance, GuardrailConfig, GuardrailRule, GuardrailSelection,
    GuardrailSelector, ProtectionLevel, GUARDRAIL_RULES,
};
