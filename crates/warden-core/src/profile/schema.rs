//! Structural checks for profile records.
//!
//! Store items are checked against `schema/user_profile.schema.json` before
//! they are deserialized. Only `user_id` and the typed attribute fields are
//! constrained; free-text fields are handled leniently by the parser.

use std::sync::OnceLock;

use serde_json::Value;
use thiserror::Error;

const PROFILE_SCHEMA: &str = include_str!("../../../../schema/user_profile.schema.json");

static VALIDATOR: OnceLock<jsonschema::Validator> = OnceLock::new();

#[derive(Error, Debug)]
enum SchemaError {
    #[error("profile schema is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("profile schema does not compile: {0}")]
    Compile(String),
}

fn compile() -> Result<jsonschema::Validator, SchemaError> {
    let schema: Value = serde_json::from_str(PROFILE_SCHEMA)?;
    jsonschema::options()
        .build(&schema)
        .map_err(|e| SchemaError::Compile(e.to_string()))
}

/// The compiled validator. A compile failure is reported on every call
/// rather than cached.
fn validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    if let Some(validator) = VALIDATOR.get() {
        return Ok(validator);
    }
    let compiled = compile()?;
    Ok(VALIDATOR.get_or_init(|| compiled))
}

/// Check a store record, returning one message per violation.
///
/// Each message names the offending location, e.g. `... at /user_id`.
pub fn validate_profile_schema(record: &Value) -> Result<(), Vec<String>> {
    let validator = validator().map_err(|e| vec![e.to_string()])?;

    let violations: Vec<String> = validator
        .iter_errors(record)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

pub fn is_valid_profile(record: &Value) -> bool {
    match validator() {
        Ok(validator) => validator.is_valid(record),
        Err(e) => {
            tracing::error!(error = %e, "Profile schema unavailable");
            false
        }
    }
}
