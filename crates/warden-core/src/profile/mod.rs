//! User profile records.
//!
//! Profiles come from an external store as JSON (or YAML fixture files) and
//! are validated against `schema/user_profile.schema.json` before use. The
//! parsed profile is an immutable snapshot for the duration of one request.

mod parser;
mod schema;

pub use parser::{ProfileError, UserProfile, MAX_USER_ID_CHARS};
pub use schema::{is_valid_profile, validate_profile_schema};

use serde::{Deserialize, Deserializer};

/// Accept a grade level written as either a string or a number.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, found {}",
            other
        ))),
    }
}

/// Accept a free-text field, ignoring values that are not strings.
///
/// Store records are not always written by us; a numeric `birth_date` or an
/// object-valued `role` degrades to "absent" so the classifier default applies.
pub(crate) fn lenient_text<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(T::from(s))),
        Some(other) => {
            tracing::warn!(value = %other, "Ignoring non-string profile field");
            Ok(None)
        }
    }
}
