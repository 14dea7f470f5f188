//! Profile parsing from JSON/YAML.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::schema::validate_profile_schema;
use crate::types::{Device, Industry, ProfileAttributes, Role};

/// Maximum length of a user identifier.
pub const MAX_USER_ID_CHARS: usize = 100;

/// Errors that can occur when parsing profiles.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Failed to read profile file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Profile does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// A user profile snapshot as held by the profile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque user identifier
    pub user_id: String,

    /// Birth date as stored, usually `YYYY-MM-DD`. Parsed by the classifier.
    #[serde(
        default,
        deserialize_with = "super::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub birth_date: Option<String>,

    #[serde(
        default,
        deserialize_with = "super::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<Role>,

    #[serde(
        default,
        deserialize_with = "super::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub industry: Option<Industry>,

    #[serde(
        default,
        deserialize_with = "super::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub device: Option<Device>,

    #[serde(flatten)]
    pub attributes: ProfileAttributes,
}

impl UserProfile {
    /// Create a profile with only an identifier.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            birth_date: None,
            role: None,
            industry: None,
            device: None,
            attributes: ProfileAttributes::default(),
        }
    }

    pub fn with_birth_date(mut self, birth_date: impl Into<String>) -> Self {
        self.birth_date = Some(birth_date.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<Industry>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<Device>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_attributes(mut self, attributes: ProfileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Parse a profile from a JSON value (as returned by a profile store).
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProfileError> {
        validate_profile_schema(&value).map_err(ProfileError::SchemaViolation)?;
        let profile: UserProfile = serde_json::from_value(value)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Parse a profile from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a profile from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ProfileError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a profile from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a profile from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a profile file, picking the format from the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Role with the documented default applied.
    pub fn role_or_default(&self) -> Role {
        self.role.clone().unwrap_or_default()
    }

    /// Industry with the documented default applied.
    pub fn industry_or_default(&self) -> Industry {
        self.industry.clone().unwrap_or_default()
    }

    /// Validate semantic constraints the schema cannot express.
    fn validate(&self) -> Result<(), ProfileError> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(ProfileError::MissingField("user_id".to_string()));
        }

        if user_id.chars().count() > MAX_USER_ID_CHARS {
            return Err(ProfileError::InvalidField {
                field: "user_id".to_string(),
                reason: format!("longer than {} characters", MAX_USER_ID_CHARS),
            });
        }

        Ok(())
    }
}
