//! Guardrail identifiers per audience segment.
//!
//! Identifiers are injected from the environment (or a config file through
//! [`GuardrailCatalog::from_lookup`]). A catalog cannot be built without a
//! default identifier, so every selection can always fall back to one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Guardrail version used when none is configured.
pub const DEFAULT_GUARDRAIL_VERSION: &str = "1";

/// Environment variable naming the guardrail version.
pub const GUARDRAIL_VERSION_ENV: &str = "GUARDRAIL_VERSION";

/// Errors from building a guardrail catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error(
        "No default guardrail identifier: set {} (or {})",
        GuardrailKey::Default.env_var(),
        Segment::AdultGeneral.env_var()
    )]
    MissingDefault,

    #[error("Guardrail identifier must not be empty")]
    EmptyIdentifier,
}

/// A non-empty guardrail identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GuardrailId(String);

impl GuardrailId {
    /// Returns `None` for blank input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GuardrailId {
    type Error = CatalogError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(CatalogError::EmptyIdentifier)
    }
}

impl From<GuardrailId> for String {
    fn from(id: GuardrailId) -> Self {
        id.0
    }
}

impl fmt::Display for GuardrailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Audience segments with their own guardrail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    Child,
    Teen,
    HealthcareProvider,
    HealthcarePatient,
    AdultGeneral,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::Child,
        Segment::Teen,
        Segment::HealthcareProvider,
        Segment::HealthcarePatient,
        Segment::AdultGeneral,
    ];

    /// Key used in config files.
    pub fn config_key(&self) -> &'static str {
        match self {
            Segment::Child => "child",
            Segment::Teen => "teen",
            Segment::HealthcareProvider => "healthcare_provider",
            Segment::HealthcarePatient => "healthcare_patient",
            Segment::AdultGeneral => "adult_general",
        }
    }

    /// Environment variable holding this segment's identifier.
    pub fn env_var(&self) -> &'static str {
        match self {
            Segment::Child => "CHILD_GUARDRAIL_ID",
            Segment::Teen => "TEEN_GUARDRAIL_ID",
            Segment::HealthcareProvider => "HEALTHCARE_PROFESSIONAL_GUARDRAIL_ID",
            Segment::HealthcarePatient => "HEALTHCARE_PATIENT_GUARDRAIL_ID",
            Segment::AdultGeneral => "ADULT_GENERAL_GUARDRAIL_ID",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// A configurable identifier slot: one per segment plus the system default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardrailKey {
    Segment(Segment),
    Default,
}

impl GuardrailKey {
    pub fn env_var(&self) -> &'static str {
        match self {
            GuardrailKey::Segment(segment) => segment.env_var(),
            GuardrailKey::Default => "DEFAULT_GUARDRAIL_ID",
        }
    }

    pub fn config_key(&self) -> &'static str {
        match self {
            GuardrailKey::Segment(segment) => segment.config_key(),
            GuardrailKey::Default => "default",
        }
    }
}

/// Resolved guardrail identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailCatalog {
    version: String,
    segments: BTreeMap<Segment, GuardrailId>,
    default: GuardrailId,
}

impl GuardrailCatalog {
    /// Create a catalog with only a default identifier.
    pub fn new(default: GuardrailId) -> Self {
        Self {
            version: DEFAULT_GUARDRAIL_VERSION.to_string(),
            segments: BTreeMap::new(),
            default,
        }
    }

    /// Set the identifier for a segment.
    pub fn with_segment(mut self, segment: Segment, id: GuardrailId) -> Self {
        self.segments.insert(segment, id);
        self
    }

    /// Set the guardrail version. Blank versions are ignored.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if !version.trim().is_empty() {
            self.version = version.trim().to_string();
        }
        self
    }

    /// Build a catalog by asking `lookup` for each key.
    ///
    /// When no default is configured, the adult-general identifier stands in
    /// for it. Fails only when neither is available.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CatalogError>
    where
        F: Fn(GuardrailKey) -> Option<String>,
    {
        let resolve = |key: GuardrailKey| lookup(key).and_then(GuardrailId::new);

        let segments: BTreeMap<Segment, GuardrailId> = Segment::ALL
            .iter()
            .filter_map(|segment| {
                resolve(GuardrailKey::Segment(*segment)).map(|id| (*segment, id))
            })
            .collect();

        let default = match resolve(GuardrailKey::Default) {
            Some(id) => id,
            None => {
                let id = segments
                    .get(&Segment::AdultGeneral)
                    .cloned()
                    .ok_or(CatalogError::MissingDefault)?;
                tracing::warn!(
                    env_var = GuardrailKey::Default.env_var(),
                    fallback = %id,
                    "No default guardrail configured, using the adult-general guardrail"
                );
                id
            }
        };

        Ok(Self {
            version: DEFAULT_GUARDRAIL_VERSION.to_string(),
            segments,
            default,
        })
    }

    /// Build a catalog from environment variables.
    pub fn from_env() -> Result<Self, CatalogError> {
        let catalog = Self::from_lookup(|key| std::env::var(key.env_var()).ok())?;
        Ok(match std::env::var(GUARDRAIL_VERSION_ENV) {
            Ok(version) => catalog.with_version(version),
            Err(_) => catalog,
        })
    }

    /// Identifier configured for a segment, if any.
    pub fn resolve(&self, segment: Segment) -> Option<&GuardrailId> {
        self.segments.get(&segment)
    }

    /// The system-wide default identifier.
    pub fn default_id(&self) -> &GuardrailId {
        &self.default
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Segments that will fall back to the default identifier.
    pub fn missing_segments(&self) -> Vec<Segment> {
        Segment::ALL
            .iter()
            .filter(|segment| !self.segments.contains_key(segment))
            .copied()
            .collect()
    }
}
