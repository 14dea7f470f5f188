//! Core types shared by the classifier, guardrail selector and prompt composer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum characters of a query kept in a stored conversation turn.
pub const STORED_QUERY_MAX_CHARS: usize = 1000;

/// Maximum characters of a response kept in a stored conversation turn.
pub const STORED_RESPONSE_MAX_CHARS: usize = 2000;

/// Age bucket derived from a birth date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    /// Ages `[0, 13)`
    Child,
    /// Ages `[13, 18)`
    Teen,
    /// Ages `[18, 65)`
    Adult,
    /// Ages `[65, ∞)`
    Senior,
}

impl AgeGroup {
    /// Every bucket, youngest first.
    pub const ALL: [AgeGroup; 4] = [
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::Adult,
        AgeGroup::Senior,
    ];

    /// Bucket for a whole number of years. Boundaries are half-open.
    pub fn from_age_years(years: i64) -> Self {
        match years {
            y if y < 13 => AgeGroup::Child,
            y if y < 18 => AgeGroup::Teen,
            y if y < 65 => AgeGroup::Adult,
            _ => AgeGroup::Senior,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Child => "child",
            AgeGroup::Teen => "teen",
            AgeGroup::Adult => "adult",
            AgeGroup::Senior => "senior",
        }
    }

    /// Child or teen.
    pub fn is_minor(&self) -> bool {
        matches!(self, AgeGroup::Child | AgeGroup::Teen)
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declares a string-backed enum whose unknown values are kept in `Other`.
///
/// Parsing trims and lowercases, so `" Provider "` and `"provider"` are the
/// same role. An empty string parses to the declared default.
macro_rules! open_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A value outside the known vocabulary, kept verbatim (normalized).
            Other(String),
        }

        impl $name {
            /// Parse a raw value, falling back to `Other` for unknown strings.
            pub fn parse(raw: &str) -> Self {
                let normalized = raw.trim().to_ascii_lowercase();
                match normalized.as_str() {
                    "" => $name::$default,
                    $($text => $name::$variant,)+
                    _ => $name::Other(normalized),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Other(value) => value.as_str(),
                }
            }

            /// True for values outside the known vocabulary.
            pub fn is_other(&self) -> bool {
                matches!(self, $name::Other(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                $name::parse(&raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                $name::parse(raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

open_enum! {
    /// Role of the requesting user within their organization.
    Role, default = Guest, {
        Student => "student",
        Teacher => "teacher",
        Patient => "patient",
        Provider => "provider",
        Parent => "parent",
        Administrator => "administrator",
        Guest => "guest",
    }
}

open_enum! {
    /// Industry the deployment serves.
    Industry, default = General, {
        Education => "education",
        Healthcare => "healthcare",
        General => "general",
    }
}

open_enum! {
    /// Device class the request came from.
    Device, default = Desktop, {
        Desktop => "desktop",
        Mobile => "mobile",
        Tablet => "tablet",
        Kiosk => "kiosk",
    }
}

impl Device {
    /// Detect the device class from a User-Agent header.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("mobile") || ua.contains("android") {
            Device::Mobile
        } else if ua.contains("tablet") || ua.contains("ipad") {
            Device::Tablet
        } else if ua.contains("kiosk") {
            Device::Kiosk
        } else {
            Device::Desktop
        }
    }

    /// Small or shared screens that need compact answers.
    pub fn is_compact(&self) -> bool {
        matches!(self, Device::Mobile | Device::Kiosk)
    }
}

/// Optional profile attributes carried through classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAttributes {
    /// School grade, e.g. "8" or "K"
    #[serde(
        default,
        deserialize_with = "crate::profile::string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub grade_level: Option<String>,

    /// Organizational department
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Security clearance level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearance_level: Option<String>,

    /// Whether a parent or guardian has enabled content restrictions
    #[serde(default)]
    pub parental_controls: bool,
}

/// Request-scoped audience context derived from a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedContext {
    pub age_group: AgeGroup,

    /// True when `age_group` is the fail-safe default (birth date missing or unusable)
    #[serde(default)]
    pub age_defaulted: bool,

    pub role: Role,
    pub industry: Industry,
    pub device: Device,

    #[serde(default)]
    pub attributes: ProfileAttributes,
}

impl ClassifiedContext {
    /// Build a context directly, with default device and no attributes.
    pub fn new(age_group: AgeGroup, role: Role, industry: Industry) -> Self {
        Self {
            age_group,
            age_defaulted: false,
            role,
            industry,
            device: Device::default(),
            attributes: ProfileAttributes::default(),
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_attributes(mut self, attributes: ProfileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// True for healthcare deployments.
    pub fn is_healthcare(&self) -> bool {
        self.industry == Industry::Healthcare
    }
}

/// One completed query/response exchange within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn, truncating query and response to their stored bounds.
    pub fn new(query: &str, response: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            query: truncate_chars(query, STORED_QUERY_MAX_CHARS).to_string(),
            response: truncate_chars(response, STORED_RESPONSE_MAX_CHARS).to_string(),
            timestamp,
        }
    }

    /// Both sides of the exchange were persisted.
    pub fn is_complete(&self) -> bool {
        !self.query.trim().is_empty() && !self.response.trim().is_empty()
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_group_boundaries() {
        assert_eq!(AgeGroup::from_age_years(0), AgeGroup::Child);
        assert_eq!(AgeGroup::from_age_years(12), AgeGroup::Child);
        assert_eq!(AgeGroup::from_age_years(13), AgeGroup::Teen);
        assert_eq!(AgeGroup::from_age_years(17), AgeGroup::Teen);
        assert_eq!(AgeGroup::from_age_years(18), AgeGroup::Adult);
        assert_eq!(AgeGroup::from_age_years(64), AgeGroup::Adult);
        assert_eq!(AgeGroup::from_age_years(65), AgeGroup::Senior);
        assert_eq!(AgeGroup::from_age_years(120), AgeGroup::Senior);
    }

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse(" Provider "), Role::Provider);
        assert_eq!(Role::parse("STUDENT"), Role::Student);
        assert_eq!(Role::parse(""), Role::Guest);
        assert_eq!(Role::parse("Astronaut"), Role::Other("astronaut".to_string()));
    }

    #[test]
    fn test_open_enum_serde_round_trips_unknown_values() {
        let industry: Industry = serde_json::from_str("\"Aerospace\"").unwrap();
        assert_eq!(industry, Industry::Other("aerospace".to_string()));
        assert_eq!(serde_json::to_string(&industry).unwrap(), "\"aerospace\"");
    }

    #[test]
    fn test_device_from_user_agent() {
        assert_eq!(
            Device::from_user_agent("Mozilla/5.0 (Linux; Android 14) Mobile"),
            Device::Mobile
        );
        assert_eq!(
            Device::from_user_agent("Mozilla/5.0 (iPad; CPU OS 17_0)"),
            Device::Tablet
        );
        assert_eq!(Device::from_user_agent("LobbyKiosk/2.1"), Device::Kiosk);
        assert_eq!(
            Device::from_user_agent("Mozilla/5.0 (X11; Linux x86_64)"),
            Device::Desktop
        );
    }

    #[test]
    fn test_turn_truncates_stored_fields() {
        let long_response = "x".repeat(STORED_RESPONSE_MAX_CHARS + 50);
        let turn = ConversationTurn::new("q", &long_response, Utc::now());
        assert_eq!(turn.response.chars().count(), STORED_RESPONSE_MAX_CHARS);
        assert!(turn.is_complete());
    }

    #[test]
    fn test_truncate_chars_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
