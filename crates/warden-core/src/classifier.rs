//! Context Classifier
//!
//! Derives the audience context (age bucket, role, industry, device) from a
//! profile snapshot and the current time.
//!
//! ## Age buckets
//!
//! `age_years = floor((now - birth_date) / 365 days)`, bucketed half-open:
//!
//! | Bucket | Years |
//! |--------|-------|
//! | child  | `[0, 13)` |
//! | teen   | `[13, 18)` |
//! | adult  | `[18, 65)` |
//! | senior | `[65, ∞)` |
//!
//! A missing, unparsable or future birth date classifies as `adult` and is
//! logged as a warning. Classification never fails.

use chrono::{DateTime, NaiveDate, Utc};

use crate::profile::UserProfile;
use crate::types::{AgeGroup, ClassifiedContext, Device};

/// Length of a year for age computation.
pub const DAYS_PER_YEAR: i64 = 365;

/// Bucket used when the birth date cannot be used.
pub const FALLBACK_AGE_GROUP: AgeGroup = AgeGroup::Adult;

/// Outcome of resolving an age bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeResolution {
    pub age_group: AgeGroup,
    /// Whole years, when the birth date was usable
    pub age_years: Option<i64>,
    pub defaulted: bool,
}

impl AgeResolution {
    fn fallback() -> Self {
        Self {
            age_group: FALLBACK_AGE_GROUP,
            age_years: None,
            defaulted: true,
        }
    }
}

/// Parse a stored birth date. Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).date_naive())
        })
}

/// Whole years between `birth` and `today`, using 365-day years.
pub fn age_in_years(birth: NaiveDate, today: NaiveDate) -> i64 {
    (today - birth).num_days().div_euclid(DAYS_PER_YEAR)
}

/// Resolve the age bucket for an optional raw birth date.
pub fn resolve_age_group(birth_date: Option<&str>, now: DateTime<Utc>) -> AgeResolution {
    let Some(raw) = birth_date else {
        return AgeResolution::fallback();
    };

    let Some(birth) = parse_birth_date(raw) else {
        tracing::warn!(birth_date = raw, "Unparsable birth date, classifying as adult");
        return AgeResolution::fallback();
    };

    let today = now.date_naive();
    if birth > today {
        tracing::warn!(birth_date = raw, "Birth date is in the future, classifying as adult");
        return AgeResolution::fallback();
    }

    let years = age_in_years(birth, today);
    AgeResolution {
        age_group: AgeGroup::from_age_years(years),
        age_years: Some(years),
        defaulted: false,
    }
}

/// The Context Classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextClassifier;

impl ContextClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a profile at time `now`.
    pub fn classify(&self, profile: &UserProfile, now: DateTime<Utc>) -> ClassifiedContext {
        self.classify_with_user_agent(profile, now, None)
    }

    /// Classify a profile, detecting the device from a User-Agent header when
    /// the profile does not name one.
    pub fn classify_with_user_agent(
        &self,
        profile: &UserProfile,
        now: DateTime<Utc>,
        user_agent: Option<&str>,
    ) -> ClassifiedContext {
        let age = resolve_age_group(profile.birth_date.as_deref(), now);
        if age.defaulted && profile.birth_date.is_none() {
            tracing::debug!(user_id = %profile.user_id, "No birth date on profile, classifying as adult");
        }

        let device = match (&profile.device, user_agent) {
            (Some(device), _) => device.clone(),
            (None, Some(ua)) => Device::from_user_agent(ua),
            (None, None) => Device::default(),
        };

        let context = ClassifiedContext {
            age_group: age.age_group,
            age_defaulted: age.defaulted,
            role: profile.role_or_default(),
            industry: profile.industry_or_default(),
            device,
            attributes: profile.attributes.clone(),
        };

        tracing::debug!(
            user_id = %profile.user_id,
            age_group = %context.age_group,
            role = %context.role,
            industry = %context.industry,
            device = %context.device,
            "Classified request context"
        );

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Industry, Role};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn born_days_ago(days: i64) -> String {
        (now().date_naive() - Duration::days(days))
            .format("%Y-%m-%d")
            .to_string()
    }

    #[test]
    fn test_boundary_ages() {
        let cases = [
            (12, AgeGroup::Child),
            (13, AgeGroup::Teen),
            (17, AgeGroup::Teen),
            (18, AgeGroup::Adult),
            (64, AgeGroup::Adult),
            (65, AgeGroup::Senior),
        ];

        for (years, expected) in cases {
            let exact = born_days_ago(years * DAYS_PER_YEAR);
            let resolution = resolve_age_group(Some(&exact), now());
            assert_eq!(resolution.age_group, expected, "age {}", years);
            assert_eq!(resolution.age_years, Some(years));
        }
    }

    #[test]
    fn test_one_day_short_of_boundary_stays_below() {
        let almost_teen = born_days_ago(13 * DAYS_PER_YEAR - 1);
        assert_eq!(
            resolve_age_group(Some(&almost_teen), now()).age_group,
            AgeGroup::Child
        );

        let almost_senior = born_days_ago(65 * DAYS_PER_YEAR - 1);
        assert_eq!(
            resolve_age_group(Some(&almost_senior), now()).age_group,
            AgeGroup::Adult
        );
    }

    #[test]
    fn test_missing_birth_date_defaults_to_adult() {
        let resolution = resolve_age_group(None, now());
        assert_eq!(resolution.age_group, AgeGroup::Adult);
        assert!(resolution.defaulted);
    }

    #[test]
    fn test_malformed_birth_date_defaults_to_adult() {
        for raw in ["", "not-a-date", "2012/03/14", "14-03-2012", "2012-13-40"] {
            let resolution = resolve_age_group(Some(raw), now());
            assert_eq!(resolution.age_group, AgeGroup::Adult, "input {:?}", raw);
            assert!(resolution.defaulted);
        }
    }

    #[test]
    fn test_future_birth_date_defaults_to_adult() {
        let resolution = resolve_age_group(Some("2030-01-01"), now());
        assert_eq!(resolution.age_group, AgeGroup::Adult);
        assert!(resolution.defaulted);
    }

    #[test]
    fn test_rfc3339_birth_date_accepted() {
        let resolution = resolve_age_group(Some("2015-01-01T00:00:00Z"), now());
        assert_eq!(resolution.age_group, AgeGroup::Child);
        assert!(!resolution.defaulted);
    }

    #[test]
    fn test_classify_applies_defaults() {
        let profile = UserProfile::new("anon");
        let context = ContextClassifier::new().classify(&profile, now());

        assert_eq!(context.age_group, AgeGroup::Adult);
        assert!(context.age_defaulted);
        assert_eq!(context.role, Role::Guest);
        assert_eq!(context.industry, Industry::General);
        assert_eq!(context.device, Device::Desktop);
    }

    #[test]
    fn test_classify_passes_profile_values_through() {
        let profile = UserProfile::new("provider-101")
            .with_birth_date("1981-02-02")
            .with_role("provider")
            .with_industry("healthcare")
            .with_device("tablet");
        let context = ContextClassifier::new().classify(&profile, now());

        assert_eq!(context.age_group, AgeGroup::Adult);
        assert_eq!(context.role, Role::Provider);
        assert_eq!(context.industry, Industry::Healthcare);
        assert_eq!(context.device, Device::Tablet);
    }

    #[test]
    fn test_user_agent_only_used_without_profile_device() {
        let classifier = ContextClassifier::new();
        let ua = Some("Mozilla/5.0 (iPhone) Mobile/15E148");

        let bare = UserProfile::new("u1");
        assert_eq!(
            classifier.classify_with_user_agent(&bare, now(), ua).device,
            Device::Mobile
        );

        let pinned = UserProfile::new("u2").with_device("kiosk");
        assert_eq!(
            classifier.classify_with_user_agent(&pinned, now(), ua).device,
            Device::Kiosk
        );
    }
}
