use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EligibilityConfig;
use crate::errors::RepositoryError;
use crate::profile::{CreditProfile, User};
use crate::repository::UserRepository;

/// why a proposed guarantor was refused; checks run in this order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuarantorRejection {
    MissingFields,
    SelfReference,
    NotFound,
    Unverified,
    NoNationalId,
    NationalIdMismatch,
    ScoreTooLow { score: u32, required: u32 },
}

impl fmt::Display for GuarantorRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuarantorRejection::MissingFields => {
                f.write_str("guarantor username and national ID are required")
            }
            GuarantorRejection::SelfReference => f.write_str("you cannot be your own guarantor"),
            GuarantorRejection::NotFound => f.write_str("guarantor not found"),
            GuarantorRejection::Unverified => f.write_str("guarantor account is not verified"),
            GuarantorRejection::NoNationalId => {
                f.write_str("guarantor has no national ID on file")
            }
            GuarantorRejection::NationalIdMismatch => {
                f.write_str("guarantor national ID does not match")
            }
            GuarantorRejection::ScoreTooLow { score, required } => write!(
                f,
                "guarantor credit score {} is below the required {}",
                score, required
            ),
        }
    }
}

/// result of checking a proposed guarantor
#[derive(Debug, Clone, PartialEq)]
pub enum GuarantorValidation {
    Valid { guarantor: User },
    Invalid { reason: GuarantorRejection },
}

impl GuarantorValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, GuarantorValidation::Valid { .. })
    }

    pub fn rejection(&self) -> Option<&GuarantorRejection> {
        match self {
            GuarantorValidation::Valid { .. } => None,
            GuarantorValidation::Invalid { reason } => Some(reason),
        }
    }
}

fn invalid(reason: GuarantorRejection) -> Result<GuarantorValidation, RepositoryError> {
    Ok(GuarantorValidation::Invalid { reason })
}

/// check a guarantor; the first failing check is reported
pub fn validate_guarantor(
    applicant: &CreditProfile,
    username: &str,
    national_id: &str,
    users: &dyn UserRepository,
    config: &EligibilityConfig,
) -> Result<GuarantorValidation, RepositoryError> {
    let username = username.trim();
    let national_id = national_id.trim();

    if username.is_empty() || national_id.is_empty() {
        return invalid(GuarantorRejection::MissingFields);
    }

    let same_user = username.eq_ignore_ascii_case(applicant.username.trim());
    let same_id = applicant
        .national_id
        .as_deref()
        .is_some_and(|own| own.trim() == national_id);
    if same_user || same_id {
        return invalid(GuarantorRejection::SelfReference);
    }

    let guarantor = match users.find_by_username(username)? {
        Some(user) if user.id != applicant.user_id => user,
        Some(_) => return invalid(GuarantorRejection::SelfReference),
        None => return invalid(GuarantorRejection::NotFound),
    };

    if !guarantor.is_verified {
        return invalid(GuarantorRejection::Unverified);
    }

    let on_file = match guarantor.national_id() {
        Some(id) => id.trim(),
        None => return invalid(GuarantorRejection::NoNationalId),
    };
    if on_file != national_id {
        return invalid(GuarantorRejection::NationalIdMismatch);
    }

    let score = guarantor.standing.internal_credit_score;
    if score < config.min_guarantor_score {
        return invalid(GuarantorRejection::ScoreTooLow {
            score,
            required: config.min_guarantor_score,
        });
    }

    debug!(applicant = %applicant.username, guarantor = %guarantor.username, "guarantor accepted");
    Ok(GuarantorValidation::Valid { guarantor })
}

/// the guarantor stored on the profile passes validation
pub fn has_valid_guarantor(
    profile: &CreditProfile,
    users: &dyn UserRepository,
    config: &EligibilityConfig,
) -> Result<bool, RepositoryError> {
    match &profile.guarantor {
        Some(reference) => {
            let validation =
                validate_guarantor(profile, &reference.username, &reference.national_id, users, config)?;
            Ok(validation.is_valid())
        }
        None => Ok(false),
    }
}

/// a basic eligibility requirement the profile misses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EligibilityGap {
    NotVerified,
    IncompleteProfile { percent: u32, required: u32 },
    ScoreTooLow { score: u32, required: u32 },
}

impl fmt::Display for EligibilityGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EligibilityGap::NotVerified => f.write_str("account is not verified"),
            EligibilityGap::IncompleteProfile { percent, required } => write!(
                f,
                "profile is {}% complete, {}% required",
                percent, required
            ),
            EligibilityGap::ScoreTooLow { score, required } => {
                write!(f, "credit score {} is below the required {}", score, required)
            }
        }
    }
}

/// every basic requirement the profile misses, guarantor aside
pub fn eligibility_gaps(profile: &CreditProfile, config: &EligibilityConfig) -> Vec<EligibilityGap> {
    let mut gaps = Vec::new();

    if !profile.is_verified {
        gaps.push(EligibilityGap::NotVerified);
    }
    if profile.profile_completeness < config.min_profile_completeness {
        gaps.push(EligibilityGap::IncompleteProfile {
            percent: whole_percent(profile.profile_completeness.as_percentage()),
            required: whole_percent(config.min_profile_completeness.as_percentage()),
        });
    }
    if profile.internal_credit_score < config.min_credit_score {
        gaps.push(EligibilityGap::ScoreTooLow {
            score: profile.internal_credit_score,
            required: config.min_credit_score,
        });
    }

    gaps
}

fn whole_percent(value: Decimal) -> u32 {
    value.floor().to_u32().unwrap_or(0)
}

/// verified, complete enough, scored enough, and backed by a valid guarantor
pub fn is_eligible_for_credit(
    profile: &CreditProfile,
    users: &dyn UserRepository,
    config: &EligibilityConfig,
) -> Result<bool, RepositoryError> {
    if !eligibility_gaps(profile, config).is_empty() {
        return Ok(false);
    }
    has_valid_guarantor(profile, users, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreditConfig;
    use crate::decimal::{Money, Rate};
    use crate::profile::GuarantorRef;
    use crate::repository::InMemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
    }

    fn user(name: &str, national_id: &str, score: u32, verified: bool) -> User {
        let mut user = User::new(name, now(), Money::from_major(500));
        user.details.national_id = Some(national_id.to_string());
        user.standing.internal_credit_score = score;
        user.is_verified = verified;
        user
    }

    fn setup() -> (InMemoryStore, User, EligibilityConfig) {
        let store = InMemoryStore::new();
        let applicant = user("ama", "GHA-100", 300, true);
        store.save_user(applicant.clone()).unwrap();
        store.save_user(user("kwame", "GHA-200", 450, true)).unwrap();
        store.save_user(user("yaw", "GHA-300", 450, false)).unwrap();
        store.save_user(user("esi", "GHA-400", 150, true)).unwrap();
        let mut no_id = user("kojo", "", 500, true);
        no_id.details.national_id = None;
        store.save_user(no_id).unwrap();
        (store, applicant, CreditConfig::standard().eligibility)
    }

    fn reason(
        applicant: &User,
        username: &str,
        national_id: &str,
        store: &InMemoryStore,
        config: &EligibilityConfig,
    ) -> Option<GuarantorRejection> {
        validate_guarantor(&applicant.credit_profile(now()), username, national_id, store, config)
            .unwrap()
            .rejection()
            .cloned()
    }

    #[test]
    fn test_guarantor_checks_in_order() {
        let (store, applicant, config) = setup();

        assert_eq!(reason(&applicant, "", "GHA-200", &store, &config), Some(GuarantorRejection::MissingFields));
        assert_eq!(reason(&applicant, "AMA", "GHA-999", &store, &config), Some(GuarantorRejection::SelfReference));
        assert_eq!(reason(&applicant, "nobody", "GHA-999", &store, &config), Some(GuarantorRejection::NotFound));
        assert_eq!(reason(&applicant, "yaw", "GHA-300", &store, &config), Some(GuarantorRejection::Unverified));
        assert_eq!(reason(&applicant, "kojo", "GHA-500", &store, &config), Some(GuarantorRejection::NoNationalId));
        assert_eq!(reason(&applicant, "kwame", "GHA-201", &store, &config), Some(GuarantorRejection::NationalIdMismatch));
        assert_eq!(
            reason(&applicant, "esi", "GHA-400", &store, &config),
            Some(GuarantorRejection::ScoreTooLow { score: 150, required: 200 })
        );
        assert_eq!(reason(&applicant, "kwame", "GHA-200", &store, &config), None);
    }

    #[test]
    fn test_first_failure_wins() {
        let (store, applicant, config) = setup();
        // unverified and mismatched id: only the earlier check is reported
        assert_eq!(reason(&applicant, "yaw", "WRONG", &store, &config), Some(GuarantorRejection::Unverified));
    }

    #[test]
    fn test_self_guarantee_always_rejected() {
        let (store, _, config) = setup();
        for name in ["ama", "kwame", "yaw", "esi", "kojo"] {
            let applicant = store.find_by_username(name).unwrap().unwrap();
            let own_id = applicant.national_id().unwrap_or_default().to_string();
            let validation = validate_guarantor(
                &applicant.credit_profile(now()),
                &applicant.username,
                &own_id,
                &store,
                &config,
            )
            .unwrap();
            assert!(!validation.is_valid(), "{} guaranteed themselves", name);
        }
    }

    #[test]
    fn test_eligibility_requires_all_conditions() {
        let (store, mut applicant, config) = setup();
        applicant.details.first_name = Some("Ama".into());
        applicant.details.last_name = Some("Owusu".into());
        applicant.details.email = Some("ama@example.com".into());
        applicant.details.phone_number = Some("0241112222".into());
        applicant.details.address = Some("4 Oxford St".into());
        applicant.details.city = Some("Accra".into());
        applicant.details.occupation = Some("Nurse".into());

        let mut profile = applicant.credit_profile(now());
        assert_eq!(profile.profile_completeness, Rate::from_fraction(8, 10));
        assert!(eligibility_gaps(&profile, &config).is_empty());

        // no guarantor on file
        assert!(!is_eligible_for_credit(&profile, &store, &config).unwrap());

        profile.guarantor = Some(GuarantorRef::new("kwame", "GHA-200"));
        assert!(is_eligible_for_credit(&profile, &store, &config).unwrap());

        profile.is_verified = false;
        profile.internal_credit_score = 10;
        let gaps = eligibility_gaps(&profile, &config);
        assert_eq!(gaps.len(), 2);
        assert!(!is_eligible_for_credit(&profile, &store, &config).unwrap());
    }

    #[test]
    fn test_incomplete_profile_gap() {
        let (_, applicant, config) = setup();
        let profile = applicant.credit_profile(now());
        let gaps = eligibility_gaps(&profile, &config);
        assert!(gaps.contains(&EligibilityGap::IncompleteProfile { percent: 10, required: 70 }));
    }
}
