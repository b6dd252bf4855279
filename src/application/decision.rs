use std::sync::Arc;

use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::{ApplicationDraft, CreditApplication};
use crate::billing::monthly_payment;
use crate::config::CreditConfig;
use crate::decimal::Money;
use crate::eligibility::{eligibility_gaps, validate_guarantor, GuarantorValidation};
use crate::errors::{CreditError, ValidationError, ValidationErrors};
use crate::events::{Event, EventStore};
use crate::item::Item;
use crate::profile::CreditProfile;
use crate::repository::UserRepository;
use crate::scoring::{refresh_profile, ProfileReview, TierReviewPolicy, UpgradeOnly};
use crate::types::ApplicationStatus;

/// the five independent decision checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckKind {
    Guarantor,
    Eligibility,
    CreditLimit,
    Affordability,
    DebtToIncome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionCheck {
    pub kind: CheckKind,
    pub passed: bool,
    pub reason: String,
}

impl DecisionCheck {
    fn new(kind: CheckKind, passed: bool, reason: String) -> Self {
        Self { kind, passed, reason }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub application: CreditApplication,
    pub checks: Vec<DecisionCheck>,
    pub review: ProfileReview,
}

impl DecisionOutcome {
    pub fn approved(&self) -> bool {
        self.application.status() == ApplicationStatus::Approved
    }

    pub fn failed_checks(&self) -> impl Iterator<Item = &DecisionCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// scores, checks and decides credit applications
pub struct DecisionEngine {
    config: CreditConfig,
    policy: Arc<dyn TierReviewPolicy>,
}

impl DecisionEngine {
    pub fn new(config: CreditConfig) -> Self {
        Self {
            config,
            policy: Arc::new(UpgradeOnly),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn TierReviewPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &CreditConfig {
        &self.config
    }

    /// refresh the applicant's standing, run every check, decide
    ///
    /// only malformed input and repository failures are errors; a decline is an outcome.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &self,
        draft: ApplicationDraft,
        profile: &mut CreditProfile,
        item: &Item,
        outstanding: Money,
        users: &dyn UserRepository,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<DecisionOutcome, CreditError> {
        draft.validate(item, &self.config.decision)?;
        let now = time.now();

        let review = refresh_profile(profile, &self.config.tiers, self.policy.as_ref(), now);
        if review.tier_changed() {
            events.emit(Event::TierUpgraded {
                user_id: profile.user_id,
                old_tier: review.previous_tier,
                new_tier: review.tier,
                new_limit: profile.credit_limit,
                score: review.score,
                timestamp: now,
            });
        }

        let checks = vec![
            self.check_guarantor(&draft, profile, users)?,
            self.check_eligibility(profile),
            self.check_credit_limit(&draft, profile, outstanding),
            self.check_affordability(&draft, item)?,
            self.check_debt_to_income(&draft),
        ];

        let approved = checks.iter().all(|c| c.passed);
        let status = if approved {
            ApplicationStatus::Approved
        } else {
            ApplicationStatus::Declined
        };
        let reasons: Vec<String> = checks
            .iter()
            .filter(|c| c.passed == approved)
            .map(|c| c.reason.clone())
            .collect();

        let application = CreditApplication::decided(
            draft,
            status,
            reasons,
            profile.internal_credit_score,
            profile.credit_tier,
            now,
        );

        info!(
            application_id = %application.id,
            user_id = %application.user_id,
            status = ?status,
            score = application.credit_score(),
            failed = checks.iter().filter(|c| !c.passed).count(),
            "credit application decided"
        );
        events.emit(Event::ApplicationDecided {
            application_id: application.id,
            user_id: application.user_id,
            status,
            score: application.credit_score(),
            tier: application.credit_tier(),
            reasons: application.reasons().to_vec(),
            timestamp: now,
        });

        Ok(DecisionOutcome {
            application,
            checks,
            review,
        })
    }

    fn check_guarantor(
        &self,
        draft: &ApplicationDraft,
        profile: &CreditProfile,
        users: &dyn UserRepository,
    ) -> Result<DecisionCheck, CreditError> {
        let validation = validate_guarantor(
            profile,
            &draft.guarantor_username,
            &draft.guarantor_national_id,
            users,
            &self.config.eligibility,
        )?;

        Ok(match validation {
            GuarantorValidation::Valid { guarantor } => DecisionCheck::new(
                CheckKind::Guarantor,
                true,
                format!("guarantor {} verified", guarantor.username),
            ),
            GuarantorValidation::Invalid { reason } => {
                DecisionCheck::new(CheckKind::Guarantor, false, format!("guarantor: {}", reason))
            }
        })
    }

    fn check_eligibility(&self, profile: &CreditProfile) -> DecisionCheck {
        let gaps = eligibility_gaps(profile, &self.config.eligibility);
        if gaps.is_empty() {
            return DecisionCheck::new(
                CheckKind::Eligibility,
                true,
                "meets basic eligibility requirements".to_string(),
            );
        }
        let reason = gaps
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        DecisionCheck::new(CheckKind::Eligibility, false, reason)
    }

    fn check_credit_limit(
        &self,
        draft: &ApplicationDraft,
        profile: &CreditProfile,
        outstanding: Money,
    ) -> DecisionCheck {
        let available = (profile.credit_limit - outstanding).non_negative();
        let passed = draft.requested_amount <= available;
        let reason = if passed {
            format!(
                "requested amount {} within available credit {}",
                draft.requested_amount, available
            )
        } else {
            format!(
                "requested amount {} exceeds available credit {}",
                draft.requested_amount, available
            )
        };
        DecisionCheck::new(CheckKind::CreditLimit, passed, reason)
    }

    fn check_affordability(
        &self,
        draft: &ApplicationDraft,
        item: &Item,
    ) -> Result<DecisionCheck, CreditError> {
        let monthly = monthly_payment(item.price, draft.installment_count).ok_or_else(|| {
            ValidationErrors(vec![ValidationError::UnsupportedInstallmentCount {
                count: draft.installment_count,
            }])
        })?;
        let share = self.config.decision.max_payment_to_income;
        let ceiling = draft.monthly_income * share.as_decimal();
        let passed = monthly <= ceiling;
        let reason = if passed {
            format!("monthly payment {} within {} of income", monthly, share)
        } else {
            format!(
                "monthly payment {} exceeds {} ({} of income)",
                monthly, ceiling, share
            )
        };
        Ok(DecisionCheck::new(CheckKind::Affordability, passed, reason))
    }

    fn check_debt_to_income(&self, draft: &ApplicationDraft) -> DecisionCheck {
        let ratio = draft.monthly_expenses.ratio_of(draft.monthly_income);
        let limit = self.config.decision.max_debt_to_income;
        let passed = ratio <= limit;
        let reason = if passed {
            format!("debt-to-income ratio {} within {}", ratio, limit)
        } else {
            format!("debt-to-income ratio {} exceeds {}", ratio, limit)
        };
        DecisionCheck::new(CheckKind::DebtToIncome, passed, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::profile::{GuarantorRef, ProfileDetails, User};
    use crate::repository::InMemoryStore;
    use crate::types::{CreditTier, EmploymentStatus};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use hourglass_rs::TimeSource;

    struct Fixture {
        time: SafeTimeProvider,
        store: InMemoryStore,
        applicant: User,
        item: Item,
        engine: DecisionEngine,
    }

    fn fixture() -> Fixture {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        ));
        let store = InMemoryStore::new();
        let joined = time.now() - Duration::days(200);

        let mut applicant = User::new("ama", joined, Money::from_major(500));
        applicant.is_verified = true;
        applicant.details = ProfileDetails {
            first_name: Some("Ama".into()),
            last_name: Some("Owusu".into()),
            email: Some("ama@example.com".into()),
            phone_number: Some("0241112222".into()),
            national_id: Some("GHA-100".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1995, 3, 3),
            address: Some("4 Oxford St".into()),
            city: Some("Accra".into()),
            occupation: Some("Nurse".into()),
            monthly_income: Some(Money::from_major(1_000)),
        };
        store.save_user(applicant.clone()).unwrap();

        let mut guarantor = User::new("kwame", joined, Money::from_major(500));
        guarantor.is_verified = true;
        guarantor.details.national_id = Some("GHA-200".into());
        guarantor.standing.internal_credit_score = 420;
        store.save_user(guarantor).unwrap();

        Fixture {
            time,
            store,
            applicant,
            item: Item::new("Redmi 13C", "Xiaomi", Money::from_major(300)),
            engine: DecisionEngine::new(CreditConfig::standard()),
        }
    }

    fn draft(f: &Fixture, income: i64, expenses: i64) -> ApplicationDraft {
        ApplicationDraft::for_item(
            f.applicant.id,
            &f.item,
            Money::from_major(income),
            Money::from_major(expenses),
            EmploymentStatus::FullTime,
            6,
            GuarantorRef::new("kwame", "GHA-200"),
        )
    }

    #[test]
    fn test_all_checks_pass_approves() {
        let f = fixture();
        let mut events = EventStore::new();
        let mut profile = f.applicant.credit_profile(f.time.now());

        let outcome = f
            .engine
            .decide(draft(&f, 3_000, 1_000), &mut profile, &f.item, Money::ZERO, &f.store, &f.time, &mut events)
            .unwrap();

        assert!(outcome.approved());
        assert_eq!(outcome.checks.len(), 5);
        assert_eq!(outcome.application.reasons().len(), 5);
        assert!(!outcome.application.payment_allowed());
        assert_eq!(outcome.application.credit_score(), profile.internal_credit_score);
        assert!(profile.internal_credit_score > 0);
        assert_eq!(
            events.count_where(|e| matches!(e, Event::ApplicationDecided { .. })),
            1
        );
    }

    #[test]
    fn test_high_dti_declines_regardless_of_score() {
        let f = fixture();
        let mut events = EventStore::new();
        let mut profile = f.applicant.credit_profile(f.time.now());

        let outcome = f
            .engine
            .decide(draft(&f, 1_000, 800), &mut profile, &f.item, Money::ZERO, &f.store, &f.time, &mut events)
            .unwrap();

        assert_eq!(outcome.application.status(), ApplicationStatus::Declined);
        let failed: Vec<CheckKind> = outcome.failed_checks().map(|c| c.kind).collect();
        assert_eq!(failed, vec![CheckKind::DebtToIncome]);
        assert_eq!(outcome.application.reasons().len(), 1);
        assert!(outcome.application.decision_reason().contains("80.0%"));
    }

    #[test]
    fn test_failures_accumulate() {
        let f = fixture();
        let mut events = EventStore::new();
        let mut profile = f.applicant.credit_profile(f.time.now());
        profile.is_verified = false;

        let mut d = draft(&f, 1_000, 900);
        d.guarantor_username = "ama".into();

        let outcome = f
            .engine
            .decide(d, &mut profile, &f.item, Money::from_major(400), &f.store, &f.time, &mut events)
            .unwrap();

        let failed: Vec<CheckKind> = outcome.failed_checks().map(|c| c.kind).collect();
        assert_eq!(
            failed,
            vec![
                CheckKind::Guarantor,
                CheckKind::Eligibility,
                CheckKind::CreditLimit,
                CheckKind::DebtToIncome,
            ]
        );
        assert_eq!(outcome.application.reasons().len(), 4);
        assert!(outcome.application.reasons()[0].contains("own guarantor"));
    }

    #[test]
    fn test_unaffordable_installment() {
        let mut f = fixture();
        f.item = Item::new("Galaxy A55", "Samsung", Money::from_major(480));
        let mut events = EventStore::new();
        let mut profile = f.applicant.credit_profile(f.time.now());

        // 480 / 6 = 80 per month against a 100 ceiling passes
        let outcome = f
            .engine
            .decide(draft(&f, 200, 50), &mut profile, &f.item, Money::ZERO, &f.store, &f.time, &mut events)
            .unwrap();
        assert!(outcome.approved());

        // 80 per month against a 50 ceiling fails
        let outcome = f
            .engine
            .decide(draft(&f, 100, 10), &mut profile, &f.item, Money::ZERO, &f.store, &f.time, &mut events)
            .unwrap();
        let failed: Vec<CheckKind> = outcome.failed_checks().map(|c| c.kind).collect();
        assert_eq!(failed, vec![CheckKind::Affordability]);
    }

    #[test]
    fn test_malformed_draft_is_an_error() {
        let f = fixture();
        let mut events = EventStore::new();
        let mut profile = f.applicant.credit_profile(f.time.now());
        let mut d = draft(&f, 1_000, 100);
        d.installment_count = 5;

        let result = f
            .engine
            .decide(d, &mut profile, &f.item, Money::ZERO, &f.store, &f.time, &mut events);
        assert!(matches!(result, Err(CreditError::Validation(_))));
        assert!(events.events().is_empty());
    }

    #[test]
    fn test_refresh_can_upgrade_before_checks() {
        let f = fixture();
        let mut events = EventStore::new();
        let mut profile = f.applicant.credit_profile(f.time.now());
        profile.successful_payments = 6;

        let outcome = f
            .engine
            .decide(draft(&f, 3_000, 500), &mut profile, &f.item, Money::ZERO, &f.store, &f.time, &mut events)
            .unwrap();

        assert_eq!(outcome.application.credit_tier(), CreditTier::Silver);
        assert_eq!(profile.credit_limit, Money::from_major(2_000));
        assert_eq!(
            events.count_where(|e| matches!(e, Event::TierUpgraded { .. })),
            1
        );
    }
}
