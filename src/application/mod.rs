pub mod decision;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::DecisionConfig;
use crate::decimal::Money;
use crate::errors::{CreditError, ValidationError, ValidationErrors};
use crate::item::Item;
use crate::profile::GuarantorRef;
use crate::types::{ApplicationId, ApplicationStatus, CreditTier, EmploymentStatus, ItemId, UserId};

pub use decision::{CheckKind, DecisionCheck, DecisionEngine, DecisionOutcome};

/// what an applicant submits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub monthly_income: Money,
    pub monthly_expenses: Money,
    pub employment_status: EmploymentStatus,
    pub installment_count: u32,
    pub requested_amount: Money,
    pub guarantor_username: String,
    pub guarantor_national_id: String,
}

impl ApplicationDraft {
    /// draft requesting the full item price
    pub fn for_item(
        user_id: UserId,
        item: &Item,
        monthly_income: Money,
        monthly_expenses: Money,
        employment_status: EmploymentStatus,
        installment_count: u32,
        guarantor: GuarantorRef,
    ) -> Self {
        Self {
            user_id,
            item_id: item.id,
            monthly_income,
            monthly_expenses,
            employment_status,
            installment_count,
            requested_amount: item.price,
            guarantor_username: guarantor.username,
            guarantor_national_id: guarantor.national_id,
        }
    }

    /// malformed input only; affordability is a decision, not a validation error
    pub fn validate(&self, item: &Item, config: &DecisionConfig) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if !self.monthly_income.is_positive() {
            errors.push(ValidationError::NonPositiveIncome);
        }
        if self.monthly_expenses.is_negative() {
            errors.push(ValidationError::NegativeExpenses);
        }
        if !self.requested_amount.is_positive() {
            errors.push(ValidationError::NonPositiveAmount);
        }
        if !config.installment_options.contains(&self.installment_count) {
            errors.push(ValidationError::UnsupportedInstallmentCount {
                count: self.installment_count,
            });
        }
        if item.id != self.item_id || !item.is_available_for_credit() {
            errors.push(ValidationError::ItemUnavailable);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn guarantor(&self) -> GuarantorRef {
        GuarantorRef::new(
            self.guarantor_username.trim(),
            self.guarantor_national_id.trim(),
        )
    }
}

/// a decided credit application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditApplication {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub item_id: ItemId,
    pub requested_amount: Money,
    pub installment_count: u32,
    pub monthly_income: Money,
    pub monthly_expenses: Money,
    pub employment_status: EmploymentStatus,
    /// copied at submission, never edited
    guarantor: GuarantorRef,
    status: ApplicationStatus,
    reasons: Vec<String>,
    /// frozen at decision time
    credit_score: u32,
    credit_tier: CreditTier,
    payment_allowed: bool,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditApplication {
    pub(crate) fn decided(
        draft: ApplicationDraft,
        status: ApplicationStatus,
        reasons: Vec<String>,
        credit_score: u32,
        credit_tier: CreditTier,
        now: DateTime<Utc>,
    ) -> Self {
        let guarantor = draft.guarantor();
        Self {
            id: Uuid::new_v4(),
            user_id: draft.user_id,
            item_id: draft.item_id,
            requested_amount: draft.requested_amount,
            installment_count: draft.installment_count,
            monthly_income: draft.monthly_income,
            monthly_expenses: draft.monthly_expenses,
            employment_status: draft.employment_status,
            guarantor,
            status,
            reasons,
            credit_score,
            credit_tier,
            payment_allowed: false,
            verified_by: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> ApplicationStatus {
        self.status
    }

    pub fn guarantor(&self) -> &GuarantorRef {
        &self.guarantor
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn credit_score(&self) -> u32 {
        self.credit_score
    }

    pub fn credit_tier(&self) -> CreditTier {
        self.credit_tier
    }

    pub fn payment_allowed(&self) -> bool {
        self.payment_allowed
    }

    /// reasons as one line
    pub fn decision_reason(&self) -> String {
        self.reasons.join("; ")
    }

    /// staff confirmed the guarantor out of band; money may now flow
    pub fn verify_for_payment(&mut self, staff_id: UserId, now: DateTime<Utc>) -> Result<(), CreditError> {
        if self.status != ApplicationStatus::Approved {
            return Err(CreditError::ApplicationStatusMismatch {
                id: self.id,
                status: self.status,
                expected: ApplicationStatus::Approved,
            });
        }
        self.status = ApplicationStatus::Verified;
        self.payment_allowed = true;
        self.verified_by = Some(staff_id);
        self.verified_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// pending or approved-but-unverified applications past their validity window
    pub fn is_stale(&self, now: DateTime<Utc>, validity_days: u32) -> bool {
        matches!(self.status, ApplicationStatus::Pending | ApplicationStatus::Approved)
            && now - self.created_at > Duration::days(i64::from(validity_days))
    }

    /// true when the application moved to EXPIRED
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, ApplicationStatus::Pending | ApplicationStatus::Approved) {
            return false;
        }
        self.status = ApplicationStatus::Expired;
        self.payment_allowed = false;
        self.updated_at = now;
        true
    }

    /// verified for this item and still usable
    pub fn is_verified_for(&self, item_id: ItemId) -> bool {
        self.status == ApplicationStatus::Verified && self.payment_allowed && self.item_id == item_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CreditConfig;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn draft(item: &Item) -> ApplicationDraft {
        ApplicationDraft::for_item(
            Uuid::new_v4(),
            item,
            Money::from_major(3_000),
            Money::from_major(1_000),
            EmploymentStatus::FullTime,
            12,
            GuarantorRef::new(" kwame ", "GHA-200"),
        )
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let config = CreditConfig::standard().decision;
        let mut item = Item::new("Galaxy S23", "Samsung", Money::from_major(4_000));
        let mut d = draft(&item);
        assert!(d.validate(&item, &config).is_ok());

        item.stock = 0;
        d.monthly_income = Money::ZERO;
        d.monthly_expenses = Money::from_major(-1);
        d.installment_count = 7;

        let errors = d.validate(&item, &config).unwrap_err();
        assert_eq!(
            errors.0,
            vec![
                ValidationError::NonPositiveIncome,
                ValidationError::NegativeExpenses,
                ValidationError::UnsupportedInstallmentCount { count: 7 },
                ValidationError::ItemUnavailable,
            ]
        );
    }

    #[test]
    fn test_expenses_above_income_is_not_a_validation_error() {
        let config = CreditConfig::standard().decision;
        let item = Item::new("Galaxy S23", "Samsung", Money::from_major(4_000));
        let mut d = draft(&item);
        d.monthly_expenses = Money::from_major(5_000);
        assert!(d.validate(&item, &config).is_ok());
    }

    #[test]
    fn test_verify_only_from_approved() {
        let item = Item::new("Galaxy S23", "Samsung", Money::from_major(4_000));
        let mut declined = CreditApplication::decided(
            draft(&item),
            ApplicationStatus::Declined,
            vec!["too risky".into()],
            120,
            CreditTier::Starter,
            now(),
        );
        assert!(declined.verify_for_payment(Uuid::new_v4(), now()).is_err());
        assert!(!declined.payment_allowed());

        let mut approved = CreditApplication::decided(
            draft(&item),
            ApplicationStatus::Approved,
            vec![],
            640,
            CreditTier::Bronze,
            now(),
        );
        assert!(!approved.payment_allowed());
        approved.verify_for_payment(Uuid::new_v4(), now()).unwrap();
        assert_eq!(approved.status(), ApplicationStatus::Verified);
        assert!(approved.payment_allowed());
        assert!(approved.is_verified_for(item.id));
        // frozen snapshot survives verification
        assert_eq!(approved.credit_score(), 640);
        assert_eq!(approved.guarantor().username, "kwame");
    }

    #[test]
    fn test_expiry_window() {
        let item = Item::new("Galaxy S23", "Samsung", Money::from_major(4_000));
        let mut application = CreditApplication::decided(
            draft(&item),
            ApplicationStatus::Approved,
            vec![],
            500,
            CreditTier::Starter,
            now(),
        );

        assert!(!application.is_stale(now() + Duration::days(30), 30));
        assert!(application.is_stale(now() + Duration::days(31), 30));
        assert!(application.expire(now() + Duration::days(31)));
        assert_eq!(application.status(), ApplicationStatus::Expired);
        assert!(!application.expire(now() + Duration::days(32)));
    }
}
