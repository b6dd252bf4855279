pub mod lifecycle;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::InstallmentPlan;
use crate::decimal::Money;
use crate::item::Item;
use crate::types::{AccountId, AccountStatus, AccountType, ApplicationId, UserId};

pub use lifecycle::StatusChange;

/// how the customer confirmed collecting the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationMethod {
    Dashboard,
    InStore,
    Sms,
}

/// pickup hand-off details, filled as the device moves to the customer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PickupDetails {
    pub location: Option<String>,
    pub marked_ready_at: Option<DateTime<Utc>>,
    pub marked_ready_by: Option<UserId>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_method: Option<ConfirmationMethod>,
}

/// a savings or credit plan for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub id: AccountId,
    pub user_id: UserId,
    pub item: Option<Item>,
    pub account_type: AccountType,
    status: AccountStatus,
    balance: Money,
    /// total owed, credit plans only
    pub loan_amount: Option<Money>,
    pub installment_amount: Money,
    pub installment_count: u32,
    pub next_payment_due_date: Option<NaiveDate>,
    pub last_payment_date: Option<NaiveDate>,
    is_active_plan: bool,
    pub payment_allowed: bool,
    pub application_id: Option<ApplicationId>,
    pub accepted_terms: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub pickup: PickupDetails,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_status_change: DateTime<Utc>,
}

impl CreditAccount {
    /// save-to-own plan awaiting approval
    pub fn savings(user_id: UserId, item: Item, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item: Some(item),
            account_type: AccountType::Savings,
            status: AccountStatus::Pending,
            balance: Money::ZERO,
            loan_amount: None,
            installment_amount: Money::ZERO,
            installment_count: 0,
            next_payment_due_date: None,
            last_payment_date: None,
            is_active_plan: true,
            payment_allowed: true,
            application_id: None,
            accepted_terms: false,
            accepted_at: None,
            pickup: PickupDetails::default(),
            created_at: now,
            completed_at: None,
            last_status_change: now,
        }
    }

    /// buy-now-pay-later plan opened from a verified application
    pub fn credit(
        user_id: UserId,
        item: Item,
        plan: InstallmentPlan,
        application_id: ApplicationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            item: Some(item),
            account_type: AccountType::Credit,
            status: AccountStatus::Active,
            balance: Money::ZERO,
            loan_amount: Some(plan.loan_amount),
            installment_amount: plan.installment_amount,
            installment_count: plan.installment_count,
            next_payment_due_date: None,
            last_payment_date: None,
            is_active_plan: true,
            payment_allowed: true,
            application_id: Some(application_id),
            accepted_terms: true,
            accepted_at: Some(now),
            pickup: PickupDetails::default(),
            created_at: now,
            completed_at: None,
            last_status_change: now,
        }
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// cumulative amount paid in
    pub fn balance(&self) -> Money {
        self.balance
    }

    /// cached "user may not start another plan" flag
    pub fn is_active_plan(&self) -> bool {
        self.is_active_plan
    }

    pub fn is_credit(&self) -> bool {
        self.account_type == AccountType::Credit
    }

    pub fn owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// full amount to be paid: loan for credit, item price for savings
    pub fn obligation(&self) -> Option<Money> {
        match (self.account_type, &self.item) {
            (AccountType::Credit, _) => self.loan_amount,
            (AccountType::Savings, Some(item)) => Some(item.price),
            (AccountType::Savings, None) => None,
        }
    }

    pub fn remaining_balance(&self) -> Money {
        match self.obligation() {
            Some(total) => (total - self.balance).non_negative(),
            None => Money::ZERO,
        }
    }

    /// whole percent paid, capped at 100
    pub fn progress_percentage(&self) -> u32 {
        let total = match self.obligation() {
            Some(total) if total.is_positive() => total,
            _ => return 0,
        };
        let pct = self.balance.non_negative().as_decimal() * Decimal::from(100) / total.as_decimal();
        pct.floor().to_u32().unwrap_or(0).min(100)
    }

    pub fn remaining_installments(&self) -> u32 {
        self.plan().map_or(0, |plan| plan.installments_left(self.balance))
    }

    /// overdue by status, or repaying past the due date
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        match self.status {
            AccountStatus::Overdue => true,
            AccountStatus::Repaying => self.next_payment_due_date.is_some_and(|due| as_of > due),
            _ => false,
        }
    }

    /// is the next installment due by `as_of`
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.is_credit()
            && self.status == AccountStatus::Repaying
            && self.next_payment_due_date.is_some_and(|due| due <= as_of)
    }

    /// balance covers the full obligation
    pub fn is_eligible_for_completion(&self) -> bool {
        match self.obligation() {
            Some(total) => total.is_positive() && self.balance >= total,
            None => false,
        }
    }

    pub fn plan(&self) -> Option<InstallmentPlan> {
        let loan_amount = self.loan_amount?;
        if !self.is_credit() || self.installment_count == 0 {
            return None;
        }
        Some(InstallmentPlan {
            loan_amount,
            installment_count: self.installment_count,
            installment_amount: self.installment_amount,
        })
    }

    /// amount the next scheduled collection should take
    pub fn next_installment(&self) -> Money {
        match self.plan() {
            Some(plan) => plan.next_charge(self.balance),
            None => Money::ZERO,
        }
    }

    /// a user may cancel only while the plan is live
    pub fn can_cancel(&self) -> bool {
        self.is_active_plan
    }

    /// credit an incoming payment; balance only grows here
    pub(crate) fn credit_payment(&mut self, amount: Money, paid_on: NaiveDate) -> Money {
        self.balance += amount.abs();
        self.last_payment_date = Some(paid_on);
        self.balance
    }

    /// the single status setter; keeps `is_active_plan` in step
    pub(crate) fn set_status(&mut self, to: AccountStatus, now: DateTime<Utc>) -> StatusChange {
        let from = self.status;
        self.status = to;
        self.last_status_change = now;
        self.is_active_plan = to.is_live_plan();
        StatusChange { from, to }
    }

    /// recompute the cached flag; true when it was stale
    pub fn refresh_active_plan_flag(&mut self) -> bool {
        let expected = self.status.is_live_plan();
        let stale = self.is_active_plan != expected;
        self.is_active_plan = expected;
        stale
    }

    #[cfg(test)]
    pub(crate) fn force_active_plan_flag(&mut self, value: bool) {
        self.is_active_plan = value;
    }
}
