use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account::{ConfirmationMethod, CreditAccount};
use crate::billing::add_billing_periods;
use crate::errors::TransitionRejected;
use crate::events::Event;
use crate::types::{AccountStatus, AccountType, UserId};

/// a status transition that went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: AccountStatus,
    pub to: AccountStatus,
}

impl StatusChange {
    pub fn into_event(
        self,
        account: &CreditAccount,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Event {
        Event::StatusChanged {
            account_id: account.id,
            old_status: self.from,
            new_status: self.to,
            reason: reason.into(),
            timestamp,
        }
    }
}

impl CreditAccount {
    fn guard(&self, action: &'static str, allowed: &[AccountStatus]) -> Result<(), TransitionRejected> {
        if allowed.contains(&self.status()) {
            Ok(())
        } else {
            debug!(account_id = %self.id, status = %self.status(), action, "transition rejected");
            Err(TransitionRejected {
                action,
                from: self.status(),
            })
        }
    }

    fn rejected(&self, action: &'static str) -> TransitionRejected {
        TransitionRejected {
            action,
            from: self.status(),
        }
    }

    /// staff approval of a pending plan
    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        self.guard("approve", &[AccountStatus::Pending])?;
        Ok(self.set_status(AccountStatus::Active, now))
    }

    /// staff rejection; terminal
    pub fn decline(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        self.guard("decline", &[AccountStatus::Pending, AccountStatus::Active])?;
        Ok(self.set_status(AccountStatus::Declined, now))
    }

    /// record agreement to the plan terms; no status change
    pub fn accept_terms(&mut self, now: DateTime<Utc>) -> Result<(), TransitionRejected> {
        self.guard("accept terms", &[AccountStatus::Pending, AccountStatus::Active])?;
        self.accepted_terms = true;
        self.accepted_at = Some(now);
        Ok(())
    }

    /// card saved for off-session charges; first installment one period out
    pub fn confirm_card_setup(
        &mut self,
        today: NaiveDate,
        period_months: u32,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TransitionRejected> {
        if self.account_type != AccountType::Credit {
            return Err(self.rejected("confirm card setup"));
        }
        self.guard("confirm card setup", &[AccountStatus::Active])?;

        let first_due = add_billing_periods(today, period_months)
            .ok_or_else(|| self.rejected("confirm card setup"))?;
        self.next_payment_due_date = Some(first_due);
        Ok(self.set_status(AccountStatus::Repaying, now))
    }

    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        self.guard("mark overdue", &[AccountStatus::Repaying])?;
        Ok(self.set_status(AccountStatus::Overdue, now))
    }

    /// late payment brings an overdue plan back
    pub fn resume_repaying(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        self.guard("resume repaying", &[AccountStatus::Overdue])?;
        Ok(self.set_status(AccountStatus::Repaying, now))
    }

    pub fn mark_paid_off(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        if self.account_type != AccountType::Credit || !self.is_eligible_for_completion() {
            return Err(self.rejected("mark paid off"));
        }
        self.guard(
            "mark paid off",
            &[AccountStatus::Active, AccountStatus::Repaying, AccountStatus::Overdue],
        )?;
        self.next_payment_due_date = None;
        Ok(self.set_status(AccountStatus::PaidOff, now))
    }

    /// both plan types converge here once the obligation is met
    pub fn mark_as_completed(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        if !self.is_eligible_for_completion() {
            return Err(self.rejected("complete"));
        }
        self.guard(
            "complete",
            &[
                AccountStatus::Active,
                AccountStatus::Repaying,
                AccountStatus::Overdue,
                AccountStatus::PaidOff,
            ],
        )?;
        self.next_payment_due_date = None;
        self.completed_at = Some(now);
        let change = self.set_status(AccountStatus::Completed, now);
        info!(account_id = %self.id, balance = %self.balance(), "plan completed");
        Ok(change)
    }

    pub fn mark_available_for_pickup(
        &mut self,
        staff_id: UserId,
        location: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TransitionRejected> {
        self.guard("mark available for pickup", &[AccountStatus::Completed])?;
        self.pickup.location = Some(location.into());
        self.pickup.marked_ready_at = Some(now);
        self.pickup.marked_ready_by = Some(staff_id);
        Ok(self.set_status(AccountStatus::AvailableForPickup, now))
    }

    pub fn confirm_pickup(
        &mut self,
        method: ConfirmationMethod,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, TransitionRejected> {
        self.guard("confirm pickup", &[AccountStatus::AvailableForPickup])?;
        self.pickup.confirmed_at = Some(now);
        self.pickup.confirmation_method = Some(method);
        Ok(self.set_status(AccountStatus::PickedUp, now))
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Result<StatusChange, TransitionRejected> {
        self.guard("close", &[AccountStatus::PickedUp])?;
        Ok(self.set_status(AccountStatus::Closed, now))
    }

    /// push the due date one billing period; only while repaying
    pub fn advance_due_date(&mut self, period_months: u32) -> Option<NaiveDate> {
        if self.status() != AccountStatus::Repaying {
            return None;
        }
        let next = add_billing_periods(self.next_payment_due_date?, period_months)?;
        self.next_payment_due_date = Some(next);
        Some(next)
    }
}
