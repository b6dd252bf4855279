use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a user
pub type UserId = Uuid;

/// unique identifier for a credit or savings account
pub type AccountId = Uuid;

/// unique identifier for a credit application
pub type ApplicationId = Uuid;

/// unique identifier for a catalogue item (device)
pub type ItemId = Uuid;

/// account product type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// save-to-own, pure accumulation with no borrowed capital
    Savings,
    /// buy-now-pay-later, repaid through fixed installments
    Credit,
}

/// account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    /// plan selected, awaiting staff approval
    Pending,
    /// approved, savings accumulate or card setup pending
    Active,
    /// card on file, installments being collected
    Repaying,
    /// a due installment was missed or declined
    Overdue,
    /// loan fully repaid
    PaidOff,
    /// obligation met, device owed to the customer
    Completed,
    /// device ready at the pickup location
    AvailableForPickup,
    /// customer confirmed collection
    PickedUp,
    /// terminal after pickup
    Closed,
    /// rejected by staff
    Declined,
}

impl AccountStatus {
    /// statuses during which a user may not start another plan
    pub fn is_live_plan(&self) -> bool {
        matches!(
            self,
            AccountStatus::Pending
                | AccountStatus::Active
                | AccountStatus::Repaying
                | AccountStatus::Overdue
                | AccountStatus::PaidOff
        )
    }

    /// statuses in which incoming money is credited to the balance
    pub fn accepts_payment(&self) -> bool {
        matches!(
            self,
            AccountStatus::Active | AccountStatus::Repaying | AccountStatus::Overdue
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "PENDING",
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Repaying => "REPAYING",
            AccountStatus::Overdue => "OVERDUE",
            AccountStatus::PaidOff => "PAID_OFF",
            AccountStatus::Completed => "COMPLETED",
            AccountStatus::AvailableForPickup => "AVAILABLE_FOR_PICKUP",
            AccountStatus::PickedUp => "PICKED_UP",
            AccountStatus::Closed => "CLOSED",
            AccountStatus::Declined => "DECLINED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// credit application status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Declined,
    Expired,
    /// approved and confirmed by staff, payments may flow
    Verified,
}

impl ApplicationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Declined | ApplicationStatus::Expired | ApplicationStatus::Verified
        )
    }
}

/// credit tier, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditTier {
    Starter,
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl CreditTier {
    pub const ALL: [CreditTier; 5] = [
        CreditTier::Starter,
        CreditTier::Bronze,
        CreditTier::Silver,
        CreditTier::Gold,
        CreditTier::Platinum,
    ];
}

impl fmt::Display for CreditTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CreditTier::Starter => "STARTER",
            CreditTier::Bronze => "BRONZE",
            CreditTier::Silver => "SILVER",
            CreditTier::Gold => "GOLD",
            CreditTier::Platinum => "PLATINUM",
        };
        f.write_str(label)
    }
}

/// ledger row type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Payment,
    Refund,
    Fee,
    LateFee,
}

/// declared employment status on an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentStatus {
    FullTime,
    PartTime,
    SelfEmployed,
    Student,
    Unemployed,
    Retired,
}
