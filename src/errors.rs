use std::fmt;

use thiserror::Error;

use crate::decimal::Money;
use crate::types::{AccountId, AccountStatus, ApplicationId, ApplicationStatus, UserId};

/// umbrella error for infrastructure failures and rejected commands
#[derive(Error, Debug)]
pub enum CreditError {
    #[error("invalid application: {0}")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Transition(#[from] TransitionRejected),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Charge(#[from] ChargeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("user not found: {id}")]
    UserNotFound {
        id: UserId,
    },

    #[error("account not found: {id}")]
    AccountNotFound {
        id: AccountId,
    },

    #[error("application not found: {id}")]
    ApplicationNotFound {
        id: ApplicationId,
    },

    #[error("user already has an active plan: {account_id}")]
    PlanAlreadyActive {
        account_id: AccountId,
    },

    #[error("application {id} is {status:?}, expected {expected:?}")]
    ApplicationStatusMismatch {
        id: ApplicationId,
        status: ApplicationStatus,
        expected: ApplicationStatus,
    },

    #[error("no verified credit application for this item")]
    NoVerifiedApplication,

    #[error("user must be verified before {action}")]
    UserNotVerified {
        action: &'static str,
    },

    #[error("{action} is restricted to staff")]
    StaffOnly {
        action: &'static str,
    },

    #[error("account {account_id} does not belong to the acting user")]
    NotAccountOwner {
        account_id: AccountId,
    },

    #[error("plan cannot be cancelled in status {status}")]
    CancellationNotAllowed {
        status: AccountStatus,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("account has no item attached")]
    NoItemAttached,

    #[error("installment scheduler has been shut down")]
    SchedulerShutDown,
}

pub type Result<T> = std::result::Result<T, CreditError>;

/// a single malformed field on a credit application
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("monthly income must be positive")]
    NonPositiveIncome,

    #[error("monthly expenses cannot be negative")]
    NegativeExpenses,

    #[error("requested amount must be positive")]
    NonPositiveAmount,

    #[error("installment count {count} is not offered")]
    UnsupportedInstallmentCount {
        count: u32,
    },

    #[error("item is not available for credit purchase")]
    ItemUnavailable,
}

/// itemized validation failures, returned together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// state machine guard rejected a transition; the account is unchanged
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot {action} from status {from}")]
pub struct TransitionRejected {
    pub action: &'static str,
    pub from: AccountStatus,
}

/// failures applying a confirmed payment to an account
#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("no account matches payment reference {reference}")]
    UnknownAccount {
        reference: String,
    },

    #[error("account {account_id} cannot take payments in status {status}")]
    InvalidState {
        account_id: AccountId,
        status: AccountStatus,
    },

    #[error("account {account_id} has not been verified for payment")]
    PaymentNotAllowed {
        account_id: AccountId,
    },

    #[error("malformed payment event: {message}")]
    MalformedEvent {
        message: String,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// storage failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record already exists: {key}")]
    Conflict {
        key: String,
    },

    #[error("record not found")]
    NotFound,

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// failures reported by the payment gateway
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChargeError {
    #[error("card declined: {message}")]
    Declined {
        message: String,
    },

    #[error("charge timed out")]
    Timeout,

    #[error("customer has no saved payment method")]
    MissingCustomer,

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

impl ChargeError {
    /// declines and timeouts count as a missed installment
    pub fn is_decline(&self) -> bool {
        matches!(self, ChargeError::Declined { .. } | ChargeError::Timeout)
    }
}

/// notification delivery failures, logged and never propagated into the ledger
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("no contact details for recipient")]
    MissingRecipient,

    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        key: String,
        value: String,
    },

    #[error("invalid configuration: {message}")]
    Inconsistent {
        message: String,
    },

    #[error("unable to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
