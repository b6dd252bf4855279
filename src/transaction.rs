use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{AccountId, TransactionType};

/// prefix of correlation ids for refunds issued on cancellation
pub const REFUND_PREFIX: &str = "refund_";

/// immutable ledger row; refunds are new rows, never edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: AccountId,
    /// signed: payments positive, refunds negative
    pub amount: Money,
    pub transaction_type: TransactionType,
    /// gateway identifier, unique across the ledger
    pub correlation_id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub payment_ref: Option<String>,
}

impl Transaction {
    /// payment credited to an account
    pub fn payment(
        account_id: AccountId,
        amount: Money,
        correlation_id: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let correlation_id = correlation_id.into();
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount: amount.abs(),
            transaction_type: TransactionType::Payment,
            payment_ref: Some(correlation_id.clone()),
            correlation_id,
            timestamp,
            description: description.into(),
        }
    }

    /// refund of `amount` back to the customer, stored negative
    pub fn refund(account_id: AccountId, amount: Money, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount: Money::ZERO - amount.abs(),
            transaction_type: TransactionType::Refund,
            correlation_id: format!("{}{}", REFUND_PREFIX, Uuid::new_v4()),
            timestamp,
            description: format!("refund of {} on plan cancellation", amount.abs()),
            payment_ref: None,
        }
    }

    pub fn is_payment(&self) -> bool {
        self.transaction_type == TransactionType::Payment
    }
}

/// sum of payment rows, ignoring refunds and fees
pub fn total_paid(transactions: &[Transaction]) -> Money {
    transactions
        .iter()
        .filter(|t| t.is_payment())
        .map(|t| t.amount)
        .sum()
}
