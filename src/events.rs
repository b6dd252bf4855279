use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::notify::NotificationKind;
use crate::types::{
    AccountId, AccountStatus, AccountType, ApplicationId, ApplicationStatus, CreditTier, UserId,
};

/// all events emitted by the credit core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // application events
    ApplicationDecided {
        application_id: ApplicationId,
        user_id: UserId,
        status: ApplicationStatus,
        score: u32,
        tier: CreditTier,
        reasons: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    ApplicationVerified {
        application_id: ApplicationId,
        verified_by: UserId,
        timestamp: DateTime<Utc>,
    },
    ApplicationExpired {
        application_id: ApplicationId,
        timestamp: DateTime<Utc>,
    },

    // account lifecycle events
    AccountOpened {
        account_id: AccountId,
        user_id: UserId,
        account_type: AccountType,
        status: AccountStatus,
        obligation: Money,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        account_id: AccountId,
        old_status: AccountStatus,
        new_status: AccountStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    AccountCancelled {
        account_id: AccountId,
        user_id: UserId,
        refunded: Money,
        timestamp: DateTime<Utc>,
    },
    RefundIssued {
        account_id: AccountId,
        amount: Money,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentReconciled {
        account_id: AccountId,
        correlation_id: String,
        amount: Money,
        new_balance: Money,
        next_payment_due: Option<NaiveDate>,
        timestamp: DateTime<Utc>,
    },
    DuplicatePaymentIgnored {
        account_id: AccountId,
        correlation_id: String,
        timestamp: DateTime<Utc>,
    },
    InstallmentCharged {
        account_id: AccountId,
        amount: Money,
        gateway_amount: Money,
        payment_ref: String,
        timestamp: DateTime<Utc>,
    },
    InstallmentDeclined {
        account_id: AccountId,
        amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // standing events
    TierUpgraded {
        user_id: UserId,
        old_tier: CreditTier,
        new_tier: CreditTier,
        new_limit: Money,
        score: u32,
        timestamp: DateTime<Utc>,
    },
    UserVerified {
        user_id: UserId,
        verified_by: UserId,
        timestamp: DateTime<Utc>,
    },

    // collaborator hand-off
    NotificationDue {
        account_id: AccountId,
        kind: NotificationKind,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// number of events matching a predicate
    pub fn count_where(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_take_events_drains() {
        let mut store = EventStore::new();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        store.emit(Event::ApplicationExpired {
            application_id: Uuid::new_v4(),
            timestamp: now,
        });
        store.emit(Event::DuplicatePaymentIgnored {
            account_id: Uuid::new_v4(),
            correlation_id: "pi_1".to_string(),
            timestamp: now,
        });

        assert_eq!(
            store.count_where(|e| matches!(e, Event::DuplicatePaymentIgnored { .. })),
            1
        );
        assert_eq!(store.take_events().len(), 2);
        assert!(store.events().is_empty());
    }
}
