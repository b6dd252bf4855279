use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::CreditAccount;
use crate::config::CreditConfig;
use crate::currency::CurrencyConverter;
use crate::decimal::Money;
use crate::errors::{ConfigError, ReconciliationError, RepositoryError};
use crate::events::{Event, EventStore};
use crate::gateway::PaymentEvent;
use crate::notify::{dispatch, NotificationKind, Notifier};
use crate::profile::User;
use crate::repository::{AccountRepository, UserRepository};
use crate::scoring::{refresh_profile, TierReviewPolicy, UpgradeOnly};
use crate::transaction::Transaction;
use crate::types::{AccountId, AccountStatus, CreditTier};

/// per-account write locks; clones share the same table
#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    table: Arc<Mutex<HashMap<AccountId, Arc<Mutex<()>>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// run `f` holding the write lock for `account_id`; the table entry is
    /// dropped again once no other caller holds or waits on it
    pub fn with_lock<T, E>(
        &self,
        account_id: AccountId,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        let handle = self.handle(account_id)?;
        let result = {
            let _guard = handle
                .lock()
                .map_err(|_| RepositoryError::Unavailable("account lock poisoned".to_string()))?;
            f()
        };
        drop(handle);
        self.prune(account_id);
        result
    }

    /// accounts with a lock currently in use
    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, account_id: AccountId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| RepositoryError::Unavailable("account lock table poisoned".to_string()))?;
        Ok(table.entry(account_id).or_default().clone())
    }

    fn prune(&self, account_id: AccountId) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        // only the table itself still refers to it
        if table
            .get(&account_id)
            .is_some_and(|handle| Arc::strong_count(handle) == 1)
        {
            table.remove(&account_id);
        }
    }
}

/// result of applying one payment event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationOutcome {
    Applied {
        account_id: AccountId,
        amount: Money,
        new_balance: Money,
        status: AccountStatus,
        next_payment_due: Option<NaiveDate>,
        completed: bool,
        tier_upgraded: Option<CreditTier>,
        notifications: Vec<NotificationKind>,
    },
    DuplicateIgnored {
        account_id: AccountId,
        correlation_id: String,
    },
}

impl ReconciliationOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ReconciliationOutcome::DuplicateIgnored { .. })
    }
}

/// applies confirmed payments to accounts, at most once per correlation id
pub struct ReconciliationProcessor<S> {
    store: Arc<S>,
    config: CreditConfig,
    converter: CurrencyConverter,
    policy: Arc<dyn TierReviewPolicy>,
    notifier: Arc<dyn Notifier>,
    locks: AccountLocks,
}

impl<S: AccountRepository + UserRepository> ReconciliationProcessor<S> {
    pub fn new(
        store: Arc<S>,
        config: CreditConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        let converter = CurrencyConverter::from_config(&config.billing)?;
        Ok(Self {
            store,
            config,
            converter,
            policy: Arc::new(UpgradeOnly),
            notifier,
            locks: AccountLocks::new(),
        })
    }

    pub fn with_policy(mut self, policy: Arc<dyn TierReviewPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// share an existing lock table, e.g. with the service layer
    pub fn with_locks(mut self, locks: AccountLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &CreditConfig {
        &self.config
    }

    pub fn converter(&self) -> &CurrencyConverter {
        &self.converter
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn locks(&self) -> &AccountLocks {
        &self.locks
    }

    /// apply a payment event from any source (webhook, poll, scheduled charge)
    pub fn apply(
        &self,
        event: &PaymentEvent,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let account_id = event.account_reference()?;
        self.locks
            .with_lock(account_id, || self.apply_locked(event, account_id, time, events))
    }

    /// caller holds the lock for `account_id`
    ///
    /// The ledger row, the account and the owner's standing are written
    /// together: if a later write fails the earlier ones are undone, so a
    /// retry of the same event applies it again instead of being taken for
    /// a duplicate.
    pub(crate) fn apply_locked(
        &self,
        event: &PaymentEvent,
        account_id: AccountId,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<ReconciliationOutcome, ReconciliationError> {
        let correlation_id = event.correlation_id.trim();
        if correlation_id.is_empty() {
            return Err(ReconciliationError::MalformedEvent {
                message: "missing correlation id".to_string(),
            });
        }
        // replays are answered even when the account is gone
        if let Some(existing) = self.store.find_transaction_by_correlation(correlation_id)? {
            return Ok(self.duplicate(existing.account_id, correlation_id, time, events));
        }

        let amount = event.resolve_amount(&self.converter)?;
        let original = self
            .store
            .load_account(account_id)?
            .ok_or_else(|| ReconciliationError::UnknownAccount {
                reference: account_id.to_string(),
            })?;

        if !original.status().accepts_payment() {
            return Err(ReconciliationError::InvalidState {
                account_id,
                status: original.status(),
            });
        }
        if !original.payment_allowed {
            return Err(ReconciliationError::PaymentNotAllowed { account_id });
        }

        let now = time.now();
        // held back until everything is persisted
        let mut staged = EventStore::new();

        let mut account = original.clone();
        let new_balance = account.credit_payment(amount, now.date_naive());
        debug!(%account_id, correlation_id, %amount, %new_balance, "payment credited");

        let period = self.config.billing.billing_period_months;
        match account.status() {
            AccountStatus::Repaying => {
                account.advance_due_date(period);
            }
            AccountStatus::Overdue => {
                if let Ok(change) = account.resume_repaying(now) {
                    staged.emit(change.into_event(&account, "late payment received", now));
                    account.advance_due_date(period);
                }
            }
            _ => {}
        }

        let mut notifications = Vec::new();
        let completed = self.complete_if_eligible(&mut account, time, &mut staged);
        if completed {
            notifications.push(NotificationKind::PlanCompleted);
        }

        let mut owner = self.store.load_user(account.user_id)?;
        let tier_upgraded = match owner.as_mut() {
            Some(user) => self.update_standing(user, &account, amount, time, &mut staged),
            None => {
                warn!(%account_id, user_id = %account.user_id, "payment owner not found");
                None
            }
        };

        let transaction = Transaction::payment(
            account_id,
            amount,
            correlation_id,
            format!("payment of {}", self.converter.format_local(amount)),
            now,
        );
        match self.store.append_transaction(transaction) {
            Ok(()) => {}
            Err(RepositoryError::Conflict { .. }) => {
                return Ok(self.duplicate(account_id, correlation_id, time, events));
            }
            Err(e) => return Err(e.into()),
        }
        self.commit(correlation_id, &original, &account, owner)?;

        for event in staged.take_events() {
            events.emit(event);
        }
        for kind in &notifications {
            dispatch(self.notifier.as_ref(), *kind, &account);
            events.emit(Event::NotificationDue {
                account_id,
                kind: *kind,
                timestamp: now,
            });
        }

        events.emit(Event::PaymentReconciled {
            account_id,
            correlation_id: correlation_id.to_string(),
            amount,
            new_balance,
            next_payment_due: account.next_payment_due_date,
            timestamp: now,
        });
        info!(
            %account_id,
            correlation_id,
            %amount,
            %new_balance,
            status = %account.status(),
            "payment reconciled"
        );

        Ok(ReconciliationOutcome::Applied {
            account_id,
            amount,
            new_balance,
            status: account.status(),
            next_payment_due: account.next_payment_due_date,
            completed,
            tier_upgraded,
            notifications,
        })
    }

    /// persist the credited account and its owner after the ledger row
    fn commit(
        &self,
        correlation_id: &str,
        original: &CreditAccount,
        account: &CreditAccount,
        owner: Option<User>,
    ) -> Result<(), RepositoryError> {
        if let Err(error) = self.store.save_account(account) {
            warn!(account_id = %account.id, correlation_id, %error, "account save failed, payment unwound");
            self.release_correlation(correlation_id);
            return Err(error);
        }

        let Some(user) = owner else {
            return Ok(());
        };
        if let Err(error) = self.store.save_user(user) {
            match self.store.save_account(original) {
                Ok(()) => {
                    warn!(account_id = %account.id, correlation_id, %error, "owner save failed, payment unwound");
                    self.release_correlation(correlation_id);
                }
                // the credit stands, so the ledger row must too
                Err(restore) => warn!(
                    account_id = %account.id,
                    correlation_id,
                    %error,
                    %restore,
                    "owner save failed and account could not be restored"
                ),
            }
            return Err(error);
        }
        Ok(())
    }

    fn release_correlation(&self, correlation_id: &str) {
        if let Err(error) = self.store.remove_transaction(correlation_id) {
            warn!(correlation_id, %error, "could not remove ledger row of an unwound payment");
        }
    }

    fn duplicate(
        &self,
        account_id: AccountId,
        correlation_id: &str,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> ReconciliationOutcome {
        info!(%account_id, correlation_id, "duplicate payment ignored");
        events.emit(Event::DuplicatePaymentIgnored {
            account_id,
            correlation_id: correlation_id.to_string(),
            timestamp: time.now(),
        });
        ReconciliationOutcome::DuplicateIgnored {
            account_id,
            correlation_id: correlation_id.to_string(),
        }
    }

    /// count the payment toward the owner's standing and re-review the tier
    fn update_standing(
        &self,
        user: &mut User,
        account: &CreditAccount,
        amount: Money,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Option<CreditTier> {
        let now = time.now();
        user.standing.successful_payments += 1;
        if account.is_credit() {
            user.standing.total_credit_used += amount;
        }

        let mut profile = user.credit_profile(now);
        let review = refresh_profile(&mut profile, &self.config.tiers, self.policy.as_ref(), now);
        user.absorb_review(&profile);

        if !review.tier_changed() {
            return None;
        }
        info!(
            user_id = %user.id,
            old_tier = %review.previous_tier,
            new_tier = %review.tier,
            score = review.score,
            "credit tier upgraded"
        );
        events.emit(Event::TierUpgraded {
            user_id: user.id,
            old_tier: review.previous_tier,
            new_tier: review.tier,
            new_limit: profile.credit_limit,
            score: review.score,
            timestamp: now,
        });
        Some(review.tier)
    }

    /// credit plans pass through PAID_OFF on the way to COMPLETED
    fn complete_if_eligible(
        &self,
        account: &mut CreditAccount,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> bool {
        if !account.is_eligible_for_completion() {
            return false;
        }
        let now = time.now();

        if account.is_credit() && account.status() != AccountStatus::PaidOff {
            match account.mark_paid_off(now) {
                Ok(change) => events.emit(change.into_event(account, "loan fully repaid", now)),
                Err(rejected) => {
                    warn!(account_id = %account.id, %rejected, "paid-off transition refused");
                    return false;
                }
            }
        }

        match account.mark_as_completed(now) {
            Ok(change) => {
                events.emit(change.into_event(account, "obligation met", now));
                true
            }
            Err(rejected) => {
                warn!(account_id = %account.id, %rejected, "completion refused");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::InstallmentPlan;
    use crate::item::Item;
    use crate::notify::RecordingNotifier;
    use crate::profile::ProfileDetails;
    use crate::repository::testing::FlakyStore;
    use crate::repository::InMemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        processor: ReconciliationProcessor<InMemoryStore>,
        time: SafeTimeProvider,
        user: User,
    }

    fn fixture() -> Fixture {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let config = CreditConfig::standard();
        let user = User::new("ama", time.now() - Duration::days(400), config.tiers.starter_limit());
        store.save_user(user.clone()).unwrap();

        let processor =
            ReconciliationProcessor::new(store.clone(), config, notifier.clone()).unwrap();
        Fixture {
            store,
            notifier,
            processor,
            time,
            user,
        }
    }

    fn repaying_account(f: &Fixture, price: i64, count: u32) -> CreditAccount {
        let item = Item::new("Galaxy A35", "Samsung", Money::from_major(price));
        let plan = InstallmentPlan::new(item.price, count).unwrap();
        let mut account = CreditAccount::credit(f.user.id, item, plan, Uuid::new_v4(), f.time.now());
        account
            .confirm_card_setup(f.time.now().date_naive(), 1, f.time.now())
            .unwrap();
        f.store.save_account(&account).unwrap();
        account
    }

    #[test]
    fn test_duplicate_delivery_credits_once() {
        let f = fixture();
        let account = repaying_account(&f, 1_200, 12);
        let mut events = EventStore::new();
        let event = PaymentEvent::for_account("pi_123", account.id, Money::from_major(100), None);

        let first = f.processor.apply(&event, &f.time, &mut events).unwrap();
        let second = f.processor.apply(&event, &f.time, &mut events).unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(f.store.transactions_for(account.id).unwrap().len(), 1);

        let stored = f.store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_major(100));
        assert_eq!(
            events.count_where(|e| matches!(e, Event::DuplicatePaymentIgnored { .. })),
            1
        );

        let user = f.store.load_user(f.user.id).unwrap().unwrap();
        assert_eq!(user.standing.successful_payments, 1);
    }

    #[test]
    fn test_payment_advances_due_date_and_balance() {
        let f = fixture();
        let account = repaying_account(&f, 1_200, 12);
        let due = account.next_payment_due_date.unwrap();
        let mut events = EventStore::new();

        let mut previous = Money::ZERO;
        for n in 1..=3 {
            let event = PaymentEvent::for_account(format!("pi_{}", n), account.id, Money::from_major(100), None);
            match f.processor.apply(&event, &f.time, &mut events).unwrap() {
                ReconciliationOutcome::Applied { new_balance, .. } => {
                    assert!(new_balance > previous);
                    previous = new_balance;
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        let stored = f.store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_major(300));
        assert_eq!(stored.next_payment_due_date, NaiveDate::from_ymd_opt(2025, 8, 1));
        assert!(stored.next_payment_due_date.unwrap() > due);
    }

    #[test]
    fn test_late_payment_resumes_repaying() {
        let f = fixture();
        let mut account = repaying_account(&f, 1_200, 12);
        account.mark_overdue(f.time.now()).unwrap();
        f.store.save_account(&account).unwrap();

        let mut events = EventStore::new();
        let event = PaymentEvent::for_account("pi_late", account.id, Money::from_major(100), None);
        f.processor.apply(&event, &f.time, &mut events).unwrap();

        let stored = f.store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.status(), AccountStatus::Repaying);
        assert_eq!(stored.next_payment_due_date, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn test_final_payment_completes_credit_plan() {
        let f = fixture();
        let account = repaying_account(&f, 600, 6);
        let mut events = EventStore::new();

        let event = PaymentEvent::for_account("pi_full", account.id, Money::from_major(600), None);
        let outcome = f.processor.apply(&event, &f.time, &mut events).unwrap();

        match outcome {
            ReconciliationOutcome::Applied { completed, status, notifications, .. } => {
                assert!(completed);
                assert_eq!(status, AccountStatus::Completed);
                assert_eq!(notifications, vec![NotificationKind::PlanCompleted]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let stored = f.store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.status(), AccountStatus::Completed);
        assert!(!stored.is_active_plan());
        assert_eq!(stored.next_payment_due_date, None);
        assert_eq!(f.notifier.count(NotificationKind::PlanCompleted), 1);

        // passed through PAID_OFF
        assert_eq!(
            events.count_where(|e| matches!(
                e,
                Event::StatusChanged { new_status: AccountStatus::PaidOff, .. }
            )),
            1
        );
    }

    #[test]
    fn test_rejects_unverified_and_closed_accounts() {
        let f = fixture();
        let mut events = EventStore::new();

        let mut unverified = repaying_account(&f, 1_200, 12);
        unverified.payment_allowed = false;
        f.store.save_account(&unverified).unwrap();
        let event = PaymentEvent::for_account("pi_a", unverified.id, Money::from_major(100), None);
        assert!(matches!(
            f.processor.apply(&event, &f.time, &mut events),
            Err(ReconciliationError::PaymentNotAllowed { .. })
        ));

        let pending = CreditAccount::savings(
            f.user.id,
            Item::new("Redmi 13", "Xiaomi", Money::from_major(700)),
            f.time.now(),
        );
        f.store.save_account(&pending).unwrap();
        let event = PaymentEvent::for_account("pi_b", pending.id, Money::from_major(100), None);
        assert!(matches!(
            f.processor.apply(&event, &f.time, &mut events),
            Err(ReconciliationError::InvalidState { status: AccountStatus::Pending, .. })
        ));

        // nothing was recorded for either
        assert!(f.store.find_transaction_by_correlation("pi_a").unwrap().is_none());
        assert!(f.store.find_transaction_by_correlation("pi_b").unwrap().is_none());
    }

    #[test]
    fn test_unknown_account() {
        let f = fixture();
        let mut events = EventStore::new();
        let event = PaymentEvent::for_account("pi_x", Uuid::new_v4(), Money::from_major(100), None);
        assert!(matches!(
            f.processor.apply(&event, &f.time, &mut events),
            Err(ReconciliationError::UnknownAccount { .. })
        ));
    }

    #[test]
    fn test_third_payment_upgrades_to_bronze() {
        let f = fixture();
        let mut user = f.store.load_user(f.user.id).unwrap().unwrap();
        user.is_verified = true;
        user.details = ProfileDetails {
            first_name: Some("Ama".into()),
            last_name: Some("Mensah".into()),
            email: Some("ama@example.com".into()),
            phone_number: Some("0241234567".into()),
            national_id: Some("GHA-1".into()),
            date_of_birth: NaiveDate::from_ymd_opt(1994, 2, 3),
            address: Some("12 Ring Road".into()),
            city: Some("Accra".into()),
            occupation: Some("Nurse".into()),
            monthly_income: Some(Money::from_major(3_000)),
        };
        user.standing.successful_payments = 2;
        f.store.save_user(user).unwrap();

        let account = repaying_account(&f, 1_200, 12);
        let mut events = EventStore::new();
        let event = PaymentEvent::for_account("pi_up", account.id, Money::from_major(100), None);
        let outcome = f.processor.apply(&event, &f.time, &mut events).unwrap();

        // 100 + 600 + 200 + 100 + 2, capped at 1000; three payments admit BRONZE only
        match outcome {
            ReconciliationOutcome::Applied { tier_upgraded, .. } => {
                assert_eq!(tier_upgraded, Some(CreditTier::Bronze));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let user = f.store.load_user(f.user.id).unwrap().unwrap();
        assert_eq!(user.standing.successful_payments, 3);
        assert_eq!(user.standing.total_credit_used, Money::from_major(100));
        assert_eq!(user.standing.internal_credit_score, 1_000);
        assert_eq!(user.standing.credit_limit, Money::from_major(1_000));
        assert_eq!(events.count_where(|e| matches!(e, Event::TierUpgraded { .. })), 1);
    }

    #[test]
    fn test_replay_answered_before_account_lookup() {
        let f = fixture();
        let mut events = EventStore::new();
        let gone = Uuid::new_v4();
        let row = Transaction::payment(gone, Money::from_major(100), "pi_old", "payment", f.time.now());
        f.store.append_transaction(row).unwrap();

        let event = PaymentEvent::for_account("pi_old", gone, Money::from_major(100), None);
        let outcome = f.processor.apply(&event, &f.time, &mut events).unwrap();
        assert!(outcome.is_duplicate());
    }

    #[test]
    fn test_failed_owner_save_unwinds_payment() {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap(),
        ));
        let config = CreditConfig::standard();
        let store = Arc::new(FlakyStore::default());
        let user = User::new("yaw", time.now() - Duration::days(400), config.tiers.starter_limit());
        store.save_user(user.clone()).unwrap();
        let processor =
            ReconciliationProcessor::new(store.clone(), config, Arc::new(RecordingNotifier::new()))
                .unwrap();

        let item = Item::new("Galaxy A35", "Samsung", Money::from_major(1_200));
        let plan = InstallmentPlan::new(item.price, 12).unwrap();
        let mut account = CreditAccount::credit(user.id, item, plan, Uuid::new_v4(), time.now());
        account
            .confirm_card_setup(time.now().date_naive(), 1, time.now())
            .unwrap();
        store.save_account(&account).unwrap();

        store.break_user(user.id);
        let mut events = EventStore::new();
        let event = PaymentEvent::for_account("pi_retry", account.id, Money::from_major(100), None);
        assert!(matches!(
            processor.apply(&event, &time, &mut events),
            Err(ReconciliationError::Repository(_))
        ));

        let stored = store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Money::ZERO);
        assert_eq!(stored.next_payment_due_date, account.next_payment_due_date);
        assert!(store.transactions_for(account.id).unwrap().is_empty());
        assert_eq!(events.count_where(|e| matches!(e, Event::PaymentReconciled { .. })), 0);

        store.heal();
        assert!(!processor.apply(&event, &time, &mut events).unwrap().is_duplicate());
        assert!(processor.apply(&event, &time, &mut events).unwrap().is_duplicate());

        let stored = store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_major(100));
        assert_eq!(store.transactions_for(account.id).unwrap().len(), 1);
        let user = store.load_user(user.id).unwrap().unwrap();
        assert_eq!(user.standing.successful_payments, 1);
    }

    #[test]
    fn test_concurrent_redelivery_credits_once() {
        let f = fixture();
        let account = repaying_account(&f, 1_200, 12);
        let account_id = account.id;
        let start = f.time.now();
        let processor = &f.processor;

        let outcomes: Vec<ReconciliationOutcome> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(move || {
                        let time = SafeTimeProvider::new(TimeSource::Test(start));
                        let mut events = EventStore::new();
                        let event =
                            PaymentEvent::for_account("pi_same", account_id, Money::from_major(10), None);
                        processor.apply(&event, &time, &mut events).unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| !o.is_duplicate()).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.is_duplicate()).count(), 7);

        let stored = f.store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_major(10));
        assert_eq!(f.store.transactions_for(account.id).unwrap().len(), 1);
        assert!(f.processor.locks().is_empty());
    }

    #[test]
    fn test_concurrent_distinct_payments_all_land() {
        let f = fixture();
        let account = repaying_account(&f, 1_200, 12);
        let account_id = account.id;
        let start = f.time.now();
        let processor = &f.processor;

        std::thread::scope(|s| {
            for n in 0..8 {
                s.spawn(move || {
                    let time = SafeTimeProvider::new(TimeSource::Test(start));
                    let mut events = EventStore::new();
                    let event = PaymentEvent::for_account(
                        format!("pi_{}", n),
                        account_id,
                        Money::from_major(10),
                        None,
                    );
                    let outcome = processor.apply(&event, &time, &mut events).unwrap();
                    assert!(!outcome.is_duplicate());
                });
            }
        });

        let stored = f.store.load_account(account.id).unwrap().unwrap();
        assert_eq!(stored.balance(), Money::from_major(80));
        assert_eq!(f.store.transactions_for(account.id).unwrap().len(), 8);
        let user = f.store.load_user(f.user.id).unwrap().unwrap();
        assert_eq!(user.standing.successful_payments, 8);
    }

    #[test]
    fn test_lock_entry_dropped_when_unused() {
        let locks = AccountLocks::new();
        let account_id = Uuid::new_v4();

        let held = locks.handle(account_id).unwrap();
        locks.with_lock(account_id, || Ok::<_, RepositoryError>(())).unwrap();
        // still referenced elsewhere
        assert_eq!(locks.len(), 1);

        drop(held);
        locks.with_lock(account_id, || Ok::<_, RepositoryError>(())).unwrap();
        assert!(locks.is_empty());
    }
}
