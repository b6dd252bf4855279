use std::sync::Arc;

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::CreditAccount;
use crate::decimal::Money;
use crate::errors::{ChargeError, CreditError, RepositoryError};
use crate::events::{Event, EventStore};
use crate::gateway::{PaymentEvent, PaymentGateway};
use crate::notify::{dispatch, NotificationKind};
use crate::reconciliation::{ReconciliationOutcome, ReconciliationProcessor};
use crate::repository::{AccountRepository, UserRepository};
use crate::types::AccountId;

/// what happened to one due account in a collection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollectionOutcome {
    Collected {
        account_id: AccountId,
        amount: Money,
        payment_ref: String,
        reconciliation: ReconciliationOutcome,
    },
    /// hard decline or timeout; the account is now overdue
    Declined {
        account_id: AccountId,
        amount: Money,
        reason: String,
    },
    Skipped {
        account_id: AccountId,
        reason: String,
    },
    Failed {
        account_id: AccountId,
        error: String,
    },
}

impl CollectionOutcome {
    pub fn account_id(&self) -> AccountId {
        match self {
            CollectionOutcome::Collected { account_id, .. }
            | CollectionOutcome::Declined { account_id, .. }
            | CollectionOutcome::Skipped { account_id, .. }
            | CollectionOutcome::Failed { account_id, .. } => *account_id,
        }
    }

    pub fn is_collected(&self) -> bool {
        matches!(self, CollectionOutcome::Collected { .. })
    }
}

/// charges due installments off-session and folds successes through reconciliation
pub struct InstallmentCollector<S> {
    processor: Arc<ReconciliationProcessor<S>>,
    gateway: Arc<dyn PaymentGateway>,
}

impl<S: AccountRepository + UserRepository> InstallmentCollector<S> {
    pub fn new(processor: Arc<ReconciliationProcessor<S>>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { processor, gateway }
    }

    pub fn processor(&self) -> &Arc<ReconciliationProcessor<S>> {
        &self.processor
    }

    /// one charge attempt per due account; a failing account never stops the batch
    pub fn collect_due_installments(
        &self,
        as_of: NaiveDate,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<Vec<CollectionOutcome>, RepositoryError> {
        let due = self.processor.store().due_credit_accounts(as_of)?;
        info!(%as_of, accounts = due.len(), "collecting due installments");

        let mut outcomes = Vec::with_capacity(due.len());
        for account in due {
            let account_id = account.id;
            let outcome = match self.collect_one(account_id, as_of, time, events) {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(%account_id, %error, "installment collection failed");
                    CollectionOutcome::Failed {
                        account_id,
                        error: error.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let collected = outcomes.iter().filter(|o| o.is_collected()).count();
        info!(%as_of, collected, total = outcomes.len(), "collection run finished");
        Ok(outcomes)
    }

    fn collect_one(
        &self,
        account_id: AccountId,
        as_of: NaiveDate,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<CollectionOutcome, CreditError> {
        self.processor
            .locks()
            .with_lock(account_id, || self.collect_locked(account_id, as_of, time, events))
    }

    fn collect_locked(
        &self,
        account_id: AccountId,
        as_of: NaiveDate,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<CollectionOutcome, CreditError> {
        let store = self.processor.store();

        // re-read under the lock; a payment may have landed since the listing
        let Some(account) = store.load_account(account_id)? else {
            return Ok(skipped(account_id, "account no longer exists"));
        };
        if !account.is_due(as_of) {
            return Ok(skipped(account_id, "installment no longer due"));
        }

        let amount = account.next_installment();
        if !amount.is_positive() {
            return Ok(skipped(account_id, "nothing left to collect"));
        }

        let customer_ref = store
            .load_user(account.user_id)?
            .and_then(|user| user.gateway_customer_id);
        let Some(customer_ref) = customer_ref else {
            return Ok(skipped(account_id, &ChargeError::MissingCustomer.to_string()));
        };

        let converter = self.processor.converter();
        let gateway_amount = converter.to_gateway(amount);
        debug!(%account_id, %amount, %gateway_amount, "charging installment");

        match self
            .gateway
            .charge_customer(&customer_ref, gateway_amount, converter.gateway_currency())
        {
            Ok(payment_ref) => {
                events.emit(Event::InstallmentCharged {
                    account_id,
                    amount,
                    gateway_amount,
                    payment_ref: payment_ref.id.clone(),
                    timestamp: time.now(),
                });
                let event = PaymentEvent::for_account(
                    payment_ref.id.clone(),
                    account_id,
                    amount,
                    converter.to_gateway_minor(amount),
                );
                let reconciliation = self.processor.apply_locked(&event, account_id, time, events)?;
                Ok(CollectionOutcome::Collected {
                    account_id,
                    amount,
                    payment_ref: payment_ref.id,
                    reconciliation,
                })
            }
            Err(error) if error.is_decline() => self.record_decline(account, amount, &error, time, events),
            Err(error) => Err(error.into()),
        }
    }

    /// declined installment: overdue, missed payment counted, customer told
    fn record_decline(
        &self,
        mut account: CreditAccount,
        amount: Money,
        error: &ChargeError,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<CollectionOutcome, CreditError> {
        let store = self.processor.store();
        let now = time.now();

        let change = account.mark_overdue(now)?;
        events.emit(change.into_event(&account, error.to_string(), now));
        store.save_account(&account)?;

        if let Some(mut user) = store.load_user(account.user_id)? {
            user.standing.missed_payments += 1;
            store.save_user(user)?;
        }

        events.emit(Event::InstallmentDeclined {
            account_id: account.id,
            amount,
            reason: error.to_string(),
            timestamp: now,
        });
        dispatch(
            self.processor.notifier().as_ref(),
            NotificationKind::PaymentFailed,
            &account,
        );
        events.emit(Event::NotificationDue {
            account_id: account.id,
            kind: NotificationKind::PaymentFailed,
            timestamp: now,
        });
        warn!(account_id = %account.id, %amount, %error, "installment declined, account overdue");

        Ok(CollectionOutcome::Declined {
            account_id: account.id,
            amount,
            reason: error.to_string(),
        })
    }
}

fn skipped(account_id: AccountId, reason: &str) -> CollectionOutcome {
    debug!(%account_id, reason, "installment skipped");
    CollectionOutcome::Skipped {
        account_id,
        reason: reason.to_string(),
    }
}

/// explicit scheduler state: one run per date, nothing after shutdown
pub struct InstallmentScheduler<S> {
    collector: InstallmentCollector<S>,
    last_run: Option<NaiveDate>,
    shut_down: bool,
}

impl<S: AccountRepository + UserRepository> InstallmentScheduler<S> {
    pub fn new(collector: InstallmentCollector<S>) -> Self {
        Self {
            collector,
            last_run: None,
            shut_down: false,
        }
    }

    pub fn last_run(&self) -> Option<NaiveDate> {
        self.last_run
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// run today's cycle; `None` when this date was already processed
    pub fn run_cycle(
        &mut self,
        time: &SafeTimeProvider,
        events: &mut EventStore,
    ) -> Result<Option<Vec<CollectionOutcome>>, CreditError> {
        if self.shut_down {
            return Err(CreditError::SchedulerShutDown);
        }

        let as_of = time.now().date_naive();
        if self.last_run.is_some_and(|last| last >= as_of) {
            debug!(%as_of, "collection cycle already ran");
            return Ok(None);
        }

        let outcomes = self.collector.collect_due_installments(as_of, time, events)?;
        self.last_run = Some(as_of);
        Ok(Some(outcomes))
    }

    pub fn shutdown(&mut self) {
        if !self.shut_down {
            info!(last_run = ?self.last_run, "installment scheduler shut down");
        }
        self.shut_down = true;
    }
}
