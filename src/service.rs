use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::account::{ConfirmationMethod, CreditAccount, StatusChange};
use crate::application::{ApplicationDraft, CreditApplication, DecisionEngine, DecisionOutcome};
use crate::billing::InstallmentPlan;
use crate::collector::{CollectionOutcome, InstallmentCollector, InstallmentScheduler};
use crate::config::CreditConfig;
use crate::currency::CurrencyConverter;
use crate::decimal::Money;
use crate::errors::{
    CreditError, ReconciliationError, Result, TransitionRejected, ValidationError, ValidationErrors,
};
use crate::events::{Event, EventStore};
use crate::gateway::{
    payment_metadata, PaymentEvent, PaymentGateway, PaymentSession, PaymentSessionRequest,
};
use crate::item::Item;
use crate::notify::{dispatch, normalize_phone_number, NotificationKind, Notifier};
use crate::profile::{ProfileDetails, User};
use crate::reconciliation::{ReconciliationOutcome, ReconciliationProcessor};
use crate::repository::{AccountRepository, ApplicationRepository, UserRepository};
use crate::transaction::Transaction;
use crate::types::{AccountId, ApplicationId, UserId};
use crate::view::AccountView;

/// per-account results of a bulk pickup update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkPickupReport {
    pub marked: Vec<AccountId>,
    pub failed: Vec<(AccountId, String)>,
}

impl BulkPickupReport {
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// user and staff actions over the credit core
pub struct CreditService<S> {
    store: Arc<S>,
    engine: DecisionEngine,
    processor: Arc<ReconciliationProcessor<S>>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    pub events: EventStore,
}

impl<S> CreditService<S>
where
    S: AccountRepository + UserRepository + ApplicationRepository,
{
    pub fn new(
        store: Arc<S>,
        config: CreditConfig,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;
        let processor = ReconciliationProcessor::new(store.clone(), config.clone(), notifier.clone())?;
        Ok(Self {
            store,
            engine: DecisionEngine::new(config),
            processor: Arc::new(processor),
            gateway,
            notifier,
            events: EventStore::new(),
        })
    }

    pub fn config(&self) -> &CreditConfig {
        self.engine.config()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn converter(&self) -> &CurrencyConverter {
        self.processor.converter()
    }

    /// shared processor, for webhook handlers running outside the service
    pub fn processor(&self) -> &Arc<ReconciliationProcessor<S>> {
        &self.processor
    }

    pub fn collector(&self) -> InstallmentCollector<S> {
        InstallmentCollector::new(self.processor.clone(), self.gateway.clone())
    }

    pub fn scheduler(&self) -> InstallmentScheduler<S> {
        InstallmentScheduler::new(self.collector())
    }

    // users

    pub fn register_user(
        &mut self,
        username: impl Into<String>,
        details: ProfileDetails,
        time: &SafeTimeProvider,
    ) -> Result<User> {
        let mut user = User::new(username, time.now(), self.config().tiers.starter_limit());
        user.details = ProfileDetails {
            phone_number: details
                .phone_number
                .as_deref()
                .and_then(normalize_phone_number),
            ..details
        };
        self.store.save_user(user.clone())?;
        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// staff confirmation of the customer's identity
    pub fn verify_user(
        &mut self,
        staff_id: UserId,
        user_id: UserId,
        time: &SafeTimeProvider,
    ) -> Result<User> {
        self.require_staff(staff_id, "verify users")?;
        let mut user = self.load_user(user_id)?;
        if !user.is_verified {
            user.is_verified = true;
            self.store.save_user(user.clone())?;
            self.events.emit(Event::UserVerified {
                user_id,
                verified_by: staff_id,
                timestamp: time.now(),
            });
            info!(%user_id, %staff_id, "user verified");
        }
        Ok(user)
    }

    // applications

    /// score, check and decide; an approved guarantor is remembered on the user
    pub fn submit_application(
        &mut self,
        draft: ApplicationDraft,
        item: &Item,
        time: &SafeTimeProvider,
    ) -> Result<DecisionOutcome> {
        let mut user = self.load_user(draft.user_id)?;
        // one live plan per user, so nothing is owed against the limit here
        self.ensure_no_live_plan(user.id)?;

        let guarantor = draft.guarantor();
        let mut profile = user.credit_profile(time.now());
        let outcome = self.engine.decide(
            draft,
            &mut profile,
            item,
            Money::ZERO,
            self.store.as_ref(),
            time,
            &mut self.events,
        )?;

        user.absorb_review(&profile);
        if outcome.approved() {
            user.guarantor = Some(guarantor);
            user.guarantor_verified = false;
        }
        self.store.save_user(user)?;
        self.store.save_application(&outcome.application)?;
        Ok(outcome)
    }

    /// staff confirmation that money may flow against an approved application
    pub fn verify_application(
        &mut self,
        staff_id: UserId,
        application_id: ApplicationId,
        time: &SafeTimeProvider,
    ) -> Result<CreditApplication> {
        self.require_staff(staff_id, "verify applications")?;
        let mut application = self
            .store
            .load_application(application_id)?
            .ok_or(CreditError::ApplicationNotFound { id: application_id })?;

        let now = time.now();
        application.verify_for_payment(staff_id, now)?;
        self.store.save_application(&application)?;

        let mut applicant = self.load_user(application.user_id)?;
        applicant.guarantor_verified = true;
        self.store.save_user(applicant)?;

        self.events.emit(Event::ApplicationVerified {
            application_id,
            verified_by: staff_id,
            timestamp: now,
        });
        info!(%application_id, %staff_id, "application verified for payment");
        Ok(application)
    }

    /// expire the user's pending or unverified applications past the validity window
    pub fn expire_stale_applications(&mut self, user_id: UserId, time: &SafeTimeProvider) -> Result<usize> {
        let now = time.now();
        let validity_days = self.config().decision.application_validity_days;
        let mut expired = 0;

        for mut application in self.store.applications_for_user(user_id)? {
            if application.is_stale(now, validity_days) && application.expire(now) {
                self.store.save_application(&application)?;
                self.events.emit(Event::ApplicationExpired {
                    application_id: application.id,
                    timestamp: now,
                });
                expired += 1;
            }
        }

        if expired > 0 {
            info!(%user_id, expired, "stale applications expired");
        }
        Ok(expired)
    }

    // plan opening

    pub fn select_savings_plan(
        &mut self,
        user_id: UserId,
        item: Item,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        let user = self.load_user(user_id)?;
        if !user.is_verified {
            return Err(CreditError::UserNotVerified {
                action: "starting a savings plan",
            });
        }
        self.ensure_no_live_plan(user_id)?;
        if !item.is_active || item.stock == 0 {
            return Err(ValidationErrors(vec![ValidationError::ItemUnavailable]).into());
        }

        let account = CreditAccount::savings(user_id, item, time.now());
        self.store.save_account(&account)?;
        self.opened(&account, time);
        Ok(account)
    }

    /// a credit plan for an item the user holds a verified application for
    pub fn open_credit_plan(
        &mut self,
        user_id: UserId,
        item: Item,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        let user = self.load_user(user_id)?;
        if !user.is_verified {
            return Err(CreditError::UserNotVerified {
                action: "opening a credit plan",
            });
        }
        self.ensure_no_live_plan(user_id)?;

        let application = self
            .store
            .applications_for_user(user_id)?
            .into_iter()
            .find(|a| a.is_verified_for(item.id))
            .ok_or(CreditError::NoVerifiedApplication)?;

        let plan = InstallmentPlan::new(item.price, application.installment_count)
            .ok_or(CreditError::InvalidAmount { amount: item.price })?;
        let mut account = CreditAccount::credit(user_id, item, plan, application.id, time.now());
        account.payment_allowed = application.payment_allowed();

        self.store.save_account(&account)?;
        self.opened(&account, time);
        Ok(account)
    }

    pub fn accept_terms(
        &mut self,
        user_id: UserId,
        account_id: AccountId,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        let locks = self.processor.locks().clone();
        locks.with_lock(account_id, || {
            let mut account = self.owned_account(user_id, account_id)?;
            account.accept_terms(time.now())?;
            self.store.save_account(&account)?;
            Ok(account)
        })
    }

    pub fn approve_account(
        &mut self,
        staff_id: UserId,
        account_id: AccountId,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        self.require_staff(staff_id, "approve plans")?;
        self.transition(account_id, "approved by staff", time, |account, now| account.approve(now))
    }

    pub fn decline_account(
        &mut self,
        staff_id: UserId,
        account_id: AccountId,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        self.require_staff(staff_id, "decline plans")?;
        self.transition(account_id, "declined by staff", time, |account, now| account.decline(now))
    }

    /// card saved with the gateway; installments start one period later
    pub fn confirm_card_setup(
        &mut self,
        user_id: UserId,
        account_id: AccountId,
        customer_ref: impl Into<String>,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        self.owned_account(user_id, account_id)?;
        let mut user = self.load_user(user_id)?;
        user.gateway_customer_id = Some(customer_ref.into());
        self.store.save_user(user)?;

        let period = self.config().billing.billing_period_months;
        let account = self.transition(account_id, "card set up", time, |account, now| {
            account.confirm_card_setup(now.date_naive(), period, now)
        })?;
        info!(
            %account_id,
            first_due = ?account.next_payment_due_date,
            installment = %account.installment_amount,
            "installments scheduled"
        );
        Ok(account)
    }

    // payments

    /// hosted checkout for a manual payment of `amount` in local currency
    pub fn create_payment_session(
        &mut self,
        user_id: UserId,
        account_id: AccountId,
        amount: Money,
    ) -> Result<PaymentSession> {
        if !amount.is_positive() {
            return Err(CreditError::InvalidAmount { amount });
        }
        let account = self.owned_account(user_id, account_id)?;
        if !account.status().accepts_payment() {
            return Err(ReconciliationError::InvalidState {
                account_id,
                status: account.status(),
            }
            .into());
        }
        if !account.payment_allowed {
            return Err(ReconciliationError::PaymentNotAllowed { account_id }.into());
        }

        let user = self.load_user(user_id)?;
        let description = match &account.item {
            Some(item) => format!("Payment towards {}", item.display_name()),
            None => "Plan payment".to_string(),
        };
        let request = PaymentSessionRequest {
            account_id,
            customer_ref: user.gateway_customer_id,
            amount: self.converter().to_gateway(amount),
            currency: self.converter().gateway_currency().to_string(),
            description,
            metadata: payment_metadata(account_id, amount),
        };
        let session = self.gateway.create_payment_session(&request)?;
        info!(%account_id, session_id = %session.id, %amount, "payment session created");
        Ok(session)
    }

    pub fn reconcile_payment(
        &mut self,
        event: &PaymentEvent,
        time: &SafeTimeProvider,
    ) -> Result<ReconciliationOutcome> {
        Ok(self.processor.apply(event, time, &mut self.events)?)
    }

    /// raw webhook body to reconciliation
    pub fn reconcile_webhook(&mut self, payload: &str, time: &SafeTimeProvider) -> Result<ReconciliationOutcome> {
        let event = PaymentEvent::from_json(payload)?;
        self.reconcile_payment(&event, time)
    }

    /// run the collector for today
    pub fn collect_due_installments(&mut self, time: &SafeTimeProvider) -> Result<Vec<CollectionOutcome>> {
        let collector = self.collector();
        Ok(collector.collect_due_installments(time.now().date_naive(), time, &mut self.events)?)
    }

    /// refund what was paid in, then remove the plan and its ledger
    pub fn cancel_plan(
        &mut self,
        user_id: UserId,
        account_id: AccountId,
        time: &SafeTimeProvider,
    ) -> Result<Money> {
        let locks = self.processor.locks().clone();
        locks.with_lock(account_id, || self.cancel_locked(user_id, account_id, time))
    }

    fn cancel_locked(
        &mut self,
        user_id: UserId,
        account_id: AccountId,
        time: &SafeTimeProvider,
    ) -> Result<Money> {
        let account = self.owned_account(user_id, account_id)?;
        if !account.can_cancel() {
            return Err(CreditError::CancellationNotAllowed {
                status: account.status(),
            });
        }

        let now = time.now();
        let refunded = account.balance();
        if refunded.is_positive() {
            let refund = Transaction::refund(account_id, refunded, now);
            let correlation_id = refund.correlation_id.clone();
            self.store.append_transaction(refund)?;
            self.events.emit(Event::RefundIssued {
                account_id,
                amount: refunded,
                correlation_id,
                timestamp: now,
            });
        }

        self.store.delete_account(account_id)?;
        self.events.emit(Event::AccountCancelled {
            account_id,
            user_id,
            refunded,
            timestamp: now,
        });
        info!(%account_id, %user_id, %refunded, "plan cancelled");
        Ok(refunded)
    }

    // pickup

    pub fn mark_available_for_pickup(
        &mut self,
        staff_id: UserId,
        account_id: AccountId,
        location: &str,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        self.require_staff(staff_id, "mark devices ready for pickup")?;
        self.pickup_ready(staff_id, account_id, location, time)
    }

    /// one failure never stops the rest
    pub fn bulk_mark_available_for_pickup(
        &mut self,
        staff_id: UserId,
        account_ids: &[AccountId],
        location: &str,
        time: &SafeTimeProvider,
    ) -> Result<BulkPickupReport> {
        self.require_staff(staff_id, "mark devices ready for pickup")?;

        let mut report = BulkPickupReport::default();
        for &account_id in account_ids {
            match self.pickup_ready(staff_id, account_id, location, time) {
                Ok(_) => report.marked.push(account_id),
                Err(error) => {
                    warn!(%account_id, %error, "could not mark ready for pickup");
                    report.failed.push((account_id, error.to_string()));
                }
            }
        }
        info!(
            marked = report.marked_count(),
            failed = report.failed_count(),
            "bulk pickup update finished"
        );
        Ok(report)
    }

    pub fn confirm_pickup(
        &mut self,
        user_id: UserId,
        account_id: AccountId,
        method: ConfirmationMethod,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        self.owned_account(user_id, account_id)?;
        self.transition(account_id, "pickup confirmed", time, |account, now| {
            account.confirm_pickup(method, now)
        })
    }

    pub fn close_account(
        &mut self,
        staff_id: UserId,
        account_id: AccountId,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        self.require_staff(staff_id, "close plans")?;
        self.transition(account_id, "closed after pickup", time, |account, now| account.close(now))
    }

    // maintenance and reads

    /// recompute every stored `is_active_plan` flag; returns how many were stale
    pub fn repair_active_plan_flags(&mut self) -> Result<usize> {
        let mut repaired = 0;
        for mut account in self.store.all_accounts()? {
            if account.refresh_active_plan_flag() {
                self.store.save_account(&account)?;
                repaired += 1;
            }
        }
        if repaired > 0 {
            warn!(repaired, "stale active-plan flags repaired");
        }
        Ok(repaired)
    }

    pub fn account_view(&self, account_id: AccountId, time: &SafeTimeProvider) -> Result<AccountView> {
        let account = self.load_account(account_id)?;
        Ok(AccountView::from_account(
            &account,
            time.now().date_naive(),
            self.converter().local_currency(),
        ))
    }

    // helpers

    fn pickup_ready(
        &mut self,
        staff_id: UserId,
        account_id: AccountId,
        location: &str,
        time: &SafeTimeProvider,
    ) -> Result<CreditAccount> {
        let account = self.transition(account_id, "ready for pickup", time, |account, now| {
            account.mark_available_for_pickup(staff_id, location, now)
        })?;
        dispatch(self.notifier.as_ref(), NotificationKind::PickupReady, &account);
        self.events.emit(Event::NotificationDue {
            account_id,
            kind: NotificationKind::PickupReady,
            timestamp: time.now(),
        });
        Ok(account)
    }

    /// load, apply one guarded transition, save and record it, under the account lock
    fn transition<F>(
        &mut self,
        account_id: AccountId,
        reason: &str,
        time: &SafeTimeProvider,
        apply: F,
    ) -> Result<CreditAccount>
    where
        F: FnOnce(&mut CreditAccount, DateTime<Utc>) -> std::result::Result<StatusChange, TransitionRejected>,
    {
        let locks = self.processor.locks().clone();
        locks.with_lock(account_id, || {
            let mut account = self.load_account(account_id)?;
            let now = time.now();
            let change = apply(&mut account, now)?;
            self.store.save_account(&account)?;
            self.events.emit(change.into_event(&account, reason, now));
            info!(%account_id, from = %change.from, to = %change.to, reason, "account status changed");
            Ok(account)
        })
    }

    fn opened(&mut self, account: &CreditAccount, time: &SafeTimeProvider) {
        self.events.emit(Event::AccountOpened {
            account_id: account.id,
            user_id: account.user_id,
            account_type: account.account_type,
            status: account.status(),
            obligation: account.obligation().unwrap_or(Money::ZERO),
            timestamp: time.now(),
        });
        info!(
            account_id = %account.id,
            user_id = %account.user_id,
            account_type = ?account.account_type,
            "plan opened"
        );
    }

    fn load_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .load_user(user_id)?
            .ok_or(CreditError::UserNotFound { id: user_id })
    }

    fn load_account(&self, account_id: AccountId) -> Result<CreditAccount> {
        self.store
            .load_account(account_id)?
            .ok_or(CreditError::AccountNotFound { id: account_id })
    }

    fn owned_account(&self, user_id: UserId, account_id: AccountId) -> Result<CreditAccount> {
        let account = self.load_account(account_id)?;
        if !account.owned_by(user_id) {
            return Err(CreditError::NotAccountOwner { account_id });
        }
        Ok(account)
    }

    fn require_staff(&self, staff_id: UserId, action: &'static str) -> Result<User> {
        let staff = self.load_user(staff_id)?;
        if !staff.is_staff {
            return Err(CreditError::StaffOnly { action });
        }
        Ok(staff)
    }

    fn ensure_no_live_plan(&self, user_id: UserId) -> Result<()> {
        match self
            .store
            .accounts_for_user(user_id)?
            .into_iter()
            .find(|a| a.is_active_plan())
        {
            Some(live) => Err(CreditError::PlanAlreadyActive { account_id: live.id }),
            None => Ok(()),
        }
    }
}
