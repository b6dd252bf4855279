pub mod account;
pub mod application;
pub mod billing;
pub mod collector;
pub mod config;
pub mod currency;
pub mod decimal;
pub mod eligibility;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod item;
pub mod notify;
pub mod profile;
pub mod reconciliation;
pub mod repository;
pub mod scoring;
pub mod service;
pub mod telemetry;
pub mod transaction;
pub mod types;
pub mod view;

// re-export key types
pub use account::{ConfirmationMethod, CreditAccount, PickupDetails, StatusChange};
pub use application::{
    ApplicationDraft, CheckKind, CreditApplication, DecisionCheck, DecisionEngine, DecisionOutcome,
};
pub use billing::InstallmentPlan;
pub use collector::{CollectionOutcome, InstallmentCollector, InstallmentScheduler};
pub use config::CreditConfig;
pub use currency::CurrencyConverter;
pub use decimal::{Money, Rate};
pub use eligibility::{
    has_valid_guarantor, is_eligible_for_credit, validate_guarantor, GuarantorRejection,
    GuarantorValidation,
};
pub use errors::{
    ChargeError, CreditError, ReconciliationError, RepositoryError, Result, TransitionRejected,
    ValidationError,
};
pub use events::{Event, EventStore};
pub use gateway::{PaymentEvent, PaymentGateway, PaymentRef, ScriptedGateway};
pub use item::Item;
pub use notify::{NoopNotifier, NotificationKind, Notifier, RecordingNotifier};
pub use profile::{CreditProfile, GuarantorRef, ProfileDetails, User};
pub use reconciliation::{ReconciliationOutcome, ReconciliationProcessor};
pub use repository::{AccountRepository, ApplicationRepository, InMemoryStore, UserRepository};
pub use scoring::{score, TierReviewPolicy, TierTable, UpgradeOnly};
pub use service::CreditService;
pub use transaction::Transaction;
pub use types::{
    AccountId, AccountStatus, AccountType, ApplicationId, ApplicationStatus, CreditTier,
    EmploymentStatus, ItemId, TransactionType, UserId,
};
pub use view::AccountView;

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
