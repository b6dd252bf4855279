/// daily collection - scheduler charging saved cards, with one card declining
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use device_credit_rs::billing::InstallmentPlan;
use device_credit_rs::{
    telemetry, AccountRepository, ChargeError, CollectionOutcome, CreditAccount, CreditConfig,
    EventStore, InMemoryStore, InstallmentCollector, InstallmentScheduler, Item, Money,
    RecordingNotifier, ReconciliationProcessor, SafeTimeProvider, ScriptedGateway, TimeSource,
    User, UserRepository, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CreditConfig::from_env()?;
    telemetry::init(&config.telemetry)?;

    println!("=== daily collection example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 2, 1, 6, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();
    let now = time.now();

    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());

    // two customers on twelve-month plans with saved cards
    let mut accounts = Vec::new();
    for (name, customer_ref, phone) in [
        ("yaw", "cus_yaw", "Tecno Spark 20"),
        ("esi", "cus_esi", "Infinix Hot 40"),
    ] {
        let mut user = User::new(name, now, config.tiers.starter_limit());
        user.is_verified = true;
        user.gateway_customer_id = Some(customer_ref.to_string());
        store.save_user(user.clone())?;

        let item = Item::new(phone, "Transsion", Money::from_major(1_200));
        let plan = InstallmentPlan::new(item.price, 12).ok_or("invalid plan")?;
        let mut account = CreditAccount::credit(user.id, item, plan, Uuid::new_v4(), now);
        account.confirm_card_setup(now.date_naive(), config.billing.billing_period_months, now)?;
        store.save_account(&account)?;
        accounts.push((name, account.id));
    }

    // esi's card starts declining
    gateway.fail_customer(
        "cus_esi",
        ChargeError::Declined {
            message: "insufficient funds".to_string(),
        },
    );

    let processor = Arc::new(ReconciliationProcessor::new(
        store.clone(),
        config,
        notifier.clone(),
    )?);
    let mut scheduler = InstallmentScheduler::new(InstallmentCollector::new(processor, gateway.clone()));
    let mut events = EventStore::new();

    // run once a day for five weeks
    for _ in 0..35 {
        controller.advance(Duration::days(1));
        let Some(outcomes) = scheduler.run_cycle(&time, &mut events)? else {
            continue;
        };
        for outcome in outcomes {
            let date = time.now().format("%Y-%m-%d");
            match outcome {
                CollectionOutcome::Collected { amount, payment_ref, .. } => {
                    println!("{date}: collected {amount} ({payment_ref})")
                }
                CollectionOutcome::Declined { amount, reason, .. } => {
                    println!("{date}: declined {amount}: {reason}")
                }
                CollectionOutcome::Skipped { reason, .. } => println!("{date}: skipped: {reason}"),
                CollectionOutcome::Failed { error, .. } => println!("{date}: failed: {error}"),
            }
        }
    }

    // a second run on the same day does nothing
    println!("\nrerun today: {:?}", scheduler.run_cycle(&time, &mut events)?.map(|o| o.len()));
    scheduler.shutdown();

    println!();
    for (name, account_id) in accounts {
        if let Some(account) = store.load_account(account_id)? {
            println!(
                "{name}: {:?}, paid {} of {}",
                account.status(),
                account.balance(),
                account.obligation().unwrap_or(Money::ZERO)
            );
        }
    }
    println!("{} payment-failed notification(s)", notifier.sent().len());
    println!("{} event(s) recorded", events.events().len());

    Ok(())
}
