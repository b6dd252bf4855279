/// bnpl lifecycle - application, plan, payments, pickup, all on controlled time
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use device_credit_rs::{
    telemetry, ApplicationDraft, ConfirmationMethod, CreditConfig, CreditService, EmploymentStatus,
    GuarantorRef, InMemoryStore, Item, Money, PaymentEvent, ProfileDetails, RecordingNotifier,
    SafeTimeProvider, ScriptedGateway, TimeSource, UserRepository,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CreditConfig::from_env()?;
    telemetry::init(&config.telemetry)?;

    println!("=== bnpl lifecycle example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
    ));
    let controller = time.test_control().unwrap();

    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let mut service = CreditService::new(store.clone(), config, gateway.clone(), notifier.clone())?;

    // staff member, customer and a guarantor with good standing
    let mut staff = service.register_user("desk", ProfileDetails::default(), &time)?;
    staff.is_staff = true;
    store.save_user(staff.clone())?;

    let customer = service.register_user(
        "kofi",
        ProfileDetails {
            first_name: Some("Kofi".into()),
            last_name: Some("Boateng".into()),
            email: Some("kofi@example.com".into()),
            phone_number: Some("0245550101".into()),
            national_id: Some("GHA-3301".into()),
            address: Some("12 Ring Road".into()),
            city: Some("Kumasi".into()),
            occupation: Some("Teacher".into()),
            monthly_income: Some(Money::from_major(4_000)),
            ..ProfileDetails::default()
        },
        &time,
    )?;
    service.verify_user(staff.id, customer.id, &time)?;

    let mut guarantor = service.register_user("abena", ProfileDetails::default(), &time)?;
    guarantor.details.national_id = Some("GHA-4410".into());
    guarantor.standing.internal_credit_score = 480;
    store.save_user(guarantor.clone())?;
    service.verify_user(staff.id, guarantor.id, &time)?;

    // apply for a phone over six months
    let item = Item::new("Galaxy A15", "Samsung", Money::from_major(480));
    let draft = ApplicationDraft::for_item(
        customer.id,
        &item,
        Money::from_major(4_000),
        Money::from_major(1_500),
        EmploymentStatus::FullTime,
        6,
        GuarantorRef::new("abena", "GHA-4410"),
    );
    let outcome = service.submit_application(draft, &item, &time)?;
    println!("application {:?}", outcome.application.status());
    println!("  {}", outcome.application.decision_reason());
    if !outcome.approved() {
        return Ok(());
    }

    service.verify_application(staff.id, outcome.application.id, &time)?;
    let account = service.open_credit_plan(customer.id, item, &time)?;
    println!(
        "\nplan opened: {} x {} GHS",
        account.installment_count, account.installment_amount
    );

    let account = service.confirm_card_setup(customer.id, account.id, "cus_kofi", &time)?;
    println!("card saved, first installment due {:?}", account.next_payment_due_date);

    // the customer pays one installment from the dashboard
    let session = service.create_payment_session(customer.id, account.id, account.installment_amount)?;
    println!("checkout session {}", session.id);
    let paid = PaymentEvent::for_account(&session.id, account.id, account.installment_amount, None);
    service.reconcile_payment(&paid, &time)?;

    // the gateway retries the same webhook; nothing changes
    let again = service.reconcile_payment(&paid, &time)?;
    println!("redelivered webhook ignored: {}", again.is_duplicate());

    // monthly collections until the plan is paid
    for month in 1..=6 {
        controller.advance(Duration::days(31));
        let outcomes = service.collect_due_installments(&time)?;
        let collected = outcomes.iter().filter(|o| o.is_collected()).count();
        println!(
            "{}: month {} collected {} installment(s)",
            time.now().format("%Y-%m-%d"),
            month,
            collected
        );
    }

    let view = service.account_view(account.id, &time)?;
    println!("\nprogress {}% status {:?}", view.progress.progress_percentage, view.status);

    // hand over the device
    service.mark_available_for_pickup(staff.id, account.id, "Kumasi City Mall", &time)?;
    service.confirm_pickup(customer.id, account.id, ConfirmationMethod::InStore, &time)?;
    service.close_account(staff.id, account.id, &time)?;

    println!("\nfinal state:");
    println!("{}", service.account_view(account.id, &time)?.to_json_pretty()?);
    println!("\n{} notification(s) sent", notifier.sent().len());
    println!("{} card charge(s)", gateway.charges().len());

    Ok(())
}
