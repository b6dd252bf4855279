/// quick start - score a customer and see which tier they qualify for
use chrono::{Duration, TimeZone, Utc};
use device_credit_rs::scoring::score_breakdown;
use device_credit_rs::{telemetry, CreditConfig, Money, ProfileDetails, User};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CreditConfig::from_env()?;
    telemetry::init(&config.telemetry)?;

    // a customer who joined six months ago and has paid six installments
    let joined = Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap();
    let mut user = User::new("efua", joined, config.tiers.starter_limit());
    user.details = ProfileDetails {
        first_name: Some("Efua".into()),
        last_name: Some("Mensah".into()),
        email: Some("efua@example.com".into()),
        phone_number: Some("0201234567".into()),
        national_id: Some("GHA-7781".into()),
        monthly_income: Some(Money::from_major(2_500)),
        ..ProfileDetails::default()
    };
    user.is_verified = true;
    user.standing.successful_payments = 6;
    user.standing.total_credit_used = Money::from_major(1_200);

    let profile = user.credit_profile(joined + Duration::days(182));
    let breakdown = score_breakdown(&profile);

    println!("score: {}", breakdown.total);
    println!("  payment history:      {}", breakdown.payment_history);
    println!("  profile completeness: {}", breakdown.profile_completeness);
    println!("  account age:          {}", breakdown.account_age);
    println!("  usage:                {}", breakdown.usage);

    let tier = config
        .tiers
        .qualifying_tier(breakdown.total, profile.successful_payments);
    println!(
        "qualifies for {:?} with limit {}",
        tier,
        config.tiers.limit_for(tier).unwrap_or(Money::ZERO)
    );

    Ok(())
}
