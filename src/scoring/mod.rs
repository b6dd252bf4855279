pub mod tier;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::profile::CreditProfile;
use crate::types::CreditTier;

pub use tier::{TierBand, TierReviewPolicy, TierTable, UpgradeOnly};

pub const MAX_SCORE: u32 = 1_000;
pub const BASE_SCORE: u32 = 100;
pub const PAYMENT_HISTORY_MAX: u32 = 600;
pub const COMPLETENESS_MAX: u32 = 200;
pub const ACCOUNT_AGE_MAX: u32 = 100;
pub const USAGE_MAX: u32 = 100;

/// per-term contributions to the internal score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: u32,
    pub payment_history: u32,
    pub profile_completeness: u32,
    pub account_age: u32,
    pub usage: u32,
    pub total: u32,
}

/// score a profile snapshot; pure, never reads the clock
pub fn score(profile: &CreditProfile) -> u32 {
    score_breakdown(profile).total
}

pub fn score_breakdown(profile: &CreditProfile) -> ScoreBreakdown {
    let payment_history = payment_history_term(profile.successful_payments, profile.missed_payments);
    let profile_completeness = capped(
        Decimal::from(COMPLETENESS_MAX) * profile.profile_completeness.clamp_unit().as_decimal(),
        COMPLETENESS_MAX,
    );
    let account_age = capped(
        Decimal::from(profile.account_age_days) * Decimal::from(100) / Decimal::from(365),
        ACCOUNT_AGE_MAX,
    );
    // 20 points per 1000 of credit used
    let usage = capped(
        profile.total_credit_used.as_decimal() * Decimal::from(20) / Decimal::from(1_000),
        USAGE_MAX,
    );

    let total = (BASE_SCORE + payment_history + profile_completeness + account_age + usage)
        .min(MAX_SCORE);

    ScoreBreakdown {
        base: BASE_SCORE,
        payment_history,
        profile_completeness,
        account_age,
        usage,
        total,
    }
}

fn payment_history_term(successful: u32, missed: u32) -> u32 {
    let attempts = u64::from(successful) + u64::from(missed);
    if attempts == 0 {
        return 0;
    }
    capped(
        Decimal::from(PAYMENT_HISTORY_MAX) * Decimal::from(successful) / Decimal::from(attempts),
        PAYMENT_HISTORY_MAX,
    )
}

/// truncate to a whole number within [0, cap]
fn capped(value: Decimal, cap: u32) -> u32 {
    if value <= Decimal::ZERO {
        return 0;
    }
    value.floor().to_u32().unwrap_or(cap).min(cap)
}

/// result of re-scoring a profile and reviewing its tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileReview {
    pub previous_score: u32,
    pub score: u32,
    pub previous_tier: CreditTier,
    pub tier: CreditTier,
}

impl ProfileReview {
    pub fn tier_changed(&self) -> bool {
        self.previous_tier != self.tier
    }
}

/// recompute the score and apply the tier policy; tier, limit and review time move together
pub fn refresh_profile(
    profile: &mut CreditProfile,
    table: &TierTable,
    policy: &dyn TierReviewPolicy,
    now: DateTime<Utc>,
) -> ProfileReview {
    let previous_score = profile.internal_credit_score;
    let previous_tier = profile.credit_tier;

    profile.internal_credit_score = score(profile);

    let qualifying = table.qualifying_tier(profile.internal_credit_score, profile.successful_payments);
    let reviewed = policy.review(previous_tier, qualifying);

    if reviewed != previous_tier {
        if let Some(limit) = table.limit_for(reviewed) {
            profile.credit_tier = reviewed;
            profile.credit_limit = limit;
            profile.last_reviewed_at = Some(now);
        }
    }

    ProfileReview {
        previous_score,
        score: profile.internal_credit_score,
        previous_tier,
        tier: profile.credit_tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn profile() -> CreditProfile {
        CreditProfile {
            user_id: Uuid::new_v4(),
            username: "kofi".to_string(),
            national_id: Some("GHA-1".to_string()),
            is_verified: true,
            monthly_income: Some(Money::from_major(2_000)),
            successful_payments: 0,
            missed_payments: 0,
            total_credit_used: Money::ZERO,
            account_age_days: 0,
            profile_completeness: Rate::ZERO,
            credit_tier: CreditTier::Starter,
            credit_limit: Money::from_major(500),
            internal_credit_score: 0,
            last_reviewed_at: None,
            guarantor: None,
            guarantor_verified: false,
        }
    }

    #[test]
    fn test_empty_profile_scores_base_only() {
        let breakdown = score_breakdown(&profile());
        assert_eq!(breakdown.payment_history, 0);
        assert_eq!(breakdown.total, BASE_SCORE);
    }

    #[test]
    fn test_reference_scenario() {
        let mut p = profile();
        p.successful_payments = 9;
        p.missed_payments = 1;
        p.profile_completeness = Rate::ONE;
        p.account_age_days = 400;
        p.total_credit_used = Money::from_major(2_000);

        let breakdown = score_breakdown(&p);
        assert_eq!(breakdown.payment_history, 540);
        assert_eq!(breakdown.profile_completeness, 200);
        assert_eq!(breakdown.account_age, 100);
        assert_eq!(breakdown.usage, 40);
        assert_eq!(breakdown.total, 980);

        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let review = refresh_profile(&mut p, &TierTable::standard(), &UpgradeOnly, now);

        // gold needs 12 payments, only 9 made
        assert_eq!(review.tier, CreditTier::Silver);
        assert_eq!(p.credit_limit, Money::from_major(2_000));
        assert_eq!(p.last_reviewed_at, Some(now));
        assert_eq!(p.internal_credit_score, 980);
    }

    #[test]
    fn test_score_always_in_range() {
        let mut p = profile();
        for (successful, missed, days, used) in [
            (0, 0, 0, 0),
            (0, 50, 10, 0),
            (u32::MAX, 0, u32::MAX, 1_000_000_000),
            (40, 3, 5_000, 75_000),
        ] {
            p.successful_payments = successful;
            p.missed_payments = missed;
            p.account_age_days = days;
            p.total_credit_used = Money::from_major(used);
            p.profile_completeness = Rate::from_decimal(dec!(1.5));

            let s = score(&p);
            assert!(s <= MAX_SCORE, "score {} out of range", s);
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let mut p = profile();
        p.successful_payments = 4;
        p.missed_payments = 3;
        p.account_age_days = 120;
        p.profile_completeness = Rate::from_fraction(7, 10);
        p.total_credit_used = Money::from_str_exact("1234.56").unwrap();

        let first = score(&p);
        for _ in 0..10 {
            assert_eq!(score(&p), first);
        }
    }

    #[test]
    fn test_negative_usage_contributes_nothing() {
        let mut p = profile();
        p.total_credit_used = Money::from_major(-500);
        assert_eq!(score_breakdown(&p).usage, 0);
    }

    #[test]
    fn test_one_threshold_does_not_upgrade() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut p = profile();
        // high score via completeness/age/usage, but only two payments
        p.successful_payments = 2;
        p.profile_completeness = Rate::ONE;
        p.account_age_days = 730;
        p.total_credit_used = Money::from_major(10_000);

        let review = refresh_profile(&mut p, &TierTable::standard(), &UpgradeOnly, now);
        assert!(review.score >= 600);
        assert_eq!(review.tier, CreditTier::Starter);
        assert!(!review.tier_changed());
        assert_eq!(p.last_reviewed_at, None);
    }

    #[test]
    fn test_no_downgrade_when_missed_payments_rise() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut p = profile();
        p.credit_tier = CreditTier::Gold;
        p.credit_limit = Money::from_major(3_500);
        p.successful_payments = 1;
        p.missed_payments = 20;

        let review = refresh_profile(&mut p, &TierTable::standard(), &UpgradeOnly, now);
        assert_eq!(review.tier, CreditTier::Gold);
        assert_eq!(p.credit_limit, Money::from_major(3_500));
    }
}
