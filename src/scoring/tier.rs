use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::ConfigError;
use crate::types::CreditTier;

/// thresholds and limit for one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierBand {
    pub tier: CreditTier,
    pub min_score: u32,
    pub min_successful_payments: u32,
    pub credit_limit: Money,
}

impl TierBand {
    /// both thresholds must hold
    pub fn admits(&self, score: u32, successful_payments: u32) -> bool {
        score >= self.min_score && successful_payments >= self.min_successful_payments
    }
}

/// ascending tier table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    bands: Vec<TierBand>,
}

impl TierTable {
    pub fn standard() -> Self {
        Self {
            bands: vec![
                band(CreditTier::Starter, 0, 0, 500),
                band(CreditTier::Bronze, 200, 3, 1_000),
                band(CreditTier::Silver, 400, 6, 2_000),
                band(CreditTier::Gold, 600, 12, 3_500),
                band(CreditTier::Platinum, 800, 24, 5_000),
            ],
        }
    }

    pub fn new(bands: Vec<TierBand>) -> Result<Self, ConfigError> {
        let table = Self { bands };
        table.validate()?;
        Ok(table)
    }

    pub fn bands(&self) -> &[TierBand] {
        &self.bands
    }

    pub fn band(&self, tier: CreditTier) -> Option<&TierBand> {
        self.bands.iter().find(|b| b.tier == tier)
    }

    pub fn limit_for(&self, tier: CreditTier) -> Option<Money> {
        self.band(tier).map(|b| b.credit_limit)
    }

    /// entry tier, the first band
    pub fn starter_limit(&self) -> Money {
        self.bands.first().map(|b| b.credit_limit).unwrap_or(Money::ZERO)
    }

    /// highest tier whose score and payment thresholds are both met
    pub fn qualifying_tier(&self, score: u32, successful_payments: u32) -> CreditTier {
        self.bands
            .iter()
            .filter(|b| b.admits(score, successful_payments))
            .map(|b| b.tier)
            .max()
            .unwrap_or(CreditTier::Starter)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bands.len() != CreditTier::ALL.len() {
            return Err(ConfigError::Inconsistent {
                message: format!("tier table needs {} bands", CreditTier::ALL.len()),
            });
        }

        for (band, expected) in self.bands.iter().zip(CreditTier::ALL) {
            if band.tier != expected {
                return Err(ConfigError::Inconsistent {
                    message: format!("tier table out of order at {}", band.tier),
                });
            }
        }

        for pair in self.bands.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.min_score < lower.min_score
                || upper.min_successful_payments < lower.min_successful_payments
                || upper.credit_limit <= lower.credit_limit
            {
                return Err(ConfigError::Inconsistent {
                    message: format!("tier {} does not dominate {}", upper.tier, lower.tier),
                });
            }
        }

        Ok(())
    }
}

fn band(tier: CreditTier, min_score: u32, min_successful_payments: u32, limit: i64) -> TierBand {
    TierBand {
        tier,
        min_score,
        min_successful_payments,
        credit_limit: Money::from_major(limit),
    }
}

/// decides the tier after a review; the seam for any future downgrade rule
pub trait TierReviewPolicy: Send + Sync {
    fn review(&self, current: CreditTier, qualifying: CreditTier) -> CreditTier;
}

/// tiers only ever go up
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeOnly;

impl TierReviewPolicy for UpgradeOnly {
    fn review(&self, current: CreditTier, qualifying: CreditTier) -> CreditTier {
        current.max(qualifying)
    }
}
