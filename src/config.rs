use std::env;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::ConfigError;
use crate::scoring::tier::TierTable;

/// top-level configuration for the credit core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditConfig {
    pub tiers: TierTable,
    pub eligibility: EligibilityConfig,
    pub decision: DecisionConfig,
    pub billing: BillingConfig,
    pub telemetry: TelemetryConfig,
}

/// thresholds for basic eligibility and guarantor standing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityConfig {
    pub min_profile_completeness: Rate,
    pub min_credit_score: u32,
    pub min_guarantor_score: u32,
}

/// affordability limits applied by the decision engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConfig {
    /// monthly installment may not exceed this share of income
    pub max_payment_to_income: Rate,
    /// expenses / income may not exceed this ratio
    pub max_debt_to_income: Rate,
    pub installment_options: Vec<u32>,
    pub application_validity_days: u32,
}

/// currency and billing cycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingConfig {
    /// currency balances are kept in
    pub currency: String,
    /// currency the payment gateway charges in
    pub gateway_currency: String,
    /// units of `currency` per unit of `gateway_currency`
    pub exchange_rate: Decimal,
    pub billing_period_months: u32,
}

/// tracing controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl CreditConfig {
    /// production defaults
    pub fn standard() -> Self {
        Self {
            tiers: TierTable::standard(),
            eligibility: EligibilityConfig {
                min_profile_completeness: Rate::from_percentage(70),
                min_credit_score: 50,
                min_guarantor_score: 200,
            },
            decision: DecisionConfig {
                max_payment_to_income: Rate::from_percentage(50),
                max_debt_to_income: Rate::from_percentage(70),
                installment_options: vec![6, 12, 18, 24],
                application_validity_days: 30,
            },
            billing: BillingConfig {
                currency: "GHS".to_string(),
                gateway_currency: "USD".to_string(),
                exchange_rate: dec!(12.00),
                billing_period_months: 1,
            },
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
            },
        }
    }

    /// parse a json document and validate it
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: CreditConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// standard config overridden by `CREDIT_*` environment variables (and `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::standard();

        if let Ok(currency) = env::var("CREDIT_CURRENCY") {
            config.billing.currency = currency;
        }
        if let Ok(currency) = env::var("CREDIT_GATEWAY_CURRENCY") {
            config.billing.gateway_currency = currency;
        }
        if let Ok(rate) = env::var("CREDIT_EXCHANGE_RATE") {
            config.billing.exchange_rate = rate
                .parse::<Decimal>()
                .map_err(|_| invalid("CREDIT_EXCHANGE_RATE", &rate))?;
        }
        if let Ok(months) = env::var("CREDIT_BILLING_PERIOD_MONTHS") {
            config.billing.billing_period_months = months
                .parse::<u32>()
                .map_err(|_| invalid("CREDIT_BILLING_PERIOD_MONTHS", &months))?;
        }
        if let Ok(days) = env::var("CREDIT_APPLICATION_VALIDITY_DAYS") {
            config.decision.application_validity_days = days
                .parse::<u32>()
                .map_err(|_| invalid("CREDIT_APPLICATION_VALIDITY_DAYS", &days))?;
        }
        if let Ok(level) = env::var("CREDIT_LOG_LEVEL") {
            config.telemetry.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// reject settings the engines cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tiers.validate()?;

        if self.billing.exchange_rate <= Decimal::ZERO {
            return Err(ConfigError::Inconsistent {
                message: "exchange rate must be positive".to_string(),
            });
        }
        if self.billing.billing_period_months == 0 {
            return Err(ConfigError::Inconsistent {
                message: "billing period must be at least one month".to_string(),
            });
        }
        if self.decision.installment_options.is_empty()
            || self.decision.installment_options.contains(&0)
        {
            return Err(ConfigError::Inconsistent {
                message: "installment options must be non-empty and non-zero".to_string(),
            });
        }
        if self.eligibility.min_profile_completeness > Rate::ONE {
            return Err(ConfigError::Inconsistent {
                message: "profile completeness threshold cannot exceed 100%".to_string(),
            });
        }

        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "CREDIT_CURRENCY",
            "CREDIT_GATEWAY_CURRENCY",
            "CREDIT_EXCHANGE_RATE",
            "CREDIT_BILLING_PERIOD_MONTHS",
            "CREDIT_APPLICATION_VALIDITY_DAYS",
            "CREDIT_LOG_LEVEL",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_standard_config_is_valid() {
        let config = CreditConfig::standard();
        assert!(config.validate().is_ok());
        assert_eq!(config.decision.installment_options, vec![6, 12, 18, 24]);
        assert_eq!(config.eligibility.min_guarantor_score, 200);
    }

    #[test]
    fn test_json_round_trip() {
        let json = serde_json::to_string(&CreditConfig::standard()).unwrap();
        let parsed = CreditConfig::from_json(&json).unwrap();
        assert_eq!(parsed, CreditConfig::standard());
    }

    #[test]
    fn test_rejects_zero_exchange_rate() {
        let mut config = CreditConfig::standard();
        config.billing.exchange_rate = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(ConfigError::Inconsistent { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CREDIT_EXCHANGE_RATE", "15.5");
        env::set_var("CREDIT_LOG_LEVEL", "debug");

        let config = CreditConfig::from_env().expect("config loads");
        assert_eq!(config.billing.exchange_rate, dec!(15.5));
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.billing.currency, "GHS");
        reset_env();
    }

    #[test]
    fn test_env_rejects_garbage() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CREDIT_BILLING_PERIOD_MONTHS", "monthly");

        let result = CreditConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        reset_env();
    }
}
