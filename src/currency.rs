use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::BillingConfig;
use crate::decimal::Money;
use crate::errors::ConfigError;

/// converts between the local ledger currency and the gateway's charging currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyConverter {
    local: String,
    gateway: String,
    /// local units per gateway unit
    rate: Decimal,
}

impl CurrencyConverter {
    pub fn new(
        local: impl Into<String>,
        gateway: impl Into<String>,
        rate: Decimal,
    ) -> Result<Self, ConfigError> {
        if rate <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "exchange_rate".to_string(),
                value: rate.to_string(),
            });
        }
        Ok(Self {
            local: local.into(),
            gateway: gateway.into(),
            rate,
        })
    }

    pub fn from_config(config: &BillingConfig) -> Result<Self, ConfigError> {
        Self::new(&config.currency, &config.gateway_currency, config.exchange_rate)
    }

    pub fn local_currency(&self) -> &str {
        &self.local
    }

    pub fn gateway_currency(&self) -> &str {
        &self.gateway
    }

    pub fn to_gateway(&self, local: Money) -> Money {
        local / self.rate
    }

    pub fn to_local(&self, gateway: Money) -> Money {
        gateway * self.rate
    }

    /// gateway amount in its smallest unit (cents)
    pub fn to_gateway_minor(&self, local: Money) -> Option<i64> {
        self.to_gateway(local).to_minor()
    }

    pub fn from_gateway_minor(&self, minor: i64) -> Money {
        self.to_local(Money::from_minor(minor))
    }

    pub fn format_local(&self, amount: Money) -> String {
        format!("{} {}", self.local, amount)
    }
}
