use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::currency::CurrencyConverter;
use crate::decimal::Money;
use crate::errors::{ChargeError, ReconciliationError};
use crate::types::AccountId;

/// metadata key linking a gateway payment back to its account
pub const ACCOUNT_METADATA_KEY: &str = "credit_account_id";
/// metadata key carrying the amount in the local ledger currency
pub const ORIGINAL_AMOUNT_METADATA_KEY: &str = "original_amount";

/// gateway's receipt for a successful charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRef {
    pub id: String,
    pub amount: Money,
    pub currency: String,
}

/// hosted checkout request for an on-session payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSessionRequest {
    pub account_id: AccountId,
    pub customer_ref: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub id: String,
    pub url: Option<String>,
}

/// the external payment processor
pub trait PaymentGateway: Send + Sync {
    /// off-session charge against the customer's saved card; `amount` is in `currency`
    fn charge_customer(
        &self,
        customer_ref: &str,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentRef, ChargeError>;

    fn create_payment_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ChargeError>;
}

/// confirmed payment as delivered by webhook, poll, or a scheduled charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub correlation_id: String,
    /// amount charged, in gateway minor units
    #[serde(default)]
    pub amount_minor: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentEvent {
    /// event for a payment against `account_id` of `amount` in local currency
    pub fn for_account(
        correlation_id: impl Into<String>,
        account_id: AccountId,
        amount: Money,
        amount_minor: Option<i64>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            amount_minor,
            metadata: payment_metadata(account_id, amount),
        }
    }

    /// parse a raw json payload
    pub fn from_json(payload: &str) -> Result<Self, ReconciliationError> {
        let event: PaymentEvent =
            serde_json::from_str(payload).map_err(|e| ReconciliationError::MalformedEvent {
                message: e.to_string(),
            })?;
        if event.correlation_id.trim().is_empty() {
            return Err(ReconciliationError::MalformedEvent {
                message: "missing correlation id".to_string(),
            });
        }
        Ok(event)
    }

    /// account named in the metadata
    pub fn account_reference(&self) -> Result<AccountId, ReconciliationError> {
        let raw = self.metadata.get(ACCOUNT_METADATA_KEY).ok_or_else(|| {
            ReconciliationError::MalformedEvent {
                message: format!("missing {} in metadata", ACCOUNT_METADATA_KEY),
            }
        })?;
        Uuid::parse_str(raw.trim()).map_err(|_| ReconciliationError::UnknownAccount {
            reference: raw.clone(),
        })
    }

    /// local amount from metadata, else converted back from the gateway amount
    pub fn resolve_amount(&self, converter: &CurrencyConverter) -> Result<Money, ReconciliationError> {
        let amount = match self.metadata.get(ORIGINAL_AMOUNT_METADATA_KEY) {
            Some(raw) => Money::from_str_exact(raw.trim()).map_err(|_| {
                ReconciliationError::MalformedEvent {
                    message: format!("unparseable original amount '{}'", raw),
                }
            })?,
            None => match self.amount_minor {
                Some(minor) => converter.from_gateway_minor(minor),
                None => {
                    return Err(ReconciliationError::MalformedEvent {
                        message: "payment event carries no amount".to_string(),
                    })
                }
            },
        };

        if !amount.is_positive() {
            return Err(ReconciliationError::MalformedEvent {
                message: format!("non-positive payment amount {}", amount),
            });
        }
        Ok(amount)
    }
}

/// metadata every payment carries through the gateway
pub fn payment_metadata(account_id: AccountId, amount: Money) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(ACCOUNT_METADATA_KEY.to_string(), account_id.to_string());
    metadata.insert(ORIGINAL_AMOUNT_METADATA_KEY.to_string(), amount.to_string());
    metadata
}

/// a charge the scripted gateway accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRecord {
    pub customer_ref: String,
    pub amount: Money,
    pub currency: String,
    pub payment_ref: String,
}

/// in-process gateway with scripted declines, for tests and demos
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    failures: Mutex<HashMap<String, ChargeError>>,
    charges: Mutex<Vec<ChargeRecord>>,
    sessions: Mutex<Vec<PaymentSessionRequest>>,
    sequence: AtomicU64,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// every charge for `customer_ref` fails with `error`
    pub fn fail_customer(&self, customer_ref: impl Into<String>, error: ChargeError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(customer_ref.into(), error);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    pub fn charges(&self) -> Vec<ChargeRecord> {
        self.charges.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn sessions(&self) -> Vec<PaymentSessionRequest> {
        self.sessions.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{:06}", prefix, n)
    }
}

impl PaymentGateway for ScriptedGateway {
    fn charge_customer(
        &self,
        customer_ref: &str,
        amount: Money,
        currency: &str,
    ) -> Result<PaymentRef, ChargeError> {
        let scripted = self
            .failures
            .lock()
            .map_err(|_| ChargeError::Unavailable("gateway state poisoned".to_string()))?
            .get(customer_ref)
            .cloned();
        if let Some(error) = scripted {
            debug!(customer_ref, %error, "scripted charge failure");
            return Err(error);
        }

        let payment_ref = PaymentRef {
            id: self.next_id("pi"),
            amount,
            currency: currency.to_string(),
        };
        self.charges
            .lock()
            .map_err(|_| ChargeError::Unavailable("gateway state poisoned".to_string()))?
            .push(ChargeRecord {
                customer_ref: customer_ref.to_string(),
                amount,
                currency: currency.to_string(),
                payment_ref: payment_ref.id.clone(),
            });
        Ok(payment_ref)
    }

    fn create_payment_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSession, ChargeError> {
        let id = self.next_id("cs");
        self.sessions
            .lock()
            .map_err(|_| ChargeError::Unavailable("gateway state poisoned".to_string()))?
            .push(request.clone());
        Ok(PaymentSession {
            url: Some(format!("https://checkout.invalid/{}", id)),
            id,
        })
    }
}
