use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::CreditAccount;
use crate::errors::NotifyError;
use crate::types::AccountId;

/// messages the core decides are due; delivery is someone else's job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PlanCompleted,
    PickupReady,
    PaymentFailed,
}

impl NotificationKind {
    pub fn subject(&self, account: &CreditAccount) -> String {
        let device = device_name(account);
        match self {
            NotificationKind::PlanCompleted => format!("Your plan for the {} is complete", device),
            NotificationKind::PickupReady => format!("Your {} is ready for pickup", device),
            NotificationKind::PaymentFailed => format!("Installment payment for your {} failed", device),
        }
    }

    pub fn message(&self, account: &CreditAccount) -> String {
        let device = device_name(account);
        match self {
            NotificationKind::PlanCompleted => format!(
                "Congratulations! Your plan for the {} is complete. \
                 You will get another message when it is ready for pickup.",
                device
            ),
            NotificationKind::PickupReady => format!(
                "Great news! Your {} is ready for pickup at {}. Bring a valid ID.",
                device,
                account.pickup.location.as_deref().unwrap_or("our store")
            ),
            NotificationKind::PaymentFailed => format!(
                "We could not collect your installment of {} for the {}. \
                 Please update your card to avoid further penalties.",
                account.next_installment(),
                device
            ),
        }
    }
}

fn device_name(account: &CreditAccount) -> String {
    match &account.item {
        Some(item) => item.display_name(),
        None => "your device".to_string(),
    }
}

/// outbound email/SMS collaborator
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotificationKind, account: &CreditAccount) -> Result<(), NotifyError>;
}

/// fire and forget; failures are logged, never propagated
pub fn dispatch(notifier: &dyn Notifier, kind: NotificationKind, account: &CreditAccount) {
    match notifier.notify(kind, account) {
        Ok(()) => debug!(account_id = %account.id, ?kind, "notification sent"),
        Err(error) => warn!(account_id = %account.id, ?kind, %error, "notification failed"),
    }
}

/// drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _kind: NotificationKind, _account: &CreditAccount) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// keeps what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(NotificationKind, AccountId)>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// records nothing and reports a transport error every time
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<(NotificationKind, AccountId)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotificationKind, account: &CreditAccount) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::Transport("recording notifier set to fail".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("notifier state poisoned".to_string()))?
            .push((kind, account.id));
        Ok(())
    }
}

/// international format for Ghana numbers; `None` for blank input
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let normalized = if digits.starts_with("233") {
        format!("+{}", digits)
    } else if let Some(local) = digits.strip_prefix('0') {
        format!("+233{}", local)
    } else if digits.len() == 9 {
        format!("+233{}", digits)
    } else if raw.starts_with('+') {
        raw.to_string()
    } else {
        format!("+{}", digits)
    };
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::item::Item;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn account() -> CreditAccount {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 9, 0, 0).unwrap();
        CreditAccount::savings(
            Uuid::new_v4(),
            Item::new("iPhone 15", "Apple", Money::from_major(9_000)),
            now,
        )
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone_number("024 123 4567").as_deref(), Some("+233241234567"));
        assert_eq!(normalize_phone_number("233241234567").as_deref(), Some("+233241234567"));
        assert_eq!(normalize_phone_number("+233 24 123 4567").as_deref(), Some("+233241234567"));
        assert_eq!(normalize_phone_number("241234567").as_deref(), Some("+233241234567"));
        assert_eq!(normalize_phone_number("+1 (415) 555-0100").as_deref(), Some("+1 (415) 555-0100"));
        assert_eq!(normalize_phone_number("14155550100").as_deref(), Some("+14155550100"));
        assert_eq!(normalize_phone_number("  "), None);
    }

    #[test]
    fn test_dispatch_swallows_failures() {
        let account = account();
        let failing = RecordingNotifier::failing();
        dispatch(&failing, NotificationKind::PlanCompleted, &account);
        assert!(failing.sent().is_empty());

        let recording = RecordingNotifier::new();
        dispatch(&recording, NotificationKind::PickupReady, &account);
        assert_eq!(recording.count(NotificationKind::PickupReady), 1);
    }

    #[test]
    fn test_message_mentions_device_and_location() {
        let mut account = account();
        account.pickup.location = Some("Accra Mall".into());
        let text = NotificationKind::PickupReady.message(&account);
        assert!(text.contains("Apple iPhone 15"));
        assert!(text.contains("Accra Mall"));

        account.item = None;
        assert!(NotificationKind::PlanCompleted.subject(&account).contains("your device"));
    }
}
