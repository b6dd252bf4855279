/// serializable dashboard summary of an account
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{CreditAccount, PickupDetails};
use crate::decimal::Money;
use crate::types::{AccountId, AccountStatus, AccountType, UserId};

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub user_id: UserId,
    pub account_type: AccountType,
    pub status: AccountStatus,
    pub is_active_plan: bool,
    pub item: Option<ItemView>,
    pub progress: ProgressView,
    pub schedule: Option<ScheduleView>,
    pub pickup: PickupDetails,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemView {
    pub name: String,
    pub price: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressView {
    pub currency: String,
    pub obligation: Option<Money>,
    pub balance: Money,
    pub remaining: Money,
    pub progress_percentage: u32,
    pub last_payment_date: Option<NaiveDate>,
}

/// installment schedule, credit plans only
#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleView {
    pub installment_amount: Money,
    pub installment_count: u32,
    pub remaining_installments: u32,
    pub next_installment: Money,
    pub next_payment_due: Option<NaiveDate>,
    pub is_overdue: bool,
}

impl AccountView {
    pub fn from_account(account: &CreditAccount, as_of: NaiveDate, currency: &str) -> Self {
        let schedule = account.plan().map(|_| ScheduleView {
            installment_amount: account.installment_amount,
            installment_count: account.installment_count,
            remaining_installments: account.remaining_installments(),
            next_installment: account.next_installment(),
            next_payment_due: account.next_payment_due_date,
            is_overdue: account.is_overdue(as_of),
        });

        AccountView {
            id: account.id,
            user_id: account.user_id,
            account_type: account.account_type,
            status: account.status(),
            is_active_plan: account.is_active_plan(),
            item: account.item.as_ref().map(|item| ItemView {
                name: item.display_name(),
                price: item.price,
            }),
            progress: ProgressView {
                currency: currency.to_string(),
                obligation: account.obligation(),
                balance: account.balance(),
                remaining: account.remaining_balance(),
                progress_percentage: account.progress_percentage(),
                last_payment_date: account.last_payment_date,
            },
            schedule,
            pickup: account.pickup.clone(),
            created_at: account.created_at,
            completed_at: account.completed_at,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::InstallmentPlan;
    use crate::item::Item;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_credit_view_reports_schedule() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
        let item = Item::new("Pixel 8", "Google", Money::from_major(2_400));
        let plan = InstallmentPlan::new(item.price, 12).unwrap();
        let mut account = CreditAccount::credit(Uuid::new_v4(), item, plan, Uuid::new_v4(), now);
        account.confirm_card_setup(now.date_naive(), 1, now).unwrap();
        account.credit_payment(Money::from_major(600), now.date_naive());

        let view = AccountView::from_account(&account, now.date_naive(), "GHS");
        assert_eq!(view.progress.progress_percentage, 25);
        assert_eq!(view.progress.remaining, Money::from_major(1_800));

        let schedule = view.schedule.as_ref().unwrap();
        assert_eq!(schedule.remaining_installments, 9);
        assert!(!schedule.is_overdue);

        let json = view.to_json_pretty().unwrap();
        assert!(json.contains("\"REPAYING\""));
        assert!(json.contains("Google Pixel 8"));
    }

    #[test]
    fn test_savings_view_has_no_schedule() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap();
        let account = CreditAccount::savings(
            Uuid::new_v4(),
            Item::new("Nord CE 4", "OnePlus", Money::from_major(1_500)),
            now,
        );
        let view = AccountView::from_account(&account, now.date_naive(), "GHS");
        assert!(view.schedule.is_none());
        assert_eq!(view.progress.obligation, Some(Money::from_major(1_500)));
    }
}
