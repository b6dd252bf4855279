use chrono::{Months, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;

/// fixed installment schedule for a credit plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub loan_amount: Money,
    pub installment_count: u32,
    pub installment_amount: Money,
}

impl InstallmentPlan {
    /// equal installments rounded to cents; `None` for a zero count
    pub fn new(loan_amount: Money, installment_count: u32) -> Option<Self> {
        let installment_amount = monthly_payment(loan_amount, installment_count)?;
        Some(Self {
            loan_amount,
            installment_count,
            installment_amount,
        })
    }

    /// last installment absorbs the rounding difference
    pub fn final_installment(&self) -> Money {
        let regular = self.installment_amount
            * Decimal::from(self.installment_count.saturating_sub(1));
        (self.loan_amount - regular).non_negative()
    }

    /// scheduled charges still needed to cover the loan
    pub fn installments_left(&self, paid: Money) -> u32 {
        let remaining = (self.loan_amount - paid).non_negative();
        if remaining.is_zero() {
            return 0;
        }
        let last = self.final_installment();
        if remaining <= last || !self.installment_amount.is_positive() {
            return 1;
        }
        let regular = (remaining - last).as_decimal() / self.installment_amount.as_decimal();
        regular.ceil().to_u32().unwrap_or(0).saturating_add(1)
    }

    /// amount to charge next given what has been paid so far; the last
    /// installment takes whatever is left, rounding difference included
    pub fn next_charge(&self, paid: Money) -> Money {
        let remaining = (self.loan_amount - paid).non_negative();
        if remaining <= self.final_installment() {
            remaining
        } else {
            self.installment_amount.min(remaining)
        }
    }
}

/// price / installment count, rounded half-up to cents
pub fn monthly_payment(price: Money, installment_count: u32) -> Option<Money> {
    price.split(installment_count)
}

/// move a due date forward by whole billing periods (calendar months, clamped to month end)
pub fn add_billing_periods(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}
