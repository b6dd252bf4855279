use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{CreditTier, UserId};

/// guarantor named by an applicant: username plus national id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuarantorRef {
    pub username: String,
    pub national_id: String,
}

impl GuarantorRef {
    pub fn new(username: impl Into<String>, national_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            national_id: national_id.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.national_id.trim().is_empty()
    }
}

/// the ten profile fields that count towards completeness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub national_id: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub occupation: Option<String>,
    pub monthly_income: Option<Money>,
}

impl ProfileDetails {
    pub const REQUIRED_FIELDS: u32 = 10;

    pub fn populated_fields(&self) -> u32 {
        let text_fields = [
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.phone_number,
            &self.national_id,
            &self.address,
            &self.city,
            &self.occupation,
        ];

        let populated_text = text_fields
            .iter()
            .filter(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
            .count() as u32;

        let dob = u32::from(self.date_of_birth.is_some());
        let income = u32::from(self.monthly_income.is_some_and(|m| m.is_positive()));

        populated_text + dob + income
    }

    /// populated / required, in [0, 1]
    pub fn completeness(&self) -> Rate {
        Rate::from_fraction(self.populated_fields(), Self::REQUIRED_FIELDS)
    }
}

/// mutable credit standing persisted with the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditStanding {
    pub successful_payments: u32,
    pub missed_payments: u32,
    pub total_credit_used: Money,
    pub internal_credit_score: u32,
    pub credit_tier: CreditTier,
    pub credit_limit: Money,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl CreditStanding {
    pub fn starter(limit: Money) -> Self {
        Self {
            successful_payments: 0,
            missed_payments: 0,
            total_credit_used: Money::ZERO,
            internal_credit_score: 0,
            credit_tier: CreditTier::Starter,
            credit_limit: limit,
            last_reviewed_at: None,
        }
    }
}

/// identity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub details: ProfileDetails,
    pub is_verified: bool,
    pub is_staff: bool,
    pub gateway_customer_id: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub standing: CreditStanding,
    pub guarantor: Option<GuarantorRef>,
    pub guarantor_verified: bool,
}

impl User {
    pub fn new(username: impl Into<String>, joined_at: DateTime<Utc>, starter_limit: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            details: ProfileDetails::default(),
            is_verified: false,
            is_staff: false,
            gateway_customer_id: None,
            joined_at,
            standing: CreditStanding::starter(starter_limit),
            guarantor: None,
            guarantor_verified: false,
        }
    }

    pub fn national_id(&self) -> Option<&str> {
        self.details
            .national_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn account_age_days(&self, as_of: DateTime<Utc>) -> u32 {
        let days = (as_of - self.joined_at).num_days();
        u32::try_from(days).unwrap_or(0)
    }

    /// snapshot used by scoring, eligibility and decisioning
    pub fn credit_profile(&self, as_of: DateTime<Utc>) -> CreditProfile {
        CreditProfile {
            user_id: self.id,
            username: self.username.clone(),
            national_id: self.national_id().map(str::to_string),
            is_verified: self.is_verified,
            monthly_income: self.details.monthly_income,
            successful_payments: self.standing.successful_payments,
            missed_payments: self.standing.missed_payments,
            total_credit_used: self.standing.total_credit_used,
            account_age_days: self.account_age_days(as_of),
            profile_completeness: self.details.completeness(),
            credit_tier: self.standing.credit_tier,
            credit_limit: self.standing.credit_limit,
            internal_credit_score: self.standing.internal_credit_score,
            last_reviewed_at: self.standing.last_reviewed_at,
            guarantor: self.guarantor.clone(),
            guarantor_verified: self.guarantor_verified,
        }
    }

    /// persist score and tier review results from a refreshed snapshot
    pub fn absorb_review(&mut self, profile: &CreditProfile) {
        self.standing.internal_credit_score = profile.internal_credit_score;
        self.standing.credit_tier = profile.credit_tier;
        self.standing.credit_limit = profile.credit_limit;
        self.standing.last_reviewed_at = profile.last_reviewed_at;
    }
}

/// read-only inputs to scoring, never the full identity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditProfile {
    pub user_id: UserId,
    pub username: String,
    pub national_id: Option<String>,
    pub is_verified: bool,
    pub monthly_income: Option<Money>,
    pub successful_payments: u32,
    pub missed_payments: u32,
    pub total_credit_used: Money,
    pub account_age_days: u32,
    pub profile_completeness: Rate,
    pub credit_tier: CreditTier,
    pub credit_limit: Money,
    pub internal_credit_score: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub guarantor: Option<GuarantorRef>,
    pub guarantor_verified: bool,
}
