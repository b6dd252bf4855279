use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::ItemId;

/// a device offered for sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub brand: String,
    pub price: Money,
    pub stock: u32,
    pub is_active: bool,
    pub credit_available: bool,
}

impl Item {
    pub fn new(name: impl Into<String>, brand: impl Into<String>, price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            brand: brand.into(),
            price,
            stock: 1,
            is_active: true,
            credit_available: true,
        }
    }

    /// can be bought on installment credit right now
    pub fn is_available_for_credit(&self) -> bool {
        self.is_active && self.credit_available && self.stock > 0
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.brand, self.name)
    }
}
