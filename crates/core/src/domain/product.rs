use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerCode;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemCode(pub String);

impl ItemCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Catalog view of an item with the price signals used by pricing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_code: ItemCode,
    pub item_name: String,
    pub catalog_price: Option<Decimal>,
    pub supplier_price: Option<Decimal>,
    pub stock_on_hand: Option<Decimal>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedPrice {
    pub customer_code: CustomerCode,
    pub item_code: ItemCode,
    pub unit_price: Decimal,
    pub agreed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub item_code: Option<ItemCode>,
    pub item_name: String,
    pub quantity: Decimal,
    pub score: u8,
    pub match_reason: String,
    pub not_found_in_sap: bool,
}

impl ProductCandidate {
    /// Placeholder for a line the catalog could not match.
    pub fn not_found(description: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            item_code: None,
            item_name: description.into(),
            quantity,
            score: 0,
            match_reason: "no catalog match".to_string(),
            not_found_in_sap: true,
        }
    }
}
