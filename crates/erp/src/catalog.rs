use std::sync::Arc;

use async_trait::async_trait;
use mailquote_core::domain::customer::CustomerCode;
use mailquote_core::domain::product::{CatalogItem, ItemCode, NegotiatedPrice};
use mailquote_core::ports::{ExternalError, ProductCatalog};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::registry::search_term;
use crate::service_layer::{entity_path, odata_literal, parse_service_date, ServiceLayerClient};

const ITEM_FIELDS: &str = "ItemCode,ItemName,QuantityOnStock,ItemPrices,UpdateDate";

#[derive(Debug, Deserialize)]
struct ItemPrice {
    #[serde(rename = "PriceList")]
    price_list: u32,
    #[serde(rename = "Price", default)]
    price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "ItemCode")]
    item_code: String,
    #[serde(rename = "ItemName", default)]
    item_name: Option<String>,
    #[serde(rename = "QuantityOnStock", default)]
    quantity_on_stock: Option<Decimal>,
    #[serde(rename = "ItemPrices", default)]
    item_prices: Vec<ItemPrice>,
    #[serde(rename = "UpdateDate", default)]
    update_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpecialPrice {
    #[serde(rename = "Price", default)]
    price: Option<Decimal>,
    #[serde(rename = "Valid", default)]
    valid: Option<String>,
    #[serde(rename = "ValidFrom", default)]
    valid_from: Option<String>,
}

/// Which price lists hold the sales and purchase prices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLists {
    pub sales: u32,
    pub purchase: u32,
}

impl Item {
    fn price_in(&self, list: u32) -> Option<Decimal> {
        self.item_prices
            .iter()
            .find(|entry| entry.price_list == list)
            .and_then(|entry| entry.price)
            .filter(|price| *price > Decimal::ZERO)
    }

    fn into_catalog_item(self, lists: PriceLists) -> CatalogItem {
        let catalog_price = self.price_in(lists.sales);
        let supplier_price = self.price_in(lists.purchase);
        let price_updated_at = self.update_date.as_deref().and_then(parse_service_date);
        let item_name = self
            .item_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.item_code.clone());
        CatalogItem {
            item_code: ItemCode(self.item_code),
            item_name,
            catalog_price,
            supplier_price,
            stock_on_hand: self.quantity_on_stock,
            price_updated_at,
        }
    }
}

impl SpecialPrice {
    fn into_negotiated(self, customer: &CustomerCode, item: &ItemCode) -> Option<NegotiatedPrice> {
        if self.valid.as_deref() == Some("tNO") {
            return None;
        }
        let unit_price = self.price.filter(|price| *price > Decimal::ZERO)?;
        Some(NegotiatedPrice {
            customer_code: customer.clone(),
            item_code: item.clone(),
            unit_price,
            agreed_at: self.valid_from.as_deref().and_then(parse_service_date),
        })
    }
}

/// Items and special prices exposed as the product catalog.
pub struct ServiceLayerCatalog {
    client: Arc<ServiceLayerClient>,
    lists: PriceLists,
}

impl ServiceLayerCatalog {
    pub fn new(client: Arc<ServiceLayerClient>, lists: PriceLists) -> Self {
        Self { client, lists }
    }
}

#[async_trait]
impl ProductCatalog for ServiceLayerCatalog {
    async fn find_item(&self, code: &str) -> Result<Option<CatalogItem>, ExternalError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let path = entity_path("Items", code);
        let item: Option<Item> =
            self.client.get(&path, &[("$select", ITEM_FIELDS.to_string())]).await?;
        Ok(item.map(|item| item.into_catalog_item(self.lists)))
    }

    async fn search_items(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, ExternalError> {
        let Some(term) = search_term(text) else {
            return Ok(Vec::new());
        };
        let literal = odata_literal(&term);
        let filter = format!("contains(ItemName, {literal}) or contains(ItemCode, {literal})");
        let items: Vec<Item> = self
            .client
            .list(
                "Items",
                &[
                    ("$select", ITEM_FIELDS.to_string()),
                    ("$filter", filter),
                    ("$top", limit.max(1).to_string()),
                ],
            )
            .await?;
        Ok(items.into_iter().map(|item| item.into_catalog_item(self.lists)).collect())
    }

    async fn negotiated_price(
        &self,
        customer: &CustomerCode,
        item: &ItemCode,
    ) -> Result<Option<NegotiatedPrice>, ExternalError> {
        let path = format!(
            "SpecialPrices(CardCode={},ItemCode={})",
            odata_literal(customer.as_str()),
            odata_literal(item.as_str())
        );
        let special: Option<SpecialPrice> = self.client.get(&path, &[]).await?;
        Ok(special.and_then(|special| special.into_negotiated(customer, item)))
    }
}
