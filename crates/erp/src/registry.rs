use std::sync::Arc;

use async_trait::async_trait;
use mailquote_core::domain::customer::{Customer, CustomerCode};
use mailquote_core::ports::{CustomerRegistry, ExternalError};
use serde::Deserialize;

use crate::service_layer::{entity_path, odata_literal, ServiceLayerClient};

const PARTNER_FIELDS: &str = "CardCode,CardName,CardType,EmailAddress,PriceListNum";
const CUSTOMER_TYPE: &str = "cCustomer";

#[derive(Debug, Deserialize)]
struct BusinessPartner {
    #[serde(rename = "CardCode")]
    card_code: String,
    #[serde(rename = "CardName", default)]
    card_name: Option<String>,
    #[serde(rename = "CardType", default)]
    card_type: Option<String>,
    #[serde(rename = "EmailAddress", default)]
    email_address: Option<String>,
    #[serde(rename = "PriceListNum", default)]
    price_list_num: Option<i64>,
}

impl BusinessPartner {
    fn is_customer(&self) -> bool {
        self.card_type.as_deref().map(|kind| kind == CUSTOMER_TYPE).unwrap_or(true)
    }

    fn into_customer(self) -> Customer {
        let name = self
            .card_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.card_code.clone());
        Customer {
            code: CustomerCode(self.card_code),
            name,
            email: self.email_address.filter(|email| !email.trim().is_empty()),
            price_tier: self.price_list_num.map(|list| list.to_string()),
        }
    }
}

/// Picks the token sent to the server-side `contains` filter; the full name is
/// scored locally afterwards.
pub fn search_term(name: &str) -> Option<String> {
    let longest = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 3)
        .max_by_key(|token| token.chars().count())?;
    Some(longest.to_string())
}

/// Business partners exposed as the customer registry.
pub struct ServiceLayerRegistry {
    client: Arc<ServiceLayerClient>,
}

impl ServiceLayerRegistry {
    pub fn new(client: Arc<ServiceLayerClient>) -> Self {
        Self { client }
    }

    async fn query(&self, filter: String, limit: usize) -> Result<Vec<Customer>, ExternalError> {
        let partners: Vec<BusinessPartner> = self
            .client
            .list(
                "BusinessPartners",
                &[
                    ("$select", PARTNER_FIELDS.to_string()),
                    ("$filter", filter),
                    ("$top", limit.max(1).to_string()),
                ],
            )
            .await?;
        Ok(partners
            .into_iter()
            .filter(BusinessPartner::is_customer)
            .map(BusinessPartner::into_customer)
            .collect())
    }
}

#[async_trait]
impl CustomerRegistry for ServiceLayerRegistry {
    async fn find_by_code(&self, code: &str) -> Result<Option<Customer>, ExternalError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let path = entity_path("BusinessPartners", code);
        let partner: Option<BusinessPartner> =
            self.client.get(&path, &[("$select", PARTNER_FIELDS.to_string())]).await?;
        Ok(partner.filter(BusinessPartner::is_customer).map(BusinessPartner::into_customer))
    }

    async fn search_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Customer>, ExternalError> {
        let Some(term) = search_term(name) else {
            return Ok(Vec::new());
        };
        let filter = format!(
            "CardType eq {} and contains(CardName, {})",
            odata_literal(CUSTOMER_TYPE),
            odata_literal(&term)
        );
        self.query(filter, limit).await
    }

    async fn find_by_email_domain(&self, domain: &str) -> Result<Vec<Customer>, ExternalError> {
        let domain = domain.trim().trim_start_matches('@');
        if domain.is_empty() {
            return Ok(Vec::new());
        }
        let filter = format!(
            "CardType eq {} and endswith(EmailAddress, {})",
            odata_literal(CUSTOMER_TYPE),
            odata_literal(&format!("@{domain}"))
        );
        self.query(filter, 20).await
    }
}

#[cfg(test)]
mod tests {
    use super::{search_term, BusinessPartner};

    #[test]
    fn partner_payload_maps_to_customer() {
        let partner: BusinessPartner = match serde_json::from_str(
            r#"{"CardCode": "C20000", "CardName": "Edge Communications",
                "CardType": "cCustomer", "EmailAddress": "achats@edge-comm.fr",
                "PriceListNum": 2}"#,
        ) {
            Ok(partner) => partner,
            Err(error) => panic!("payload should decode: {error}"),
        };
        assert!(partner.is_customer());

        let customer = partner.into_customer();
        assert_eq!(customer.code.as_str(), "C20000");
        assert_eq!(customer.price_tier.as_deref(), Some("2"));
        assert_eq!(customer.email_domain().as_deref(), Some("edge-comm.fr"));
    }

    #[test]
    fn suppliers_and_blank_names_are_handled() {
        let supplier: Result<BusinessPartner, _> =
            serde_json::from_str(r#"{"CardCode": "V100", "CardType": "cSupplier"}"#);
        assert_eq!(supplier.map(|partner| partner.is_customer()).ok(), Some(false));

        let unnamed: Result<BusinessPartner, _> =
            serde_json::from_str(r#"{"CardCode": "C1", "CardName": "  ", "EmailAddress": ""}"#);
        let customer = unnamed.map(BusinessPartner::into_customer).ok();
        assert_eq!(customer.as_ref().map(|c| c.name.as_str()), Some("C1"));
        assert_eq!(customer.and_then(|c| c.email), None);
    }

    #[test]
    fn search_term_prefers_the_longest_token() {
        assert_eq!(search_term("Edge Communications SA").as_deref(), Some("Communications"));
        assert_eq!(search_term("ACME"), Some("ACME".to_string()));
        assert_eq!(search_term("a b"), None);
    }
}
