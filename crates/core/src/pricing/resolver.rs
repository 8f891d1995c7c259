use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::{decide, PricingDecision, PricingInputs, PricingRules};
use crate::domain::analysis::LinePricing;
use crate::domain::customer::CustomerCandidate;
use crate::domain::product::ProductCandidate;
use crate::ports::{ExternalError, ProductCatalog};

/// Fetches price signals from the catalog and applies [`decide`].
pub struct PricingResolver {
    catalog: Arc<dyn ProductCatalog>,
    rules: PricingRules,
}

impl PricingResolver {
    pub fn new(catalog: Arc<dyn ProductCatalog>, rules: PricingRules) -> Self {
        Self { catalog, rules }
    }

    pub fn rules(&self) -> &PricingRules {
        &self.rules
    }

    pub async fn price(
        &self,
        candidate: &ProductCandidate,
        customer: Option<&CustomerCandidate>,
    ) -> Result<PricingDecision, ExternalError> {
        let now = Utc::now();
        let Some(item_code) = candidate.item_code.as_ref().filter(|_| !candidate.not_found_in_sap)
        else {
            let inputs = PricingInputs { candidate, item: None, negotiated: None, customer, now };
            return Ok(decide(inputs, &self.rules));
        };

        let negotiated = async {
            match customer {
                Some(customer) => {
                    self.catalog.negotiated_price(&customer.external_code, item_code).await
                }
                None => Ok(None),
            }
        };
        let (item, negotiated) =
            tokio::try_join!(self.catalog.find_item(item_code.as_str()), negotiated)?;

        Ok(decide(
            PricingInputs {
                candidate,
                item: item.as_ref(),
                negotiated: negotiated.as_ref(),
                customer,
                now,
            },
            &self.rules,
        ))
    }

    /// Prices one line; lookup failures become an unpriced line instead of an error.
    pub async fn price_line(
        &self,
        line_index: usize,
        selected: Option<&ProductCandidate>,
        requires_user_choice: bool,
        customer: Option<&CustomerCandidate>,
    ) -> LinePricing {
        let Some(candidate) = selected.filter(|_| !requires_user_choice) else {
            return LinePricing::AwaitingSelection;
        };

        match self.price(candidate, customer).await {
            Ok(decision) => LinePricing::Priced(decision),
            Err(error) => {
                warn!(
                    event_name = "pricing.line.failed",
                    line_index,
                    system = error.system(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "line pricing lookup failed"
                );
                LinePricing::Unpriced { reason: error.to_string(), retryable: error.is_retryable() }
            }
        }
    }
}
