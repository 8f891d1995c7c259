//! Unit price decisions.
//!
//! Price sources are tried in a fixed order and the first one that applies
//! wins: negotiated price for the customer and item, catalog price plus the
//! customer tier margin, supplier reference price plus the default supplier
//! margin. When none applies the decision carries no price and a
//! `price_basis_missing` alert. Margins are percentages applied
//! multiplicatively to the basis and the result is rounded to cents, half
//! away from zero. Alerts never change the computed price.

mod resolver;

pub use resolver::PricingResolver;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::config::PricingConfig;
use crate::domain::customer::CustomerCandidate;
use crate::domain::product::{CatalogItem, NegotiatedPrice, ProductCandidate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricingCase {
    ExistingPrice,
    CatalogPlusMargin,
    SupplierPlusMargin,
    NoHistory,
    NewProduct,
}

impl PricingCase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExistingPrice => "EXISTING_PRICE",
            Self::CatalogPlusMargin => "CATALOG_PLUS_MARGIN",
            Self::SupplierPlusMargin => "SUPPLIER_PLUS_MARGIN",
            Self::NoHistory => "NO_HISTORY",
            Self::NewProduct => "NEW_PRODUCT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingAlert {
    StalePrice,
    NegativeMargin,
    QuantityExceedsStock,
    IndirectPriceBasis,
    PriceBasisMissing,
    CustomerUnconfirmed,
    ManualOverride,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingDecision {
    pub unit_price: Option<Decimal>,
    pub pricing_case: PricingCase,
    pub margin_applied: Option<Decimal>,
    pub supplier_reference_price: Option<Decimal>,
    #[serde(default)]
    pub basis_price: Option<Decimal>,
    /// Stock reported by the catalog when the decision was made.
    #[serde(default)]
    pub stock_on_hand: Option<Decimal>,
    pub alerts: BTreeSet<PricingAlert>,
}

impl PricingDecision {
    fn without_price(pricing_case: PricingCase) -> Self {
        Self {
            unit_price: None,
            pricing_case,
            margin_applied: None,
            supplier_reference_price: None,
            basis_price: None,
            stock_on_hand: None,
            alerts: BTreeSet::from([PricingAlert::PriceBasisMissing]),
        }
    }

    /// Re-checks the stock alert against a corrected quantity.
    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        match self.stock_on_hand {
            Some(stock) if quantity > stock => {
                self.alerts.insert(PricingAlert::QuantityExceedsStock);
            }
            _ => {
                self.alerts.remove(&PricingAlert::QuantityExceedsStock);
            }
        }
        self
    }

    /// Re-checks the unconfirmed-customer alert.
    pub fn with_customer_confirmed(mut self, confirmed: bool) -> Self {
        if confirmed {
            self.alerts.remove(&PricingAlert::CustomerUnconfirmed);
        } else {
            self.alerts.insert(PricingAlert::CustomerUnconfirmed);
        }
        self
    }

    /// Replaces the unit price with a manual value, keeping the machine basis for reference.
    pub fn with_manual_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(round_price(unit_price));
        self.alerts.remove(&PricingAlert::PriceBasisMissing);
        self.alerts.insert(PricingAlert::ManualOverride);
        match self.supplier_reference_price {
            Some(cost) if unit_price < cost => {
                self.alerts.insert(PricingAlert::NegativeMargin);
            }
            _ => {
                self.alerts.remove(&PricingAlert::NegativeMargin);
            }
        }
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingRules {
    /// Margin per customer price tier, applied to the catalog price.
    pub tier_margins: BTreeMap<String, Decimal>,
    pub catalog_margin_pct: Decimal,
    pub supplier_margin_pct: Decimal,
    pub stale_after_days: u32,
}

impl Default for PricingRules {
    fn default() -> Self {
        Self {
            tier_margins: BTreeMap::new(),
            catalog_margin_pct: Decimal::ZERO,
            supplier_margin_pct: Decimal::from(30),
            stale_after_days: 365,
        }
    }
}

impl From<&PricingConfig> for PricingRules {
    fn from(config: &PricingConfig) -> Self {
        Self {
            tier_margins: config.tier_margins.clone(),
            catalog_margin_pct: config.catalog_margin_pct,
            supplier_margin_pct: config.supplier_margin_pct,
            stale_after_days: config.stale_after_days,
        }
    }
}

impl PricingRules {
    fn catalog_margin(&self, customer: Option<&CustomerCandidate>) -> Decimal {
        customer
            .and_then(|customer| customer.price_tier.as_ref())
            .and_then(|tier| self.tier_margins.get(tier))
            .copied()
            .unwrap_or(self.catalog_margin_pct)
    }

    fn is_stale(&self, updated_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        updated_at
            .map(|at| now - at > Duration::days(i64::from(self.stale_after_days)))
            .unwrap_or(false)
    }
}

/// Everything a pricing decision depends on, already fetched.
#[derive(Clone, Copy, Debug)]
pub struct PricingInputs<'a> {
    pub candidate: &'a ProductCandidate,
    pub item: Option<&'a CatalogItem>,
    pub negotiated: Option<&'a NegotiatedPrice>,
    /// The validated customer, `None` when the customer still needs a choice.
    pub customer: Option<&'a CustomerCandidate>,
    pub now: DateTime<Utc>,
}

pub fn decide(inputs: PricingInputs<'_>, rules: &PricingRules) -> PricingDecision {
    let mut decision = base_decision(&inputs, rules);

    if inputs.customer.is_none() {
        decision.alerts.insert(PricingAlert::CustomerUnconfirmed);
    }

    if let Some(item) = inputs.item {
        if decision.supplier_reference_price.is_none() {
            decision.supplier_reference_price = item.supplier_price;
        }
        decision.stock_on_hand = item.stock_on_hand;
        decision = decision.with_quantity(inputs.candidate.quantity);
    }

    let below_cost = matches!(
        (decision.unit_price, decision.supplier_reference_price),
        (Some(price), Some(cost)) if price < cost
    );
    let negative_margin = decision.margin_applied.map(|m| m < Decimal::ZERO).unwrap_or(false);
    if below_cost || negative_margin {
        decision.alerts.insert(PricingAlert::NegativeMargin);
    }

    decision
}

fn base_decision(inputs: &PricingInputs<'_>, rules: &PricingRules) -> PricingDecision {
    if inputs.candidate.not_found_in_sap || inputs.candidate.item_code.is_none() {
        return PricingDecision::without_price(PricingCase::NewProduct);
    }
    let Some(item) = inputs.item else {
        return PricingDecision::without_price(PricingCase::NoHistory);
    };

    if let Some(negotiated) = inputs.negotiated {
        let mut alerts = BTreeSet::new();
        if rules.is_stale(negotiated.agreed_at, inputs.now) {
            alerts.insert(PricingAlert::StalePrice);
        }
        return PricingDecision {
            unit_price: Some(round_price(negotiated.unit_price)),
            pricing_case: PricingCase::ExistingPrice,
            margin_applied: None,
            supplier_reference_price: item.supplier_price,
            basis_price: Some(negotiated.unit_price),
            stock_on_hand: None,
            alerts,
        };
    }

    if let Some(catalog_price) = item.catalog_price.filter(|price| *price > Decimal::ZERO) {
        let margin = rules.catalog_margin(inputs.customer);
        let mut alerts = BTreeSet::new();
        if rules.is_stale(item.price_updated_at, inputs.now) {
            alerts.insert(PricingAlert::StalePrice);
        }
        return PricingDecision {
            unit_price: Some(apply_margin(catalog_price, margin)),
            pricing_case: PricingCase::CatalogPlusMargin,
            margin_applied: Some(margin),
            supplier_reference_price: item.supplier_price,
            basis_price: Some(catalog_price),
            stock_on_hand: None,
            alerts,
        };
    }

    if let Some(supplier_price) = item.supplier_price.filter(|price| *price > Decimal::ZERO) {
        let margin = rules.supplier_margin_pct;
        return PricingDecision {
            unit_price: Some(apply_margin(supplier_price, margin)),
            pricing_case: PricingCase::SupplierPlusMargin,
            margin_applied: Some(margin),
            supplier_reference_price: Some(supplier_price),
            basis_price: Some(supplier_price),
            stock_on_hand: None,
            alerts: BTreeSet::from([PricingAlert::IndirectPriceBasis]),
        };
    }

    PricingDecision::without_price(PricingCase::NoHistory)
}

/// `basis * (1 + margin / 100)` rounded to cents.
pub fn apply_margin(basis: Decimal, margin_pct: Decimal) -> Decimal {
    round_price(basis * (Decimal::ONE + margin_pct / Decimal::ONE_HUNDRED))
}

pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{apply_margin, decide, PricingAlert, PricingCase, PricingInputs, PricingRules};
    use crate::domain::customer::{CustomerCandidate, CustomerCode};
    use crate::domain::product::{CatalogItem, ItemCode, NegotiatedPrice, ProductCandidate};

    fn candidate(code: Option<&str>, quantity: i64) -> ProductCandidate {
        ProductCandidate {
            item_code: code.map(|code| ItemCode(code.to_string())),
            item_name: "Cable HO7".to_string(),
            quantity: Decimal::from(quantity),
            score: 100,
            match_reason: "exact item code".to_string(),
            not_found_in_sap: code.is_none(),
        }
    }

    fn item(catalog: Option<Decimal>, supplier: Option<Decimal>) -> CatalogItem {
        CatalogItem {
            item_code: ItemCode("A00002".to_string()),
            item_name: "Cable HO7".to_string(),
            catalog_price: catalog,
            supplier_price: supplier,
            stock_on_hand: Some(Decimal::from(100)),
            price_updated_at: None,
        }
    }

    fn customer(tier: Option<&str>) -> CustomerCandidate {
        CustomerCandidate {
            external_code: CustomerCode("C20000".to_string()),
            display_name: "Edge Communications".to_string(),
            score: 95,
            match_reason: "normalized name match".to_string(),
            price_tier: tier.map(str::to_string),
        }
    }

    fn rules() -> PricingRules {
        PricingRules {
            tier_margins: BTreeMap::from([("2".to_string(), Decimal::from(15))]),
            catalog_margin_pct: Decimal::from(10),
            ..PricingRules::default()
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_else(Utc::now)
    }

    #[test]
    fn margin_rounds_half_away_from_zero() {
        assert_eq!(apply_margin(Decimal::new(1005, 2), Decimal::from(5)), Decimal::new(1055, 2));
        assert_eq!(apply_margin(Decimal::new(1, 1), Decimal::from(25)), Decimal::new(13, 2));
        assert_eq!(apply_margin(Decimal::new(-1, 1), Decimal::from(25)), Decimal::new(-13, 2));
    }

    #[test]
    fn negotiated_price_wins() {
        let candidate = candidate(Some("A00002"), 5);
        let item = item(Some(Decimal::from(20)), Some(Decimal::from(8)));
        let customer = customer(Some("2"));
        let negotiated = NegotiatedPrice {
            customer_code: customer.external_code.clone(),
            item_code: ItemCode("A00002".to_string()),
            unit_price: Decimal::new(1790, 2),
            agreed_at: Some(now() - Duration::days(30)),
        };

        let decision = decide(
            PricingInputs {
                candidate: &candidate,
                item: Some(&item),
                negotiated: Some(&negotiated),
                customer: Some(&customer),
                now: now(),
            },
            &rules(),
        );

        assert_eq!(decision.pricing_case, PricingCase::ExistingPrice);
        assert_eq!(decision.unit_price, Some(Decimal::new(1790, 2)));
        assert!(decision.alerts.is_empty());
    }

    #[test]
    fn catalog_price_uses_customer_tier_margin() {
        let candidate = candidate(Some("A00002"), 5);
        let item = item(Some(Decimal::from(20)), None);
        let tiered = customer(Some("2"));
        let untiered = customer(None);

        let inputs = PricingInputs {
            candidate: &candidate,
            item: Some(&item),
            negotiated: None,
            customer: Some(&tiered),
            now: now(),
        };
        let decision = decide(inputs, &rules());
        assert_eq!(decision.pricing_case, PricingCase::CatalogPlusMargin);
        assert_eq!(decision.margin_applied, Some(Decimal::from(15)));
        assert_eq!(decision.unit_price, Some(Decimal::from(23)));

        let decision = decide(PricingInputs { customer: Some(&untiered), ..inputs }, &rules());
        assert_eq!(decision.unit_price, Some(Decimal::from(22)));
    }

    #[test]
    fn supplier_basis_flags_indirect_price() {
        let candidate = candidate(Some("A00002"), 5);
        let item = item(None, Some(Decimal::new(1250, 2)));
        let customer = customer(None);

        let decision = decide(
            PricingInputs {
                candidate: &candidate,
                item: Some(&item),
                negotiated: None,
                customer: Some(&customer),
                now: now(),
            },
            &rules(),
        );

        assert_eq!(decision.pricing_case, PricingCase::SupplierPlusMargin);
        assert_eq!(decision.unit_price, Some(Decimal::new(1625, 2)));
        assert!(decision.alerts.contains(&PricingAlert::IndirectPriceBasis));
    }

    #[test]
    fn selling_below_cost_alerts_without_clamping() {
        let candidate = candidate(Some("A00002"), 500);
        let item = item(Some(Decimal::from(10)), Some(Decimal::from(12)));

        let decision = decide(
            PricingInputs {
                candidate: &candidate,
                item: Some(&item),
                negotiated: None,
                customer: None,
                now: now(),
            },
            &rules(),
        );

        assert_eq!(decision.unit_price, Some(Decimal::from(11)));
        assert!(decision.alerts.contains(&PricingAlert::NegativeMargin));
        assert!(decision.alerts.contains(&PricingAlert::QuantityExceedsStock));
        assert!(decision.alerts.contains(&PricingAlert::CustomerUnconfirmed));
    }

    #[test]
    fn stock_alert_follows_corrected_quantity() {
        let candidate = candidate(Some("A00002"), 500);
        let item = item(Some(Decimal::from(10)), None);

        let decision = decide(
            PricingInputs {
                candidate: &candidate,
                item: Some(&item),
                negotiated: None,
                customer: None,
                now: now(),
            },
            &rules(),
        );
        assert_eq!(decision.stock_on_hand, Some(Decimal::from(100)));
        assert!(decision.alerts.contains(&PricingAlert::QuantityExceedsStock));

        let reduced = decision.clone().with_quantity(Decimal::from(80));
        assert!(!reduced.alerts.contains(&PricingAlert::QuantityExceedsStock));
        assert_eq!(reduced.unit_price, decision.unit_price);

        let confirmed = reduced.with_customer_confirmed(true);
        assert!(!confirmed.alerts.contains(&PricingAlert::CustomerUnconfirmed));
    }

    #[test]
    fn catalog_item_with_code_is_never_new_product() {
        let candidate = candidate(Some("A00002"), 1);
        let bare = item(None, None);
        let customer = customer(None);

        let missing_basis = decide(
            PricingInputs {
                candidate: &candidate,
                item: Some(&bare),
                negotiated: None,
                customer: Some(&customer),
                now: now(),
            },
            &rules(),
        );
        assert_eq!(missing_basis.pricing_case, PricingCase::NoHistory);
        assert_eq!(missing_basis.unit_price, None);
        assert!(missing_basis.alerts.contains(&PricingAlert::PriceBasisMissing));

        let vanished = decide(
            PricingInputs {
                candidate: &candidate,
                item: None,
                negotiated: None,
                customer: Some(&customer),
                now: now(),
            },
            &rules(),
        );
        assert_eq!(vanished.pricing_case, PricingCase::NoHistory);
    }

    #[test]
    fn not_found_candidate_is_new_product_without_price() {
        let candidate = candidate(None, 1);
        let decision = decide(
            PricingInputs {
                candidate: &candidate,
                item: None,
                negotiated: None,
                customer: None,
                now: now(),
            },
            &rules(),
        );

        assert_eq!(decision.pricing_case, PricingCase::NewProduct);
        assert_eq!(decision.unit_price, None);
    }

    #[test]
    fn old_catalog_price_is_flagged_stale() {
        let candidate = candidate(Some("A00002"), 1);
        let mut old = item(Some(Decimal::from(20)), None);
        old.price_updated_at = Some(now() - Duration::days(400));
        let customer = customer(None);

        let decision = decide(
            PricingInputs {
                candidate: &candidate,
                item: Some(&old),
                negotiated: None,
                customer: Some(&customer),
                now: now(),
            },
            &rules(),
        );
        assert!(decision.alerts.contains(&PricingAlert::StalePrice));
    }
}
