//! Human corrections layered over the machine analysis.
//!
//! The machine result is never mutated by a correction. The effective view is
//! rebuilt on every read by applying each stored patch field by field; a
//! field missing from a patch keeps the machine value. Manual unit prices are
//! not part of the patches: they live in an append-only trail and the latest
//! entry per line wins.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::analysis::{AnalysisResult, CustomerResolution, LinePricing};
use crate::domain::correction::{
    CorrectionOverlay, CorrectionPatch, CorrectionTarget, PriceCorrection,
};
use crate::domain::customer::{CustomerCandidate, CustomerCode};
use crate::domain::product::{ItemCode, ProductCandidate};
use crate::errors::PipelineError;
use crate::pricing::{PricingCase, PricingDecision};

pub const CUSTOMER_FIELDS: &[&str] = &["external_code", "display_name"];
pub const LINE_FIELDS: &[&str] = &["item_code", "item_name", "quantity", "unit", "unit_price"];
pub const DELIVERY_FIELDS: &[&str] = &["address", "requested_date", "notes"];

/// Field routed to the price trail instead of the overlay.
pub const UNIT_PRICE_FIELD: &str = "unit_price";

const STALE_PRICING_REASON: &str = "selection corrected since last pricing; reprice to refresh";
const STALE_CUSTOMER_REASON: &str = "customer corrected since last pricing; reprice to refresh";

pub fn allowed_fields(target: CorrectionTarget) -> &'static [&'static str] {
    match target {
        CorrectionTarget::Customer => CUSTOMER_FIELDS,
        CorrectionTarget::Line(_) => LINE_FIELDS,
        CorrectionTarget::Delivery => DELIVERY_FIELDS,
    }
}

/// Field names, null values, value types and the line target are checked
/// against the machine result.
pub fn validate_patch(
    machine: &AnalysisResult,
    target: CorrectionTarget,
    patch: &CorrectionPatch,
) -> Result<(), PipelineError> {
    if patch.is_empty() {
        return Err(PipelineError::InvalidCorrection(format!("empty patch for {target}")));
    }

    if let CorrectionTarget::Line(index) = target {
        if machine.line(index).is_none() {
            let reason = match machine.dropped_lines.iter().find(|line| line.line_index == index) {
                Some(dropped) => format!("line {index} was dropped by rule `{}`", dropped.rule),
                None => format!("line {index} is out of range"),
            };
            return Err(PipelineError::InvalidCorrection(reason));
        }
    }

    let allowed = allowed_fields(target);
    for (field, value) in patch {
        if !allowed.contains(&field.as_str()) {
            return Err(PipelineError::InvalidCorrection(format!(
                "unknown field `{field}` for {target} (allowed: {})",
                allowed.join(", ")
            )));
        }
        if value.is_null() {
            return Err(PipelineError::InvalidCorrection(format!(
                "field `{field}` must not be null; omit it to keep the machine value"
            )));
        }
        match field.as_str() {
            "quantity" => {
                let quantity = decimal_value(field, value)?;
                if quantity <= Decimal::ZERO {
                    return Err(PipelineError::InvalidCorrection(
                        "quantity must be positive".to_string(),
                    ));
                }
            }
            UNIT_PRICE_FIELD => {
                let price = decimal_value(field, value)?;
                if price < Decimal::ZERO {
                    return Err(PipelineError::InvalidCorrection(
                        "unit_price must not be negative".to_string(),
                    ));
                }
            }
            _ => {
                let text = text_value(field, value)?;
                let is_code = field == "external_code" || field == "item_code";
                if is_code && text.is_empty() {
                    return Err(PipelineError::InvalidCorrection(format!(
                        "field `{field}` must not be empty"
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Checks that only hold once the patch is merged with earlier corrections.
pub fn validate_effective(
    effective: &AnalysisResult,
    target: CorrectionTarget,
    sets_price: bool,
) -> Result<(), PipelineError> {
    match target {
        CorrectionTarget::Customer if effective.selected_customer().is_none() => {
            Err(PipelineError::InvalidCorrection(
                "no customer is selected; the correction must set external_code".to_string(),
            ))
        }
        CorrectionTarget::Line(index) if sets_price => {
            let selected = effective.line(index).and_then(|line| line.selected.as_ref());
            match selected {
                None => Err(PipelineError::InvalidCorrection(format!(
                    "line {index} has no selected product; set item_code before unit_price"
                ))),
                Some(candidate) if candidate.not_found_in_sap => {
                    Err(PipelineError::InvalidCorrection(format!(
                        "line {index} is not in the catalog and cannot carry a unit price; \
                         set item_code first"
                    )))
                }
                Some(_) => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// Removes the unit price from a line patch.
pub fn split_unit_price(
    mut patch: CorrectionPatch,
) -> Result<(CorrectionPatch, Option<Decimal>), PipelineError> {
    let price = match patch.remove(UNIT_PRICE_FIELD) {
        Some(value) => Some(decimal_value(UNIT_PRICE_FIELD, &value)?),
        None => None,
    };
    Ok((patch, price))
}

/// Builds the effective view: machine result, then overlays, then latest manual prices.
pub fn apply_overlays(
    machine: &AnalysisResult,
    overlays: &[CorrectionOverlay],
    prices: &[PriceCorrection],
) -> AnalysisResult {
    let mut effective = machine.clone();

    for overlay in overlays {
        match overlay.target {
            CorrectionTarget::Customer => apply_customer(&mut effective, overlay),
            CorrectionTarget::Line(index) => apply_line(&mut effective, index, overlay),
            CorrectionTarget::Delivery => apply_delivery(&mut effective, &overlay.patch),
        }
    }
    if overlays.iter().any(|overlay| overlay.target == CorrectionTarget::Customer) {
        refresh_customer_pricing(&mut effective);
    }

    let mut latest: BTreeMap<usize, &PriceCorrection> = BTreeMap::new();
    for entry in prices {
        match latest.get(&entry.line_index) {
            Some(current) if current.recorded_at > entry.recorded_at => {}
            _ => {
                latest.insert(entry.line_index, entry);
            }
        }
    }
    for (index, entry) in latest {
        apply_price(&mut effective, index, entry.unit_price);
    }

    effective.refresh_status();
    effective
}

fn apply_customer(effective: &mut AnalysisResult, overlay: &CorrectionOverlay) {
    let code = text_field(&overlay.patch, "external_code");
    let display_name = text_field(&overlay.patch, "display_name");

    let resolution = effective.customer.get_or_insert_with(|| CustomerResolution {
        candidates: Vec::new(),
        selected: None,
        requires_user_choice: true,
        reason: "no customer resolution ran".to_string(),
    });

    if let Some(code) = code {
        let chosen = resolution
            .candidates
            .iter()
            .find(|candidate| candidate.external_code.0 == code)
            .cloned()
            .unwrap_or_else(|| CustomerCandidate {
                external_code: CustomerCode(code.clone()),
                display_name: code.clone(),
                score: 100,
                match_reason: format!("selected by {}", overlay.author),
                price_tier: None,
            });
        resolution.selected = Some(chosen);
        resolution.requires_user_choice = false;
        resolution.reason = format!("customer corrected by {}", overlay.author);
    }

    if let (Some(name), Some(selected)) = (display_name, resolution.selected.as_mut()) {
        selected.display_name = name;
    }
}

fn apply_line(effective: &mut AnalysisResult, index: usize, overlay: &CorrectionOverlay) {
    let Some(line) = effective.line_mut(index) else {
        return;
    };
    let patch = &overlay.patch;

    if let Some(quantity) = decimal_field(patch, "quantity") {
        line.line.quantity = quantity;
        if let Some(selected) = line.selected.as_mut() {
            selected.quantity = quantity;
        }
        if let LinePricing::Priced(decision) = &mut line.pricing {
            *decision = decision.clone().with_quantity(quantity);
        }
    }
    if let Some(unit) = text_field(patch, "unit") {
        line.line.unit = Some(unit);
    }

    if let Some(code) = text_field(patch, "item_code") {
        let quantity = line.line.quantity;
        let chosen = line
            .candidates
            .iter()
            .find(|candidate| candidate.item_code.as_ref().map(ItemCode::as_str) == Some(code.as_str()))
            .cloned()
            .unwrap_or_else(|| ProductCandidate {
                item_code: Some(ItemCode(code.clone())),
                item_name: code.clone(),
                quantity,
                score: 100,
                match_reason: format!("selected by {}", overlay.author),
                not_found_in_sap: false,
            });
        line.selected = Some(ProductCandidate { quantity, ..chosen });
        line.requires_user_choice = false;
        line.reason = format!("product corrected by {}", overlay.author);
    }
    if let Some(name) = text_field(patch, "item_name") {
        if let Some(selected) = line.selected.as_mut() {
            selected.item_name = name;
        }
    }

    let selected_code = line.selected.as_ref().and_then(|selected| selected.item_code.clone());
    if patch.contains_key("item_code") && selected_code != line.priced_item {
        line.pricing = LinePricing::Unpriced {
            reason: STALE_PRICING_REASON.to_string(),
            retryable: true,
        };
    }

    for field in patch.keys() {
        if !line.corrected_fields.contains(field) {
            line.corrected_fields.push(field.clone());
        }
    }
}

/// Lines priced for another customer than the effective one go stale; a line
/// with no catalog item only has its customer alert refreshed.
fn refresh_customer_pricing(effective: &mut AnalysisResult) {
    let customer = effective.selected_customer().map(|selected| selected.external_code.clone());
    for line in &mut effective.lines {
        if line.priced_customer == customer {
            continue;
        }
        let LinePricing::Priced(decision) = &line.pricing else {
            continue;
        };
        line.pricing = if line.priced_item.is_some() {
            LinePricing::Unpriced { reason: STALE_CUSTOMER_REASON.to_string(), retryable: true }
        } else {
            LinePricing::Priced(decision.clone().with_customer_confirmed(customer.is_some()))
        };
    }
}

fn apply_delivery(effective: &mut AnalysisResult, patch: &CorrectionPatch) {
    if let Some(address) = text_field(patch, "address") {
        effective.delivery.address = Some(address);
    }
    if let Some(requested_date) = text_field(patch, "requested_date") {
        effective.delivery.requested_date = Some(requested_date);
    }
    if let Some(notes) = text_field(patch, "notes") {
        effective.delivery.notes = Some(notes);
    }
}

fn apply_price(effective: &mut AnalysisResult, index: usize, unit_price: Decimal) {
    let Some(line) = effective.line_mut(index) else {
        return;
    };
    let sellable = line.selected.as_ref().map(|selected| !selected.not_found_in_sap);
    if sellable != Some(true) {
        return;
    }

    let decision = match std::mem::replace(&mut line.pricing, LinePricing::AwaitingSelection) {
        LinePricing::Priced(decision) => decision.with_manual_price(unit_price),
        _ => PricingDecision {
            unit_price: None,
            pricing_case: PricingCase::NoHistory,
            margin_applied: None,
            supplier_reference_price: None,
            basis_price: None,
            stock_on_hand: None,
            alerts: Default::default(),
        }
        .with_manual_price(unit_price),
    };
    line.pricing = LinePricing::Priced(decision);
    if !line.corrected_fields.iter().any(|field| field == UNIT_PRICE_FIELD) {
        line.corrected_fields.push(UNIT_PRICE_FIELD.to_string());
    }
}

fn text_value(field: &str, value: &Value) -> Result<String, PipelineError> {
    match value {
        Value::String(text) => Ok(text.trim().to_string()),
        other => Err(PipelineError::InvalidCorrection(format!(
            "field `{field}` must be a string, got `{other}`"
        ))),
    }
}

fn decimal_value(field: &str, value: &Value) -> Result<Decimal, PipelineError> {
    let parsed = match value {
        Value::Number(number) => number.to_string().parse::<Decimal>().ok(),
        Value::String(text) => text.trim().replace(',', ".").parse::<Decimal>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        PipelineError::InvalidCorrection(format!("field `{field}` must be a number, got `{value}`"))
    })
}

fn text_field(patch: &CorrectionPatch, field: &str) -> Option<String> {
    patch.get(field).and_then(|value| text_value(field, value).ok())
}

fn decimal_field(patch: &CorrectionPatch, field: &str) -> Option<Decimal> {
    patch.get(field).and_then(|value| decimal_value(field, value).ok())
}
