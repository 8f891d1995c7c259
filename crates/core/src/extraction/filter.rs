use std::collections::BTreeSet;

use regex::Regex;

use crate::domain::request::{ExtractedRequest, LineItem};

const DENYLIST: &[&str] = &[
    "X-AXIS", "Y-AXIS", "Z-AXIS", "AXE X", "AXE Y", "PAGE", "TOTAL", "SOUS-TOTAL", "SUBTOTAL",
    "TVA", "VAT", "HT", "TTC", "REF", "REFERENCE", "QTE", "QTY", "QUANTITE", "DESIGNATION",
    "PRIX", "PRIX UNITAIRE", "MONTANT", "SIRET", "SIREN", "IBAN", "BIC", "RCS", "NAF", "APE",
    "TEL", "FAX", "DATE", "N/A",
];

const PLACEHOLDERS: &[&str] = &[
    "ARTICLE", "ARTICLES", "PRODUIT", "PRODUITS", "PRODUCT", "ITEM", "CABLE", "CABLES",
    "ROULEMENT", "ROULEMENTS", "BEARING", "VIS", "BOULON", "ECROU", "JOINT", "MOTEUR", "PIECE",
    "PIECES", "MATERIEL", "FOURNITURE", "DIVERS",
];

/// How a line reference should be treated before resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceClass {
    /// Any other reference; resolve by exact lookup first, then by search.
    Code(String),
    /// Category word or free text; resolve by similarity search.
    SearchRequired,
    /// Document noise that must never be resolved; `rule` names the check that fired.
    Spurious { rule: String },
    /// No reference and no description to search on.
    Missing,
}

/// Denylist and placeholder rules applied to extracted line references.
#[derive(Clone, Debug)]
pub struct ReferenceFilter {
    denylist: BTreeSet<String>,
    placeholders: BTreeSet<String>,
    axis_label: Regex,
    long_numeric: Regex,
    phone_number: Regex,
}

impl ReferenceFilter {
    pub fn new(extra_denylist: &[String], extra_placeholders: &[String]) -> Self {
        let denylist = DENYLIST
            .iter()
            .map(|token| token.to_string())
            .chain(extra_denylist.iter().map(|token| canonical(token)))
            .collect();
        let placeholders = PLACEHOLDERS
            .iter()
            .map(|token| token.to_string())
            .chain(extra_placeholders.iter().map(|token| canonical(token)))
            .collect();

        Self {
            denylist,
            placeholders,
            axis_label: compile(r"^(?:[XYZ][\s_-]?AXIS|AXE[\s_-]?[XYZ])$"),
            long_numeric: compile(r"^\d{9,}$"),
            phone_number: compile(r"^(?:\+33|0033|0)[1-9](?:[\s.-]?\d{2}){4}$"),
        }
    }

    pub fn classify(&self, line: &LineItem) -> ReferenceClass {
        let Some(reference) = line.reference_guess.as_deref().map(str::trim) else {
            return if line.description_guess.is_some() {
                ReferenceClass::SearchRequired
            } else {
                ReferenceClass::Missing
            };
        };

        let key = canonical(reference);
        if key.is_empty() {
            return ReferenceClass::Missing;
        }
        if let Some(rule) = self.spurious_rule(reference, &key) {
            return ReferenceClass::Spurious { rule };
        }
        if line.search_required || self.placeholders.contains(&key) {
            return ReferenceClass::SearchRequired;
        }
        ReferenceClass::Code(reference.to_string())
    }

    /// Marks placeholder references as search-required; noise is left for the resolver to drop.
    pub fn normalize(&self, request: &mut ExtractedRequest) {
        for line in &mut request.line_items {
            let placeholder = line
                .reference_guess
                .as_deref()
                .map(|reference| self.placeholders.contains(&canonical(reference)))
                .unwrap_or(false);
            if placeholder {
                line.search_required = true;
                if line.description_guess.is_none() {
                    line.description_guess = line.reference_guess.clone();
                }
            }
        }
    }

    fn spurious_rule(&self, reference: &str, key: &str) -> Option<String> {
        if self.axis_label.is_match(key) {
            return Some("axis_label".to_string());
        }
        if self.denylist.contains(key) {
            return Some(format!("denylist:{key}"));
        }
        if self.long_numeric.is_match(key) {
            return Some("long_numeric_identifier".to_string());
        }
        if self.phone_number.is_match(reference.trim()) {
            return Some("phone_number".to_string());
        }
        None
    }
}

impl Default for ReferenceFilter {
    fn default() -> Self {
        Self::new(&[], &[])
    }
}

fn canonical(token: &str) -> String {
    let upper = token.trim().trim_end_matches([':', '.']).to_uppercase();
    upper.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => unreachable!("built-in reference pattern `{pattern}` is invalid: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ReferenceClass, ReferenceFilter};
    use crate::domain::request::{ActionType, DeliveryHints, ExtractedRequest, LineItem};

    fn line(reference: Option<&str>, description: Option<&str>) -> LineItem {
        LineItem {
            reference_guess: reference.map(str::to_string),
            description_guess: description.map(str::to_string),
            quantity: Decimal::ONE,
            unit: None,
            search_required: false,
        }
    }

    #[test]
    fn layout_noise_is_spurious() {
        let filter = ReferenceFilter::default();

        assert_eq!(
            filter.classify(&line(Some("X-AXIS"), None)),
            ReferenceClass::Spurious { rule: "axis_label".to_string() }
        );
        assert_eq!(
            filter.classify(&line(Some("Total :"), None)),
            ReferenceClass::Spurious { rule: "denylist:TOTAL".to_string() }
        );
        assert_eq!(
            filter.classify(&line(Some("123456789012"), None)),
            ReferenceClass::Spurious { rule: "long_numeric_identifier".to_string() }
        );
        assert_eq!(
            filter.classify(&line(Some("01 23 45 67 89"), None)),
            ReferenceClass::Spurious { rule: "phone_number".to_string() }
        );
    }

    #[test]
    fn codes_and_placeholders_are_told_apart() {
        let filter = ReferenceFilter::default();

        assert_eq!(
            filter.classify(&line(Some("A00002"), None)),
            ReferenceClass::Code("A00002".to_string())
        );
        assert_eq!(
            filter.classify(&line(Some("OFFICEPRINT"), None)),
            ReferenceClass::Code("OFFICEPRINT".to_string())
        );
        assert_eq!(
            filter.classify(&line(Some("moteur-xl"), None)),
            ReferenceClass::Code("moteur-xl".to_string())
        );
        assert_eq!(filter.classify(&line(Some("cable"), None)), ReferenceClass::SearchRequired);
        assert_eq!(
            filter.classify(&line(None, Some("gaine thermo"))),
            ReferenceClass::SearchRequired
        );
        assert_eq!(filter.classify(&line(None, None)), ReferenceClass::Missing);
    }

    #[test]
    fn configured_tokens_extend_builtin_lists() {
        let filter =
            ReferenceFilter::new(&["bon de commande".to_string()], &["Flexible".to_string()]);

        assert!(matches!(
            filter.classify(&line(Some("Bon de  commande"), None)),
            ReferenceClass::Spurious { .. }
        ));
        assert_eq!(filter.classify(&line(Some("FLEXIBLE"), None)), ReferenceClass::SearchRequired);
    }

    #[test]
    fn normalize_marks_placeholder_lines() {
        let filter = ReferenceFilter::default();
        let mut request = ExtractedRequest {
            raw_text: String::new(),
            detected_action_type: ActionType::Quote,
            customer_name_guess: None,
            customer_email_guess: None,
            line_items: vec![line(Some("ROULEMENT"), None), line(Some("A00002"), None)],
            delivery: DeliveryHints::default(),
            confidence: 80,
        };

        filter.normalize(&mut request);

        assert!(request.line_items[0].search_required);
        assert_eq!(request.line_items[0].description_guess.as_deref(), Some("ROULEMENT"));
        assert!(!request.line_items[1].search_required);
    }
}
