use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the sender is asking for, as classified by the extraction service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Quote,
    ProductSearch,
    ClientInfo,
    StockCheck,
    Other,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quote => "QUOTE",
            Self::ProductSearch => "PRODUCT_SEARCH",
            Self::ClientInfo => "CLIENT_INFO",
            Self::StockCheck => "STOCK_CHECK",
            Self::Other => "OTHER",
        }
    }

    /// Lenient parse of model output; anything unrecognised is `Other`.
    pub fn parse_lenient(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();

        match normalized.as_str() {
            "QUOTE" | "QUOTATION" | "DEVIS" => Self::Quote,
            "PRODUCT_SEARCH" | "SEARCH" => Self::ProductSearch,
            "CLIENT_INFO" | "CUSTOMER_INFO" => Self::ClientInfo,
            "STOCK_CHECK" | "STOCK" => Self::StockCheck,
            _ => Self::Other,
        }
    }

    pub fn resolves_customer(&self) -> bool {
        matches!(self, Self::Quote | Self::ClientInfo)
    }

    pub fn resolves_products(&self) -> bool {
        matches!(self, Self::Quote | Self::ProductSearch | Self::StockCheck)
    }

    pub fn prices_lines(&self) -> bool {
        matches!(self, Self::Quote | Self::StockCheck)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub reference_guess: Option<String>,
    pub description_guess: Option<String>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    /// Set when the reference is a generic category word rather than a code.
    #[serde(default)]
    pub search_required: bool,
}

impl LineItem {
    /// Free text used for catalog similarity search: the description, else the reference.
    pub fn search_text(&self) -> Option<&str> {
        self.description_guess
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .or_else(|| {
                self.reference_guess.as_deref().map(str::trim).filter(|text| !text.is_empty())
            })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHints {
    pub address: Option<String>,
    pub requested_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRequest {
    pub raw_text: String,
    pub detected_action_type: ActionType,
    pub customer_name_guess: Option<String>,
    pub customer_email_guess: Option<String>,
    pub line_items: Vec<LineItem>,
    #[serde(default)]
    pub delivery: DeliveryHints,
    pub confidence: u8,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{ActionType, LineItem};

    #[test]
    fn lenient_action_parse_accepts_common_spellings() {
        assert_eq!(ActionType::parse_lenient("quote"), ActionType::Quote);
        assert_eq!(ActionType::parse_lenient("product-search"), ActionType::ProductSearch);
        assert_eq!(ActionType::parse_lenient(" Stock Check "), ActionType::StockCheck);
        assert_eq!(ActionType::parse_lenient("newsletter"), ActionType::Other);
    }

    #[test]
    fn search_text_prefers_description_then_reference() {
        let mut line = LineItem {
            reference_guess: Some("MOTEUR-XL".to_string()),
            description_guess: None,
            quantity: Decimal::ONE,
            unit: None,
            search_required: false,
        };
        assert_eq!(line.search_text(), Some("MOTEUR-XL"));

        line.description_guess = Some("  ".to_string());
        assert_eq!(line.search_text(), Some("MOTEUR-XL"));

        line.description_guess = Some("moteur asynchrone 4kW".to_string());
        assert_eq!(line.search_text(), Some("moteur asynchrone 4kW"));

        line.reference_guess = None;
        line.description_guess = None;
        assert_eq!(line.search_text(), None);
    }
}
