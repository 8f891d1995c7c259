use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::{CustomerCandidate, CustomerCode};
use crate::domain::product::{ItemCode, ProductCandidate};
use crate::domain::request::{ActionType, DeliveryHints, ExtractedRequest, LineItem};
use crate::pricing::PricingDecision;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerResolution {
    pub candidates: Vec<CustomerCandidate>,
    pub selected: Option<CustomerCandidate>,
    pub requires_user_choice: bool,
    pub reason: String,
}

/// Pricing state of one resolved line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinePricing {
    Priced(PricingDecision),
    AwaitingSelection,
    Unpriced { reason: String, retryable: bool },
    /// The action type does not ask for prices.
    Skipped,
}

impl LinePricing {
    pub fn decision(&self) -> Option<&PricingDecision> {
        match self {
            Self::Priced(decision) => Some(decision),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineResult {
    /// Index of the line in the extracted request, stable across filtering.
    pub line_index: usize,
    pub line: LineItem,
    pub candidates: Vec<ProductCandidate>,
    pub selected: Option<ProductCandidate>,
    pub requires_user_choice: bool,
    pub reason: String,
    pub pricing: LinePricing,
    /// Item the current pricing was computed for.
    #[serde(default)]
    pub priced_item: Option<ItemCode>,
    /// Validated customer the current pricing was computed for.
    #[serde(default)]
    pub priced_customer: Option<CustomerCode>,
    /// Fields whose effective value comes from a correction.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrected_fields: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedLine {
    pub line_index: usize,
    pub reference: String,
    pub rule: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub source_id: SourceId,
    pub classification: ActionType,
    pub confidence: u8,
    pub requires_user_choice: bool,
    pub reasoning: Vec<String>,
    pub request: ExtractedRequest,
    pub customer: Option<CustomerResolution>,
    pub lines: Vec<LineResult>,
    pub dropped_lines: Vec<DroppedLine>,
    pub delivery: DeliveryHints,
    pub analyzed_at: DateTime<Utc>,
    pub priced_at: Option<DateTime<Utc>>,
}

impl AnalysisResult {
    pub fn line(&self, line_index: usize) -> Option<&LineResult> {
        self.lines.iter().find(|line| line.line_index == line_index)
    }

    pub fn line_mut(&mut self, line_index: usize) -> Option<&mut LineResult> {
        self.lines.iter_mut().find(|line| line.line_index == line_index)
    }

    pub fn selected_customer(&self) -> Option<&CustomerCandidate> {
        self.customer.as_ref().and_then(|resolution| resolution.selected.as_ref())
    }

    /// Recomputes the top-level choice flag from the customer and lines.
    pub fn refresh_status(&mut self) {
        let customer_pending = self
            .customer
            .as_ref()
            .map(|resolution| resolution.requires_user_choice)
            .unwrap_or(false);
        let line_pending = self.lines.iter().any(|line| line.requires_user_choice);
        self.requires_user_choice = customer_pending || line_pending;
    }
}
