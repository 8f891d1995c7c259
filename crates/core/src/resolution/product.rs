use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use super::normalize::{compact_code, name_similarity, normalize_name};
use super::{
    merge_candidates, select, similarity_score, ResolutionSettings, CODE_CONTAINS_SCORE,
    EXACT_CODE_SCORE,
};
use crate::domain::analysis::DroppedLine;
use crate::domain::product::{CatalogItem, ProductCandidate};
use crate::domain::request::LineItem;
use crate::extraction::{ReferenceClass, ReferenceFilter};
use crate::ports::{ExternalError, ProductCatalog};

pub const NEW_PRODUCT_REASON: &str = "no catalog match; treated as new product";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLine {
    pub line_index: usize,
    pub line: LineItem,
    pub candidates: Vec<ProductCandidate>,
    pub selected: Option<ProductCandidate>,
    pub requires_user_choice: bool,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Resolved(ResolvedLine),
    Dropped(DroppedLine),
}

pub struct ProductResolver {
    catalog: Arc<dyn ProductCatalog>,
    filter: ReferenceFilter,
    settings: ResolutionSettings,
}

impl ProductResolver {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        filter: ReferenceFilter,
        settings: ResolutionSettings,
    ) -> Self {
        Self { catalog, filter, settings }
    }

    /// Resolves every line concurrently, preserving input order in the output.
    pub async fn resolve_lines(
        &self,
        lines: &[LineItem],
    ) -> Result<Vec<LineOutcome>, ExternalError> {
        try_join_all(lines.iter().enumerate().map(|(index, line)| self.resolve_line(index, line)))
            .await
    }

    pub async fn resolve_line(
        &self,
        line_index: usize,
        line: &LineItem,
    ) -> Result<LineOutcome, ExternalError> {
        let candidates = match self.filter.classify(line) {
            ReferenceClass::Spurious { rule } => {
                debug!(
                    event_name = "resolution.product.dropped",
                    line_index,
                    rule = %rule,
                    "line reference filtered as document noise"
                );
                return Ok(LineOutcome::Dropped(DroppedLine {
                    line_index,
                    reference: line.reference_guess.clone().unwrap_or_default(),
                    rule,
                }));
            }
            ReferenceClass::Missing => {
                return Ok(LineOutcome::Dropped(DroppedLine {
                    line_index,
                    reference: String::new(),
                    rule: "empty_line".to_string(),
                }));
            }
            ReferenceClass::Code(code) => self.by_code(&code, line).await?,
            ReferenceClass::SearchRequired => match line.search_text() {
                Some(text) => self.by_search(None, text, line).await?,
                None => Vec::new(),
            },
        };

        let ranked = merge_candidates(candidates, self.settings.max_candidates);
        if ranked.is_empty() {
            let description = line
                .description_guess
                .clone()
                .or_else(|| line.reference_guess.clone())
                .unwrap_or_default();
            let placeholder = ProductCandidate::not_found(description, line.quantity);
            return Ok(LineOutcome::Resolved(ResolvedLine {
                line_index,
                line: line.clone(),
                candidates: vec![placeholder.clone()],
                selected: Some(placeholder),
                requires_user_choice: false,
                reason: NEW_PRODUCT_REASON.to_string(),
            }));
        }

        let selection = select(&ranked, self.settings.auto_validation);
        Ok(LineOutcome::Resolved(ResolvedLine {
            line_index,
            line: line.clone(),
            candidates: ranked,
            selected: selection.selected,
            requires_user_choice: selection.requires_user_choice,
            reason: selection.reason,
        }))
    }

    async fn by_code(
        &self,
        code: &str,
        line: &LineItem,
    ) -> Result<Vec<ProductCandidate>, ExternalError> {
        if let Some(item) = self.catalog.find_item(code).await? {
            let reason = "exact item code".to_string();
            return Ok(vec![candidate(item, line, EXACT_CODE_SCORE, reason)]);
        }
        let text = line.search_text().unwrap_or(code);
        self.by_search(Some(code), text, line).await
    }

    async fn by_search(
        &self,
        reference: Option<&str>,
        text: &str,
        line: &LineItem,
    ) -> Result<Vec<ProductCandidate>, ExternalError> {
        let items = self.catalog.search_items(text, self.settings.search_limit).await?;
        let wanted = normalize_name(text);
        let compact_reference = reference.map(compact_code).filter(|code| !code.is_empty());

        Ok(items
            .into_iter()
            .filter_map(|item| {
                let contains = compact_reference
                    .as_deref()
                    .map(|reference| compact_code(&item.item_code.0).contains(reference))
                    .unwrap_or(false);
                let similarity = name_similarity(&wanted, &normalize_name(&item.item_name));
                let fuzzy = similarity_score(similarity);

                if contains && CODE_CONTAINS_SCORE >= fuzzy {
                    let reason = "item code contains reference".to_string();
                    Some(candidate(item, line, CODE_CONTAINS_SCORE, reason))
                } else if fuzzy > 0 {
                    let reason = format!("description similarity {similarity:.2}");
                    Some(candidate(item, line, fuzzy, reason))
                } else {
                    None
                }
            })
            .collect())
    }
}

fn candidate(item: CatalogItem, line: &LineItem, score: u8, reason: String) -> ProductCandidate {
    ProductCandidate {
        item_code: Some(item.item_code),
        item_name: item.item_name,
        quantity: line.quantity,
        score,
        match_reason: reason,
        not_found_in_sap: false,
    }
}
