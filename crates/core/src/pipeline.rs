//! Extraction, resolution and pricing orchestration for one source document.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::AnalysisCache;
use crate::config::AppConfig;
use crate::domain::analysis::{
    AnalysisResult, CustomerResolution, DroppedLine, LinePricing, LineResult, SourceId,
};
use crate::domain::correction::{
    CorrectionOverlay, CorrectionPatch, CorrectionTarget, PriceCorrection,
};
use crate::domain::customer::{CustomerCandidate, CustomerCode};
use crate::domain::product::ItemCode;
use crate::domain::request::ExtractedRequest;
use crate::errors::{PipelineError, PipelineStep};
use crate::extraction::ReferenceFilter;
use crate::overlay::{apply_overlays, split_unit_price, validate_effective, validate_patch};
use crate::ports::{
    AnalysisStore, CorrectionStore, CustomerRegistry, ProductCatalog, RequestExtractor,
    SourceDocuments,
};
use crate::pricing::{PricingResolver, PricingRules};
use crate::resolution::{CustomerResolver, LineOutcome, ProductResolver, ResolutionSettings};

pub struct PipelineDeps {
    pub documents: Arc<dyn SourceDocuments>,
    pub extractor: Arc<dyn RequestExtractor>,
    pub registry: Arc<dyn CustomerRegistry>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub analyses: Arc<dyn AnalysisStore>,
    pub corrections: Arc<dyn CorrectionStore>,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineSettings {
    pub resolution: ResolutionSettings,
    pub pricing: PricingRules,
    pub extra_denylist: Vec<String>,
    pub extra_placeholders: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            resolution: ResolutionSettings::from(&config.resolution),
            pricing: PricingRules::from(&config.pricing),
            extra_denylist: config.resolution.extra_denylist.clone(),
            extra_placeholders: config.resolution.extra_placeholders.clone(),
        }
    }
}

pub struct QuotePipeline {
    documents: Arc<dyn SourceDocuments>,
    extractor: Arc<dyn RequestExtractor>,
    corrections: Arc<dyn CorrectionStore>,
    cache: AnalysisCache,
    customers: CustomerResolver,
    products: ProductResolver,
    pricing: PricingResolver,
}

impl QuotePipeline {
    pub fn new(deps: PipelineDeps, settings: PipelineSettings) -> Self {
        let filter = ReferenceFilter::new(&settings.extra_denylist, &settings.extra_placeholders);
        Self {
            documents: deps.documents,
            extractor: deps.extractor,
            corrections: deps.corrections,
            cache: AnalysisCache::new(deps.analyses),
            customers: CustomerResolver::new(deps.registry, settings.resolution.clone()),
            products: ProductResolver::new(deps.catalog.clone(), filter, settings.resolution),
            pricing: PricingResolver::new(deps.catalog, settings.pricing),
        }
    }

    /// Analyzes a source document and returns the effective (corrected) view.
    ///
    /// A cached analysis is reused unless `force` is set. A forced run that fails
    /// leaves the previous machine result in place.
    pub async fn analyze(
        &self,
        source_id: &SourceId,
        force: bool,
    ) -> Result<AnalysisResult, PipelineError> {
        let correlation_id = Uuid::new_v4().to_string();
        let _guard = self.cache.lock(source_id).await;

        let cached = if force { None } else { self.cache.get(source_id).await? };
        if let Some(cached) = cached {
            info!(
                event_name = "pipeline.analysis.cache_hit",
                correlation_id = %correlation_id,
                source_id = %source_id,
                "returning cached analysis"
            );
            return self.effective_view(cached).await;
        }

        info!(
            event_name = "pipeline.analysis.started",
            correlation_id = %correlation_id,
            source_id = %source_id,
            force,
            "analysis started"
        );

        let machine = match self.run_analysis(source_id).await {
            Ok(machine) => machine,
            Err(error) => {
                warn!(
                    event_name = "pipeline.analysis.failed",
                    correlation_id = %correlation_id,
                    source_id = %source_id,
                    step = %error.step(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "analysis failed"
                );
                return Err(error);
            }
        };
        self.cache.put(&machine).await?;

        info!(
            event_name = "pipeline.analysis.completed",
            correlation_id = %correlation_id,
            source_id = %source_id,
            classification = machine.classification.as_str(),
            line_count = machine.lines.len(),
            dropped_count = machine.dropped_lines.len(),
            requires_user_choice = machine.requires_user_choice,
            "analysis completed"
        );

        self.effective_view(machine).await
    }

    /// Machine result with every correction applied. Never calls external systems.
    pub async fn get_effective_result(
        &self,
        source_id: &SourceId,
    ) -> Result<AnalysisResult, PipelineError> {
        let machine = self.get_machine_result(source_id).await?;
        self.effective_view(machine).await
    }

    /// Cached machine result without corrections.
    pub async fn get_machine_result(
        &self,
        source_id: &SourceId,
    ) -> Result<AnalysisResult, PipelineError> {
        self.cache
            .get(source_id)
            .await?
            .ok_or_else(|| PipelineError::NotAnalyzed(source_id.to_string()))
    }

    pub async fn apply_correction(
        &self,
        source_id: &SourceId,
        target: CorrectionTarget,
        patch: CorrectionPatch,
        author: &str,
    ) -> Result<AnalysisResult, PipelineError> {
        let author = author.trim();
        if author.is_empty() {
            return Err(PipelineError::InvalidCorrection("author is required".to_string()));
        }

        let _guard = self.cache.lock(source_id).await;
        let machine = self.get_machine_result(source_id).await?;
        validate_patch(&machine, target, &patch)?;

        let (fields, unit_price) = match target {
            CorrectionTarget::Line(_) => split_unit_price(patch)?,
            _ => (patch, None),
        };

        let mut overlays = self.corrections.overlays(source_id).await?;
        let prices = self.corrections.price_history(source_id, None).await?;
        match overlays.iter_mut().find(|overlay| overlay.target == target) {
            Some(existing) => existing.patch.extend(fields.clone()),
            None => overlays.push(CorrectionOverlay {
                source_id: source_id.clone(),
                target,
                patch: fields.clone(),
                author: author.to_string(),
                updated_at: Utc::now(),
            }),
        }
        let prospective = apply_overlays(&machine, &overlays, &prices);
        validate_effective(&prospective, target, unit_price.is_some())?;

        if !fields.is_empty() {
            self.corrections.upsert_overlay(source_id, target, fields, author).await?;
        }
        if let Some(unit_price) = unit_price {
            let CorrectionTarget::Line(line_index) = target else {
                return Err(PipelineError::InvalidCorrection(
                    "unit_price only applies to a line".to_string(),
                ));
            };
            let entry = PriceCorrection {
                id: Uuid::new_v4().to_string(),
                source_id: source_id.clone(),
                line_index,
                unit_price,
                author: author.to_string(),
                recorded_at: Utc::now(),
            };
            self.corrections.append_price_correction(&entry).await?;
        }

        info!(
            event_name = "pipeline.correction.applied",
            source_id = %source_id,
            target = %target,
            author,
            "correction applied"
        );

        self.effective_view(machine).await
    }

    /// Reprices the corrected selections and stores the new pricing on the machine result.
    pub async fn recalculate_pricing(
        &self,
        source_id: &SourceId,
    ) -> Result<AnalysisResult, PipelineError> {
        let _guard = self.cache.lock(source_id).await;
        let mut machine = self.get_machine_result(source_id).await?;

        if machine.classification.prices_lines() {
            let overlays = self.corrections.overlays(source_id).await?;
            let selections = apply_overlays(&machine, &overlays, &[]);
            let customer = selections.selected_customer().cloned();
            let priced = self.price_lines(&selections.lines, customer.as_ref()).await;

            for priced_line in priced {
                if let Some(line) = machine.line_mut(priced_line.line_index) {
                    priced_line.record(line);
                }
            }
            machine.priced_at = Some(Utc::now());
            self.cache.put(&machine).await?;

            info!(
                event_name = "pipeline.pricing.recalculated",
                source_id = %source_id,
                line_count = machine.lines.len(),
                "pricing recalculated"
            );
        }

        self.effective_view(machine).await
    }

    pub async fn price_history(
        &self,
        source_id: &SourceId,
        line_index: Option<usize>,
    ) -> Result<Vec<PriceCorrection>, PipelineError> {
        Ok(self.corrections.price_history(source_id, line_index).await?)
    }

    async fn run_analysis(&self, source_id: &SourceId) -> Result<AnalysisResult, PipelineError> {
        let document = self
            .documents
            .fetch(source_id)
            .await
            .map_err(|error| PipelineError::Document {
                source_id: source_id.to_string(),
                message: error.to_string(),
            })?
            .ok_or_else(|| PipelineError::Document {
                source_id: source_id.to_string(),
                message: "no document stored under this id".to_string(),
            })?;

        let request = self.extractor.extract(&document.combined_text()).await?;
        let action = request.detected_action_type;

        let customer = async {
            if !action.resolves_customer() {
                return Ok(None);
            }
            let name = request.customer_name_guess.as_deref();
            let email = request.customer_email_guess.as_deref();
            self.customers
                .resolve(name, email)
                .await
                .map(Some)
                .map_err(|error| PipelineError::external(PipelineStep::CustomerResolution, error))
        };
        let products = async {
            if !action.resolves_products() {
                return Ok(Vec::new());
            }
            self.products
                .resolve_lines(&request.line_items)
                .await
                .map_err(|error| PipelineError::external(PipelineStep::ProductResolution, error))
        };
        let (customer, outcomes) = tokio::try_join!(customer, products)?;

        let mut lines = Vec::new();
        let mut dropped_lines = Vec::new();
        for outcome in outcomes {
            match outcome {
                LineOutcome::Resolved(resolved) => lines.push(LineResult {
                    line_index: resolved.line_index,
                    line: resolved.line,
                    candidates: resolved.candidates,
                    selected: resolved.selected,
                    requires_user_choice: resolved.requires_user_choice,
                    reason: resolved.reason,
                    pricing: LinePricing::Skipped,
                    priced_item: None,
                    priced_customer: None,
                    corrected_fields: Vec::new(),
                }),
                LineOutcome::Dropped(dropped) => dropped_lines.push(dropped),
            }
        }

        let mut priced_at = None;
        if action.prices_lines() {
            let validated = customer.as_ref().and_then(|resolution| resolution.selected.clone());
            for priced_line in self.price_lines(&lines, validated.as_ref()).await {
                let index = priced_line.line_index;
                if let Some(line) = lines.iter_mut().find(|line| line.line_index == index) {
                    priced_line.record(line);
                }
            }
            priced_at = Some(Utc::now());
        }

        let reasoning = reasoning(&request, customer.as_ref(), &lines, &dropped_lines);
        let mut result = AnalysisResult {
            source_id: source_id.clone(),
            classification: action,
            confidence: request.confidence,
            requires_user_choice: false,
            reasoning,
            delivery: request.delivery.clone(),
            request,
            customer,
            lines,
            dropped_lines,
            analyzed_at: Utc::now(),
            priced_at,
        };
        result.refresh_status();
        Ok(result)
    }

    /// Prices lines concurrently.
    async fn price_lines(
        &self,
        lines: &[LineResult],
        customer: Option<&CustomerCandidate>,
    ) -> Vec<PricedLine> {
        join_all(lines.iter().map(|line| async move {
            let selected = line.selected.as_ref();
            let pricing = self
                .pricing
                .price_line(line.line_index, selected, line.requires_user_choice, customer)
                .await;
            let (item, priced_for) = match pricing {
                LinePricing::Priced(_) => (
                    line.selected.as_ref().and_then(|selected| selected.item_code.clone()),
                    customer.map(|customer| customer.external_code.clone()),
                ),
                _ => (None, None),
            };
            PricedLine { line_index: line.line_index, pricing, item, customer: priced_for }
        }))
        .await
    }

    async fn effective_view(
        &self,
        machine: AnalysisResult,
    ) -> Result<AnalysisResult, PipelineError> {
        let overlays = self.corrections.overlays(&machine.source_id).await?;
        let prices = self.corrections.price_history(&machine.source_id, None).await?;
        Ok(apply_overlays(&machine, &overlays, &prices))
    }
}

/// Pricing outcome for one line together with the inputs it was computed for.
struct PricedLine {
    line_index: usize,
    pricing: LinePricing,
    item: Option<ItemCode>,
    customer: Option<CustomerCode>,
}

impl PricedLine {
    fn record(self, line: &mut LineResult) {
        line.pricing = self.pricing;
        line.priced_item = self.item;
        line.priced_customer = self.customer;
    }
}

fn reasoning(
    request: &ExtractedRequest,
    customer: Option<&CustomerResolution>,
    lines: &[LineResult],
    dropped: &[DroppedLine],
) -> Vec<String> {
    let action = request.detected_action_type;
    let mut notes = vec![format!(
        "classified as {} with confidence {}",
        action.as_str(),
        request.confidence
    )];

    if !action.resolves_customer() && !action.resolves_products() {
        notes.push(format!("action {} needs no customer or product resolution", action.as_str()));
        return notes;
    }

    match customer {
        Some(resolution) => notes.push(format!("customer: {}", resolution.reason)),
        None => notes.push(format!("customer not resolved for action {}", action.as_str())),
    }
    for line in lines {
        notes.push(format!("line {}: {}", line.line_index, line.reason));
    }
    for line in dropped {
        notes.push(format!(
            "line {} dropped by rule `{}` (reference `{}`)",
            line.line_index, line.rule, line.reference
        ));
    }
    if !action.prices_lines() && !lines.is_empty() {
        notes.push(format!("action {} does not price lines", action.as_str()));
    }
    notes
}
