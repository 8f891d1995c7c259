//! Seams to the collaborators the pipeline consumes.
//!
//! Every outbound dependency (document source, extraction service, customer
//! registry, product catalog, storage) is reached through one of these traits
//! so that adapters in the `agent`, `erp` and `db` crates can be swapped for
//! in-memory fakes in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::analysis::{AnalysisResult, SourceId};
use crate::domain::correction::{
    CorrectionOverlay, CorrectionPatch, CorrectionTarget, PriceCorrection,
};
use crate::domain::customer::{Customer, CustomerCode};
use crate::domain::product::{CatalogItem, ItemCode, NegotiatedPrice};
use crate::domain::request::ExtractedRequest;
use crate::extraction::ExtractionError;

/// Failure talking to an external system of record.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExternalError {
    #[error("{system} rejected the credentials: {message}")]
    Authentication { system: String, message: String },
    #[error("{system} did not answer within {timeout_secs}s")]
    Timeout { system: String, timeout_secs: u64 },
    #[error("{system} is unavailable: {message}")]
    Unavailable { system: String, message: String },
    #[error("{system} returned an unexpected payload: {message}")]
    Protocol { system: String, message: String },
}

impl ExternalError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }

    pub fn system(&self) -> &str {
        match self {
            Self::Authentication { system, .. }
            | Self::Timeout { system, .. }
            | Self::Unavailable { system, .. }
            | Self::Protocol { system, .. } => system,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceDocument {
    pub source_id: SourceId,
    pub body: String,
    pub attachment_text: Option<String>,
}

pub const ATTACHMENT_SEPARATOR: &str = "\n\n--- attachment ---\n";

impl SourceDocument {
    /// Body followed by attachment text, the input handed to extraction.
    pub fn combined_text(&self) -> String {
        match self.attachment_text.as_deref().map(str::trim) {
            Some(attachment) if !attachment.is_empty() => {
                format!("{}{ATTACHMENT_SEPARATOR}{attachment}", self.body.trim_end())
            }
            _ => self.body.clone(),
        }
    }
}

#[async_trait]
pub trait SourceDocuments: Send + Sync {
    async fn fetch(&self, source_id: &SourceId) -> Result<Option<SourceDocument>, StoreError>;
}

#[async_trait]
pub trait RequestExtractor: Send + Sync {
    async fn extract(&self, raw_text: &str) -> Result<ExtractedRequest, ExtractionError>;
}

#[async_trait]
pub trait CustomerRegistry: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<Customer>, ExternalError>;
    async fn search_by_name(&self, name: &str, limit: usize)
        -> Result<Vec<Customer>, ExternalError>;
    async fn find_by_email_domain(&self, domain: &str) -> Result<Vec<Customer>, ExternalError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_item(&self, code: &str) -> Result<Option<CatalogItem>, ExternalError>;
    async fn search_items(&self, text: &str, limit: usize)
        -> Result<Vec<CatalogItem>, ExternalError>;
    async fn negotiated_price(
        &self,
        customer: &CustomerCode,
        item: &ItemCode,
    ) -> Result<Option<NegotiatedPrice>, ExternalError>;
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn load(&self, source_id: &SourceId) -> Result<Option<AnalysisResult>, StoreError>;
    async fn store(&self, result: &AnalysisResult) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CorrectionStore: Send + Sync {
    /// Merges `patch` into the overlay for `target` and returns the merged overlay.
    async fn upsert_overlay(
        &self,
        source_id: &SourceId,
        target: CorrectionTarget,
        patch: CorrectionPatch,
        author: &str,
    ) -> Result<CorrectionOverlay, StoreError>;
    async fn overlays(&self, source_id: &SourceId) -> Result<Vec<CorrectionOverlay>, StoreError>;
    async fn append_price_correction(&self, entry: &PriceCorrection) -> Result<(), StoreError>;
    /// Price corrections oldest first.
    async fn price_history(
        &self,
        source_id: &SourceId,
        line_index: Option<usize>,
    ) -> Result<Vec<PriceCorrection>, StoreError>;
}
