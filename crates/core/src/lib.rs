pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod extraction;
pub mod overlay;
pub mod pipeline;
pub mod ports;
pub mod pricing;
pub mod resolution;

pub use domain::analysis::{AnalysisResult, CustomerResolution, LinePricing, LineResult, SourceId};
pub use domain::correction::{CorrectionOverlay, CorrectionPatch, CorrectionTarget, PriceCorrection};
pub use domain::customer::{Customer, CustomerCandidate, CustomerCode};
pub use domain::product::{CatalogItem, ItemCode, NegotiatedPrice, ProductCandidate};
pub use domain::request::{ActionType, DeliveryHints, ExtractedRequest, LineItem};
pub use errors::{ApplicationError, DomainError, InterfaceError, PipelineError, PipelineStep};
pub use extraction::{ExtractionError, ReferenceFilter};
pub use pipeline::{PipelineDeps, PipelineSettings, QuotePipeline};
pub use pricing::{PricingAlert, PricingCase, PricingDecision};
