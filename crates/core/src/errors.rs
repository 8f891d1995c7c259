use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::ports::{ExternalError, StoreError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid correction: {0}")]
    InvalidCorrection(String),
    #[error("source `{0}` has not been analyzed yet")]
    NotAnalyzed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest {
                    message: error.to_string(),
                    correlation_id: "unassigned".to_owned(),
                }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

/// Stage of the analysis pipeline an error originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Document,
    Extraction,
    CustomerResolution,
    ProductResolution,
    Pricing,
    Correction,
    Storage,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Extraction => "extraction",
            Self::CustomerResolution => "customer_resolution",
            Self::ProductResolution => "product_resolution",
            Self::Pricing => "pricing",
            Self::Correction => "correction",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("extraction output was not a usable JSON object: {0}")]
    ExtractionFormat(String),
    #[error("extraction service failed: {message}")]
    ExtractionService { message: String, timed_out: bool, retryable: bool },
    #[error("authentication against {system} failed: {message}")]
    Authentication { step: PipelineStep, system: String, message: String },
    #[error("{step} failed: {source}")]
    Resolution { step: PipelineStep, source: ExternalError },
    #[error("source document `{source_id}` is unavailable: {message}")]
    Document { source_id: String, message: String },
    #[error("source `{0}` has not been analyzed yet")]
    NotAnalyzed(String),
    #[error("invalid correction: {0}")]
    InvalidCorrection(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl PipelineError {
    pub fn step(&self) -> PipelineStep {
        match self {
            Self::ExtractionFormat(_) | Self::ExtractionService { .. } => PipelineStep::Extraction,
            Self::Authentication { step, .. } | Self::Resolution { step, .. } => *step,
            Self::Document { .. } => PipelineStep::Document,
            Self::NotAnalyzed(_) | Self::InvalidCorrection(_) => PipelineStep::Correction,
            Self::Persistence(_) => PipelineStep::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExtractionService { retryable, .. } => *retryable,
            Self::Persistence(_) => true,
            Self::Resolution { source, .. } => source.is_retryable(),
            Self::ExtractionFormat(_)
            | Self::Authentication { .. }
            | Self::Document { .. }
            | Self::NotAnalyzed(_)
            | Self::InvalidCorrection(_) => false,
        }
    }

    /// Maps an external failure at `step`, lifting authentication failures out.
    pub fn external(step: PipelineStep, error: ExternalError) -> Self {
        match error {
            ExternalError::Authentication { system, message } => {
                Self::Authentication { step, system, message }
            }
            other => Self::Resolution { step, source: other },
        }
    }
}

impl From<ExtractionError> for PipelineError {
    fn from(value: ExtractionError) -> Self {
        match value {
            ExtractionError::Format(message) => Self::ExtractionFormat(message),
            ExtractionError::Service { message, timed_out, retryable } => {
                Self::ExtractionService { message, timed_out, retryable }
            }
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<PipelineError> for ApplicationError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::NotAnalyzed(source_id) => DomainError::NotAnalyzed(source_id).into(),
            PipelineError::InvalidCorrection(message) => {
                DomainError::InvalidCorrection(message).into()
            }
            PipelineError::ExtractionFormat(message) => {
                Self::Integration(format!("extraction output rejected: {message}"))
            }
            PipelineError::Persistence(message) => Self::Persistence(message),
            PipelineError::Authentication { .. }
            | PipelineError::ExtractionService { retryable: false, .. } => {
                Self::Configuration(value.to_string())
            }
            other => Self::Integration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{
        ApplicationError, DomainError, InterfaceError, PipelineError, PipelineStep,
    };
    use crate::extraction::ExtractionError;
    use crate::ports::ExternalError;

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::NotAnalyzed("mail-1".to_owned()))
            .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.class(), "service_unavailable");
    }

    #[test]
    fn invalid_correction_is_a_bad_request() {
        let interface = ApplicationError::from(PipelineError::InvalidCorrection(
            "unknown field `colour`".to_owned(),
        ))
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::BadRequest { ref message, .. }
            if message.contains("colour")));
    }

    #[test]
    fn extraction_errors_keep_retry_semantics() {
        let format = PipelineError::from(ExtractionError::Format("no JSON object".to_owned()));
        let service = PipelineError::from(ExtractionError::Service {
            message: "timed out".to_owned(),
            timed_out: true,
            retryable: true,
        });

        assert!(!format.is_retryable());
        assert!(service.is_retryable());
        assert_eq!(format.step(), PipelineStep::Extraction);
    }

    #[test]
    fn misconfigured_extraction_is_internal_and_final() {
        let error = PipelineError::from(ExtractionError::Service {
            message: "llm client misconfigured: missing api key".to_owned(),
            timed_out: false,
            retryable: false,
        });
        assert!(!error.is_retryable());
        assert_eq!(error.step(), PipelineStep::Extraction);

        let interface = ApplicationError::from(error).into_interface("req-5");
        assert!(matches!(interface, InterfaceError::Internal { .. }));
    }

    #[test]
    fn external_failures_name_their_step() {
        let timeout = PipelineError::external(
            PipelineStep::ProductResolution,
            ExternalError::Timeout { system: "catalog".to_owned(), timeout_secs: 20 },
        );
        assert_eq!(timeout.step(), PipelineStep::ProductResolution);
        assert!(timeout.is_retryable());

        let rejected = PipelineError::external(
            PipelineStep::ProductResolution,
            ExternalError::Authentication {
                system: "catalog".to_owned(),
                message: "rejected twice".to_owned(),
            },
        );
        assert!(matches!(rejected, PipelineError::Authentication { .. }));
        assert!(!rejected.is_retryable());
    }
}
