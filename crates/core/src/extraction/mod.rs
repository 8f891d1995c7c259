mod filter;
mod parse;

pub use filter::{ReferenceClass, ReferenceFilter};
pub use parse::{locate_json_object, parse_extraction};

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// The service answered but no usable JSON object could be read. Not retryable.
    #[error("{0}")]
    Format(String),
    /// Transport failure, non-success status, timeout or client misconfiguration.
    #[error("{message}")]
    Service { message: String, timed_out: bool, retryable: bool },
}

impl ExtractionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Service { retryable: true, .. })
    }
}
