use std::sync::Arc;

use async_trait::async_trait;
use mailquote_core::domain::request::ExtractedRequest;
use mailquote_core::extraction::{parse_extraction, ExtractionError, ReferenceFilter};
use mailquote_core::ports::RequestExtractor;
use tracing::{info, warn};

use crate::llm::{LlmClient, LlmError};
use crate::prompts::{extraction_prompt, EXTRACTION_SYSTEM_PROMPT};

/// [`RequestExtractor`] backed by a language model.
pub struct LlmRequestExtractor {
    client: Arc<dyn LlmClient>,
    filter: ReferenceFilter,
}

impl LlmRequestExtractor {
    pub fn new(client: Arc<dyn LlmClient>, filter: ReferenceFilter) -> Self {
        Self { client, filter }
    }
}

#[async_trait]
impl RequestExtractor for LlmRequestExtractor {
    async fn extract(&self, raw_text: &str) -> Result<ExtractedRequest, ExtractionError> {
        let output = self
            .client
            .complete(EXTRACTION_SYSTEM_PROMPT, &extraction_prompt(raw_text))
            .await
            .map_err(|error| {
                warn!(event_name = "extraction.service.failed", error = %error, "llm call failed");
                service_error(error)
            })?;

        let mut request = parse_extraction(raw_text, &output).map_err(|error| {
            warn!(event_name = "extraction.format.rejected", error = %error, "unusable llm output");
            error
        })?;
        self.filter.normalize(&mut request);

        info!(
            event_name = "extraction.completed",
            action_type = request.detected_action_type.as_str(),
            line_count = request.line_items.len(),
            confidence = request.confidence,
            "request extracted"
        );
        Ok(request)
    }
}

fn service_error(error: LlmError) -> ExtractionError {
    let timed_out = matches!(error, LlmError::Timeout { .. });
    let retryable = error.is_retryable();
    match error {
        LlmError::Decode(message) => ExtractionError::Format(message),
        other => ExtractionError::Service { message: other.to_string(), timed_out, retryable },
    }
}
