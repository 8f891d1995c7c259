//! Language-model side of the pipeline.
//!
//! - **LLM client** (`llm`) - one HTTP client for OpenAI, Anthropic and Ollama with bounded timeout and retries
//! - **Prompts** (`prompts`) - the extraction task description
//! - **Extraction** (`extraction`) - [`RequestExtractor`](mailquote_core::ports::RequestExtractor) on top of the client
//!
//! The model is strictly a reader. It never chooses customers, products or
//! prices; those are decided by the resolution and pricing code in `mailquote-core`.

pub mod extraction;
pub mod llm;
pub mod prompts;

pub use extraction::LlmRequestExtractor;
pub use llm::{HttpLlmClient, LlmClient, LlmError, RetryPolicy};
