pub mod analyze;
pub mod config;
pub mod correct;
pub mod doctor;
pub mod history;
pub mod ingest;
pub mod migrate;
pub mod reprice;
pub mod show;

use std::future::Future;

use mailquote_core::config::{AppConfig, LoadOptions};
use mailquote_core::{ApplicationError, InterfaceError, PipelineError, SourceId};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::bootstrap::{self, Workspace};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    /// Success carrying a structured `data` payload.
    pub fn success_with<T: Serialize>(command: &str, message: impl Into<String>, data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 8),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with(command, error_class, message, exit_code, None)
    }

    fn failure_with(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Maps a pipeline failure through the interface error classes.
    pub fn pipeline_failure(command: &str, error: PipelineError) -> Self {
        let correlation_id = Uuid::new_v4().to_string();
        let step = error.step();
        let retryable = error.is_retryable();
        let message = error.to_string();
        let interface = ApplicationError::from(error).into_interface(correlation_id.clone());
        let exit_code = match interface {
            InterfaceError::BadRequest { .. } => 6,
            InterfaceError::ServiceUnavailable { .. } => 7,
            InterfaceError::Internal { .. } => 8,
        };
        let data = json!({
            "step": step,
            "retryable": retryable,
            "correlation_id": correlation_id,
            "hint": interface.user_message(),
        });
        Self::failure_with(command, interface.class(), message, exit_code, Some(data))
    }
}

/// Loads config, opens the workspace on a current-thread runtime and runs `task`.
pub(crate) fn with_workspace<F, Fut>(command: &str, task: F) -> CommandResult
where
    F: FnOnce(Workspace) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async {
        let workspace = match bootstrap::open(config).await {
            Ok(workspace) => workspace,
            Err(error) => {
                return CommandResult::failure(
                    command,
                    error.class(),
                    error.to_string(),
                    error.exit_code(),
                );
            }
        };
        let pool = workspace.pool.clone();
        let result = task(workspace).await;
        pool.close().await;
        result
    })
}

pub(crate) fn parse_source_id(command: &str, raw: &str) -> Result<SourceId, CommandResult> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CommandResult::failure(command, "invalid_input", "source id is required", 6));
    }
    Ok(SourceId(trimmed.to_string()))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
