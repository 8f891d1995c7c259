use crate::commands::analyze::summary;
use crate::commands::{parse_source_id, with_workspace, CommandResult};

/// Reads the stored analysis; never calls the LLM or the ERP.
pub fn run(source_id: &str, raw: bool) -> CommandResult {
    let source_id = match parse_source_id("show", source_id) {
        Ok(source_id) => source_id,
        Err(result) => return result,
    };

    with_workspace("show", |workspace| async move {
        let result = if raw {
            workspace.pipeline.get_machine_result(&source_id).await
        } else {
            workspace.pipeline.get_effective_result(&source_id).await
        };
        match result {
            Ok(result) => CommandResult::success_with("show", summary(&result), &result),
            Err(error) => CommandResult::pipeline_failure("show", error),
        }
    })
}
