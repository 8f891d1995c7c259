use crate::commands::{parse_source_id, with_workspace, CommandResult};

pub fn run(source_id: &str, line: Option<usize>) -> CommandResult {
    let source_id = match parse_source_id("history", source_id) {
        Ok(source_id) => source_id,
        Err(result) => return result,
    };

    with_workspace("history", |workspace| async move {
        match workspace.pipeline.price_history(&source_id, line).await {
            Ok(entries) => {
                let scope = line.map(|line| format!(" line {line}")).unwrap_or_default();
                let message = format!(
                    "{} price correction(s) for `{source_id}`{scope}",
                    entries.len()
                );
                CommandResult::success_with("history", message, &entries)
            }
            Err(error) => CommandResult::pipeline_failure("history", error),
        }
    })
}
