use mailquote_core::AnalysisResult;

use crate::commands::{parse_source_id, with_workspace, CommandResult};

pub fn run(source_id: &str, force: bool) -> CommandResult {
    let source_id = match parse_source_id("analyze", source_id) {
        Ok(source_id) => source_id,
        Err(result) => return result,
    };

    with_workspace("analyze", |workspace| async move {
        match workspace.pipeline.analyze(&source_id, force).await {
            Ok(result) => CommandResult::success_with("analyze", summary(&result), &result),
            Err(error) => CommandResult::pipeline_failure("analyze", error),
        }
    })
}

pub(crate) fn summary(result: &AnalysisResult) -> String {
    let choice = if result.requires_user_choice { "; operator choice required" } else { "" };
    format!(
        "{} `{}`: {} line(s), {} dropped, confidence {}{choice}",
        result.classification.as_str(),
        result.source_id,
        result.lines.len(),
        result.dropped_lines.len(),
        result.confidence,
    )
}
