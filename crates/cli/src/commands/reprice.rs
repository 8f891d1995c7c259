use mailquote_core::LinePricing;

use crate::commands::{parse_source_id, with_workspace, CommandResult};

pub fn run(source_id: &str) -> CommandResult {
    let source_id = match parse_source_id("reprice", source_id) {
        Ok(source_id) => source_id,
        Err(result) => return result,
    };

    with_workspace("reprice", |workspace| async move {
        match workspace.pipeline.recalculate_pricing(&source_id).await {
            Ok(result) => {
                let priced = result
                    .lines
                    .iter()
                    .filter(|line| matches!(line.pricing, LinePricing::Priced(_)))
                    .count();
                let message =
                    format!("repriced `{source_id}`: {priced}/{} line(s) priced", result.lines.len());
                CommandResult::success_with("reprice", message, &result)
            }
            Err(error) => CommandResult::pipeline_failure("reprice", error),
        }
    })
}
