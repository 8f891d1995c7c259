use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use mailquote_core::ports::SourceDocument;
use serde_json::json;

use crate::commands::{parse_source_id, with_workspace, CommandResult};

/// Stores a source document. The body comes from `body_path`, or stdin when absent.
pub fn run(source_id: &str, body_path: Option<&Path>, attachment_path: Option<&Path>) -> CommandResult {
    let source_id = match parse_source_id("ingest", source_id) {
        Ok(source_id) => source_id,
        Err(result) => return result,
    };
    let (body, attachment_text) = match read_inputs(body_path, attachment_path) {
        Ok(inputs) => inputs,
        Err(error) => {
            return CommandResult::failure("ingest", "invalid_input", format!("{error:#}"), 6);
        }
    };
    if body.trim().is_empty() && attachment_text.is_none() {
        return CommandResult::failure("ingest", "invalid_input", "email body is empty", 6);
    }

    let document = SourceDocument { source_id, body, attachment_text };
    with_workspace("ingest", |workspace| async move {
        if let Err(error) = workspace.sources.save(&document).await {
            return CommandResult::failure("ingest", "persistence", error.to_string(), 7);
        }
        let data = json!({
            "source_id": document.source_id,
            "body_chars": document.body.chars().count(),
            "has_attachment": document.attachment_text.is_some(),
        });
        CommandResult::success_with(
            "ingest",
            format!("stored `{}`; run `analyze` to process it", document.source_id),
            &data,
        )
    })
}

fn read_inputs(
    body_path: Option<&Path>,
    attachment_path: Option<&Path>,
) -> Result<(String, Option<String>)> {
    let body = match body_path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading email body from `{}`", path.display()))?,
        None => {
            let mut body = String::new();
            io::stdin().read_to_string(&mut body).context("reading email body from stdin")?;
            body
        }
    };
    let attachment = attachment_path
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("reading attachment text from `{}`", path.display()))
        })
        .transpose()?
        .filter(|text| !text.trim().is_empty());
    Ok((body, attachment))
}
