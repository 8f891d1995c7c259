use mailquote_core::{CorrectionPatch, CorrectionTarget};
use serde_json::Value;

use crate::commands::analyze::summary;
use crate::commands::{parse_source_id, with_workspace, CommandResult};

pub fn run(source_id: &str, target: &str, assignments: &[String], author: &str) -> CommandResult {
    let source_id = match parse_source_id("correct", source_id) {
        Ok(source_id) => source_id,
        Err(result) => return result,
    };
    let target = match target.parse::<CorrectionTarget>() {
        Ok(target) => target,
        Err(message) => return CommandResult::failure("correct", "invalid_input", message, 6),
    };
    let patch = match parse_patch(assignments) {
        Ok(patch) => patch,
        Err(message) => return CommandResult::failure("correct", "invalid_input", message, 6),
    };
    let author = author.to_string();

    with_workspace("correct", |workspace| async move {
        match workspace.pipeline.apply_correction(&source_id, target, patch, &author).await {
            Ok(result) => CommandResult::success_with(
                "correct",
                format!("corrected {target}; {}", summary(&result)),
                &result,
            ),
            Err(error) => CommandResult::pipeline_failure("correct", error),
        }
    })
}

/// Parses `field=value` pairs. Values stay strings; the overlay validates numbers.
pub fn parse_patch(assignments: &[String]) -> Result<CorrectionPatch, String> {
    let mut patch = CorrectionPatch::new();
    for assignment in assignments {
        let Some((field, value)) = assignment.split_once('=') else {
            return Err(format!("expected FIELD=VALUE, got `{assignment}`"));
        };
        let field = field.trim();
        if field.is_empty() {
            return Err(format!("missing field name in `{assignment}`"));
        }
        patch.insert(field.to_string(), Value::String(value.trim().to_string()));
    }
    if patch.is_empty() {
        return Err("at least one --set FIELD=VALUE is required".to_string());
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::parse_patch;

    #[test]
    fn assignments_become_string_patch_values() {
        let patch = parse_patch(&["quantity=250".to_string(), " unit_price = 95,50 ".to_string()])
            .expect("patch");
        assert_eq!(patch.get("quantity"), Some(&Value::String("250".to_string())));
        assert_eq!(patch.get("unit_price"), Some(&Value::String("95,50".to_string())));
    }

    #[test]
    fn later_assignments_win_and_values_may_contain_equals() {
        let patch = parse_patch(&[
            "notes=first".to_string(),
            "notes=quai 3 = porte B".to_string(),
        ])
        .expect("patch");
        assert_eq!(patch.get("notes"), Some(&Value::String("quai 3 = porte B".to_string())));
    }

    #[test]
    fn malformed_assignments_are_rejected() {
        assert!(parse_patch(&["quantity".to_string()]).is_err());
        assert!(parse_patch(&["=12".to_string()]).is_err());
        assert!(parse_patch(&[]).is_err());
    }
}
