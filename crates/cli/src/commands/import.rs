use std::fs;
use std::path::Path;

use canvass_core::transfer::SurveyExport;

use crate::commands::{correlation_id, with_service, CommandResult, Failure};

pub fn run(path: &Path) -> CommandResult {
    let export = match read_export(path) {
        Ok(export) => export,
        Err(failure) => return CommandResult::from_failure("import", failure),
    };

    let imported = with_service("import", |service| async move {
        Ok(service.import(export, &correlation_id("import")).await?)
    });

    match imported {
        Ok(detail) => CommandResult::success(
            "import",
            format!(
                "imported survey {} with {} questions",
                detail.survey.id,
                detail.question_links.len()
            ),
        ),
        Err(result) => result,
    }
}

fn read_export(path: &Path) -> Result<SurveyExport, Failure> {
    let raw = fs::read_to_string(path)
        .map_err(|error| Failure::input(format!("cannot read {}: {error}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|error| Failure::input(format!("{} is not a survey export: {error}", path.display())))
}
