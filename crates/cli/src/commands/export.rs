use crate::commands::{parse_survey_id, with_service, CommandResult};

/// Prints the survey's portable definition; links come out in display order.
pub fn run(survey_id: &str) -> CommandResult {
    let exported = with_service("export", |service| async move {
        let survey_id = parse_survey_id(survey_id)?;
        Ok(service.export(&survey_id).await?)
    });

    match exported {
        Ok(export) => {
            let message = format!("exported survey with {} questions", export.questions.len());
            CommandResult::success_with_document("export", &export, message)
        }
        Err(result) => result,
    }
}
