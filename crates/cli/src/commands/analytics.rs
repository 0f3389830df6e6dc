use crate::commands::{parse_survey_id, with_service, CommandResult};

pub fn run(survey_id: &str) -> CommandResult {
    let analytics = with_service("analytics", |service| async move {
        let survey_id = parse_survey_id(survey_id)?;
        Ok(service.analytics(&survey_id).await?)
    });

    match analytics {
        Ok(analytics) => {
            let message = format!(
                "{} submissions across {} questions",
                analytics.total_submissions,
                analytics.question_analytics.len()
            );
            CommandResult::success_with_document("analytics", &analytics, message)
        }
        Err(result) => result,
    }
}
