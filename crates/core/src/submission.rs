//! Turns a respondent's submission into a persistable response graph.
//!
//! Nothing is persisted here. The caller loads the survey, its links and the
//! option catalog, calls [`process_submission`], and writes the returned
//! [`SurveyResponse`] as a single unit.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::question::QuestionId;
use crate::domain::response::{
    AnswerId, AnswerInput, AnswerType, QuestionResponse, ResponseId, SelectedOption,
    SubmissionRequest, SurveyResponse,
};
use crate::domain::survey::{LinkedQuestion, Survey};
use crate::errors::DomainError;
use crate::validation::{validate_answer, OptionCatalog};

pub struct SubmissionContext<'a> {
    pub survey: &'a Survey,
    pub linked: &'a [LinkedQuestion],
    pub catalog: &'a OptionCatalog,
}

pub fn process_submission(
    context: &SubmissionContext<'_>,
    request: SubmissionRequest,
    submitter_origin: Option<String>,
    now: DateTime<Utc>,
) -> Result<SurveyResponse, DomainError> {
    if !context.survey.accepting_responses() {
        return Err(DomainError::forbidden("Survey is not accepting responses"));
    }
    check_request_shape(&request.answers)?;

    let mut visible: Vec<&LinkedQuestion> =
        context.linked.iter().filter(|item| !item.link.hidden).collect();
    visible.sort_by_key(|item| item.link.order_index);
    let by_question: HashMap<QuestionId, &LinkedQuestion> =
        visible.iter().map(|item| (item.question.id, *item)).collect();

    let answered: HashSet<QuestionId> =
        request.answers.iter().map(|answer| answer.question_id).collect();
    for item in &visible {
        let effective = item.effective();
        if effective.required && !answered.contains(&item.question.id) {
            return Err(DomainError::validation(format!(
                "Required question not answered: {}",
                effective.label
            )));
        }
    }

    for answer in &request.answers {
        if let Some(item) = by_question.get(&answer.question_id) {
            validate_answer(answer, &item.question, &item.effective_label(), context.catalog)?;
        }
    }

    let answers = request
        .answers
        .into_iter()
        .filter_map(|answer| {
            let item = by_question.get(&answer.question_id)?;
            Some(build_answer(answer, item.question.question_type.answer_type(), context.catalog))
        })
        .collect();

    Ok(SurveyResponse {
        id: ResponseId::generate(),
        survey_id: context.survey.id,
        submitted_at: now,
        submitter_id: request.submitter_id,
        submitter_origin,
        answers,
    })
}

fn check_request_shape(answers: &[AnswerInput]) -> Result<(), DomainError> {
    if answers.is_empty() {
        return Err(DomainError::validation("At least one answer is required"));
    }
    let mut seen = HashSet::with_capacity(answers.len());
    for answer in answers {
        if !seen.insert(answer.question_id) {
            return Err(DomainError::validation(format!(
                "Question answered more than once: {}",
                answer.question_id
            )));
        }
    }
    Ok(())
}

fn build_answer(
    answer: AnswerInput,
    answer_type: AnswerType,
    catalog: &OptionCatalog,
) -> QuestionResponse {
    // Ids that no longer resolve were deleted after the form was rendered.
    let selected_options = answer
        .selected_option_ids
        .iter()
        .filter_map(|id| catalog.get(id))
        .map(|option| SelectedOption { option_id: option.id, label_snapshot: option.label.clone() })
        .collect();

    QuestionResponse {
        id: AnswerId::generate(),
        question_id: answer.question_id,
        answer_type,
        text_answer: answer.text_answer,
        numeric_answer: answer.numeric_answer,
        selected_options,
    }
}
