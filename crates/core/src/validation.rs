//! Per-answer checks against a question's type-specific constraints.

use std::collections::HashMap;

use crate::domain::question::{OptionId, OptionRef, Question, QuestionType};
use crate::domain::response::AnswerInput;
use crate::errors::DomainError;

/// Options that currently exist in the option store, keyed by id.
///
/// A selected id absent from the catalog refers to an option deleted after
/// the form was rendered; such ids are tolerated here and dropped when the
/// response graph is built. An id that exists but belongs to another
/// question is a real violation.
#[derive(Clone, Debug, Default)]
pub struct OptionCatalog {
    options: HashMap<OptionId, OptionRef>,
}

impl OptionCatalog {
    pub fn new(options: impl IntoIterator<Item = OptionRef>) -> Self {
        Self { options: options.into_iter().map(|option| (option.id, option)).collect() }
    }

    pub fn get(&self, id: &OptionId) -> Option<&OptionRef> {
        self.options.get(id)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

pub fn validate_answer(
    answer: &AnswerInput,
    question: &Question,
    label: &str,
    catalog: &OptionCatalog,
) -> Result<(), DomainError> {
    match question.question_type {
        QuestionType::ShortAnswer | QuestionType::Paragraph => {
            if let (Some(text), Some(max_length)) = (&answer.text_answer, question.max_length) {
                if text.chars().count() > max_length as usize {
                    return Err(DomainError::validation(format!(
                        "Answer exceeds maximum length for question: {label}"
                    )));
                }
            }
        }
        QuestionType::MultipleChoice | QuestionType::Dropdown => {
            if answer.selected_option_ids.len() > 1 {
                return Err(DomainError::validation(format!(
                    "Only one option can be selected for: {label}"
                )));
            }
            validate_option_ids(&answer.selected_option_ids, question, label, catalog)?;
        }
        QuestionType::Checkboxes => {
            validate_option_ids(&answer.selected_option_ids, question, label, catalog)?;
        }
        QuestionType::LinearScale => {
            if let (Some(value), Some(config)) =
                (answer.numeric_answer, question.linear_scale_config.as_ref())
            {
                if !config.contains(value) {
                    return Err(DomainError::validation(format!(
                        "Scale value out of range for: {label}"
                    )));
                }
            }
        }
        QuestionType::Date | QuestionType::Time => {}
    }

    Ok(())
}

fn validate_option_ids(
    ids: &[OptionId],
    question: &Question,
    label: &str,
    catalog: &OptionCatalog,
) -> Result<(), DomainError> {
    for id in ids {
        if question.has_option(id) {
            continue;
        }
        let belongs_elsewhere =
            catalog.get(id).is_some_and(|option| option.question_id != question.id);
        if belongs_elsewhere {
            return Err(DomainError::validation(format!(
                "Invalid option selected for question: {label}"
            )));
        }
    }
    Ok(())
}
