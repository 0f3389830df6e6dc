//! Effective per-survey values of a linked question.
//!
//! Each field falls back to the question independently: a link may override
//! the label and leave the description and required flag untouched.

use serde::{Deserialize, Serialize};

use crate::domain::question::{LinearScaleConfig, OptionId, Question, QuestionId, QuestionType};
use crate::domain::survey::{LinkedQuestion, Survey, SurveyId, SurveyQuestionLink};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveQuestion {
    pub label: String,
    pub description: Option<String>,
    pub required: bool,
}

pub fn resolve(question: &Question, link: &SurveyQuestionLink) -> EffectiveQuestion {
    let overrides = &link.overrides;
    EffectiveQuestion {
        label: overrides.label_override.clone().unwrap_or_else(|| question.title.clone()),
        description: overrides
            .description_override
            .clone()
            .or_else(|| question.description.clone()),
        required: overrides.required_override.unwrap_or(question.required),
    }
}

impl LinkedQuestion {
    pub fn effective(&self) -> EffectiveQuestion {
        resolve(&self.question, &self.link)
    }

    pub fn effective_label(&self) -> String {
        self.link.overrides.label_override.clone().unwrap_or_else(|| self.question.title.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOption {
    pub id: OptionId,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub question_id: QuestionId,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub required: bool,
    pub max_length: Option<u32>,
    pub linear_scale_config: Option<LinearScaleConfig>,
    pub options: Vec<PublicOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSurvey {
    pub id: SurveyId,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<PublicQuestion>,
}

/// What a respondent sees: visible links only, in link order, with overrides applied.
pub fn public_view(survey: &Survey, linked: &[LinkedQuestion]) -> Result<PublicSurvey, DomainError> {
    if !survey.accepting_responses() {
        return Err(DomainError::forbidden("Survey is not available"));
    }

    let mut visible: Vec<&LinkedQuestion> = linked.iter().filter(|item| !item.link.hidden).collect();
    visible.sort_by_key(|item| item.link.order_index);

    let questions = visible
        .into_iter()
        .map(|item| {
            let effective = item.effective();
            let mut options = item.question.options.clone();
            options.sort_by_key(|option| option.position);
            PublicQuestion {
                question_id: item.question.id,
                title: effective.label,
                description: effective.description,
                question_type: item.question.question_type,
                required: effective.required,
                max_length: item.question.max_length,
                linear_scale_config: item.question.linear_scale_config.clone(),
                options: options
                    .into_iter()
                    .map(|option| PublicOption { id: option.id, label: option.label })
                    .collect(),
            }
        })
        .collect();

    Ok(PublicSurvey {
        id: survey.id,
        title: survey.title.clone(),
        description: survey.description.clone(),
        questions,
    })
}
