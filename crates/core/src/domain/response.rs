use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::question::{OptionId, QuestionId};
use crate::domain::survey::SurveyId;

uuid_id!(ResponseId);
uuid_id!(AnswerId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerType {
    Text,
    Selection,
    Numeric,
    Date,
    Time,
}

impl AnswerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Selection => "SELECTION",
            Self::Numeric => "NUMERIC",
            Self::Date => "DATE",
            Self::Time => "TIME",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Some(Self::Text),
            "SELECTION" => Some(Self::Selection),
            "NUMERIC" => Some(Self::Numeric),
            "DATE" => Some(Self::Date),
            "TIME" => Some(Self::Time),
            _ => None,
        }
    }
}

/// One answer as sent by a respondent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerInput {
    pub question_id: QuestionId,
    #[serde(default)]
    pub text_answer: Option<String>,
    #[serde(default)]
    pub selected_option_ids: Vec<OptionId>,
    #[serde(default)]
    pub numeric_answer: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub survey_id: SurveyId,
    #[serde(default)]
    pub submitter_id: Option<String>,
    #[serde(default)]
    pub answers: Vec<AnswerInput>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedOption {
    pub option_id: OptionId,
    pub label_snapshot: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub answer_type: AnswerType,
    pub text_answer: Option<String>,
    pub numeric_answer: Option<i32>,
    pub selected_options: Vec<SelectedOption>,
}

/// A stored submission. Append-only: never edited once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: ResponseId,
    pub survey_id: SurveyId,
    pub submitted_at: DateTime<Utc>,
    pub submitter_id: Option<String>,
    pub submitter_origin: Option<String>,
    pub answers: Vec<QuestionResponse>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSummary {
    pub id: ResponseId,
    pub survey_id: SurveyId,
    pub submitted_at: DateTime<Utc>,
    pub submitter_id: Option<String>,
    pub answer_count: u32,
}

impl From<&SurveyResponse> for ResponseSummary {
    fn from(response: &SurveyResponse) -> Self {
        Self {
            id: response.id,
            survey_id: response.survey_id,
            submitted_at: response.submitted_at,
            submitter_id: response.submitter_id.clone(),
            answer_count: response.answers.len() as u32,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}
