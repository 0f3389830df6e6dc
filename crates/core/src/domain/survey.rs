use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::question::{Question, QuestionId, MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS};
use crate::errors::DomainError;

uuid_id!(SurveyId);
uuid_id!(LinkId);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: SurveyId,
    pub title: String,
    pub description: Option<String>,
    pub published: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Survey {
    pub fn accepting_responses(&self) -> bool {
        self.published && !self.archived
    }

    /// Fails when publishing would leave a published survey without questions.
    pub fn ensure_publishable(published: bool, link_count: usize) -> Result<(), DomainError> {
        if published && link_count == 0 {
            return Err(DomainError::validation(
                "A survey must have at least one question to be published",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
}

impl SurveyDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_survey_text(&self.title, self.description.as_deref())
    }
}

pub(crate) fn validate_survey_text(
    title: &str,
    description: Option<&str>,
) -> Result<(), DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("Survey title is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(format!(
            "Title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    if description.is_some_and(|text| text.chars().count() > MAX_DESCRIPTION_CHARS) {
        return Err(DomainError::validation(format!(
            "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}

/// Per-survey replacements for a question's own fields. `None` means
/// "fall back to the question", an empty string is a real override.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOverrides {
    #[serde(default)]
    pub required_override: Option<bool>,
    #[serde(default)]
    pub label_override: Option<String>,
    #[serde(default)]
    pub description_override: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyQuestionLink {
    pub id: LinkId,
    pub survey_id: SurveyId,
    pub question_id: QuestionId,
    pub order_index: i32,
    #[serde(flatten)]
    pub overrides: LinkOverrides,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A link together with the question it points at, both already loaded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedQuestion {
    #[serde(flatten)]
    pub link: SurveyQuestionLink,
    pub question: Question,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDetail {
    #[serde(flatten)]
    pub survey: Survey,
    pub question_links: Vec<LinkedQuestion>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLink {
    pub question_id: QuestionId,
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(flatten)]
    pub overrides: LinkOverrides,
    #[serde(default)]
    pub hidden: bool,
}

/// Partial link update; absent fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPatch {
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(default)]
    pub required_override: Option<bool>,
    #[serde(default)]
    pub label_override: Option<String>,
    #[serde(default)]
    pub description_override: Option<String>,
    #[serde(default)]
    pub hidden: Option<bool>,
}

impl SurveyQuestionLink {
    pub fn apply_patch(&mut self, patch: LinkPatch, now: DateTime<Utc>) {
        if let Some(order_index) = patch.order_index {
            self.order_index = order_index;
        }
        if let Some(required) = patch.required_override {
            self.overrides.required_override = Some(required);
        }
        if let Some(label) = patch.label_override {
            self.overrides.label_override = Some(label);
        }
        if let Some(description) = patch.description_override {
            self.overrides.description_override = Some(description);
        }
        if let Some(hidden) = patch.hidden {
            self.hidden = hidden;
        }
        self.updated_at = now;
    }
}
