use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::response::AnswerType;
use crate::errors::DomainError;

pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

uuid_id!(QuestionId);
uuid_id!(OptionId);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    ShortAnswer,
    Paragraph,
    MultipleChoice,
    Checkboxes,
    Dropdown,
    Date,
    Time,
    LinearScale,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortAnswer => "SHORT_ANSWER",
            Self::Paragraph => "PARAGRAPH",
            Self::MultipleChoice => "MULTIPLE_CHOICE",
            Self::Checkboxes => "CHECKBOXES",
            Self::Dropdown => "DROPDOWN",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::LinearScale => "LINEAR_SCALE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SHORT_ANSWER" => Some(Self::ShortAnswer),
            "PARAGRAPH" => Some(Self::Paragraph),
            "MULTIPLE_CHOICE" => Some(Self::MultipleChoice),
            "CHECKBOXES" => Some(Self::Checkboxes),
            "DROPDOWN" => Some(Self::Dropdown),
            "DATE" => Some(Self::Date),
            "TIME" => Some(Self::Time),
            "LINEAR_SCALE" => Some(Self::LinearScale),
            _ => None,
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, Self::MultipleChoice | Self::Checkboxes | Self::Dropdown)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::ShortAnswer | Self::Paragraph)
    }

    /// Coarse category a stored answer to this question is interpreted as.
    pub fn answer_type(&self) -> AnswerType {
        match self {
            Self::ShortAnswer | Self::Paragraph => AnswerType::Text,
            Self::MultipleChoice | Self::Checkboxes | Self::Dropdown => AnswerType::Selection,
            Self::LinearScale => AnswerType::Numeric,
            Self::Date => AnswerType::Date,
            Self::Time => AnswerType::Time,
        }
    }
}

fn default_step() -> i32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinearScaleConfig {
    pub min_value: i32,
    pub max_value: i32,
    #[serde(default = "default_step")]
    pub step: i32,
    #[serde(default)]
    pub left_label: Option<String>,
    #[serde(default)]
    pub right_label: Option<String>,
}

impl LinearScaleConfig {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_value >= self.max_value {
            return Err(DomainError::validation("Min value must be less than max value"));
        }
        if self.step <= 0 {
            return Err(DomainError::validation("Step must be greater than 0"));
        }
        Ok(())
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min_value..=self.max_value).contains(&value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: OptionId,
    pub label: String,
    pub position: i32,
}

/// An option as seen by the option store, independent of any question graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRef {
    pub id: OptionId,
    pub question_id: QuestionId,
    pub label: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub required: bool,
    pub max_length: Option<u32>,
    pub linear_scale_config: Option<LinearScaleConfig>,
    pub options: Vec<QuestionOption>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn option_refs(&self) -> impl Iterator<Item = OptionRef> + '_ {
        self.options.iter().map(|option| OptionRef {
            id: option.id,
            question_id: self.id,
            label: option.label.clone(),
        })
    }

    pub fn has_option(&self, id: &OptionId) -> bool {
        self.options.iter().any(|option| &option.id == id)
    }

    /// Authoring form of this question, used for copies and exports.
    pub fn to_draft(&self) -> QuestionDraft {
        QuestionDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            question_type: self.question_type,
            required: self.required,
            max_length: self.max_length,
            linear_scale_config: self.linear_scale_config.clone(),
            options: self
                .options
                .iter()
                .map(|option| OptionDraft {
                    label: option.label.clone(),
                    position: Some(option.position),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDraft {
    pub label: String,
    #[serde(default, alias = "orderIndex")]
    pub position: Option<i32>,
}

/// Question definition as submitted by an author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub linear_scale_config: Option<LinearScaleConfig>,
    #[serde(default)]
    pub options: Vec<OptionDraft>,
}

impl QuestionDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("Question title is required"));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(DomainError::validation(format!(
                "Title must be at most {MAX_TITLE_CHARS} characters"
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_CHARS {
                return Err(DomainError::validation(format!(
                    "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
                )));
            }
        }
        if self.max_length == Some(0) {
            return Err(DomainError::validation("Max length must be greater than 0"));
        }

        if self.question_type.is_choice() {
            if self.options.is_empty() {
                return Err(DomainError::validation(format!(
                    "At least one option is required for {}",
                    self.question_type.as_str()
                )));
            }
            if self.options.iter().any(|option| option.label.trim().is_empty()) {
                return Err(DomainError::validation("Option label is required"));
            }
        }

        if self.question_type == QuestionType::LinearScale {
            let config = self.linear_scale_config.as_ref().ok_or_else(|| {
                DomainError::validation(
                    "Linear scale configuration is required for LINEAR_SCALE questions",
                )
            })?;
            config.validate()?;
        }

        Ok(())
    }

    /// Builds a brand-new question with fresh ids.
    pub fn into_question(self, id: QuestionId, now: DateTime<Utc>) -> Question {
        let options = self.build_options(&[]);
        let linear_scale_config = self.scale_config();
        Question {
            id,
            title: self.title,
            description: self.description,
            question_type: self.question_type,
            required: self.required,
            max_length: self.max_length,
            linear_scale_config,
            options,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the definition of `existing` in place. Options whose label is
    /// unchanged keep their id so historical selections still join.
    pub fn apply_to(self, existing: &Question, now: DateTime<Utc>) -> Question {
        let options = self.build_options(&existing.options);
        let linear_scale_config = self.scale_config();
        Question {
            id: existing.id,
            title: self.title,
            description: self.description,
            question_type: self.question_type,
            required: self.required,
            max_length: self.max_length,
            linear_scale_config,
            options,
            archived: existing.archived,
            created_at: existing.created_at,
            updated_at: now,
        }
    }

    fn scale_config(&self) -> Option<LinearScaleConfig> {
        (self.question_type == QuestionType::LinearScale)
            .then(|| self.linear_scale_config.clone())
            .flatten()
    }

    fn build_options(&self, previous: &[QuestionOption]) -> Vec<QuestionOption> {
        let mut reusable: Vec<&QuestionOption> = previous.iter().collect();
        self.options
            .iter()
            .enumerate()
            .map(|(index, draft)| {
                let reused = reusable
                    .iter()
                    .position(|option| option.label == draft.label)
                    .map(|slot| reusable.remove(slot).id);
                QuestionOption {
                    id: reused.unwrap_or_else(OptionId::generate),
                    label: draft.label.clone(),
                    position: draft.position.unwrap_or(index as i32),
                }
            })
            .collect()
    }
}
