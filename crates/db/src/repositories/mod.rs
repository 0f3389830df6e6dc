use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use uuid::Uuid;

use canvass_core::analytics::{DailySubmissionCount, QuestionTally};
use canvass_core::domain::question::{OptionId, OptionRef, Question, QuestionId};
use canvass_core::domain::response::{Page, ResponseId, ResponseSummary, SurveyResponse};
use canvass_core::domain::survey::{LinkId, LinkedQuestion, Survey, SurveyId, SurveyQuestionLink};
use canvass_core::transfer::ImportPlan;

pub mod memory;
pub mod question;
pub mod response;
pub mod survey;

pub use memory::InMemorySurveyStore;
pub use question::SqlQuestionRepository;
pub use response::SqlResponseRepository;
pub use survey::SqlSurveyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Includes archived questions; callers decide how to treat them.
    async fn find_by_id(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError>;

    /// Non-archived questions, newest first, optionally filtered by a
    /// case-insensitive match on title or description.
    async fn list(&self, search: Option<&str>) -> Result<Vec<Question>, RepositoryError>;

    /// Upserts the question and replaces its option set.
    async fn save(&self, question: Question) -> Result<(), RepositoryError>;

    /// Resolves option ids against every stored option, whichever question owns it.
    async fn find_options(&self, ids: &[OptionId]) -> Result<Vec<OptionRef>, RepositoryError>;
}

#[async_trait]
pub trait SurveyRepository: Send + Sync {
    async fn find_by_id(&self, id: &SurveyId) -> Result<Option<Survey>, RepositoryError>;

    /// Non-archived surveys, newest first, optionally filtered by title.
    async fn list(&self, search: Option<&str>) -> Result<Vec<Survey>, RepositoryError>;

    async fn save(&self, survey: Survey) -> Result<(), RepositoryError>;

    /// Links with their questions, ascending by order index.
    async fn list_links(&self, survey_id: &SurveyId)
        -> Result<Vec<LinkedQuestion>, RepositoryError>;

    /// Fails with [`RepositoryError::Conflict`] when the question is already linked.
    async fn insert_link(&self, link: SurveyQuestionLink) -> Result<(), RepositoryError>;

    /// Inserts the link after the survey's current last position. The index is
    /// chosen inside the write, so concurrent appends stay dense; `link.order_index`
    /// is ignored and the stored link is returned.
    async fn append_link(
        &self,
        link: SurveyQuestionLink,
    ) -> Result<SurveyQuestionLink, RepositoryError>;

    async fn update_link(&self, link: SurveyQuestionLink) -> Result<(), RepositoryError>;

    /// Deletes the link and renumbers the remaining ones in one transaction.
    /// Returns `false` when no such link exists in the survey.
    async fn remove_link(
        &self,
        survey_id: &SurveyId,
        link_id: &LinkId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Writes the survey, every planned question and the replacement link set
    /// in one transaction.
    async fn apply_import(&self, plan: ImportPlan) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Persists the response with all answers and selections, or nothing.
    async fn append(&self, response: SurveyResponse) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        survey_id: &SurveyId,
        response_id: &ResponseId,
    ) -> Result<Option<SurveyResponse>, RepositoryError>;

    /// Newest first. `page` is zero-based.
    async fn list_summaries(
        &self,
        survey_id: &SurveyId,
        page: u32,
        size: u32,
    ) -> Result<Page<ResponseSummary>, RepositoryError>;

    async fn count_for_survey(&self, survey_id: &SurveyId) -> Result<u64, RepositoryError>;

    async fn daily_counts(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<DailySubmissionCount>, RepositoryError>;

    /// Per-question aggregates over every stored answer to the survey.
    async fn question_tallies(
        &self,
        survey_id: &SurveyId,
        text_sample_limit: usize,
    ) -> Result<HashMap<QuestionId, QuestionTally>, RepositoryError>;
}

/// Fixed-width UTC form so stored timestamps sort lexically.
pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_uuid(column: &str, value: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(value).map_err(|error| {
        RepositoryError::Decode(format!("invalid uuid in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative count): {value}"
        ))
    })
}

pub(crate) fn conflict_or_database(error: sqlx::Error, message: String) -> RepositoryError {
    match &error {
        sqlx::Error::Database(database) if database.is_unique_violation() => {
            RepositoryError::Conflict(message)
        }
        _ => RepositoryError::Database(error),
    }
}

pub(crate) fn like_pattern(search: &str) -> String {
    format!("%{}%", search.trim().to_lowercase())
}
