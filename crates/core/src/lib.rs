pub mod analytics;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ordering;
pub mod overrides;
pub mod submission;
pub mod transfer;
pub mod validation;

pub use analytics::{
    AnalyticsInput, DailySubmissionCount, OptionCount, OptionTally, QuestionAnalytics,
    QuestionTally, ScaleStatistics, SurveyAnalytics, MAX_TEXT_SAMPLES,
};
pub use domain::question::{
    LinearScaleConfig, OptionDraft, OptionId, OptionRef, Question, QuestionDraft, QuestionId,
    QuestionOption, QuestionType,
};
pub use domain::response::{
    AnswerId, AnswerInput, AnswerType, Page, QuestionResponse, ResponseId, ResponseSummary,
    SelectedOption, SubmissionRequest, SurveyResponse,
};
pub use domain::survey::{
    LinkId, LinkOverrides, LinkPatch, LinkedQuestion, NewLink, Survey, SurveyDetail, SurveyDraft,
    SurveyId, SurveyQuestionLink,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use overrides::{EffectiveQuestion, PublicSurvey};
pub use submission::SubmissionContext;
pub use transfer::{ImportPlan, SurveyExport};
pub use validation::OptionCatalog;
