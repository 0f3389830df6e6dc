//! Request-scoped orchestration: load what an operation needs, hand it to the
//! core engine, persist the result.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use canvass_core::analytics::{summarize, AnalyticsInput, SurveyAnalytics};
use canvass_core::config::SurveyConfig;
use canvass_core::domain::question::{OptionId, Question, QuestionDraft, QuestionId};
use canvass_core::domain::response::{
    Page, ResponseId, ResponseSummary, SubmissionRequest, SurveyResponse,
};
use canvass_core::domain::survey::{
    LinkId, LinkPatch, LinkedQuestion, NewLink, Survey, SurveyDetail, SurveyDraft, SurveyId,
    SurveyQuestionLink,
};
use canvass_core::errors::{ApplicationError, DomainError};
use canvass_core::ordering::validate_explicit_index;
use canvass_core::overrides::{public_view, PublicSurvey};
use canvass_core::submission::{process_submission, SubmissionContext};
use canvass_core::transfer::{export_survey, plan_import, SurveyExport};
use canvass_core::validation::OptionCatalog;

use crate::repositories::{
    InMemorySurveyStore, QuestionRepository, RepositoryError, ResponseRepository,
    SqlQuestionRepository, SqlResponseRepository, SqlSurveyRepository, SurveyRepository,
};
use crate::DbPool;

const COPY_SUFFIX: &str = " (Copy)";

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

#[derive(Clone)]
pub struct SurveyService {
    questions: Arc<dyn QuestionRepository>,
    surveys: Arc<dyn SurveyRepository>,
    responses: Arc<dyn ResponseRepository>,
    config: SurveyConfig,
}

impl SurveyService {
    pub fn new(
        questions: Arc<dyn QuestionRepository>,
        surveys: Arc<dyn SurveyRepository>,
        responses: Arc<dyn ResponseRepository>,
        config: SurveyConfig,
    ) -> Self {
        Self { questions, surveys, responses, config }
    }

    pub fn sqlite(pool: DbPool, config: SurveyConfig) -> Self {
        Self::new(
            Arc::new(SqlQuestionRepository::new(pool.clone())),
            Arc::new(SqlSurveyRepository::new(pool.clone())),
            Arc::new(SqlResponseRepository::new(pool)),
            config,
        )
    }

    pub fn in_memory(config: SurveyConfig) -> Self {
        let store = Arc::new(InMemorySurveyStore::default());
        Self::new(store.clone(), store.clone(), store, config)
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    // Question bank

    pub async fn list_questions(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<Question>, ApplicationError> {
        Ok(self.questions.list(search).await?)
    }

    pub async fn get_question(&self, id: &QuestionId) -> Result<Question, ApplicationError> {
        self.active_question(id).await
    }

    pub async fn create_question(
        &self,
        draft: QuestionDraft,
        correlation_id: &str,
    ) -> Result<Question, ApplicationError> {
        draft.validate()?;
        let question = draft.into_question(QuestionId::generate(), Utc::now());
        self.questions.save(question.clone()).await?;

        info!(
            event_name = "survey.question.created",
            correlation_id = %correlation_id,
            question_id = %question.id,
            question_type = question.question_type.as_str(),
            "question created"
        );
        Ok(question)
    }

    pub async fn update_question(
        &self,
        id: &QuestionId,
        draft: QuestionDraft,
        correlation_id: &str,
    ) -> Result<Question, ApplicationError> {
        draft.validate()?;
        let current = self.active_question(id).await?;
        let question = draft.apply_to(&current, Utc::now());
        self.questions.save(question.clone()).await?;

        info!(
            event_name = "survey.question.updated",
            correlation_id = %correlation_id,
            question_id = %question.id,
            option_count = question.options.len(),
            "question updated"
        );
        Ok(question)
    }

    pub async fn archive_question(
        &self,
        id: &QuestionId,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let mut question = self.active_question(id).await?;
        question.archived = true;
        question.updated_at = Utc::now();
        self.questions.save(question).await?;

        info!(
            event_name = "survey.question.archived",
            correlation_id = %correlation_id,
            question_id = %id,
            "question archived"
        );
        Ok(())
    }

    pub async fn copy_question(
        &self,
        id: &QuestionId,
        correlation_id: &str,
    ) -> Result<Question, ApplicationError> {
        let source = self.active_question(id).await?;
        let mut draft = source.to_draft();
        draft.title.push_str(COPY_SUFFIX);
        let copy = draft.into_question(QuestionId::generate(), Utc::now());
        self.questions.save(copy.clone()).await?;

        info!(
            event_name = "survey.question.copied",
            correlation_id = %correlation_id,
            question_id = %copy.id,
            source_question_id = %id,
            "question copied"
        );
        Ok(copy)
    }

    // Surveys

    pub async fn list_surveys(&self, search: Option<&str>) -> Result<Vec<Survey>, ApplicationError> {
        Ok(self.surveys.list(search).await?)
    }

    pub async fn get_survey(&self, id: &SurveyId) -> Result<SurveyDetail, ApplicationError> {
        let survey = self.active_survey(id).await?;
        let question_links = self.surveys.list_links(id).await?;
        Ok(SurveyDetail { survey, question_links })
    }

    /// New surveys always start unpublished, whatever the draft says.
    pub async fn create_survey(
        &self,
        draft: SurveyDraft,
        correlation_id: &str,
    ) -> Result<Survey, ApplicationError> {
        draft.validate()?;
        let now = Utc::now();
        let survey = Survey {
            id: SurveyId::generate(),
            title: draft.title,
            description: draft.description,
            published: false,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        self.surveys.save(survey.clone()).await?;

        info!(
            event_name = "survey.created",
            correlation_id = %correlation_id,
            survey_id = %survey.id,
            "survey created"
        );
        Ok(survey)
    }

    pub async fn update_survey(
        &self,
        id: &SurveyId,
        draft: SurveyDraft,
        correlation_id: &str,
    ) -> Result<Survey, ApplicationError> {
        draft.validate()?;
        let current = self.active_survey(id).await?;
        let published = draft.published.unwrap_or(current.published);
        if published {
            let link_count = self.surveys.list_links(id).await?.len();
            Survey::ensure_publishable(published, link_count)?;
        }

        let survey = Survey {
            title: draft.title,
            description: draft.description,
            published,
            updated_at: Utc::now(),
            ..current
        };
        self.surveys.save(survey.clone()).await?;

        info!(
            event_name = "survey.updated",
            correlation_id = %correlation_id,
            survey_id = %survey.id,
            published = survey.published,
            "survey updated"
        );
        Ok(survey)
    }

    pub async fn archive_survey(
        &self,
        id: &SurveyId,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let mut survey = self.active_survey(id).await?;
        survey.archived = true;
        survey.updated_at = Utc::now();
        self.surveys.save(survey).await?;

        info!(
            event_name = "survey.archived",
            correlation_id = %correlation_id,
            survey_id = %id,
            "survey archived"
        );
        Ok(())
    }

    // Links

    pub async fn list_links(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<LinkedQuestion>, ApplicationError> {
        self.active_survey(survey_id).await?;
        Ok(self.surveys.list_links(survey_id).await?)
    }

    pub async fn add_link(
        &self,
        survey_id: &SurveyId,
        request: NewLink,
        correlation_id: &str,
    ) -> Result<LinkedQuestion, ApplicationError> {
        self.active_survey(survey_id).await?;
        let question = self.active_question(&request.question_id).await?;
        let existing = self.surveys.list_links(survey_id).await?;
        if existing.iter().any(|linked| linked.link.question_id == question.id) {
            return Err(duplicate_link().into());
        }

        let now = Utc::now();
        let link = SurveyQuestionLink {
            id: LinkId::generate(),
            survey_id: *survey_id,
            question_id: question.id,
            order_index: 0,
            overrides: request.overrides,
            hidden: request.hidden,
            created_at: now,
            updated_at: now,
        };
        let stored = match request.order_index {
            Some(order_index) => {
                validate_explicit_index(order_index)?;
                let link = SurveyQuestionLink { order_index, ..link };
                self.surveys.insert_link(link.clone()).await.map(|()| link)
            }
            None => self.surveys.append_link(link).await,
        };
        let link = stored.map_err(|error| match error {
            RepositoryError::Conflict(_) => ApplicationError::from(duplicate_link()),
            other => ApplicationError::from(other),
        })?;

        info!(
            event_name = "survey.link.added",
            correlation_id = %correlation_id,
            survey_id = %survey_id,
            link_id = %link.id,
            question_id = %question.id,
            order_index = link.order_index,
            "question linked to survey"
        );
        Ok(LinkedQuestion { link, question })
    }

    pub async fn update_link(
        &self,
        survey_id: &SurveyId,
        link_id: &LinkId,
        patch: LinkPatch,
        correlation_id: &str,
    ) -> Result<LinkedQuestion, ApplicationError> {
        self.active_survey(survey_id).await?;
        if let Some(order_index) = patch.order_index {
            validate_explicit_index(order_index)?;
        }
        let mut linked = self
            .surveys
            .list_links(survey_id)
            .await?
            .into_iter()
            .find(|linked| &linked.link.id == link_id)
            .ok_or_else(|| DomainError::not_found("SurveyQuestionLink", link_id))?;

        linked.link.apply_patch(patch, Utc::now());
        self.surveys.update_link(linked.link.clone()).await?;

        info!(
            event_name = "survey.link.updated",
            correlation_id = %correlation_id,
            survey_id = %survey_id,
            link_id = %link_id,
            order_index = linked.link.order_index,
            hidden = linked.link.hidden,
            "survey link updated"
        );
        Ok(linked)
    }

    pub async fn remove_link(
        &self,
        survey_id: &SurveyId,
        link_id: &LinkId,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let survey = self.active_survey(survey_id).await?;
        let links = self.surveys.list_links(survey_id).await?;
        if !links.iter().any(|linked| &linked.link.id == link_id) {
            return Err(DomainError::not_found("SurveyQuestionLink", link_id).into());
        }
        if survey.published && links.len() == 1 {
            return Err(DomainError::validation(
                "A published survey must keep at least one question",
            )
            .into());
        }

        if !self.surveys.remove_link(survey_id, link_id, Utc::now()).await? {
            return Err(DomainError::not_found("SurveyQuestionLink", link_id).into());
        }

        info!(
            event_name = "survey.link.removed",
            correlation_id = %correlation_id,
            survey_id = %survey_id,
            link_id = %link_id,
            remaining_links = links.len() - 1,
            "survey link removed"
        );
        Ok(())
    }

    // Respondent surface

    pub async fn public_survey(&self, id: &SurveyId) -> Result<PublicSurvey, ApplicationError> {
        let survey = self.existing_survey(id).await?;
        let linked = self.surveys.list_links(id).await?;
        Ok(public_view(&survey, &linked)?)
    }

    /// Validates and stores one submission. The addressed survey is
    /// authoritative; `request.survey_id` is overwritten with it.
    pub async fn submit(
        &self,
        survey_id: &SurveyId,
        mut request: SubmissionRequest,
        submitter_origin: Option<String>,
        correlation_id: &str,
    ) -> Result<SurveyResponse, ApplicationError> {
        request.survey_id = *survey_id;
        let survey = self.existing_survey(survey_id).await?;
        let linked = self.surveys.list_links(survey_id).await?;

        let requested: Vec<OptionId> = request
            .answers
            .iter()
            .flat_map(|answer| answer.selected_option_ids.iter().copied())
            .collect();
        let catalog = OptionCatalog::new(self.questions.find_options(&requested).await?);

        let context = SubmissionContext { survey: &survey, linked: &linked, catalog: &catalog };
        let response = match process_submission(&context, request, submitter_origin, Utc::now()) {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "survey.response.rejected",
                    correlation_id = %correlation_id,
                    survey_id = %survey_id,
                    reason = %error.reason(),
                    "submission rejected"
                );
                return Err(error.into());
            }
        };

        self.responses.append(response.clone()).await?;

        info!(
            event_name = "survey.response.submitted",
            correlation_id = %correlation_id,
            survey_id = %survey_id,
            response_id = %response.id,
            answer_count = response.answers.len(),
            "survey response stored"
        );
        Ok(response)
    }

    pub async fn get_response(
        &self,
        survey_id: &SurveyId,
        response_id: &ResponseId,
    ) -> Result<SurveyResponse, ApplicationError> {
        self.existing_survey(survey_id).await?;
        self.responses
            .find_by_id(survey_id, response_id)
            .await?
            .ok_or_else(|| DomainError::not_found("SurveyResponse", response_id).into())
    }

    /// `page` is zero-based; `size` falls back to the configured default.
    pub async fn list_responses(
        &self,
        survey_id: &SurveyId,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<Page<ResponseSummary>, ApplicationError> {
        let size = size.unwrap_or(self.config.default_page_size);
        if size == 0 {
            return Err(DomainError::validation("Page size must be greater than 0").into());
        }
        self.existing_survey(survey_id).await?;
        Ok(self.responses.list_summaries(survey_id, page.unwrap_or(0), size).await?)
    }

    // Results and transfer

    pub async fn analytics(&self, survey_id: &SurveyId) -> Result<SurveyAnalytics, ApplicationError> {
        let survey = self.active_survey(survey_id).await?;
        let linked = self.surveys.list_links(survey_id).await?;
        let text_sample_limit = self.config.text_sample_limit;

        let total_submissions = self.responses.count_for_survey(survey_id).await?;
        let submissions_over_time = self.responses.daily_counts(survey_id).await?;
        let tallies = self.responses.question_tallies(survey_id, text_sample_limit).await?;

        Ok(summarize(AnalyticsInput {
            survey: &survey,
            linked: &linked,
            total_submissions,
            submissions_over_time,
            tallies,
            text_sample_limit,
        }))
    }

    pub async fn export(&self, survey_id: &SurveyId) -> Result<SurveyExport, ApplicationError> {
        let survey = self.active_survey(survey_id).await?;
        let linked = self.surveys.list_links(survey_id).await?;
        Ok(export_survey(&survey, &linked))
    }

    /// Updates the survey and questions whose ids name live records, creates
    /// the rest, and replaces the survey's link set.
    pub async fn import(
        &self,
        export: SurveyExport,
        correlation_id: &str,
    ) -> Result<SurveyDetail, ApplicationError> {
        let existing_survey = match export.id {
            Some(id) => self.surveys.find_by_id(&id).await?.filter(|survey| !survey.archived),
            None => None,
        };

        let mut existing_questions = HashMap::new();
        for id in export.questions.iter().filter_map(|entry| entry.question.id) {
            if let Some(question) =
                self.questions.find_by_id(&id).await?.filter(|question| !question.archived)
            {
                existing_questions.insert(id, question);
            }
        }

        let plan = plan_import(export, existing_survey.as_ref(), &existing_questions, Utc::now())?;
        let survey_id = plan.survey.id;
        let survey_created = plan.survey_created;
        let created_questions = plan.questions.iter().filter(|planned| planned.created).count();
        let link_count = plan.links.len();
        self.surveys.apply_import(plan).await?;

        info!(
            event_name = "survey.imported",
            correlation_id = %correlation_id,
            survey_id = %survey_id,
            survey_created,
            created_questions,
            link_count,
            "survey imported"
        );
        self.get_survey(&survey_id).await
    }

    async fn existing_survey(&self, id: &SurveyId) -> Result<Survey, ApplicationError> {
        self.surveys
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Survey", id).into())
    }

    async fn active_survey(&self, id: &SurveyId) -> Result<Survey, ApplicationError> {
        self.surveys
            .find_by_id(id)
            .await?
            .filter(|survey| !survey.archived)
            .ok_or_else(|| DomainError::not_found("Survey", id).into())
    }

    async fn active_question(&self, id: &QuestionId) -> Result<Question, ApplicationError> {
        self.questions
            .find_by_id(id)
            .await?
            .filter(|question| !question.archived)
            .ok_or_else(|| DomainError::not_found("Question", id).into())
    }
}

fn duplicate_link() -> DomainError {
    DomainError::validation("Question is already added to this survey")
}

#[cfg(test)]
mod tests {
    use canvass_core::config::SurveyConfig;
    use canvass_core::domain::question::{
        LinearScaleConfig, OptionDraft, Question, QuestionDraft, QuestionId, QuestionType,
    };
    use canvass_core::domain::response::{AnswerInput, SubmissionRequest};
    use canvass_core::domain::survey::{LinkOverrides, LinkPatch, NewLink, SurveyDraft, SurveyId};
    use canvass_core::errors::{ApplicationError, DomainError};
    use canvass_core::ordering::is_dense;

    use super::SurveyService;
    use crate::{connect_with_settings, migrations};

    fn config() -> SurveyConfig {
        SurveyConfig { text_sample_limit: 10, default_page_size: 20 }
    }

    async fn sqlite_service() -> SurveyService {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SurveyService::sqlite(pool, config())
    }

    fn question_draft(title: &str, question_type: QuestionType, labels: &[&str]) -> QuestionDraft {
        QuestionDraft {
            title: title.to_string(),
            description: None,
            question_type,
            required: false,
            max_length: None,
            linear_scale_config: (question_type == QuestionType::LinearScale).then(|| {
                LinearScaleConfig {
                    min_value: 1,
                    max_value: 5,
                    step: 1,
                    left_label: None,
                    right_label: None,
                }
            }),
            options: labels
                .iter()
                .map(|label| OptionDraft { label: label.to_string(), position: None })
                .collect(),
        }
    }

    fn survey_draft(title: &str, published: Option<bool>) -> SurveyDraft {
        SurveyDraft { title: title.to_string(), description: None, published }
    }

    fn new_link(question_id: QuestionId) -> NewLink {
        NewLink {
            question_id,
            order_index: None,
            overrides: LinkOverrides::default(),
            hidden: false,
        }
    }

    fn answer(question_id: QuestionId) -> AnswerInput {
        AnswerInput {
            question_id,
            text_answer: None,
            selected_option_ids: Vec::new(),
            numeric_answer: None,
        }
    }

    /// Published survey with a required dropdown and an optional scale.
    async fn published_fixture(service: &SurveyService) -> (SurveyId, Question, Question) {
        let mut colour = question_draft("Colour", QuestionType::Dropdown, &["Red", "Blue"]);
        colour.required = true;
        let colour = service.create_question(colour, "test").await.expect("colour");
        let rating = service
            .create_question(question_draft("Rating", QuestionType::LinearScale, &[]), "test")
            .await
            .expect("rating");

        let survey = service.create_survey(survey_draft("Feedback", None), "test").await.expect("survey");
        service.add_link(&survey.id, new_link(colour.id), "test").await.expect("link colour");
        service.add_link(&survey.id, new_link(rating.id), "test").await.expect("link rating");
        service
            .update_survey(&survey.id, survey_draft("Feedback", Some(true)), "test")
            .await
            .expect("publish");
        (survey.id, colour, rating)
    }

    fn domain(error: ApplicationError) -> DomainError {
        match error {
            ApplicationError::Domain(error) => error,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_survey_starts_unpublished_and_publishing_requires_links() {
        let service = SurveyService::in_memory(config());
        let survey = service
            .create_survey(survey_draft("Draft", Some(true)), "test")
            .await
            .expect("create");
        assert!(!survey.published);

        let error = service
            .update_survey(&survey.id, survey_draft("Draft", Some(true)), "test")
            .await
            .expect_err("cannot publish empty survey");
        assert_eq!(
            domain(error),
            DomainError::validation("A survey must have at least one question to be published")
        );
    }

    #[tokio::test]
    async fn add_link_appends_and_rejects_duplicates() {
        let service = SurveyService::in_memory(config());
        let survey = service.create_survey(survey_draft("Links", None), "test").await.expect("survey");
        let first = service
            .create_question(question_draft("First", QuestionType::ShortAnswer, &[]), "test")
            .await
            .expect("first");
        let second = service
            .create_question(question_draft("Second", QuestionType::ShortAnswer, &[]), "test")
            .await
            .expect("second");

        let a = service.add_link(&survey.id, new_link(first.id), "test").await.expect("a");
        let b = service.add_link(&survey.id, new_link(second.id), "test").await.expect("b");
        assert_eq!((a.link.order_index, b.link.order_index), (0, 1));

        let error = service.add_link(&survey.id, new_link(first.id), "test").await.expect_err("dup");
        assert_eq!(domain(error), DomainError::validation("Question is already added to this survey"));

        let mut negative = new_link(second.id);
        negative.order_index = Some(-1);
        let other = service.create_survey(survey_draft("Other", None), "test").await.expect("other");
        let error = service.add_link(&other.id, negative, "test").await.expect_err("negative");
        assert!(matches!(domain(error), DomainError::Validation(_)));
    }

    async fn assert_concurrent_appends_stay_dense(service: SurveyService) {
        let survey = service.create_survey(survey_draft("Busy", None), "test").await.expect("survey");
        let mut questions = Vec::new();
        for title in ["A", "B", "C", "D", "E", "F"] {
            let question = service
                .create_question(question_draft(title, QuestionType::ShortAnswer, &[]), "test")
                .await
                .expect("question");
            questions.push(question.id);
        }

        let handles: Vec<_> = questions
            .into_iter()
            .map(|question_id| {
                let service = service.clone();
                let survey_id = survey.id;
                tokio::spawn(async move {
                    service.add_link(&survey_id, new_link(question_id), "test").await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("link");
        }

        let links: Vec<_> = service
            .list_links(&survey.id)
            .await
            .expect("links")
            .into_iter()
            .map(|linked| linked.link)
            .collect();
        let mut indices: Vec<i32> = links.iter().map(|link| link.order_index).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..6).collect::<Vec<_>>());
        assert!(is_dense(&links));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_distinct_positions_in_sqlite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("busy.db").display());
        let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        assert_concurrent_appends_stay_dense(SurveyService::sqlite(pool, config())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_get_distinct_positions_in_memory() {
        assert_concurrent_appends_stay_dense(SurveyService::in_memory(config())).await;
    }

    #[tokio::test]
    async fn removing_links_keeps_order_dense() {
        let service = sqlite_service().await;
        let survey = service.create_survey(survey_draft("Dense", None), "test").await.expect("survey");
        let mut link_ids = Vec::new();
        for title in ["A", "B", "C", "D"] {
            let question = service
                .create_question(question_draft(title, QuestionType::Paragraph, &[]), "test")
                .await
                .expect("question");
            link_ids.push(service.add_link(&survey.id, new_link(question.id), "test").await.expect("link").link.id);
        }

        service.remove_link(&survey.id, &link_ids[1], "test").await.expect("remove b");
        service.remove_link(&survey.id, &link_ids[3], "test").await.expect("remove d");

        let links: Vec<_> = service
            .list_links(&survey.id)
            .await
            .expect("links")
            .into_iter()
            .map(|linked| linked.link)
            .collect();
        assert!(is_dense(&links));
        assert_eq!(links.iter().map(|link| link.id).collect::<Vec<_>>(), vec![link_ids[0], link_ids[2]]);
    }

    #[tokio::test]
    async fn published_survey_keeps_its_last_link() {
        let service = SurveyService::in_memory(config());
        let question = service
            .create_question(question_draft("Only", QuestionType::ShortAnswer, &[]), "test")
            .await
            .expect("question");
        let survey = service.create_survey(survey_draft("Solo", None), "test").await.expect("survey");
        let link = service.add_link(&survey.id, new_link(question.id), "test").await.expect("link");
        service.update_survey(&survey.id, survey_draft("Solo", Some(true)), "test").await.expect("publish");

        let error = service.remove_link(&survey.id, &link.link.id, "test").await.expect_err("last link");
        assert!(matches!(domain(error), DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn submit_persists_snapshots_and_rejects_closed_surveys() {
        let service = sqlite_service().await;
        let (survey_id, colour, rating) = published_fixture(&service).await;

        let mut pick = answer(colour.id);
        pick.selected_option_ids = vec![colour.options[1].id];
        let mut score = answer(rating.id);
        score.numeric_answer = Some(4);
        let request = SubmissionRequest {
            survey_id,
            submitter_id: Some("respondent-1".to_string()),
            answers: vec![pick.clone(), score],
        };

        let stored = service
            .submit(&survey_id, request.clone(), Some("198.51.100.7".to_string()), "test")
            .await
            .expect("submit");
        let fetched = service.get_response(&survey_id, &stored.id).await.expect("fetch");
        assert_eq!(fetched.answers[0].selected_options[0].label_snapshot, "Blue");
        assert_eq!(fetched.submitter_origin.as_deref(), Some("198.51.100.7"));

        service.archive_survey(&survey_id, "test").await.expect("archive");
        let error = service.submit(&survey_id, request, None, "test").await.expect_err("closed");
        assert_eq!(domain(error), DomainError::forbidden("Survey is not accepting responses"));
        assert_eq!(service.list_responses(&survey_id, None, None).await.expect("list").total, 1);
    }

    #[tokio::test]
    async fn submit_requires_required_answers_using_effective_label() {
        let service = SurveyService::in_memory(config());
        let (survey_id, colour, rating) = published_fixture(&service).await;
        let links = service.list_links(&survey_id).await.expect("links");
        let colour_link = links.iter().find(|l| l.question.id == colour.id).expect("colour link");
        service
            .update_link(
                &survey_id,
                &colour_link.link.id,
                LinkPatch { label_override: Some("Pick a colour".to_string()), ..LinkPatch::default() },
                "test",
            )
            .await
            .expect("override label");

        let mut score = answer(rating.id);
        score.numeric_answer = Some(2);
        let request = SubmissionRequest { survey_id, submitter_id: None, answers: vec![score] };

        let error = service.submit(&survey_id, request, None, "test").await.expect_err("missing");
        assert_eq!(
            domain(error),
            DomainError::validation("Required question not answered: Pick a colour")
        );
        assert_eq!(service.list_responses(&survey_id, None, None).await.expect("list").total, 0);
    }

    #[tokio::test]
    async fn analytics_report_scale_statistics_and_zero_option_counts() {
        let service = sqlite_service().await;
        let (survey_id, colour, rating) = published_fixture(&service).await;

        for value in [1, 3, 3, 5] {
            let mut pick = answer(colour.id);
            pick.selected_option_ids = vec![colour.options[0].id];
            let mut score = answer(rating.id);
            score.numeric_answer = Some(value);
            let request =
                SubmissionRequest { survey_id, submitter_id: None, answers: vec![pick, score] };
            service.submit(&survey_id, request, None, "test").await.expect("submit");
        }

        let analytics = service.analytics(&survey_id).await.expect("analytics");
        assert_eq!(analytics.total_submissions, 4);
        assert_eq!(analytics.submissions_over_time.iter().map(|d| d.count).sum::<u64>(), 4);

        let colours = analytics.question_analytics[0].option_counts.as_ref().expect("options");
        assert_eq!(colours.len(), 2);
        assert_eq!((colours[0].label.as_str(), colours[0].count), ("Red", 4));
        assert_eq!((colours[1].label.as_str(), colours[1].count), ("Blue", 0));
        assert_eq!(colours[0].percentage, 100.0);

        let scale = analytics.question_analytics[1].scale.as_ref().expect("scale");
        assert_eq!(scale.average, Some(3.0));
        assert_eq!(scale.median, Some(3.0));
    }

    #[tokio::test]
    async fn export_then_import_updates_in_place() {
        let service = sqlite_service().await;
        let (survey_id, colour, _) = published_fixture(&service).await;

        let mut exported = service.export(&survey_id).await.expect("export");
        exported.title = "Feedback v2".to_string();
        exported.questions.truncate(1);

        let detail = service.import(exported, "test").await.expect("import");
        assert_eq!(detail.survey.id, survey_id);
        assert_eq!(detail.survey.title, "Feedback v2");
        assert_eq!(detail.question_links.len(), 1);
        assert_eq!(detail.question_links[0].question.id, colour.id);
        assert_eq!(detail.question_links[0].question.options, colour.options);
    }

    #[tokio::test]
    async fn copy_question_suffixes_title_with_fresh_ids() {
        let service = SurveyService::in_memory(config());
        let source = service
            .create_question(question_draft("Colour", QuestionType::Checkboxes, &["Red"]), "test")
            .await
            .expect("source");

        let copy = service.copy_question(&source.id, "test").await.expect("copy");

        assert_eq!(copy.title, "Colour (Copy)");
        assert_ne!(copy.id, source.id);
        assert_ne!(copy.options[0].id, source.options[0].id);
        assert_eq!(service.list_questions(Some("copy")).await.expect("search").len(), 1);
    }

    #[tokio::test]
    async fn archived_entities_are_not_found() {
        let service = SurveyService::in_memory(config());
        let question = service
            .create_question(question_draft("Gone", QuestionType::Date, &[]), "test")
            .await
            .expect("question");
        service.archive_question(&question.id, "test").await.expect("archive");

        let error = service.get_question(&question.id).await.expect_err("archived");
        assert!(matches!(domain(error), DomainError::NotFound { entity: "Question", .. }));

        let survey = service.create_survey(survey_draft("Gone", None), "test").await.expect("survey");
        let error = service.add_link(&survey.id, new_link(question.id), "test").await.expect_err("link");
        assert!(matches!(domain(error), DomainError::NotFound { .. }));

        service.archive_survey(&survey.id, "test").await.expect("archive survey");
        assert!(service.analytics(&survey.id).await.is_err());
        assert!(service.public_survey(&survey.id).await.is_err());
    }
}
