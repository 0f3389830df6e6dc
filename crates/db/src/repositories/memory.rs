use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use canvass_core::analytics::{daily_histogram, DailySubmissionCount, QuestionTally};
use canvass_core::domain::question::{OptionId, OptionRef, Question, QuestionId};
use canvass_core::domain::response::{Page, ResponseId, ResponseSummary, SurveyResponse};
use canvass_core::domain::survey::{LinkId, LinkedQuestion, Survey, SurveyId, SurveyQuestionLink};
use canvass_core::ordering::{next_order_index, redensify};
use canvass_core::transfer::ImportPlan;

use super::{QuestionRepository, RepositoryError, ResponseRepository, SurveyRepository};

/// Process-local store behind all three repository traits. A single lock
/// guards every collection, so multi-record writes are atomic.
#[derive(Default)]
pub struct InMemorySurveyStore {
    state: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    questions: HashMap<QuestionId, Question>,
    surveys: HashMap<SurveyId, Survey>,
    links: HashMap<LinkId, SurveyQuestionLink>,
    responses: Vec<SurveyResponse>,
}

fn matches_search(search: Option<&str>, fields: &[Option<&str>]) -> bool {
    match search.map(str::trim).filter(|term| !term.is_empty()) {
        Some(term) => {
            let term = term.to_lowercase();
            fields.iter().flatten().any(|field| field.to_lowercase().contains(&term))
        }
        None => true,
    }
}

fn ensure_unlinked(
    links: &HashMap<LinkId, SurveyQuestionLink>,
    link: &SurveyQuestionLink,
) -> Result<(), RepositoryError> {
    let duplicate = links.values().any(|existing| {
        existing.survey_id == link.survey_id && existing.question_id == link.question_id
    });
    if duplicate {
        return Err(RepositoryError::Conflict(format!(
            "question {} is already linked to survey {}",
            link.question_id, link.survey_id
        )));
    }
    Ok(())
}

#[async_trait::async_trait]
impl QuestionRepository for InMemorySurveyStore {
    async fn find_by_id(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError> {
        let state = self.state.read().await;
        let questions = &state.questions;
        Ok(questions.get(id).cloned())
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<Question>, RepositoryError> {
        let state = self.state.read().await;
        let questions = &state.questions;
        let mut found: Vec<Question> = questions
            .values()
            .filter(|question| !question.archived)
            .filter(|question| {
                matches_search(search, &[Some(&question.title), question.description.as_deref()])
            })
            .cloned()
            .collect();
        found.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then(left.id.cmp(&right.id))
        });
        Ok(found)
    }

    async fn save(&self, question: Question) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let questions = &mut state.questions;
        questions.insert(question.id, question);
        Ok(())
    }

    async fn find_options(&self, ids: &[OptionId]) -> Result<Vec<OptionRef>, RepositoryError> {
        let state = self.state.read().await;
        let questions = &state.questions;
        Ok(questions
            .values()
            .flat_map(|question| question.option_refs())
            .filter(|option| ids.contains(&option.id))
            .collect())
    }
}

#[async_trait::async_trait]
impl SurveyRepository for InMemorySurveyStore {
    async fn find_by_id(&self, id: &SurveyId) -> Result<Option<Survey>, RepositoryError> {
        let state = self.state.read().await;
        let surveys = &state.surveys;
        Ok(surveys.get(id).cloned())
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<Survey>, RepositoryError> {
        let state = self.state.read().await;
        let surveys = &state.surveys;
        let mut found: Vec<Survey> = surveys
            .values()
            .filter(|survey| !survey.archived && matches_search(search, &[Some(&survey.title)]))
            .cloned()
            .collect();
        found.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then(left.id.cmp(&right.id))
        });
        Ok(found)
    }

    async fn save(&self, survey: Survey) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let surveys = &mut state.surveys;
        surveys.insert(survey.id, survey);
        Ok(())
    }

    async fn list_links(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<LinkedQuestion>, RepositoryError> {
        let state = self.state.read().await;
        let (questions, links) = (&state.questions, &state.links);

        let mut linked = links
            .values()
            .filter(|link| &link.survey_id == survey_id)
            .map(|link| {
                let question = questions.get(&link.question_id).cloned().ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "link {} points at missing question {}",
                        link.id, link.question_id
                    ))
                })?;
                Ok(LinkedQuestion { link: link.clone(), question })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;
        linked.sort_by(|left, right| {
            left.link
                .order_index
                .cmp(&right.link.order_index)
                .then(left.link.created_at.cmp(&right.link.created_at))
                .then(left.link.id.cmp(&right.link.id))
        });
        Ok(linked)
    }

    async fn insert_link(&self, link: SurveyQuestionLink) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        ensure_unlinked(&state.links, &link)?;
        state.links.insert(link.id, link);
        Ok(())
    }

    async fn append_link(
        &self,
        mut link: SurveyQuestionLink,
    ) -> Result<SurveyQuestionLink, RepositoryError> {
        let mut state = self.state.write().await;
        ensure_unlinked(&state.links, &link)?;
        let siblings: Vec<SurveyQuestionLink> = state
            .links
            .values()
            .filter(|existing| existing.survey_id == link.survey_id)
            .cloned()
            .collect();
        link.order_index = next_order_index(&siblings);
        state.links.insert(link.id, link.clone());
        Ok(link)
    }

    async fn update_link(&self, link: SurveyQuestionLink) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let links = &mut state.links;
        if let Some(existing) = links.get_mut(&link.id) {
            if existing.survey_id == link.survey_id {
                *existing = link;
            }
        }
        Ok(())
    }

    async fn remove_link(
        &self,
        survey_id: &SurveyId,
        link_id: &LinkId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let links = &mut state.links;
        if !links.get(link_id).is_some_and(|link| &link.survey_id == survey_id) {
            return Ok(false);
        }
        links.remove(link_id);

        let mut remaining: Vec<SurveyQuestionLink> =
            links.values().filter(|link| &link.survey_id == survey_id).cloned().collect();
        redensify(&mut remaining, now);
        for link in remaining {
            links.insert(link.id, link);
        }
        Ok(true)
    }

    async fn apply_import(&self, plan: ImportPlan) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;

        for planned in plan.questions {
            state.questions.insert(planned.question.id, planned.question);
        }
        let survey_id = plan.survey.id;
        state.surveys.insert(survey_id, plan.survey);
        state.links.retain(|_, link| link.survey_id != survey_id);
        for link in plan.links {
            state.links.insert(link.id, link);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResponseRepository for InMemorySurveyStore {
    async fn append(&self, response: SurveyResponse) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let responses = &mut state.responses;
        responses.push(response);
        Ok(())
    }

    async fn find_by_id(
        &self,
        survey_id: &SurveyId,
        response_id: &ResponseId,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        let state = self.state.read().await;
        let responses = &state.responses;
        Ok(responses
            .iter()
            .find(|response| &response.id == response_id && &response.survey_id == survey_id)
            .cloned())
    }

    async fn list_summaries(
        &self,
        survey_id: &SurveyId,
        page: u32,
        size: u32,
    ) -> Result<Page<ResponseSummary>, RepositoryError> {
        let state = self.state.read().await;
        let responses = &state.responses;
        // Reverse first so equal timestamps list the later append first.
        let mut matching: Vec<&SurveyResponse> =
            responses.iter().rev().filter(|response| &response.survey_id == survey_id).collect();
        matching.sort_by(|left, right| right.submitted_at.cmp(&left.submitted_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page as usize * size as usize)
            .take(size as usize)
            .map(ResponseSummary::from)
            .collect();
        Ok(Page { items, page, size, total })
    }

    async fn count_for_survey(&self, survey_id: &SurveyId) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let responses = &state.responses;
        Ok(responses.iter().filter(|response| &response.survey_id == survey_id).count() as u64)
    }

    async fn daily_counts(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<DailySubmissionCount>, RepositoryError> {
        let state = self.state.read().await;
        let responses = &state.responses;
        Ok(daily_histogram(
            responses
                .iter()
                .filter(|response| &response.survey_id == survey_id)
                .map(|response| response.submitted_at),
        ))
    }

    async fn question_tallies(
        &self,
        survey_id: &SurveyId,
        text_sample_limit: usize,
    ) -> Result<HashMap<QuestionId, QuestionTally>, RepositoryError> {
        let state = self.state.read().await;
        let responses = &state.responses;
        let mut ordered: Vec<&SurveyResponse> =
            responses.iter().filter(|response| &response.survey_id == survey_id).collect();
        ordered.sort_by_key(|response| response.submitted_at);

        let mut tallies: HashMap<QuestionId, QuestionTally> = HashMap::new();
        for answer in ordered.into_iter().flat_map(|response| &response.answers) {
            tallies.entry(answer.question_id).or_default().record(answer, text_sample_limit);
        }
        Ok(tallies)
    }
}
