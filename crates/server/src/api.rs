//! JSON API for survey authors (`/v1/admin`) and respondents (`/v1/public`).
//!
//! Admin routes cover the question bank, surveys and their links, results
//! (analytics, paged submissions, single submission) and export/import.
//! Public routes serve the respondent view, accept submissions, and return a
//! stored submission by id.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use canvass_core::analytics::SurveyAnalytics;
use canvass_core::domain::question::{Question, QuestionDraft, QuestionId};
use canvass_core::domain::response::{
    Page, ResponseId, ResponseSummary, SubmissionRequest, SurveyResponse,
};
use canvass_core::domain::survey::{
    LinkId, LinkPatch, LinkedQuestion, NewLink, Survey, SurveyDetail, SurveyDraft, SurveyId,
};
use canvass_core::errors::{ApplicationError, InterfaceError};
use canvass_core::overrides::PublicSurvey;
use canvass_core::transfer::SurveyExport;
use canvass_db::SurveyService;

pub const CORRELATION_HEADER: &str = "x-correlation-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct ApiState {
    service: SurveyService,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type ApiFailure = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<T, ApiFailure>;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// Caller-supplied `X-Correlation-Id`, or a fresh one.
pub struct CorrelationId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let supplied = parts
            .headers
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);
        Ok(Self(supplied.unwrap_or_else(|| Uuid::new_v4().to_string())))
    }
}

/// Where a submission came from: the first `X-Forwarded-For` hop, else the
/// peer address when the server was started with connect info.
pub struct SubmitterOrigin(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for SubmitterOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(address)| address.ip().to_string());
        Ok(Self(forwarded_for(&parts.headers).or(peer)))
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_owned)
}

pub fn router(service: SurveyService) -> Router {
    Router::new()
        .route("/v1/admin/questions", get(list_questions).post(create_question))
        .route(
            "/v1/admin/questions/{id}",
            get(get_question).put(update_question).delete(archive_question),
        )
        .route("/v1/admin/questions/{id}/copy", post(copy_question))
        .route("/v1/admin/surveys", get(list_surveys).post(create_survey))
        .route("/v1/admin/surveys/import", post(import_survey))
        .route(
            "/v1/admin/surveys/{id}",
            get(get_survey).put(update_survey).delete(archive_survey),
        )
        .route("/v1/admin/surveys/{id}/links", get(list_links).post(add_link))
        .route("/v1/admin/surveys/{id}/links/{link_id}", patch(update_link).delete(remove_link))
        .route("/v1/admin/surveys/{id}/results", get(survey_results))
        .route("/v1/admin/surveys/{id}/results/submissions", get(list_submissions))
        .route(
            "/v1/admin/surveys/{id}/results/submissions/{response_id}",
            get(get_submission),
        )
        .route("/v1/admin/surveys/{id}/export", get(export_survey))
        .route("/v1/public/surveys/{id}", get(public_survey))
        .route("/v1/public/surveys/{id}/responses", post(submit_response))
        .route("/v1/public/surveys/{id}/responses/{response_id}", get(get_submission))
        .with_state(ApiState { service })
}

fn reject(error: ApplicationError, correlation_id: &str) -> ApiFailure {
    let interface = error.into_interface(correlation_id);
    let (status, kind) = match &interface {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::Forbidden { .. } => (StatusCode::FORBIDDEN, "forbidden"),
        InterfaceError::ServiceUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
        }
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    // Domain reasons are written for respondents; anything else stays in the logs.
    let message = if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id = %correlation_id,
            error = %interface.message(),
            "request failed"
        );
        interface.user_message().to_string()
    } else {
        interface.message().to_string()
    };

    (
        status,
        Json(ApiError {
            error: kind.to_string(),
            message,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

// Question bank

async fn list_questions(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Question>>> {
    state
        .service
        .list_questions(params.search.as_deref())
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn create_question(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Json(draft): Json<QuestionDraft>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let question = state
        .service
        .create_question(draft, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn get_question(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Question>> {
    state
        .service
        .get_question(&QuestionId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn update_question(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
    Json(draft): Json<QuestionDraft>,
) -> ApiResult<Json<Question>> {
    state
        .service
        .update_question(&QuestionId(id), draft, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn archive_question(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .service
        .archive_question(&QuestionId(id), &correlation_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| reject(error, &correlation_id))
}

async fn copy_question(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let copy = state
        .service
        .copy_question(&QuestionId(id), &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(copy)))
}

// Surveys

async fn list_surveys(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Survey>>> {
    state
        .service
        .list_surveys(params.search.as_deref())
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn create_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Json(draft): Json<SurveyDraft>,
) -> ApiResult<(StatusCode, Json<Survey>)> {
    let survey = state
        .service
        .create_survey(draft, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(survey)))
}

async fn get_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SurveyDetail>> {
    state
        .service
        .get_survey(&SurveyId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn update_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
    Json(draft): Json<SurveyDraft>,
) -> ApiResult<Json<Survey>> {
    state
        .service
        .update_survey(&SurveyId(id), draft, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn archive_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .service
        .archive_survey(&SurveyId(id), &correlation_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| reject(error, &correlation_id))
}

// Links

async fn list_links(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LinkedQuestion>>> {
    state
        .service
        .list_links(&SurveyId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn add_link(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
    Json(request): Json<NewLink>,
) -> ApiResult<(StatusCode, Json<LinkedQuestion>)> {
    let linked = state
        .service
        .add_link(&SurveyId(id), request, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(linked)))
}

async fn update_link(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path((id, link_id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<LinkPatch>,
) -> ApiResult<Json<LinkedQuestion>> {
    state
        .service
        .update_link(&SurveyId(id), &LinkId(link_id), patch, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn remove_link(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path((id, link_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    state
        .service
        .remove_link(&SurveyId(id), &LinkId(link_id), &correlation_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| reject(error, &correlation_id))
}

// Results and transfer

async fn survey_results(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SurveyAnalytics>> {
    state
        .service
        .analytics(&SurveyId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn list_submissions(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<ResponseSummary>>> {
    state
        .service
        .list_responses(&SurveyId(id), params.page, params.size)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn get_submission(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path((id, response_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<SurveyResponse>> {
    state
        .service
        .get_response(&SurveyId(id), &ResponseId(response_id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn export_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SurveyExport>> {
    state
        .service
        .export(&SurveyId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn import_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Json(export): Json<SurveyExport>,
) -> ApiResult<Json<SurveyDetail>> {
    state
        .service
        .import(export, &correlation_id)
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

// Respondents

async fn public_survey(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PublicSurvey>> {
    state
        .service
        .public_survey(&SurveyId(id))
        .await
        .map(Json)
        .map_err(|error| reject(error, &correlation_id))
}

async fn submit_response(
    State(state): State<ApiState>,
    CorrelationId(correlation_id): CorrelationId,
    SubmitterOrigin(origin): SubmitterOrigin,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmissionRequest>,
) -> ApiResult<(StatusCode, Json<SurveyResponse>)> {
    let response = state
        .service
        .submit(&SurveyId(id), request, origin, &correlation_id)
        .await
        .map_err(|error| reject(error, &correlation_id))?;
    Ok((StatusCode::CREATED, Json(response)))
}
