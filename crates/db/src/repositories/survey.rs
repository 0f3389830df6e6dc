use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use chrono::{DateTime, Utc};

use canvass_core::domain::question::{Question, QuestionId};
use canvass_core::domain::survey::{
    LinkId, LinkOverrides, LinkedQuestion, Survey, SurveyId, SurveyQuestionLink,
};
use canvass_core::ordering::redensify;
use canvass_core::transfer::ImportPlan;

use super::question::{fetch_questions, write_question};
use super::{
    conflict_or_database, format_timestamp, like_pattern, parse_timestamp, parse_uuid,
    RepositoryError, SurveyRepository,
};
use crate::DbPool;

const SURVEY_COLUMNS: &str = "id, title, description, published, archived, created_at, updated_at";
const LINK_COLUMNS: &str = "id, survey_id, question_id, order_index, required_override,
    label_override, description_override, hidden, created_at, updated_at";

pub struct SqlSurveyRepository {
    pool: DbPool,
}

impl SqlSurveyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SurveyRepository for SqlSurveyRepository {
    async fn find_by_id(&self, id: &SurveyId) -> Result<Option<Survey>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SURVEY_COLUMNS} FROM survey WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(survey_from_row).transpose()
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<Survey>, RepositoryError> {
        let rows = match search.filter(|term| !term.trim().is_empty()) {
            Some(term) => {
                sqlx::query(&format!(
                    "SELECT {SURVEY_COLUMNS} FROM survey
                     WHERE archived = 0 AND LOWER(title) LIKE ?
                     ORDER BY created_at DESC, id"
                ))
                .bind(like_pattern(term))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {SURVEY_COLUMNS} FROM survey WHERE archived = 0
                     ORDER BY created_at DESC, id"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(survey_from_row).collect()
    }

    async fn save(&self, survey: Survey) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        write_survey(&mut conn, &survey).await
    }

    async fn list_links(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<LinkedQuestion>, RepositoryError> {
        let survey_key = survey_id.to_string();
        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM survey_question_link
             WHERE survey_id = ?
             ORDER BY order_index, created_at, id"
        ))
        .bind(&survey_key)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let questions: HashMap<QuestionId, Question> = fetch_questions(
            &self.pool,
            "WHERE id IN (SELECT question_id FROM survey_question_link WHERE survey_id = ?)",
            "",
            &[survey_key],
        )
        .await?
        .into_iter()
        .map(|question| (question.id, question))
        .collect();

        rows.iter()
            .map(|row| {
                let link = link_from_row(row)?;
                let question = questions.get(&link.question_id).cloned().ok_or_else(|| {
                    RepositoryError::Decode(format!(
                        "link {} points at missing question {}",
                        link.id, link.question_id
                    ))
                })?;
                Ok(LinkedQuestion { link, question })
            })
            .collect()
    }

    async fn insert_link(&self, link: SurveyQuestionLink) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_link_row(&mut conn, &link).await.map_err(|error| match error {
            RepositoryError::Database(error) => conflict_or_database(
                error,
                format!("question {} is already linked to survey {}", link.question_id, link.survey_id),
            ),
            other => other,
        })
    }

    async fn append_link(
        &self,
        mut link: SurveyQuestionLink,
    ) -> Result<SurveyQuestionLink, RepositoryError> {
        let order_index = sqlx::query_scalar::<_, i32>(
            "INSERT INTO survey_question_link
                 (id, survey_id, question_id, order_index, required_override, label_override,
                  description_override, hidden, created_at, updated_at)
             SELECT ?, ?, ?, COALESCE(MAX(order_index) + 1, 0), ?, ?, ?, ?, ?, ?
             FROM survey_question_link
             WHERE survey_id = ?
             RETURNING order_index",
        )
        .bind(link.id.to_string())
        .bind(link.survey_id.to_string())
        .bind(link.question_id.to_string())
        .bind(link.overrides.required_override)
        .bind(&link.overrides.label_override)
        .bind(&link.overrides.description_override)
        .bind(link.hidden)
        .bind(format_timestamp(&link.created_at))
        .bind(format_timestamp(&link.updated_at))
        .bind(link.survey_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            conflict_or_database(
                error,
                format!("question {} is already linked to survey {}", link.question_id, link.survey_id),
            )
        })?;

        link.order_index = order_index;
        Ok(link)
    }

    async fn update_link(&self, link: SurveyQuestionLink) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE survey_question_link
             SET order_index = ?, required_override = ?, label_override = ?,
                 description_override = ?, hidden = ?, updated_at = ?
             WHERE id = ? AND survey_id = ?",
        )
        .bind(link.order_index)
        .bind(link.overrides.required_override)
        .bind(&link.overrides.label_override)
        .bind(&link.overrides.description_override)
        .bind(link.hidden)
        .bind(format_timestamp(&link.updated_at))
        .bind(link.id.to_string())
        .bind(link.survey_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_link(
        &self,
        survey_id: &SurveyId,
        link_id: &LinkId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let survey_key = survey_id.to_string();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM survey_question_link WHERE id = ? AND survey_id = ?")
            .bind(link_id.to_string())
            .bind(&survey_key)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let rows = sqlx::query(&format!(
            "SELECT {LINK_COLUMNS} FROM survey_question_link WHERE survey_id = ?"
        ))
        .bind(&survey_key)
        .fetch_all(&mut *tx)
        .await?;
        let mut remaining = rows.iter().map(link_from_row).collect::<Result<Vec<_>, _>>()?;

        for change in redensify(&mut remaining, now) {
            sqlx::query(
                "UPDATE survey_question_link SET order_index = ?, updated_at = ? WHERE id = ?",
            )
            .bind(change.order_index)
            .bind(format_timestamp(&now))
            .bind(change.link_id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_import(&self, plan: ImportPlan) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        write_survey(&mut tx, &plan.survey).await?;
        for planned in &plan.questions {
            write_question(&mut tx, &planned.question).await?;
        }

        sqlx::query("DELETE FROM survey_question_link WHERE survey_id = ?")
            .bind(plan.survey.id.to_string())
            .execute(&mut *tx)
            .await?;
        for link in &plan.links {
            insert_link_row(&mut tx, link).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn write_survey(conn: &mut SqliteConnection, survey: &Survey) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO survey (id, title, description, published, archived, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             description = excluded.description,
             published = excluded.published,
             archived = excluded.archived,
             updated_at = excluded.updated_at",
    )
    .bind(survey.id.to_string())
    .bind(&survey.title)
    .bind(&survey.description)
    .bind(survey.published)
    .bind(survey.archived)
    .bind(format_timestamp(&survey.created_at))
    .bind(format_timestamp(&survey.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_link_row(
    conn: &mut SqliteConnection,
    link: &SurveyQuestionLink,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO survey_question_link
             (id, survey_id, question_id, order_index, required_override, label_override,
              description_override, hidden, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(link.id.to_string())
    .bind(link.survey_id.to_string())
    .bind(link.question_id.to_string())
    .bind(link.order_index)
    .bind(link.overrides.required_override)
    .bind(&link.overrides.label_override)
    .bind(&link.overrides.description_override)
    .bind(link.hidden)
    .bind(format_timestamp(&link.created_at))
    .bind(format_timestamp(&link.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn survey_from_row(row: &SqliteRow) -> Result<Survey, RepositoryError> {
    let id: String = row.try_get("id")?;
    Ok(Survey {
        id: SurveyId(parse_uuid("survey.id", &id)?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        published: row.try_get("published")?,
        archived: row.try_get("archived")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<SurveyQuestionLink, RepositoryError> {
    let id: String = row.try_get("id")?;
    let survey_id: String = row.try_get("survey_id")?;
    let question_id: String = row.try_get("question_id")?;
    Ok(SurveyQuestionLink {
        id: LinkId(parse_uuid("survey_question_link.id", &id)?),
        survey_id: SurveyId(parse_uuid("survey_question_link.survey_id", &survey_id)?),
        question_id: QuestionId(parse_uuid("survey_question_link.question_id", &question_id)?),
        order_index: row.try_get("order_index")?,
        overrides: LinkOverrides {
            required_override: row.try_get("required_override")?,
            label_override: row.try_get("label_override")?,
            description_override: row.try_get("description_override")?,
        },
        hidden: row.try_get("hidden")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
