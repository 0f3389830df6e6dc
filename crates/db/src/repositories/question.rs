use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use canvass_core::domain::question::{
    LinearScaleConfig, OptionId, OptionRef, Question, QuestionId, QuestionOption, QuestionType,
};

use super::{
    format_timestamp, like_pattern, parse_timestamp, parse_u32, parse_uuid, QuestionRepository,
    RepositoryError,
};
use crate::DbPool;

const QUESTION_COLUMNS: &str = "id, title, description, question_type, required, max_length,
    scale_min, scale_max, scale_step, scale_left_label, scale_right_label,
    archived, created_at, updated_at";

pub struct SqlQuestionRepository {
    pool: DbPool,
}

impl SqlQuestionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqlQuestionRepository {
    async fn find_by_id(&self, id: &QuestionId) -> Result<Option<Question>, RepositoryError> {
        let questions =
            fetch_questions(&self.pool, "WHERE id = ?", "", &[id.to_string()]).await?;
        Ok(questions.into_iter().next())
    }

    async fn list(&self, search: Option<&str>) -> Result<Vec<Question>, RepositoryError> {
        match search.filter(|term| !term.trim().is_empty()) {
            Some(term) => {
                let pattern = like_pattern(term);
                fetch_questions(
                    &self.pool,
                    "WHERE archived = 0
                       AND (LOWER(title) LIKE ? OR LOWER(IFNULL(description, '')) LIKE ?)",
                    "ORDER BY created_at DESC, id",
                    &[pattern.clone(), pattern],
                )
                .await
            }
            None => {
                fetch_questions(&self.pool, "WHERE archived = 0", "ORDER BY created_at DESC, id", &[])
                    .await
            }
        }
    }

    async fn save(&self, question: Question) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        write_question(&mut tx, &question).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_options(&self, ids: &[OptionId]) -> Result<Vec<OptionRef>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, question_id, label FROM question_option WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let question_id: String = row.try_get("question_id")?;
                Ok(OptionRef {
                    id: OptionId(parse_uuid("question_option.id", &id)?),
                    question_id: QuestionId(parse_uuid("question_option.question_id", &question_id)?),
                    label: row.try_get("label")?,
                })
            })
            .collect()
    }
}

/// Loads questions matching `filter` together with their options.
///
/// `filter` and `order` are static SQL fragments; values go through `binds`,
/// which are applied to the question query and the option subquery alike.
pub(crate) async fn fetch_questions(
    pool: &DbPool,
    filter: &str,
    order: &str,
    binds: &[String],
) -> Result<Vec<Question>, RepositoryError> {
    let question_sql = format!("SELECT {QUESTION_COLUMNS} FROM question {filter} {order}");
    let mut query = sqlx::query(&question_sql);
    for value in binds {
        query = query.bind(value);
    }
    let rows = query.fetch_all(pool).await?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let option_sql = format!(
        "SELECT id, question_id, label, position FROM question_option
         WHERE question_id IN (SELECT id FROM question {filter})
         ORDER BY question_id, position, rowid"
    );
    let mut option_query = sqlx::query(&option_sql);
    for value in binds {
        option_query = option_query.bind(value);
    }

    let mut options: HashMap<String, Vec<QuestionOption>> = HashMap::new();
    for row in option_query.fetch_all(pool).await? {
        let question_id: String = row.try_get("question_id")?;
        let id: String = row.try_get("id")?;
        options.entry(question_id).or_default().push(QuestionOption {
            id: OptionId(parse_uuid("question_option.id", &id)?),
            label: row.try_get("label")?,
            position: row.try_get("position")?,
        });
    }

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            let question_options = options.remove(&id).unwrap_or_default();
            question_from_row(row, question_options)
        })
        .collect()
}

fn question_from_row(
    row: &SqliteRow,
    options: Vec<QuestionOption>,
) -> Result<Question, RepositoryError> {
    let id: String = row.try_get("id")?;
    let type_raw: String = row.try_get("question_type")?;
    let question_type = QuestionType::parse(&type_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown question type `{type_raw}`")))?;

    let scale_min: Option<i32> = row.try_get("scale_min")?;
    let scale_max: Option<i32> = row.try_get("scale_max")?;
    let linear_scale_config = match (scale_min, scale_max) {
        (Some(min_value), Some(max_value)) => Some(LinearScaleConfig {
            min_value,
            max_value,
            step: row.try_get::<Option<i32>, _>("scale_step")?.unwrap_or(1),
            left_label: row.try_get("scale_left_label")?,
            right_label: row.try_get("scale_right_label")?,
        }),
        _ => None,
    };

    Ok(Question {
        id: QuestionId(parse_uuid("question.id", &id)?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        question_type,
        required: row.try_get("required")?,
        max_length: row
            .try_get::<Option<i64>, _>("max_length")?
            .map(|value| parse_u32("max_length", value))
            .transpose()?,
        linear_scale_config,
        options,
        archived: row.try_get("archived")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

/// Upserts `question` and replaces its options on an open connection, so
/// callers can include it in a wider transaction.
pub(crate) async fn write_question(
    conn: &mut SqliteConnection,
    question: &Question,
) -> Result<(), RepositoryError> {
    let scale = question.linear_scale_config.as_ref();
    let question_id = question.id.to_string();

    sqlx::query(
        "INSERT INTO question (id, title, description, question_type, required, max_length,
                               scale_min, scale_max, scale_step, scale_left_label,
                               scale_right_label, archived, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             description = excluded.description,
             question_type = excluded.question_type,
             required = excluded.required,
             max_length = excluded.max_length,
             scale_min = excluded.scale_min,
             scale_max = excluded.scale_max,
             scale_step = excluded.scale_step,
             scale_left_label = excluded.scale_left_label,
             scale_right_label = excluded.scale_right_label,
             archived = excluded.archived,
             updated_at = excluded.updated_at",
    )
    .bind(&question_id)
    .bind(&question.title)
    .bind(&question.description)
    .bind(question.question_type.as_str())
    .bind(question.required)
    .bind(question.max_length.map(i64::from))
    .bind(scale.map(|config| config.min_value))
    .bind(scale.map(|config| config.max_value))
    .bind(scale.map(|config| config.step))
    .bind(scale.and_then(|config| config.left_label.clone()))
    .bind(scale.and_then(|config| config.right_label.clone()))
    .bind(question.archived)
    .bind(format_timestamp(&question.created_at))
    .bind(format_timestamp(&question.updated_at))
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM question_option WHERE question_id = ?")
        .bind(&question_id)
        .execute(&mut *conn)
        .await?;

    for option in &question.options {
        sqlx::query(
            "INSERT INTO question_option (id, question_id, label, position) VALUES (?, ?, ?, ?)",
        )
        .bind(option.id.to_string())
        .bind(&question_id)
        .bind(&option.label)
        .bind(option.position)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}
