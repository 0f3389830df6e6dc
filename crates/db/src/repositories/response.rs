use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use canvass_core::analytics::{DailySubmissionCount, OptionTally, QuestionTally};
use canvass_core::domain::question::{OptionId, QuestionId};
use canvass_core::domain::response::{
    AnswerId, AnswerType, Page, QuestionResponse, ResponseId, ResponseSummary, SelectedOption,
    SurveyResponse,
};
use canvass_core::domain::survey::SurveyId;

use super::{
    format_timestamp, parse_timestamp, parse_u32, parse_u64, parse_uuid, RepositoryError,
    ResponseRepository,
};
use crate::DbPool;

pub struct SqlResponseRepository {
    pool: DbPool,
}

impl SqlResponseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ResponseRepository for SqlResponseRepository {
    async fn append(&self, response: SurveyResponse) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO survey_response (id, survey_id, submitted_at, submitter_id, submitter_origin)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(response.id.to_string())
        .bind(response.survey_id.to_string())
        .bind(format_timestamp(&response.submitted_at))
        .bind(&response.submitter_id)
        .bind(&response.submitter_origin)
        .execute(&mut *tx)
        .await?;

        for (position, answer) in response.answers.iter().enumerate() {
            let answer_id = answer.id.to_string();
            sqlx::query(
                "INSERT INTO question_response
                     (id, response_id, question_id, answer_type, text_answer, numeric_answer, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&answer_id)
            .bind(response.id.to_string())
            .bind(answer.question_id.to_string())
            .bind(answer.answer_type.as_str())
            .bind(&answer.text_answer)
            .bind(answer.numeric_answer)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;

            for (selection_position, selected) in answer.selected_options.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO selected_option (answer_id, position, option_id, label_snapshot)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&answer_id)
                .bind(selection_position as i64)
                .bind(selected.option_id.to_string())
                .bind(&selected.label_snapshot)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        survey_id: &SurveyId,
        response_id: &ResponseId,
    ) -> Result<Option<SurveyResponse>, RepositoryError> {
        let response_key = response_id.to_string();
        let Some(row) = sqlx::query(
            "SELECT id, survey_id, submitted_at, submitter_id, submitter_origin
             FROM survey_response WHERE id = ? AND survey_id = ?",
        )
        .bind(&response_key)
        .bind(survey_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let mut selections: HashMap<String, Vec<SelectedOption>> = HashMap::new();
        let selection_rows = sqlx::query(
            "SELECT so.answer_id, so.option_id, so.label_snapshot
             FROM selected_option so
             JOIN question_response qr ON qr.id = so.answer_id
             WHERE qr.response_id = ?
             ORDER BY so.answer_id, so.position",
        )
        .bind(&response_key)
        .fetch_all(&self.pool)
        .await?;
        for selection in selection_rows {
            let answer_id: String = selection.try_get("answer_id")?;
            let option_id: String = selection.try_get("option_id")?;
            selections.entry(answer_id).or_default().push(SelectedOption {
                option_id: OptionId(parse_uuid("selected_option.option_id", &option_id)?),
                label_snapshot: selection.try_get("label_snapshot")?,
            });
        }

        let answer_rows = sqlx::query(
            "SELECT id, question_id, answer_type, text_answer, numeric_answer
             FROM question_response WHERE response_id = ? ORDER BY position",
        )
        .bind(&response_key)
        .fetch_all(&self.pool)
        .await?;
        let answers = answer_rows
            .iter()
            .map(|answer| {
                let id: String = answer.try_get("id")?;
                let selected_options = selections.remove(&id).unwrap_or_default();
                answer_from_row(answer, &id, selected_options)
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let id: String = row.try_get("id")?;
        let stored_survey: String = row.try_get("survey_id")?;
        Ok(Some(SurveyResponse {
            id: ResponseId(parse_uuid("survey_response.id", &id)?),
            survey_id: SurveyId(parse_uuid("survey_response.survey_id", &stored_survey)?),
            submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
            submitter_id: row.try_get("submitter_id")?,
            submitter_origin: row.try_get("submitter_origin")?,
            answers,
        }))
    }

    async fn list_summaries(
        &self,
        survey_id: &SurveyId,
        page: u32,
        size: u32,
    ) -> Result<Page<ResponseSummary>, RepositoryError> {
        let total = self.count_for_survey(survey_id).await?;
        let rows = sqlx::query(
            "SELECT r.id, r.survey_id, r.submitted_at, r.submitter_id,
                    (SELECT COUNT(*) FROM question_response qr WHERE qr.response_id = r.id)
                        AS answer_count
             FROM survey_response r
             WHERE r.survey_id = ?
             ORDER BY r.submitted_at DESC, r.rowid DESC
             LIMIT ? OFFSET ?",
        )
        .bind(survey_id.to_string())
        .bind(i64::from(size))
        .bind(i64::from(page) * i64::from(size))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let stored_survey: String = row.try_get("survey_id")?;
                Ok(ResponseSummary {
                    id: ResponseId(parse_uuid("survey_response.id", &id)?),
                    survey_id: SurveyId(parse_uuid("survey_response.survey_id", &stored_survey)?),
                    submitted_at: parse_timestamp("submitted_at", row.try_get("submitted_at")?)?,
                    submitter_id: row.try_get("submitter_id")?,
                    answer_count: parse_u32("answer_count", row.try_get("answer_count")?)?,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Page { items, page, size, total })
    }

    async fn count_for_survey(&self, survey_id: &SurveyId) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM survey_response WHERE survey_id = ?")
                .bind(survey_id.to_string())
                .fetch_one(&self.pool)
                .await?;
        parse_u64("count", count)
    }

    async fn daily_counts(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<DailySubmissionCount>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT substr(submitted_at, 1, 10) AS day, COUNT(*) AS count
             FROM survey_response
             WHERE survey_id = ?
             GROUP BY day
             ORDER BY day",
        )
        .bind(survey_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let day: String = row.try_get("day")?;
                let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d").map_err(|error| {
                    RepositoryError::Decode(format!("invalid submission day `{day}` ({error})"))
                })?;
                Ok(DailySubmissionCount { date, count: parse_u64("count", row.try_get("count")?)? })
            })
            .collect()
    }

    async fn question_tallies(
        &self,
        survey_id: &SurveyId,
        text_sample_limit: usize,
    ) -> Result<HashMap<QuestionId, QuestionTally>, RepositoryError> {
        let survey_key = survey_id.to_string();
        let mut tallies: HashMap<QuestionId, QuestionTally> = HashMap::new();

        let answered = sqlx::query(
            "SELECT qr.question_id, COUNT(*) AS answered
             FROM question_response qr
             JOIN survey_response r ON r.id = qr.response_id
             WHERE r.survey_id = ?
             GROUP BY qr.question_id",
        )
        .bind(&survey_key)
        .fetch_all(&self.pool)
        .await?;
        for row in &answered {
            tally_for(&mut tallies, row)?.answered = parse_u64("answered", row.try_get("answered")?)?;
        }

        // Grouped by captured label too, so renamed options report both spellings.
        let selections = sqlx::query(
            "SELECT qr.question_id, so.option_id, so.label_snapshot, COUNT(*) AS count
             FROM selected_option so
             JOIN question_response qr ON qr.id = so.answer_id
             JOIN survey_response r ON r.id = qr.response_id
             WHERE r.survey_id = ?
             GROUP BY qr.question_id, so.option_id, so.label_snapshot
             ORDER BY qr.question_id, MIN(r.submitted_at), MIN(so.rowid)",
        )
        .bind(&survey_key)
        .fetch_all(&self.pool)
        .await?;
        for row in &selections {
            let option_id: String = row.try_get("option_id")?;
            let tally = OptionTally {
                option_id: OptionId(parse_uuid("selected_option.option_id", &option_id)?),
                label: row.try_get("label_snapshot")?,
                count: parse_u64("count", row.try_get("count")?)?,
            };
            tally_for(&mut tallies, row)?.options.push(tally);
        }

        let scale = sqlx::query(
            "SELECT qr.question_id, qr.numeric_answer AS value, COUNT(*) AS count
             FROM question_response qr
             JOIN survey_response r ON r.id = qr.response_id
             WHERE r.survey_id = ? AND qr.numeric_answer IS NOT NULL
             GROUP BY qr.question_id, qr.numeric_answer",
        )
        .bind(&survey_key)
        .fetch_all(&self.pool)
        .await?;
        for row in &scale {
            let value: i32 = row.try_get("value")?;
            let count = parse_u64("count", row.try_get("count")?)?;
            tally_for(&mut tallies, row)?.scale_distribution.insert(value, count);
        }

        let samples = sqlx::query(
            "SELECT question_id, text_answer FROM (
                 SELECT qr.question_id, qr.text_answer,
                        ROW_NUMBER() OVER (
                            PARTITION BY qr.question_id
                            ORDER BY r.submitted_at, r.rowid, qr.position
                        ) AS sample_rank
                 FROM question_response qr
                 JOIN survey_response r ON r.id = qr.response_id
                 WHERE r.survey_id = ?
                   AND qr.text_answer IS NOT NULL
                   AND TRIM(qr.text_answer, ?) <> ''
             )
             WHERE sample_rank <= ?
             ORDER BY question_id, sample_rank",
        )
        .bind(&survey_key)
        .bind(UNICODE_WHITESPACE)
        .bind(i64::try_from(text_sample_limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        for row in &samples {
            let text: String = row.try_get("text_answer")?;
            tally_for(&mut tallies, row)?.text_samples.push(text);
        }

        Ok(tallies)
    }
}

/// Every `White_Space` code point, so SQL `TRIM` agrees with `str::trim`.
const UNICODE_WHITESPACE: &str = "\t\n\u{0B}\u{0C}\r \u{85}\u{A0}\u{1680}\u{2000}\u{2001}\u{2002}\u{2003}\u{2004}\u{2005}\u{2006}\u{2007}\u{2008}\u{2009}\u{200A}\u{2028}\u{2029}\u{202F}\u{205F}\u{3000}";

fn tally_for<'a>(
    tallies: &'a mut HashMap<QuestionId, QuestionTally>,
    row: &SqliteRow,
) -> Result<&'a mut QuestionTally, RepositoryError> {
    let question_id: String = row.try_get("question_id")?;
    let question_id = QuestionId(parse_uuid("question_response.question_id", &question_id)?);
    Ok(tallies.entry(question_id).or_default())
}

fn answer_from_row(
    row: &SqliteRow,
    id: &str,
    selected_options: Vec<SelectedOption>,
) -> Result<QuestionResponse, RepositoryError> {
    let question_id: String = row.try_get("question_id")?;
    let answer_type_raw: String = row.try_get("answer_type")?;
    let answer_type = AnswerType::parse(&answer_type_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown answer type `{answer_type_raw}`"))
    })?;
    Ok(QuestionResponse {
        id: AnswerId(parse_uuid("question_response.id", id)?),
        question_id: QuestionId(parse_uuid("question_response.question_id", &question_id)?),
        answer_type,
        text_answer: row.try_get("text_answer")?,
        numeric_answer: row.try_get("numeric_answer")?,
        selected_options,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use canvass_core::analytics::daily_histogram;
    use canvass_core::domain::question::{OptionId, QuestionId};
    use canvass_core::domain::response::{
        AnswerId, AnswerType, QuestionResponse, ResponseId, SelectedOption, SurveyResponse,
    };
    use canvass_core::domain::survey::{Survey, SurveyId};

    use super::SqlResponseRepository;
    use crate::repositories::{ResponseRepository, SqlSurveyRepository, SurveyRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> (DbPool, SurveyId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let now = Utc::now();
        let survey = Survey {
            id: SurveyId::generate(),
            title: "Responses".to_string(),
            description: None,
            published: true,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        let id = survey.id;
        SqlSurveyRepository::new(pool.clone()).save(survey).await.expect("save survey");
        (pool, id)
    }

    fn text(question_id: QuestionId, value: &str) -> QuestionResponse {
        QuestionResponse {
            id: AnswerId::generate(),
            question_id,
            answer_type: AnswerType::Text,
            text_answer: Some(value.to_string()),
            numeric_answer: None,
            selected_options: Vec::new(),
        }
    }

    fn scale(question_id: QuestionId, value: i32) -> QuestionResponse {
        QuestionResponse {
            id: AnswerId::generate(),
            question_id,
            answer_type: AnswerType::Numeric,
            text_answer: None,
            numeric_answer: Some(value),
            selected_options: Vec::new(),
        }
    }

    fn choice(question_id: QuestionId, picks: &[(OptionId, &str)]) -> QuestionResponse {
        QuestionResponse {
            id: AnswerId::generate(),
            question_id,
            answer_type: AnswerType::Selection,
            text_answer: None,
            numeric_answer: None,
            selected_options: picks
                .iter()
                .map(|(option_id, label)| SelectedOption {
                    option_id: *option_id,
                    label_snapshot: label.to_string(),
                })
                .collect(),
        }
    }

    fn response(
        survey_id: SurveyId,
        submitted_at: DateTime<Utc>,
        answers: Vec<QuestionResponse>,
    ) -> SurveyResponse {
        SurveyResponse {
            id: ResponseId::generate(),
            survey_id,
            submitted_at,
            submitter_id: Some("respondent".to_string()),
            submitter_origin: Some("203.0.113.9".to_string()),
            answers,
        }
    }

    #[tokio::test]
    async fn append_and_find_round_trip_full_graph() {
        let (pool, survey_id) = setup().await;
        let repo = SqlResponseRepository::new(pool);
        let option = OptionId::generate();
        let stored = response(
            survey_id,
            Utc::now(),
            vec![
                text(QuestionId::generate(), "Great"),
                choice(QuestionId::generate(), &[(option, "Red")]),
                scale(QuestionId::generate(), 4),
            ],
        );

        repo.append(stored.clone()).await.expect("append");

        let found = repo.find_by_id(&survey_id, &stored.id).await.expect("find").expect("exists");
        assert_eq!(found.answers, stored.answers);
        assert_eq!(found.submitter_origin, stored.submitter_origin);

        let other_survey = SurveyId::generate();
        assert!(repo.find_by_id(&other_survey, &stored.id).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn summaries_are_paged_newest_first() {
        let (pool, survey_id) = setup().await;
        let repo = SqlResponseRepository::new(pool);
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("timestamp");
        let mut ids = Vec::new();
        for offset in 0..5 {
            let stored = response(
                survey_id,
                start + Duration::minutes(offset),
                vec![text(QuestionId::generate(), "x"), scale(QuestionId::generate(), 1)],
            );
            ids.push(stored.id);
            repo.append(stored).await.expect("append");
        }

        let first = repo.list_summaries(&survey_id, 0, 2).await.expect("page 0");
        assert_eq!(first.total, 5);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].id, ids[4]);
        assert_eq!(first.items[0].answer_count, 2);

        let last = repo.list_summaries(&survey_id, 2, 2).await.expect("page 2");
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn daily_counts_match_in_memory_histogram() {
        let (pool, survey_id) = setup().await;
        let repo = SqlResponseRepository::new(pool);
        let instants = [
            Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).single().expect("timestamp"),
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).single().expect("timestamp"),
            Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).single().expect("timestamp"),
        ];
        for instant in instants {
            repo.append(response(survey_id, instant, Vec::new())).await.expect("append");
        }

        let counts = repo.daily_counts(&survey_id).await.expect("daily counts");
        assert_eq!(counts, daily_histogram(instants));
        assert_eq!(counts.iter().map(|day| day.count).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn tallies_group_selections_scale_values_and_text_samples() {
        let (pool, survey_id) = setup().await;
        let repo = SqlResponseRepository::new(pool);
        let colour = QuestionId::generate();
        let rating = QuestionId::generate();
        let comment = QuestionId::generate();
        let red = OptionId::generate();
        let blue = OptionId::generate();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("timestamp");

        let rows = [
            (vec![(red, "Red")], 1, "first"),
            (vec![(red, "Crimson")], 3, "  "),
            (vec![(red, "Red"), (blue, "Blue")], 3, "third"),
            (vec![(blue, "Blue")], 5, "fourth"),
        ];
        for (offset, (picks, value, remark)) in rows.iter().enumerate() {
            repo.append(response(
                survey_id,
                start + Duration::minutes(offset as i64),
                vec![choice(colour, picks), scale(rating, *value), text(comment, remark)],
            ))
            .await
            .expect("append");
        }

        let tallies = repo.question_tallies(&survey_id, 2).await.expect("tallies");

        let colours = &tallies[&colour];
        assert_eq!(colours.answered, 4);
        let summary: Vec<(&str, u64)> =
            colours.options.iter().map(|tally| (tally.label.as_str(), tally.count)).collect();
        assert_eq!(summary, vec![("Red", 2), ("Crimson", 1), ("Blue", 2)]);

        let ratings = &tallies[&rating];
        assert_eq!(ratings.scale_distribution.get(&3), Some(&2));
        assert_eq!(ratings.scale_distribution.len(), 3);

        assert_eq!(tallies[&comment].text_samples, vec!["first", "third"]);
        assert_eq!(tallies[&comment].answered, 4);
    }

    #[tokio::test]
    async fn whitespace_only_text_does_not_crowd_out_samples() {
        let (pool, survey_id) = setup().await;
        let repo = SqlResponseRepository::new(pool);
        let comment = QuestionId::generate();
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("timestamp");

        let remarks = ["\t\n", "\r\n ", "\u{A0}\u{3000}", "real answer"];
        for (offset, remark) in remarks.iter().enumerate() {
            repo.append(response(
                survey_id,
                start + Duration::minutes(offset as i64),
                vec![text(comment, remark)],
            ))
            .await
            .expect("append");
        }

        let tallies = repo.question_tallies(&survey_id, 2).await.expect("tallies");

        assert_eq!(tallies[&comment].text_samples, vec!["real answer"]);
        assert_eq!(tallies[&comment].answered, 4);
    }

    #[test]
    fn whitespace_set_covers_every_char_rust_trims() {
        let trimmed: Vec<char> = (0..=0x3000u32)
            .filter_map(char::from_u32)
            .filter(|ch| ch.is_whitespace())
            .collect();
        for ch in trimmed {
            assert!(super::UNICODE_WHITESPACE.contains(ch), "missing {:#x}", ch as u32);
        }
    }
}
