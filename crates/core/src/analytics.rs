//! Read-side statistics for a survey.
//!
//! Stores hand over pre-aggregated [`QuestionTally`] values (SQL `GROUP BY`
//! results, or a fold over in-memory responses via [`QuestionTally::record`])
//! and [`summarize`] shapes them into the reported structure. Nothing here
//! touches stored entities.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::question::{OptionId, QuestionId, QuestionType};
use crate::domain::response::QuestionResponse;
use crate::domain::survey::{LinkedQuestion, Survey, SurveyId};

pub const MAX_TEXT_SAMPLES: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySubmissionCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// Selections of one option, grouped by the label captured at submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionTally {
    pub option_id: OptionId,
    pub label: String,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuestionTally {
    pub answered: u64,
    pub options: Vec<OptionTally>,
    pub scale_distribution: BTreeMap<i32, u64>,
    pub text_samples: Vec<String>,
}

impl QuestionTally {
    pub fn record(&mut self, answer: &QuestionResponse, text_sample_limit: usize) {
        self.answered += 1;

        for selected in &answer.selected_options {
            let existing = self.options.iter_mut().find(|tally| {
                tally.option_id == selected.option_id && tally.label == selected.label_snapshot
            });
            match existing {
                Some(tally) => tally.count += 1,
                None => self.options.push(OptionTally {
                    option_id: selected.option_id,
                    label: selected.label_snapshot.clone(),
                    count: 1,
                }),
            }
        }

        if let Some(value) = answer.numeric_answer {
            *self.scale_distribution.entry(value).or_insert(0) += 1;
        }

        if let Some(text) = &answer.text_answer {
            if !text.trim().is_empty() && self.text_samples.len() < text_sample_limit {
                self.text_samples.push(text.clone());
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionCount {
    pub option_id: OptionId,
    pub label: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleStatistics {
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub distribution: BTreeMap<i32, u64>,
}

impl ScaleStatistics {
    pub fn from_distribution(distribution: BTreeMap<i32, u64>) -> Self {
        let total: u64 = distribution.values().sum();
        if total == 0 {
            return Self { average: None, median: None, distribution };
        }

        let sum: i64 = distribution.iter().map(|(value, count)| i64::from(*value) * *count as i64).sum();
        let average = sum as f64 / total as f64;
        let middle = total / 2;
        let median = if total % 2 == 0 {
            let lower = nth_value(&distribution, middle - 1);
            let upper = nth_value(&distribution, middle);
            (f64::from(lower) + f64::from(upper)) / 2.0
        } else {
            f64::from(nth_value(&distribution, middle))
        };

        Self { average: Some(average), median: Some(median), distribution }
    }
}

/// Value at zero-based `rank` of the sorted sample described by `distribution`.
fn nth_value(distribution: &BTreeMap<i32, u64>, rank: u64) -> i32 {
    let mut seen = 0;
    for (value, count) in distribution {
        seen += count;
        if rank < seen {
            return *value;
        }
    }
    distribution.keys().next_back().copied().unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionAnalytics {
    pub question_id: QuestionId,
    pub label: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub total_responses: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_counts: Option<Vec<OptionCount>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_samples: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyAnalytics {
    pub survey_id: SurveyId,
    pub survey_title: String,
    pub total_submissions: u64,
    pub submissions_over_time: Vec<DailySubmissionCount>,
    pub question_analytics: Vec<QuestionAnalytics>,
}

/// Groups submission instants by UTC calendar date, ascending.
pub fn daily_histogram(
    submitted_at: impl IntoIterator<Item = DateTime<Utc>>,
) -> Vec<DailySubmissionCount> {
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for instant in submitted_at {
        *per_day.entry(instant.date_naive()).or_insert(0) += 1;
    }
    per_day.into_iter().map(|(date, count)| DailySubmissionCount { date, count }).collect()
}

pub struct AnalyticsInput<'a> {
    pub survey: &'a Survey,
    pub linked: &'a [LinkedQuestion],
    pub total_submissions: u64,
    pub submissions_over_time: Vec<DailySubmissionCount>,
    pub tallies: HashMap<QuestionId, QuestionTally>,
    pub text_sample_limit: usize,
}

pub fn summarize(input: AnalyticsInput<'_>) -> SurveyAnalytics {
    let AnalyticsInput {
        survey,
        linked,
        total_submissions,
        submissions_over_time,
        mut tallies,
        text_sample_limit,
    } = input;

    let mut ordered: Vec<&LinkedQuestion> = linked.iter().collect();
    ordered.sort_by_key(|item| item.link.order_index);

    let question_analytics = ordered
        .into_iter()
        .map(|item| {
            let tally = tallies.remove(&item.question.id).unwrap_or_default();
            question_analytics(item, tally, text_sample_limit)
        })
        .collect();

    SurveyAnalytics {
        survey_id: survey.id,
        survey_title: survey.title.clone(),
        total_submissions,
        submissions_over_time,
        question_analytics,
    }
}

fn question_analytics(
    item: &LinkedQuestion,
    tally: QuestionTally,
    text_sample_limit: usize,
) -> QuestionAnalytics {
    let question = &item.question;
    let mut analytics = QuestionAnalytics {
        question_id: question.id,
        label: item.effective_label(),
        question_type: question.question_type,
        total_responses: tally.answered,
        option_counts: None,
        scale: None,
        text_samples: None,
    };

    match question.question_type {
        QuestionType::MultipleChoice | QuestionType::Checkboxes | QuestionType::Dropdown => {
            analytics.option_counts = Some(option_counts(item, tally.options, tally.answered));
        }
        QuestionType::LinearScale => {
            analytics.scale = Some(ScaleStatistics::from_distribution(tally.scale_distribution));
        }
        QuestionType::ShortAnswer | QuestionType::Paragraph => {
            let samples = tally
                .text_samples
                .into_iter()
                .filter(|text| !text.trim().is_empty())
                .take(text_sample_limit)
                .collect();
            analytics.text_samples = Some(samples);
        }
        QuestionType::Date | QuestionType::Time => {}
    }

    analytics
}

/// Tallied selections plus a zero entry for every current option nobody picked.
fn option_counts(item: &LinkedQuestion, tallies: Vec<OptionTally>, answered: u64) -> Vec<OptionCount> {
    let mut options = item.question.options.clone();
    options.sort_by_key(|option| option.position);
    let unpicked: Vec<OptionTally> = options
        .into_iter()
        .filter(|option| !tallies.iter().any(|tally| tally.option_id == option.id))
        .map(|option| OptionTally { option_id: option.id, label: option.label, count: 0 })
        .collect();

    let mut counts: Vec<OptionCount> = tallies
        .into_iter()
        .chain(unpicked)
        .map(|tally| OptionCount {
            option_id: tally.option_id,
            percentage: percentage(tally.count, answered),
            label: tally.label,
            count: tally.count,
        })
        .collect();
    // Stable: zero-count options keep their authored position.
    counts.sort_by(|left, right| right.count.cmp(&left.count));
    counts
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{
        daily_histogram, summarize, AnalyticsInput, OptionTally, QuestionTally, ScaleStatistics,
        MAX_TEXT_SAMPLES,
    };
    use crate::domain::question::{
        LinearScaleConfig, OptionId, Question, QuestionId, QuestionOption, QuestionType,
    };
    use crate::domain::response::{AnswerId, AnswerType, QuestionResponse, SelectedOption};
    use crate::domain::survey::{
        LinkId, LinkOverrides, LinkedQuestion, Survey, SurveyId, SurveyQuestionLink,
    };

    fn survey() -> Survey {
        let now = Utc::now();
        Survey {
            id: SurveyId::generate(),
            title: "Quarterly pulse".to_string(),
            description: None,
            published: true,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn linked(survey: &Survey, question_type: QuestionType, order_index: i32) -> LinkedQuestion {
        let now = Utc::now();
        let question = Question {
            id: QuestionId::generate(),
            title: format!("{} question", question_type.as_str()),
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
            options: if question_type.is_choice() {
                ["Yes", "No", "Maybe"]
                    .iter()
                    .enumerate()
                    .map(|(index, label)| QuestionOption {
                        id: OptionId::generate(),
                        label: label.to_string(),
                        position: index as i32,
                    })
                    .collect()
            } else {
                vec![]
            },
            archived: false,
            created_at: now,
            updated_at: now,
        };
        LinkedQuestion {
            link: SurveyQuestionLink {
                id: LinkId::generate(),
                survey_id: survey.id,
                question_id: question.id,
                order_index,
                overrides: LinkOverrides::default(),
                hidden: false,
                created_at: now,
                updated_at: now,
            },
            question,
        }
    }

    fn numeric(question_id: QuestionId, value: Option<i32>) -> QuestionResponse {
        QuestionResponse {
            id: AnswerId::generate(),
            question_id,
            answer_type: AnswerType::Numeric,
            text_answer: None,
            numeric_answer: value,
            selected_options: vec![],
        }
    }

    fn text(question_id: QuestionId, value: &str) -> QuestionResponse {
        QuestionResponse {
            id: AnswerId::generate(),
            question_id,
            answer_type: AnswerType::Text,
            text_answer: Some(value.to_string()),
            numeric_answer: None,
            selected_options: vec![],
        }
    }

    fn input<'a>(
        survey: &'a Survey,
        linked: &'a [LinkedQuestion],
        tallies: HashMap<QuestionId, QuestionTally>,
    ) -> AnalyticsInput<'a> {
        AnalyticsInput {
            survey,
            linked,
            total_submissions: 4,
            submissions_over_time: vec![],
            tallies,
            text_sample_limit: MAX_TEXT_SAMPLES,
        }
    }

    #[test]
    fn scale_of_one_three_three_five_has_mean_and_median_three() {
        let survey = survey();
        let linked = vec![linked(&survey, QuestionType::LinearScale, 0)];
        let question_id = linked[0].question.id;

        let mut tally = QuestionTally::default();
        for value in [1, 3, 3, 5] {
            tally.record(&numeric(question_id, Some(value)), MAX_TEXT_SAMPLES);
        }
        let report = summarize(input(&survey, &linked, HashMap::from([(question_id, tally)])));

        let scale = report.question_analytics[0].scale.clone().expect("scale stats");
        assert_eq!(scale.average, Some(3.0));
        assert_eq!(scale.median, Some(3.0));
        assert_eq!(scale.distribution, BTreeMap::from([(1, 1), (3, 2), (5, 1)]));
        assert_eq!(report.question_analytics[0].total_responses, 4);
    }

    #[test]
    fn median_of_odd_sample_is_middle_value() {
        let stats = ScaleStatistics::from_distribution(BTreeMap::from([(1, 2), (4, 1), (5, 2)]));
        assert_eq!(stats.median, Some(4.0));
        assert_eq!(stats.average, Some(16.0 / 5.0));
    }

    #[test]
    fn median_of_even_sample_averages_the_two_middle_values() {
        let stats = ScaleStatistics::from_distribution(BTreeMap::from([(2, 1), (3, 1)]));
        assert_eq!(stats.median, Some(2.5));
    }

    #[test]
    fn unanswered_numeric_values_are_excluded_from_scale_statistics() {
        let question_id = QuestionId::generate();
        let mut tally = QuestionTally::default();
        tally.record(&numeric(question_id, None), MAX_TEXT_SAMPLES);
        tally.record(&numeric(question_id, Some(2)), MAX_TEXT_SAMPLES);

        assert_eq!(tally.answered, 2);
        let stats = ScaleStatistics::from_distribution(tally.scale_distribution);
        assert_eq!(stats.average, Some(2.0));
    }

    #[test]
    fn zero_responses_give_zero_percentages_and_absent_scale_statistics() {
        let survey = survey();
        let linked = vec![
            linked(&survey, QuestionType::Checkboxes, 0),
            linked(&survey, QuestionType::LinearScale, 1),
        ];
        let report = summarize(AnalyticsInput {
            total_submissions: 0,
            ..input(&survey, &linked, HashMap::new())
        });

        let options = report.question_analytics[0].option_counts.clone().expect("option counts");
        assert_eq!(options.len(), 3);
        assert!(options.iter().all(|option| option.count == 0 && option.percentage == 0.0));
        let labels: Vec<&str> = options.iter().map(|option| option.label.as_str()).collect();
        assert_eq!(labels, vec!["Yes", "No", "Maybe"]);

        let scale = report.question_analytics[1].scale.clone().expect("scale stats");
        assert_eq!(scale.average, None);
        assert_eq!(scale.median, None);
        assert!(scale.distribution.is_empty());
    }

    #[test]
    fn option_counts_sort_by_count_and_use_answered_total() {
        let survey = survey();
        let linked = vec![linked(&survey, QuestionType::Checkboxes, 0)];
        let question = &linked[0].question;
        let (yes, no) = (&question.options[0], &question.options[1]);

        let tally = QuestionTally {
            answered: 4,
            options: vec![
                OptionTally { option_id: yes.id, label: yes.label.clone(), count: 1 },
                OptionTally { option_id: no.id, label: no.label.clone(), count: 3 },
            ],
            ..QuestionTally::default()
        };
        let report = summarize(input(&survey, &linked, HashMap::from([(question.id, tally)])));
        let counts = report.question_analytics[0].option_counts.clone().expect("option counts");

        assert_eq!(counts[0].label, "No");
        assert_eq!(counts[0].percentage, 75.0);
        assert_eq!(counts[1].label, "Yes");
        assert_eq!(counts[1].percentage, 25.0);
        assert_eq!(counts[2].label, "Maybe");
        assert_eq!(counts[2].count, 0);
    }

    #[test]
    fn renamed_options_are_reported_under_their_snapshot_label() {
        let question_id = QuestionId::generate();
        let option_id = OptionId::generate();
        let mut tally = QuestionTally::default();
        for label in ["Old name", "Old name", "New name"] {
            let answer = QuestionResponse {
                selected_options: vec![SelectedOption {
                    option_id,
                    label_snapshot: label.to_string(),
                }],
                ..numeric(question_id, None)
            };
            tally.record(&answer, MAX_TEXT_SAMPLES);
        }

        assert_eq!(tally.options.len(), 2);
        assert_eq!(tally.options[0].count, 2);
        assert_eq!(tally.options[1].label, "New name");
    }

    #[test]
    fn text_samples_skip_blanks_and_stop_at_the_cap() {
        let question_id = QuestionId::generate();
        let mut tally = QuestionTally::default();
        tally.record(&text(question_id, "   "), 3);
        for index in 0..5 {
            tally.record(&text(question_id, &format!("answer {index}")), 3);
        }

        assert_eq!(tally.answered, 6);
        assert_eq!(tally.text_samples, vec!["answer 0", "answer 1", "answer 2"]);
    }

    #[test]
    fn questions_are_reported_in_link_order_with_effective_labels() {
        let survey = survey();
        let mut linked = vec![
            linked(&survey, QuestionType::Date, 1),
            linked(&survey, QuestionType::Paragraph, 0),
        ];
        linked[0].link.overrides.label_override = Some("Start date".to_string());

        let report = summarize(input(&survey, &linked, HashMap::new()));
        assert_eq!(report.survey_title, "Quarterly pulse");
        assert_eq!(report.question_analytics[0].question_type, QuestionType::Paragraph);
        assert_eq!(report.question_analytics[0].text_samples, Some(vec![]));
        assert_eq!(report.question_analytics[1].label, "Start date");
        assert_eq!(report.question_analytics[1].option_counts, None);
        assert_eq!(report.question_analytics[1].scale, None);
    }

    #[test]
    fn daily_histogram_groups_by_utc_date_ascending() {
        let histogram = daily_histogram([
            Utc.with_ymd_and_hms(2026, 3, 2, 23, 59, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).unwrap(),
        ]);

        assert_eq!(histogram.len(), 2);
        assert_eq!(histogram[0].date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(histogram[0].count, 1);
        assert_eq!(histogram[1].count, 2);
    }
}
