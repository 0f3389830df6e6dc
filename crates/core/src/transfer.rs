//! Portable survey definitions: export to a nested document, import back
//! as a plan of upserts the store applies in one transaction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::question::{Question, QuestionDraft, QuestionId};
use crate::domain::survey::{
    validate_survey_text, LinkId, LinkOverrides, LinkedQuestion, Survey, SurveyId,
    SurveyQuestionLink,
};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyExport {
    #[serde(default)]
    pub id: Option<SurveyId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub questions: Vec<ExportedLink>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedLink {
    /// Informational on import; payload position decides the order.
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(flatten)]
    pub overrides: LinkOverrides,
    #[serde(default)]
    pub hidden: bool,
    pub question: ExportedQuestion,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedQuestion {
    #[serde(default)]
    pub id: Option<QuestionId>,
    #[serde(flatten)]
    pub definition: QuestionDraft,
}

pub fn export_survey(survey: &Survey, linked: &[LinkedQuestion]) -> SurveyExport {
    let mut ordered: Vec<&LinkedQuestion> = linked.iter().collect();
    ordered.sort_by_key(|item| item.link.order_index);

    SurveyExport {
        id: Some(survey.id),
        title: survey.title.clone(),
        description: survey.description.clone(),
        published: survey.published,
        questions: ordered
            .into_iter()
            .map(|item| ExportedLink {
                order_index: Some(item.link.order_index),
                overrides: item.link.overrides.clone(),
                hidden: item.link.hidden,
                question: ExportedQuestion {
                    id: Some(item.question.id),
                    definition: item.question.to_draft(),
                },
            })
            .collect(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedQuestion {
    pub question: Question,
    pub created: bool,
}

/// Everything an import writes. Existing links of the survey are replaced
/// wholesale by `links`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportPlan {
    pub survey: Survey,
    pub survey_created: bool,
    pub questions: Vec<PlannedQuestion>,
    pub links: Vec<SurveyQuestionLink>,
}

/// `existing_survey` and `existing_questions` hold only records that exist
/// and are not archived; any other supplied id produces a fresh record.
pub fn plan_import(
    export: SurveyExport,
    existing_survey: Option<&Survey>,
    existing_questions: &HashMap<QuestionId, Question>,
    now: DateTime<Utc>,
) -> Result<ImportPlan, DomainError> {
    validate_survey_text(&export.title, export.description.as_deref())?;
    Survey::ensure_publishable(export.published, export.questions.len())?;

    let mut seen = HashSet::new();
    for entry in &export.questions {
        entry.question.definition.validate()?;
        if let Some(id) = entry.question.id.filter(|id| existing_questions.contains_key(id)) {
            if !seen.insert(id) {
                return Err(DomainError::validation(format!(
                    "Question appears more than once in import: {id}"
                )));
            }
        }
    }

    let survey = match existing_survey {
        Some(current) => Survey {
            title: export.title,
            description: export.description,
            published: export.published,
            updated_at: now,
            ..current.clone()
        },
        None => Survey {
            id: SurveyId::generate(),
            title: export.title,
            description: export.description,
            published: export.published,
            archived: false,
            created_at: now,
            updated_at: now,
        },
    };

    let mut questions = Vec::with_capacity(export.questions.len());
    let mut links = Vec::with_capacity(export.questions.len());
    for (position, entry) in export.questions.into_iter().enumerate() {
        let ExportedQuestion { id, definition } = entry.question;
        let planned = match id.and_then(|id| existing_questions.get(&id)) {
            Some(current) => {
                PlannedQuestion { question: definition.apply_to(current, now), created: false }
            }
            None => PlannedQuestion {
                question: definition.into_question(QuestionId::generate(), now),
                created: true,
            },
        };

        links.push(SurveyQuestionLink {
            id: LinkId::generate(),
            survey_id: survey.id,
            question_id: planned.question.id,
            order_index: position as i32,
            overrides: entry.overrides,
            hidden: entry.hidden,
            created_at: now,
            updated_at: now,
        });
        questions.push(planned);
    }

    Ok(ImportPlan { survey, survey_created: existing_survey.is_none(), questions, links })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::{export_survey, plan_import, SurveyExport};
    use crate::domain::question::{
        LinearScaleConfig, OptionDraft, Question, QuestionDraft, QuestionId, QuestionType,
    };
    use crate::domain::survey::{
        LinkId, LinkOverrides, LinkedQuestion, Survey, SurveyId, SurveyQuestionLink,
    };
    use crate::errors::DomainError;

    fn draft(title: &str, question_type: QuestionType) -> QuestionDraft {
        QuestionDraft {
            title: title.to_string(),
            description: Some(format!("About {title}")),
            question_type,
            required: true,
            max_length: question_type.is_text().then_some(200),
            linear_scale_config: (question_type == QuestionType::LinearScale).then(|| {
                LinearScaleConfig {
                    min_value: 0,
                    max_value: 10,
                    step: 2,
                    left_label: Some("Never".to_string()),
                    right_label: Some("Always".to_string()),
                }
            }),
            options: if question_type.is_choice() {
                vec![
                    OptionDraft { label: "One".to_string(), position: Some(0) },
                    OptionDraft { label: "Two".to_string(), position: Some(1) },
                ]
            } else {
                vec![]
            },
        }
    }

    fn stored_survey() -> (Survey, Vec<LinkedQuestion>) {
        let now = Utc::now();
        let survey = Survey {
            id: SurveyId::generate(),
            title: "Exit interview".to_string(),
            description: Some("For leavers".to_string()),
            published: true,
            archived: false,
            created_at: now,
            updated_at: now,
        };
        let definitions = [
            ("Reason", QuestionType::Paragraph),
            ("Team", QuestionType::Dropdown),
            ("Recommend", QuestionType::LinearScale),
        ];
        let linked = definitions
            .iter()
            .enumerate()
            .map(|(index, (title, question_type))| {
                let question = draft(title, *question_type).into_question(QuestionId::generate(), now);
                LinkedQuestion {
                    link: SurveyQuestionLink {
                        id: LinkId::generate(),
                        survey_id: survey.id,
                        question_id: question.id,
                        order_index: index as i32,
                        overrides: LinkOverrides {
                            required_override: (index == 1).then_some(false),
                            label_override: (index == 2).then(|| "Would you recommend us?".to_string()),
                            description_override: None,
                        },
                        hidden: index == 1,
                        created_at: now,
                        updated_at: now,
                    },
                    question,
                }
            })
            .rev()
            .collect();
        (survey, linked)
    }

    #[test]
    fn export_lists_links_in_order_with_full_definitions() {
        let (survey, linked) = stored_survey();
        let export = export_survey(&survey, &linked);

        assert_eq!(export.id, Some(survey.id));
        let titles: Vec<&str> =
            export.questions.iter().map(|entry| entry.question.definition.title.as_str()).collect();
        assert_eq!(titles, vec!["Reason", "Team", "Recommend"]);
        assert_eq!(export.questions[1].overrides.required_override, Some(false));
        assert!(export.questions[1].hidden);
    }

    #[test]
    fn export_then_import_into_empty_store_reproduces_equivalent_survey() {
        let (survey, linked) = stored_survey();
        let export = export_survey(&survey, &linked);
        let json = serde_json::to_string(&export).expect("serialize export");
        let parsed: SurveyExport = serde_json::from_str(&json).expect("parse export");

        let plan = plan_import(parsed, None, &HashMap::new(), Utc::now()).expect("import plan");

        assert!(plan.survey_created);
        assert_ne!(plan.survey.id, survey.id);
        assert_eq!(plan.survey.title, survey.title);
        assert_eq!(plan.survey.description, survey.description);
        assert!(plan.survey.published);

        let mut original: Vec<&LinkedQuestion> = linked.iter().collect();
        original.sort_by_key(|item| item.link.order_index);
        for ((planned, link), source) in plan.questions.iter().zip(&plan.links).zip(original) {
            assert!(planned.created);
            assert_ne!(planned.question.id, source.question.id);
            assert_eq!(planned.question.to_draft(), source.question.to_draft());
            assert_eq!(link.question_id, planned.question.id);
            assert_eq!(link.order_index, source.link.order_index);
            assert_eq!(link.overrides, source.link.overrides);
            assert_eq!(link.hidden, source.link.hidden);
            assert_ne!(link.id, source.link.id);
        }
    }

    #[test]
    fn known_ids_update_in_place_and_unknown_ids_create() {
        let (survey, linked) = stored_survey();
        let mut export = export_survey(&survey, &linked);
        export.title = "Exit interview v2".to_string();
        export.questions[0].question.definition.title = "Main reason".to_string();
        export.questions[1].question.id = Some(QuestionId::generate());

        let existing: HashMap<QuestionId, Question> =
            linked.iter().map(|item| (item.question.id, item.question.clone())).collect();
        let plan = plan_import(export.clone(), Some(&survey), &existing, Utc::now()).expect("plan");

        assert!(!plan.survey_created);
        assert_eq!(plan.survey.id, survey.id);
        assert_eq!(plan.survey.created_at, survey.created_at);
        assert_eq!(plan.survey.title, "Exit interview v2");

        assert!(!plan.questions[0].created);
        assert_eq!(Some(plan.questions[0].question.id), export.questions[0].question.id);
        assert_eq!(plan.questions[0].question.title, "Main reason");
        assert!(plan.questions[1].created);
        assert_ne!(Some(plan.questions[1].question.id), export.questions[1].question.id);
        assert!(plan.links.iter().all(|link| link.survey_id == survey.id));
    }

    #[test]
    fn payload_position_becomes_the_order_index() {
        let (survey, linked) = stored_survey();
        let mut export = export_survey(&survey, &linked);
        export.questions.reverse();

        let plan = plan_import(export, None, &HashMap::new(), Utc::now()).expect("plan");
        let indices: Vec<i32> = plan.links.iter().map(|link| link.order_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(plan.questions[0].question.title, "Recommend");
    }

    #[test]
    fn invalid_imports_are_rejected() {
        let (survey, linked) = stored_survey();

        let mut empty_published = export_survey(&survey, &linked);
        empty_published.questions.clear();
        assert!(matches!(
            plan_import(empty_published, None, &HashMap::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let mut bad_question = export_survey(&survey, &linked);
        bad_question.questions[1].question.definition.options.clear();
        assert!(matches!(
            plan_import(bad_question, None, &HashMap::new(), Utc::now()),
            Err(DomainError::Validation(_))
        ));

        let mut duplicated = export_survey(&survey, &linked);
        let repeat = duplicated.questions[0].clone();
        duplicated.questions.push(repeat);
        let existing: HashMap<QuestionId, Question> =
            linked.iter().map(|item| (item.question.id, item.question.clone())).collect();
        let error = plan_import(duplicated, Some(&survey), &existing, Utc::now())
            .expect_err("duplicate question");
        assert!(matches!(error, DomainError::Validation(ref m) if m.contains("more than once")));
    }
}
