// src/models/response.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{prelude::FromRow, types::Json};

use crate::error::AppError;
use crate::models::survey::{Question, QuestionType};

/// Response lifecycle states. `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::InProgress => "in_progress",
            ResponseStatus::Completed => "completed",
            ResponseStatus::Abandoned => "abandoned",
        }
    }
}

/// One per-question answer, embedded in `survey_responses.answers`.
///
/// Question text and type are denormalized so reports stay stable even if
/// the question is edited after responses exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,

    pub question_text: String,

    #[serde(rename = "type")]
    pub question_type: QuestionType,

    /// Number for rating, string for text/multiple choice, null for a skip.
    pub value: Value,

    pub skipped: bool,
}

/// Demographic snapshot captured when the respondent starts the survey,
/// stored disconnected from their identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographics {
    pub department: Option<String>,
    pub position: Option<String>,
    pub experience_level: Option<String>,
    pub employment_type: Option<String>,
}

/// Represents the 'survey_responses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SurveyResponse {
    pub id: i64,

    pub survey_id: i64,

    /// Unique: one response per token. No respondent reference is stored
    /// anywhere on this row.
    pub token: String,

    pub demographics: Json<Demographics>,

    pub answers: Json<Vec<Answer>>,

    /// One of `in_progress|completed|abandoned`; see [`ResponseStatus`].
    pub status: String,

    pub completion_percentage: i32,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    pub time_spent_seconds: Option<i64>,
}

impl SurveyResponse {
    pub fn is_completed(&self) -> bool {
        self.status == ResponseStatus::Completed.as_str()
    }
}

/// An answer is counted only when its value is neither null nor an empty
/// string.
pub fn is_answered(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Merges incoming answers into the stored list: last write wins per
/// question id, new questions append. Never removes an answer.
pub fn merge_answers(existing: &mut Vec<Answer>, incoming: Vec<Answer>) {
    for answer in incoming {
        match existing
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
        {
            Some(slot) => *slot = answer,
            None => existing.push(answer),
        }
    }
}

/// Completion percentage = round(100 * answered / total), where answered
/// excludes skipped entries.
pub fn completion_percentage(answers: &[Answer], total_questions: usize) -> i32 {
    if total_questions == 0 {
        return 0;
    }
    let answered = answers.iter().filter(|a| !a.skipped).count();
    (100.0 * answered as f64 / total_questions as f64).round() as i32
}

/// Raw per-question answer as submitted by the respondent.
#[derive(Debug, Deserialize)]
pub struct AnswerInput {
    pub question_id: String,
    #[serde(default)]
    pub value: Value,
}

/// DTO for the partial-save endpoint.
#[derive(Debug, Deserialize)]
pub struct SaveResponseRequest {
    pub demographics: Option<Demographics>,
    pub answers: Vec<AnswerInput>,
}

/// Resolves a submitted answer against the survey's question list,
/// denormalizing text/type and validating the value against the question.
pub fn resolve_answer(questions: &[Question], input: AnswerInput) -> Result<Answer, AppError> {
    let question = questions
        .iter()
        .find(|q| q.id == input.question_id)
        .ok_or_else(|| {
            AppError::BadRequest(format!("unknown question id: {}", input.question_id))
        })?;

    let skipped = !is_answered(&input.value);
    if !skipped {
        match question.question_type {
            QuestionType::Rating => {
                let v = input.value.as_f64().ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "question {} expects a numeric rating",
                        question.id
                    ))
                })?;
                if v < question.scale_min as f64 || v > question.scale_max as f64 {
                    return Err(AppError::BadRequest(format!(
                        "rating for question {} must be between {} and {}",
                        question.id, question.scale_min, question.scale_max
                    )));
                }
            }
            QuestionType::Text => {
                if !input.value.is_string() {
                    return Err(AppError::BadRequest(format!(
                        "question {} expects a text answer",
                        question.id
                    )));
                }
            }
            QuestionType::MultipleChoice => {
                let choice = input.value.as_str().ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "question {} expects one of its options",
                        question.id
                    ))
                })?;
                if !question.options.iter().any(|o| o == choice) {
                    return Err(AppError::BadRequest(format!(
                        "'{}' is not an option of question {}",
                        choice, question.id
                    )));
                }
            }
        }
    }

    Ok(Answer {
        question_id: question.id.clone(),
        question_text: question.text.clone(),
        question_type: question.question_type,
        value: input.value,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn questions() -> Vec<Question> {
        serde_json::from_value(json!([
            {"id": "q1", "text": "Rate the kitchen", "type": "rating"},
            {"id": "q2", "text": "Any comments?", "type": "text"},
            {"id": "q3", "text": "Shift", "type": "multiple_choice",
             "options": ["Morning", "Evening"]},
        ]))
        .unwrap()
    }

    fn answer(questions: &[Question], id: &str, value: Value) -> Answer {
        resolve_answer(
            questions,
            AnswerInput {
                question_id: id.to_string(),
                value,
            },
        )
        .unwrap()
    }

    #[test]
    fn empty_and_null_values_are_skips() {
        assert!(!is_answered(&Value::Null));
        assert!(!is_answered(&json!("")));
        assert!(is_answered(&json!("ok")));
        assert!(is_answered(&json!(0)));
    }

    #[test]
    fn merge_replaces_instead_of_duplicating() {
        let qs = questions();
        let mut stored = vec![answer(&qs, "q1", json!(4))];

        merge_answers(&mut stored, vec![answer(&qs, "q1", json!(9))]);

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].value, json!(9));
    }

    #[test]
    fn merge_appends_new_questions_in_order() {
        let qs = questions();
        let mut stored = vec![answer(&qs, "q1", json!(4))];

        merge_answers(
            &mut stored,
            vec![answer(&qs, "q2", json!("fine")), answer(&qs, "q3", json!("Morning"))],
        );

        let ids: Vec<&str> = stored.iter().map(|a| a.question_id.as_str()).collect();
        assert_eq!(ids, ["q1", "q2", "q3"]);
    }

    #[test]
    fn completion_is_monotonic_under_adds_and_replaces() {
        let qs = questions();
        let mut stored = vec![];
        let mut last = 0;

        for incoming in [
            vec![answer(&qs, "q1", json!(4))],
            vec![answer(&qs, "q1", json!(7))],
            vec![answer(&qs, "q2", json!("fine"))],
            vec![answer(&qs, "q3", json!("Evening"))],
        ] {
            merge_answers(&mut stored, incoming);
            let pct = completion_percentage(&stored, qs.len());
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn skipped_answers_do_not_count_toward_completion() {
        let qs = questions();
        let stored = vec![
            answer(&qs, "q1", json!(8)),
            answer(&qs, "q2", Value::Null),
        ];
        assert_eq!(completion_percentage(&stored, 3), 33);
    }

    #[test]
    fn completion_with_no_questions_is_zero() {
        assert_eq!(completion_percentage(&[], 0), 0);
    }

    #[test]
    fn rating_out_of_bounds_rejected() {
        let qs = questions();
        let err = resolve_answer(
            &qs,
            AnswerInput {
                question_id: "q1".to_string(),
                value: json!(11),
            },
        );
        assert!(matches!(err, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn unknown_option_rejected() {
        let qs = questions();
        let err = resolve_answer(
            &qs,
            AnswerInput {
                question_id: "q3".to_string(),
                value: json!("Night"),
            },
        );
        assert!(matches!(err, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn unknown_question_rejected() {
        let qs = questions();
        let err = resolve_answer(
            &qs,
            AnswerInput {
                question_id: "nope".to_string(),
                value: json!(1),
            },
        );
        assert!(matches!(err, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn skip_is_recorded_with_null_value() {
        let qs = questions();
        let a = answer(&qs, "q2", Value::Null);
        assert!(a.skipped);
        assert_eq!(a.question_text, "Any comments?");
    }
}
