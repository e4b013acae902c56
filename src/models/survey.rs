// src/models/survey.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::config::{DEFAULT_SCALE_MAX, DEFAULT_SCALE_MIN};

/// Survey lifecycle states.
///
/// `draft` -> `active` (tokens issued) -> `closed` (end date passed or manual).
/// Closed surveys are immutable apart from analytics reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurveyStatus {
    Draft,
    Active,
    Closed,
    Archived,
}

impl SurveyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyStatus::Draft => "draft",
            SurveyStatus::Active => "active",
            SurveyStatus::Closed => "closed",
            SurveyStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SurveyStatus::Draft),
            "active" => Some(SurveyStatus::Active),
            "closed" => Some(SurveyStatus::Closed),
            "archived" => Some(SurveyStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Rating,
    Text,
    MultipleChoice,
}

/// A single survey question, embedded (ordered) in `surveys.questions`.
///
/// Questions are keyed by a stable string `id` rather than their position,
/// so stored answers stay attached if questions are reordered later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,

    pub text: String,

    #[serde(rename = "type")]
    pub question_type: QuestionType,

    #[serde(default)]
    pub required: bool,

    /// Answer options; required for multiple-choice questions.
    #[serde(default)]
    pub options: Vec<String>,

    /// Rating bounds; only meaningful for rating questions.
    #[serde(default = "default_scale_min")]
    pub scale_min: i32,
    #[serde(default = "default_scale_max")]
    pub scale_max: i32,
}

fn default_scale_min() -> i32 {
    DEFAULT_SCALE_MIN
}

fn default_scale_max() -> i32 {
    DEFAULT_SCALE_MAX
}

/// Target-audience filter, stored as provided by the (out-of-scope)
/// audience-selection step. Empty lists mean "no restriction".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudienceFilter {
    #[serde(default)]
    pub departments: Vec<String>,
    #[serde(default)]
    pub positions: Vec<String>,
    #[serde(default)]
    pub experience_levels: Vec<String>,
    #[serde(default)]
    pub employment_types: Vec<String>,
}

/// Represents the 'surveys' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Survey {
    pub id: i64,

    pub title: String,

    pub description: Option<String>,

    /// One of `draft|active|closed|archived`; see [`SurveyStatus`].
    pub status: String,

    /// Ordered question list.
    pub questions: Json<Vec<Question>>,

    pub audience: Json<AudienceFilter>,

    /// Respondent ids to invite at activation, precomputed by the
    /// audience-selection step at creation time.
    pub invitees: Json<Vec<i64>>,

    pub starts_at: DateTime<Utc>,

    /// Tokens expire at this instant, never later.
    pub ends_at: DateTime<Utc>,

    pub allow_multiple_responses: bool,

    /// Days before `ends_at` at which one reminder is issued.
    pub reminder_days: i32,

    pub reminder_sent_at: Option<DateTime<Utc>>,

    pub total_invited: i32,

    pub created_at: Option<DateTime<Utc>>,
}

impl Survey {
    pub fn status(&self) -> Option<SurveyStatus> {
        SurveyStatus::parse(&self.status)
    }
}

/// Respondent-facing view of a survey. Deliberately excludes audience,
/// invitees and any token material.
#[derive(Debug, Serialize)]
pub struct PublicSurvey {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
    pub ends_at: DateTime<Utc>,
}

impl From<&Survey> for PublicSurvey {
    fn from(survey: &Survey) -> Self {
        PublicSurvey {
            id: survey.id,
            title: survey.title.clone(),
            description: survey.description.clone(),
            questions: survey.questions.0.clone(),
            ends_at: survey.ends_at,
        }
    }
}

/// Admin detail view: the survey plus participation counters.
#[derive(Debug, Serialize)]
pub struct SurveyDetail {
    #[serde(flatten)]
    pub survey: Survey,
    pub response_count: i64,
    pub completed_count: i64,
}

/// DTO for creating a new survey (always created in `draft`).
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSurveyRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(custom(function = validate_questions))]
    pub questions: Vec<Question>,

    #[serde(default)]
    pub audience: AudienceFilter,

    #[serde(default)]
    pub invitees: Vec<i64>,

    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,

    #[serde(default)]
    pub allow_multiple_responses: bool,

    #[validate(range(min = 0, max = 30))]
    #[serde(default = "default_reminder_days")]
    pub reminder_days: i32,
}

fn default_reminder_days() -> i32 {
    3
}

fn validate_questions(questions: &[Question]) -> Result<(), validator::ValidationError> {
    if questions.is_empty() {
        return Err(validator::ValidationError::new("questions_cannot_be_empty"));
    }
    let mut seen = std::collections::HashSet::new();
    for q in questions {
        if q.id.is_empty() || q.id.len() > 100 {
            return Err(validator::ValidationError::new("invalid_question_id"));
        }
        if !seen.insert(q.id.as_str()) {
            return Err(validator::ValidationError::new("duplicate_question_id"));
        }
        if q.text.is_empty() || q.text.len() > 1000 {
            return Err(validator::ValidationError::new("invalid_question_text"));
        }
        match q.question_type {
            QuestionType::MultipleChoice => {
                if q.options.is_empty() {
                    return Err(validator::ValidationError::new("options_cannot_be_empty"));
                }
                if q.options.iter().any(|o| o.is_empty() || o.len() > 500) {
                    return Err(validator::ValidationError::new("invalid_option"));
                }
            }
            QuestionType::Rating => {
                if q.scale_min < 0 || q.scale_min >= q.scale_max || q.scale_max > 100 {
                    return Err(validator::ValidationError::new("invalid_rating_scale"));
                }
            }
            QuestionType::Text => {}
        }
    }
    Ok(())
}

/// Query parameters for listing surveys.
#[derive(Debug, Deserialize)]
pub struct ListSurveysParams {
    pub status: Option<String>,
}
