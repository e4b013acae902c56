// src/handlers/respondent.rs
//
// The anonymous, token-gated surface. Nothing returned from these handlers
// may carry a respondent reference: surveys are reduced to `PublicSurvey`
// and responses never stored one in the first place.

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction, types::Json as Jsonb};

use crate::{
    error::AppError,
    models::{
        response::{
            Answer, Demographics, ResponseStatus, SaveResponseRequest, SurveyResponse,
            completion_percentage, merge_answers, resolve_answer,
        },
        survey::{PublicSurvey, Survey, SurveyStatus},
        token::{SurveyToken, validate_token},
    },
    utils::retry::with_retry,
};

use super::survey::fetch_survey;

async fn fetch_token(pool: &PgPool, token: &str) -> Result<Option<SurveyToken>, AppError> {
    let row = with_retry("fetch token", || {
        sqlx::query_as::<_, SurveyToken>("SELECT * FROM survey_tokens WHERE token = $1")
            .bind(token)
            .fetch_optional(pool)
    })
    .await?;
    Ok(row)
}

/// Row-locks the response for this token, if one exists. Updates within the
/// transaction then serialize per response, which is what makes
/// last-write-wins per question and finalize-once hold under concurrency.
async fn lock_response(
    tx: &mut Transaction<'_, Postgres>,
    token: &str,
) -> Result<Option<SurveyResponse>, AppError> {
    let row = sqlx::query_as::<_, SurveyResponse>(
        "SELECT * FROM survey_responses WHERE token = $1 FOR UPDATE",
    )
    .bind(token)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Merges incoming answers into a locked response row and writes it back.
async fn merge_and_store(
    tx: &mut Transaction<'_, Postgres>,
    response: SurveyResponse,
    incoming: Vec<Answer>,
    demographics: Option<Demographics>,
    total_questions: usize,
) -> Result<SurveyResponse, AppError> {
    let mut merged = response.answers.0.clone();
    merge_answers(&mut merged, incoming);
    let pct = completion_percentage(&merged, total_questions);
    let demographics = demographics.unwrap_or(response.demographics.0);

    let updated = sqlx::query_as::<_, SurveyResponse>(
        r#"
        UPDATE survey_responses
        SET answers = $2, demographics = $3, completion_percentage = $4
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(response.id)
    .bind(Jsonb(&merged))
    .bind(Jsonb(&demographics))
    .bind(pct)
    .fetch_one(&mut **tx)
    .await?;
    Ok(updated)
}

fn require_active(survey: &Survey) -> Result<(), AppError> {
    if survey.status() != Some(SurveyStatus::Active) {
        return Err(AppError::InvalidState(format!(
            "survey is {}, not accepting responses",
            survey.status
        )));
    }
    Ok(())
}

/// Returns the survey's question set for a token, plus any partial response
/// already saved under it, so a respondent can resume where they left off.
pub async fn get_survey_by_token(
    State(pool): State<PgPool>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let token_row = fetch_token(&pool, &token).await?;
    let token_row = validate_token(token_row.as_ref(), Utc::now())?;

    let survey = fetch_survey(&pool, token_row.survey_id).await?;

    let response = with_retry("fetch response", || {
        sqlx::query_as::<_, SurveyResponse>("SELECT * FROM survey_responses WHERE token = $1")
            .bind(&token)
            .fetch_optional(&pool)
    })
    .await?;

    Ok(Json(serde_json::json!({
        "survey": PublicSurvey::from(&survey),
        "response": response,
    })))
}

/// Saves a partial (or full) set of answers under a token.
///
/// Creates the response on first call, seeded with the demographic snapshot;
/// afterwards each answer replaces any stored answer for the same question.
/// Never finalizes and never consumes the token, so the same token can keep
/// saving until submission.
pub async fn save_response(
    State(pool): State<PgPool>,
    Path(token): Path<String>,
    Json(req): Json<SaveResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let token_row = fetch_token(&pool, &token)
        .await?
        .ok_or(AppError::TokenNotFound)?;
    let survey = fetch_survey(&pool, token_row.survey_id).await?;

    let mut tx = pool.begin().await?;
    let existing = lock_response(&mut tx, &token).await?;

    // A completed response outranks the generic token-used rejection: the
    // caller is told the response is closed, not that the token is spent.
    if let Some(response) = &existing {
        if response.is_completed() && !survey.allow_multiple_responses {
            return Err(AppError::ResponseClosed);
        }
    }

    validate_token(Some(&token_row), now)?;
    require_active(&survey)?;

    let mut answers: Vec<Answer> = Vec::new();
    for input in req.answers {
        answers.push(resolve_answer(&survey.questions.0, input)?);
    }

    let total_questions = survey.questions.0.len();

    let response = match existing {
        Some(response) => {
            merge_and_store(&mut tx, response, answers, req.demographics, total_questions).await?
        }
        None => {
            let pct = completion_percentage(&answers, total_questions);
            let demographics = req.demographics.clone().unwrap_or_default();

            // Two concurrent first saves can both miss the lock above; the
            // conflict clause lets the loser fall through to the update path
            // instead of tripping the unique index.
            let inserted = sqlx::query_as::<_, SurveyResponse>(
                r#"
                INSERT INTO survey_responses
                    (survey_id, token, demographics, answers, status,
                     completion_percentage, started_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (token) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(survey.id)
            .bind(&token)
            .bind(Jsonb(&demographics))
            .bind(Jsonb(&answers))
            .bind(ResponseStatus::InProgress.as_str())
            .bind(pct)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            match inserted {
                Some(response) => response,
                None => {
                    let response =
                        lock_response(&mut tx, &token).await?.ok_or_else(|| {
                            AppError::InternalServerError(
                                "response row missing after insert conflict".to_string(),
                            )
                        })?;
                    // The winner may even have finalized by now.
                    if response.is_completed() {
                        if survey.allow_multiple_responses {
                            return Err(AppError::TokenAlreadyUsed);
                        }
                        return Err(AppError::ResponseClosed);
                    }
                    merge_and_store(&mut tx, response, answers, req.demographics, total_questions)
                        .await?
                }
            }
        }
    };

    tx.commit().await?;
    Ok(Json(response))
}

/// Finalizes the response for a token: marks it completed, stamps the time
/// spent, and only then consumes the token. One-way; a second call is
/// rejected and leaves the stored record untouched.
pub async fn submit_response(
    State(pool): State<PgPool>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let token_row = fetch_token(&pool, &token)
        .await?
        .ok_or(AppError::TokenNotFound)?;
    let survey = fetch_survey(&pool, token_row.survey_id).await?;

    let mut tx = pool.begin().await?;
    let response = lock_response(&mut tx, &token)
        .await?
        .ok_or(AppError::NotFound(
            "no response recorded for this token".to_string(),
        ))?;

    if response.is_completed() {
        return Err(AppError::AlreadyCompleted);
    }

    validate_token(Some(&token_row), now)?;
    require_active(&survey)?;

    let time_spent = time_spent_seconds(response.started_at, now);
    let pct = completion_percentage(&response.answers.0, survey.questions.0.len());

    let response = sqlx::query_as::<_, SurveyResponse>(
        r#"
        UPDATE survey_responses
        SET status = $2, completed_at = $3, time_spent_seconds = $4,
            completion_percentage = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(response.id)
    .bind(ResponseStatus::Completed.as_str())
    .bind(now)
    .bind(time_spent)
    .bind(pct)
    .fetch_one(&mut *tx)
    .await?;

    // The explicit mark-used step; partial saves never reach this.
    sqlx::query("UPDATE survey_tokens SET used = TRUE, used_at = $2 WHERE token = $1")
        .bind(&token)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("response finalized for survey {}", survey.id);

    Ok(Json(response))
}

fn time_spent_seconds(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i64 {
    (completed_at - started_at).num_seconds().max(0)
}
