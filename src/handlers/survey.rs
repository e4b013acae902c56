// src/handlers/survey.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, types::Json as Jsonb};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        analytics::{AnalyticsFilter, compute_analytics},
        response::{ResponseStatus, SurveyResponse},
        survey::{CreateSurveyRequest, ListSurveysParams, Survey, SurveyDetail, SurveyStatus},
        token::generate_token,
    },
    utils::retry::with_retry,
};

// Idempotent reads go through `with_retry` so a transient store hiccup is
// retried before surfacing a 500. Transactional writes stay single-shot: a
// retried transaction would re-run its check-then-write sequence against
// state the first attempt may have partially observed.

pub(crate) async fn fetch_survey(pool: &PgPool, id: i64) -> Result<Survey, AppError> {
    with_retry("fetch survey", || {
        sqlx::query_as::<_, Survey>("SELECT * FROM surveys WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
    })
    .await?
    .ok_or(AppError::NotFound("Survey not found".to_string()))
}

/// All completed responses of a survey, in creation order. This is the
/// input set for analytics.
pub(crate) async fn fetch_completed_responses(
    pool: &PgPool,
    survey_id: i64,
) -> Result<Vec<SurveyResponse>, AppError> {
    let responses = with_retry("fetch completed responses", || {
        sqlx::query_as::<_, SurveyResponse>(
            r#"
            SELECT * FROM survey_responses
            WHERE survey_id = $1 AND status = 'completed'
            ORDER BY started_at, id
            "#,
        )
        .bind(survey_id)
        .fetch_all(pool)
    })
    .await?;
    Ok(responses)
}

/// Issues one token per invited respondent and flips the survey to `active`.
///
/// Re-activation is allowed while the survey is `draft` or `active`; the
/// unique (survey_id, respondent_id) constraint makes re-invites a no-op,
/// so a respondent never holds two tokens for the same survey.
pub(crate) async fn issue_tokens(
    pool: &PgPool,
    survey: &Survey,
    now: DateTime<Utc>,
) -> Result<i64, AppError> {
    match survey.status() {
        Some(SurveyStatus::Draft) | Some(SurveyStatus::Active) => {}
        _ => {
            return Err(AppError::InvalidState(format!(
                "cannot issue tokens for a {} survey",
                survey.status
            )));
        }
    }

    let mut tx = pool.begin().await?;

    for respondent_id in survey.invitees.0.iter() {
        // Token expiry never exceeds the survey's end date.
        sqlx::query(
            r#"
            INSERT INTO survey_tokens (survey_id, token, respondent_id, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (survey_id, respondent_id) DO NOTHING
            "#,
        )
        .bind(survey.id)
        .bind(generate_token(now))
        .bind(respondent_id)
        .bind(survey.ends_at)
        .execute(&mut *tx)
        .await?;
    }

    let total_invited: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM survey_tokens WHERE survey_id = $1")
            .bind(survey.id)
            .fetch_one(&mut *tx)
            .await?;

    sqlx::query("UPDATE surveys SET status = 'active', total_invited = $2 WHERE id = $1")
        .bind(survey.id)
        .bind(total_invited)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "survey {} activated with {} invited respondents",
        survey.id,
        total_invited
    );

    Ok(total_invited)
}

/// Creates a new survey in `draft` state.
pub async fn create_survey(
    State(pool): State<PgPool>,
    Json(req): Json<CreateSurveyRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if req.starts_at >= req.ends_at {
        return Err(AppError::BadRequest(
            "starts_at must be before ends_at".to_string(),
        ));
    }

    let survey = sqlx::query_as::<_, Survey>(
        r#"
        INSERT INTO surveys
            (title, description, questions, audience, invitees,
             starts_at, ends_at, allow_multiple_responses, reminder_days)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&req.title)
    .bind(&req.description)
    .bind(Jsonb(&req.questions))
    .bind(Jsonb(&req.audience))
    .bind(Jsonb(&req.invitees))
    .bind(req.starts_at)
    .bind(req.ends_at)
    .bind(req.allow_multiple_responses)
    .bind(req.reminder_days)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(survey)))
}

/// Lists surveys, optionally filtered by lifecycle status.
pub async fn list_surveys(
    State(pool): State<PgPool>,
    Query(params): Query<ListSurveysParams>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(status) = &params.status {
        if SurveyStatus::parse(status).is_none() {
            return Err(AppError::BadRequest(format!(
                "unknown survey status: {}",
                status
            )));
        }
    }

    let surveys = with_retry("list surveys", || {
        sqlx::query_as::<_, Survey>(
            r#"
            SELECT * FROM surveys
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(&params.status)
        .fetch_all(&pool)
    })
    .await?;

    Ok(Json(surveys))
}

/// Retrieves a single survey with participation counters.
pub async fn get_survey(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let survey = fetch_survey(&pool, id).await?;

    let response_count: i64 = with_retry("count responses", || {
        sqlx::query_scalar("SELECT COUNT(*) FROM survey_responses WHERE survey_id = $1")
            .bind(id)
            .fetch_one(&pool)
    })
    .await?;

    let completed_count: i64 = with_retry("count completed responses", || {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM survey_responses WHERE survey_id = $1 AND status = 'completed'",
        )
        .bind(id)
        .fetch_one(&pool)
    })
    .await?;

    Ok(Json(SurveyDetail {
        survey,
        response_count,
        completed_count,
    }))
}

/// Manually activates a survey: issues tokens to the invitees stored at
/// creation time and marks the survey active.
pub async fn activate_survey(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let survey = fetch_survey(&pool, id).await?;

    let total_invited = issue_tokens(&pool, &survey, Utc::now()).await?;

    let survey = fetch_survey(&pool, id).await?;
    Ok(Json(serde_json::json!({
        "survey": survey,
        "total_invited": total_invited,
    })))
}

/// Manually closes an active survey. In-progress responses are marked
/// abandoned; the survey becomes immutable apart from analytics reads.
pub async fn close_survey(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let survey = fetch_survey(&pool, id).await?;

    if survey.status() != Some(SurveyStatus::Active) {
        return Err(AppError::InvalidState(format!(
            "cannot close a {} survey",
            survey.status
        )));
    }

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE surveys SET status = 'closed' WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE survey_responses SET status = $2 WHERE survey_id = $1 AND status = $3",
    )
    .bind(id)
    .bind(ResponseStatus::Abandoned.as_str())
    .bind(ResponseStatus::InProgress.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!("survey {} closed", id);

    let survey = fetch_survey(&pool, id).await?;
    Ok(Json(survey))
}

/// Computes the analytics report over completed responses, optionally
/// narrowed by demographic equality filters.
pub async fn get_analytics(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<impl IntoResponse, AppError> {
    let survey = fetch_survey(&pool, id).await?;
    let responses = fetch_completed_responses(&pool, id).await?;

    let report = compute_analytics(&survey, &responses, &filter);
    Ok(Json(report))
}
