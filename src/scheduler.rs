// src/scheduler.rs
//
// Periodic survey housekeeping: activate due drafts, remind about unused
// tokens, close surveys once their end date passes. `run_scheduler_pass`
// takes the clock as an argument so the same pass can be driven by the
// in-process interval loop, an external cron, or a test with a fixed time.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::AppError,
    handlers::survey::issue_tokens,
    models::{response::ResponseStatus, survey::Survey},
    utils::retry::with_retry,
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchedulerSummary {
    pub activated: u64,
    pub reminded: u64,
    pub closed: u64,
}

/// One full pass. The three steps touch disjoint survey sets (due drafts,
/// mid-flight actives, expired actives), so a failure in one step is logged
/// and does not block the others.
pub async fn run_scheduler_pass(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<SchedulerSummary, AppError> {
    let mut summary = SchedulerSummary::default();

    match activate_due_surveys(pool, now).await {
        Ok(n) => summary.activated = n,
        Err(e) => tracing::error!("scheduler: activation step failed: {}", e),
    }

    match send_due_reminders(pool, now).await {
        Ok(n) => summary.reminded = n,
        Err(e) => tracing::error!("scheduler: reminder step failed: {}", e),
    }

    match close_expired_surveys(pool, now).await {
        Ok(n) => summary.closed = n,
        Err(e) => tracing::error!("scheduler: closing step failed: {}", e),
    }

    if summary != SchedulerSummary::default() {
        tracing::info!(
            "scheduler pass: {} activated, {} reminded, {} closed",
            summary.activated,
            summary.reminded,
            summary.closed
        );
    }

    Ok(summary)
}

/// Activates draft surveys whose start date has arrived, issuing their
/// invitation tokens. Per-survey failures are skipped, not fatal.
async fn activate_due_surveys(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, AppError> {
    let due = with_retry("fetch due draft surveys", || {
        sqlx::query_as::<_, Survey>(
            "SELECT * FROM surveys WHERE status = 'draft' AND starts_at <= $1",
        )
        .bind(now)
        .fetch_all(pool)
    })
    .await?;

    let mut activated = 0;
    for survey in due {
        match issue_tokens(pool, &survey, now).await {
            Ok(invited) => {
                tracing::info!(
                    "scheduler: activated survey {} ({} invited)",
                    survey.id,
                    invited
                );
                activated += 1;
            }
            Err(e) => {
                tracing::error!("scheduler: failed to activate survey {}: {}", survey.id, e);
            }
        }
    }
    Ok(activated)
}

/// Issues one reminder per active survey once it enters its reminder window
/// (`reminder_days` before the end date), for tokens still unused. Outbound
/// delivery is handled elsewhere; this step records and logs the fact.
async fn send_due_reminders(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, AppError> {
    let due = with_retry("fetch surveys due a reminder", || {
        sqlx::query_as::<_, Survey>(
            r#"
            SELECT * FROM surveys
            WHERE status = 'active'
              AND reminder_sent_at IS NULL
              AND ends_at > $1
              AND ends_at - make_interval(days => reminder_days) <= $1
            "#,
        )
        .bind(now)
        .fetch_all(pool)
    })
    .await?;

    let mut reminded = 0;
    for survey in due {
        let pending: i64 = with_retry("count pending tokens", || {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM survey_tokens WHERE survey_id = $1 AND used = FALSE",
            )
            .bind(survey.id)
            .fetch_one(pool)
        })
        .await?;

        // Stamping the same instant twice is harmless, so the retry is safe.
        with_retry("stamp reminder", || {
            sqlx::query("UPDATE surveys SET reminder_sent_at = $2 WHERE id = $1")
                .bind(survey.id)
                .bind(now)
                .execute(pool)
        })
        .await?;

        tracing::info!(
            "scheduler: reminder for survey {} ({} respondents pending)",
            survey.id,
            pending
        );
        reminded += 1;
    }
    Ok(reminded)
}

/// Closes active surveys whose end date has passed and abandons their
/// in-progress responses. Tokens need no touch-up: validation already
/// rejects them as expired.
async fn close_expired_surveys(pool: &PgPool, now: DateTime<Utc>) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;

    let closed_ids: Vec<i64> = sqlx::query_scalar(
        "UPDATE surveys SET status = 'closed' WHERE status = 'active' AND ends_at < $1 RETURNING id",
    )
    .bind(now)
    .fetch_all(&mut *tx)
    .await?;

    if !closed_ids.is_empty() {
        sqlx::query(
            "UPDATE survey_responses SET status = $2 WHERE survey_id = ANY($1) AND status = $3",
        )
        .bind(&closed_ids)
        .bind(ResponseStatus::Abandoned.as_str())
        .bind(ResponseStatus::InProgress.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    for id in &closed_ids {
        tracing::info!("scheduler: closed expired survey {}", id);
    }
    Ok(closed_ids.len() as u64)
}
