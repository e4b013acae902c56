// src/models/token.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::prelude::FromRow;
use uuid::Uuid;

/// Represents the 'survey_tokens' table in the database.
///
/// A token is the single-use, time-bounded credential for taking one survey
/// anonymously. The respondent link lives here and only here; it is never
/// copied onto the response.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SurveyToken {
    pub id: i64,

    pub survey_id: i64,

    pub token: String,

    /// Internal only. Skipped during serialization so no handler can leak
    /// the identity link by returning the row.
    #[serde(skip)]
    pub respondent_id: i64,

    pub used: bool,

    pub used_at: Option<DateTime<Utc>>,

    /// Equals the survey's end date at issuance.
    pub expires_at: DateTime<Utc>,

    pub created_at: Option<DateTime<Utc>>,
}

/// Why a token was rejected, in check-priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    NotFound,
    AlreadyUsed,
    Expired,
}

/// Generates a token value: 128 bits of random entropy plus a millisecond
/// time component. Uniqueness is additionally enforced by the unique index
/// on `survey_tokens.token`.
pub fn generate_token(now: DateTime<Utc>) -> String {
    format!("{}{:x}", Uuid::new_v4().simple(), now.timestamp_millis())
}

/// Decides whether a survey may be taken with the given token.
///
/// Pure function of the lookup result and the current time; side-effect free.
/// Must run before every read or write keyed by a token. Marking the token
/// used is a separate, explicit step taken only at final submission.
pub fn validate_token(
    token: Option<&SurveyToken>,
    now: DateTime<Utc>,
) -> Result<&SurveyToken, TokenRejection> {
    let token = token.ok_or(TokenRejection::NotFound)?;
    if token.used {
        return Err(TokenRejection::AlreadyUsed);
    }
    if now > token.expires_at {
        return Err(TokenRejection::Expired);
    }
    Ok(token)
}
