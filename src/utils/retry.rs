// src/utils/retry.rs

use std::future::Future;
use std::time::Duration;

use crate::config::{DB_RETRY_ATTEMPTS, DB_RETRY_DELAY_MS};

/// Whether an error is worth retrying. Query/logic errors are not.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Runs a persistence call up to `DB_RETRY_ATTEMPTS` times with a fixed
/// delay, retrying only transient failures.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < DB_RETRY_ATTEMPTS && is_transient(&err) => {
                tracing::warn!(
                    "{} failed (attempt {}/{}), retrying in {}ms: {}",
                    op_name,
                    attempt,
                    DB_RETRY_ATTEMPTS,
                    DB_RETRY_DELAY_MS,
                    err
                );
                tokio::time::sleep(Duration::from_millis(DB_RETRY_DELAY_MS)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
