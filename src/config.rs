// src/config.rs

use dotenvy::dotenv;
use std::env;

/// Number of attempts for a retried persistence call (first try included).
pub const DB_RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between retried persistence calls, in milliseconds.
pub const DB_RETRY_DELAY_MS: u64 = 200;

/// Default rating scale bounds when a question does not set its own.
pub const DEFAULT_SCALE_MIN: i32 = 1;
pub const DEFAULT_SCALE_MAX: i32 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub port: u16,
    /// Seconds between scheduler passes (activation / reminders / closing).
    pub scheduler_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let scheduler_interval_secs = env::var("SCHEDULER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Self {
            database_url,
            rust_log,
            port,
            scheduler_interval_secs,
        }
    }
}
