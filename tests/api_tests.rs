// tests/api_tests.rs
//
// These tests need a running Postgres reachable through DATABASE_URL, the
// same way the service itself does. They are ignored by default; run them
// with `cargo test -- --ignored` against a disposable database.

use chrono::{Duration, Utc};
use pulse_backend::{config::Config, routes, scheduler, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Spawns the app on a random port for testing.
/// Returns the base URL and a pool for direct seeding/inspection.
async fn spawn_app() -> (String, PgPool) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        rust_log: "error".to_string(),
        port: 0,
        scheduler_interval_secs: 3600,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

fn survey_body(invitees: &[i64], ends_in_days: i64) -> serde_json::Value {
    serde_json::json!({
        "title": "Monthly team pulse",
        "questions": [
            {"id": "q1", "text": "Rate the kitchen", "type": "rating"},
            {"id": "q2", "text": "Any comments?", "type": "text"},
        ],
        "invitees": invitees,
        "starts_at": (Utc::now() - Duration::hours(1)).to_rfc3339(),
        "ends_at": (Utc::now() + Duration::days(ends_in_days)).to_rfc3339(),
    })
}

/// Creates and activates a survey from a prepared body, returning its id
/// and issued tokens.
async fn activate_from_body(
    address: &str,
    pool: &PgPool,
    client: &reqwest::Client,
    body: serde_json::Value,
) -> (i64, Vec<String>) {
    let response = client
        .post(format!("{}/api/surveys", address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let survey: serde_json::Value = response.json().await.unwrap();
    let survey_id = survey["id"].as_i64().unwrap();

    let response = client
        .post(format!("{}/api/surveys/{}/activate", address, survey_id))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 200);

    let tokens: Vec<String> = sqlx::query_scalar(
        "SELECT token FROM survey_tokens WHERE survey_id = $1 ORDER BY respondent_id",
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await
    .unwrap();

    (survey_id, tokens)
}

/// Creates a survey through the API, activates it, and returns
/// (survey_id, issued tokens in respondent order).
async fn create_active_survey(
    address: &str,
    pool: &PgPool,
    client: &reqwest::Client,
    invitees: &[i64],
) -> (i64, Vec<String>) {
    let (survey_id, tokens) =
        activate_from_body(address, pool, client, survey_body(invitees, 7)).await;
    assert_eq!(tokens.len(), invitees.len());
    (survey_id, tokens)
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn health_check_404() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn create_survey_fails_validation() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // No questions.
    let response = client
        .post(format!("{}/api/surveys", address))
        .json(&serde_json::json!({
            "title": "Empty",
            "questions": [],
            "starts_at": Utc::now().to_rfc3339(),
            "ends_at": (Utc::now() + Duration::days(1)).to_rfc3339(),
        }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn anonymous_response_lifecycle() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (_survey_id, tokens) = create_active_survey(&address, &pool, &client, &[101, 102]).await;
    let token = &tokens[0];

    // The respondent can fetch the survey by token; no response yet.
    let response = client
        .get(format!("{}/api/surveys/token/{}", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["response"].is_null());
    assert!(body["survey"].get("invitees").is_none());

    // First partial save: one of two questions answered.
    let response = client
        .post(format!("{}/api/surveys/token/{}/response", address, token))
        .json(&serde_json::json!({
            "demographics": {"department": "Kitchen", "position": "Cook"},
            "answers": [{"question_id": "q1", "value": 4}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["completion_percentage"], 50);

    // Replacing q1 keeps the answer count constant; adding q2 completes.
    let response = client
        .post(format!("{}/api/surveys/token/{}/response", address, token))
        .json(&serde_json::json!({
            "answers": [
                {"question_id": "q1", "value": 8},
                {"question_id": "q2", "value": "all good"},
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["answers"].as_array().unwrap().len(), 2);
    assert_eq!(body["answers"][0]["value"], 8);
    assert_eq!(body["completion_percentage"], 100);

    // Finalize.
    let response = client
        .post(format!("{}/api/surveys/token/{}/submit", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "completed");
    assert!(body["time_spent_seconds"].is_i64());

    // Finalize is one-way.
    let response = client
        .post(format!("{}/api/surveys/token/{}/submit", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Further saves are rejected (multiple responses not allowed).
    let response = client
        .post(format!("{}/api/surveys/token/{}/response", address, token))
        .json(&serde_json::json!({
            "answers": [{"question_id": "q1", "value": 2}],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // The token is spent.
    let response = client
        .get(format!("{}/api/surveys/token/{}", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // An unknown token is a 404.
    let response = client
        .get(format!("{}/api/surveys/token/nope", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn concurrent_first_saves_share_one_response() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (survey_id, tokens) = create_active_survey(&address, &pool, &client, &[501]).await;
    let token = &tokens[0];

    let url = format!("{}/api/surveys/token/{}/response", address, token);
    let body = serde_json::json!({"answers": [{"question_id": "q1", "value": 5}]});

    // Neither racer may see a 500; the loser of the insert race merges into
    // the winner's row.
    let (a, b) = tokio::join!(
        client.post(&url).json(&body).send(),
        client.post(&url).json(&body).send(),
    );
    assert_eq!(a.unwrap().status().as_u16(), 200);
    assert_eq!(b.unwrap().status().as_u16(), 200);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM survey_responses WHERE survey_id = $1")
            .bind(survey_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn second_submit_leaves_persisted_record_unchanged() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (_survey_id, tokens) = create_active_survey(&address, &pool, &client, &[601]).await;
    let token = &tokens[0];

    let response = client
        .post(format!("{}/api/surveys/token/{}/response", address, token))
        .json(&serde_json::json!({"answers": [{"question_id": "q1", "value": 9}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{}/api/surveys/token/{}/submit", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let before: (String, Option<chrono::DateTime<Utc>>, Option<i64>, serde_json::Value) =
        sqlx::query_as(
            "SELECT status, completed_at, time_spent_seconds, answers
             FROM survey_responses WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/surveys/token/{}/submit", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let after: (String, Option<chrono::DateTime<Utc>>, Option<i64>, serde_json::Value) =
        sqlx::query_as(
            "SELECT status, completed_at, time_spent_seconds, answers
             FROM survey_responses WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn closed_survey_rejects_lifecycle_changes() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (survey_id, tokens) = create_active_survey(&address, &pool, &client, &[701]).await;

    let response = client
        .post(format!("{}/api/surveys/{}/close", address, survey_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Closing again and re-activating are both wrong-lifecycle operations.
    let response = client
        .post(format!("{}/api/surveys/{}/close", address, survey_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    let response = client
        .post(format!("{}/api/surveys/{}/activate", address, survey_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // An unexpired token cannot write to a closed survey either.
    let response = client
        .post(format!(
            "{}/api/surveys/token/{}/response",
            address, &tokens[0]
        ))
        .json(&serde_json::json!({"answers": [{"question_id": "q1", "value": 3}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn spent_token_rejected_when_multiple_responses_allowed() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let mut body = survey_body(&[801], 7);
    body["allow_multiple_responses"] = serde_json::json!(true);
    let (_survey_id, tokens) = activate_from_body(&address, &pool, &client, body).await;
    let token = &tokens[0];

    let response = client
        .post(format!("{}/api/surveys/token/{}/response", address, token))
        .json(&serde_json::json!({"answers": [{"question_id": "q1", "value": 7}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{}/api/surveys/token/{}/submit", address, token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Multiple responses are a token-issuance concern: the spent token is
    // rejected as used, not as a closed response.
    let response = client
        .post(format!("{}/api/surveys/token/{}/response", address, token))
        .json(&serde_json::json!({"answers": [{"question_id": "q1", "value": 2}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("used"));
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn analytics_over_completed_responses() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (survey_id, tokens) =
        create_active_survey(&address, &pool, &client, &[201, 202, 203]).await;

    for (token, rating, department) in [
        (&tokens[0], 8, "Kitchen"),
        (&tokens[1], 6, "Kitchen"),
        (&tokens[2], 10, "Front of House"),
    ] {
        let response = client
            .post(format!("{}/api/surveys/token/{}/response", address, token))
            .json(&serde_json::json!({
                "demographics": {"department": department},
                "answers": [{"question_id": "q1", "value": rating}],
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let response = client
            .post(format!("{}/api/surveys/token/{}/submit", address, token))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    let response = client
        .get(format!("{}/api/surveys/{}/analytics", address, survey_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let report: serde_json::Value = response.json().await.unwrap();

    assert_eq!(report["total_responses"], 3);
    assert_eq!(report["overall_score"], 8.0);
    let q1 = &report["questions"][0];
    assert_eq!(q1["total_responses"], 3);
    assert_eq!(q1["average_rating"], 8.0);
    assert_eq!(q1["rating_distribution"][7], 1);
    assert_eq!(q1["rating_distribution"][5], 1);
    assert_eq!(q1["rating_distribution"][9], 1);
    assert_eq!(report["demographics"]["departments"]["Kitchen"], 2);

    // Demographic filter narrows the set.
    let response = client
        .get(format!(
            "{}/api/surveys/{}/analytics?department=Kitchen",
            address, survey_id
        ))
        .send()
        .await
        .unwrap();
    let report: serde_json::Value = response.json().await.unwrap();
    assert_eq!(report["total_responses"], 2);
    assert_eq!(report["questions"][0]["average_rating"], 7.0);
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn expired_token_is_rejected() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let (survey_id, tokens) = create_active_survey(&address, &pool, &client, &[301]).await;

    // Force the token past its expiry.
    sqlx::query("UPDATE survey_tokens SET expires_at = $2 WHERE survey_id = $1")
        .bind(survey_id)
        .bind(Utc::now() - Duration::days(1))
        .execute(&pool)
        .await
        .unwrap();

    let response = client
        .get(format!("{}/api/surveys/token/{}", address, &tokens[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("expired"));
}

#[tokio::test]
#[ignore = "requires Postgres via DATABASE_URL"]
async fn scheduler_activates_and_closes_surveys() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Draft survey whose window has already started.
    let response = client
        .post(format!("{}/api/surveys", address))
        .json(&survey_body(&[401, 402], 2))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let survey: serde_json::Value = response.json().await.unwrap();
    let survey_id = survey["id"].as_i64().unwrap();

    let summary = scheduler::run_scheduler_pass(&pool, Utc::now()).await.unwrap();
    assert!(summary.activated >= 1);

    let status: String = sqlx::query_scalar("SELECT status FROM surveys WHERE id = $1")
        .bind(survey_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "active");

    let token_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM survey_tokens WHERE survey_id = $1")
            .bind(survey_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(token_count, 2);

    // A pass after the end date closes it.
    let summary = scheduler::run_scheduler_pass(&pool, Utc::now() + Duration::days(3))
        .await
        .unwrap();
    assert!(summary.closed >= 1);

    let status: String = sqlx::query_scalar("SELECT status FROM surveys WHERE id = $1")
        .bind(survey_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "closed");
}
