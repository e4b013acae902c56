// src/routes.rs

use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{respondent, survey},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Admin surface under /api/surveys.
/// * Anonymous respondent surface under /api/surveys/token.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (Database Pool + Config).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let survey_routes = Router::new()
        .route("/", post(survey::create_survey).get(survey::list_surveys))
        .route("/{id}", get(survey::get_survey))
        .route("/{id}/activate", post(survey::activate_survey))
        .route("/{id}/close", post(survey::close_survey))
        .route("/{id}/analytics", get(survey::get_analytics))
        // Anonymous, token-gated routes. Static /token segment wins over
        // the {id} capture above.
        .route("/token/{token}", get(respondent::get_survey_by_token))
        .route("/token/{token}/response", post(respondent::save_response))
        .route("/token/{token}/submit", post(respondent::submit_response));

    Router::new()
        .nest("/api/surveys", survey_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
