//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - JSON API under `/api/...`
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(http::http_health))
        // Problems
        .route("/api/problems", get(http::http_list_problems))
        .route("/api/problems/:id", get(http::http_get_problem))
        // Contests
        .route("/api/contests", get(http::http_list_contests))
        .route("/api/contests/:id", get(http::http_get_contest))
        .route("/api/contest-registration", post(http::http_register))
        .route("/api/contest-registration/:id", delete(http::http_unregister))
        // Submissions
        .route("/api/submission", post(http::http_create_submission).get(http::http_list_submissions))
        .route("/api/submission/:id", get(http::http_get_submission))
        // User dashboard
        .route("/api/user/progress", get(http::http_user_progress))
        .route("/api/user/activity", get(http::http_user_activity))
        // Admin
        .route("/api/admin/problems", post(http::http_admin_create_problem))
        .route(
            "/api/admin/problems/:id",
            put(http::http_admin_update_problem).delete(http::http_admin_delete_problem),
        )
        .route("/api/admin/contests", post(http::http_admin_create_contest))
        .route(
            "/api/admin/contests/:id",
            put(http::http_admin_update_contest).delete(http::http_admin_delete_contest),
        )
        .route(
            "/api/admin/testcase",
            post(http::http_admin_create_test_case).get(http::http_admin_list_test_cases),
        )
        .route(
            "/api/admin/testcase/:id",
            get(http::http_admin_get_test_case)
                .put(http::http_admin_update_test_case)
                .delete(http::http_admin_delete_test_case),
        )
        .route("/api/admin/testcase/problem/:problem_id", get(http::http_admin_problem_test_cases))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
