// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, admin, tests, attempts).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, config, clock).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        );

    let admin_routes = Router::new()
        .route("/tests", get(admin::list_tests).post(admin::create_test))
        .route(
            "/tests/{id}",
            get(admin::get_test)
                .put(admin::update_test)
                .delete(admin::delete_test),
        )
        .route("/tests/{id}/questions", put(admin::replace_questions))
        .route("/tests/{id}/toggle", post(admin::toggle_test))
        .route("/tests/{id}/results", get(admin::test_results))
        // Auth runs first, then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let test_routes = Router::new()
        .route("/", get(attempt::list_active_tests))
        .route("/{id}/attempts", post(attempt::start_attempt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let attempt_routes = Router::new()
        .route("/", get(attempt::list_history))
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", put(attempt::select_answer))
        .route("/{id}/submit", post(attempt::submit_attempt))
        .route("/{id}/expire", post(attempt::expire_attempt))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/tests", test_routes)
        .nest("/api/attempts", attempt_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
