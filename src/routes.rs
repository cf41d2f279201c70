// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, coins, exams, portal, profile, webhook},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * `/auth` and `/portal` are public; portal calls carry their own session token.
/// * `/api` requires a Bearer JWT.
/// * `/webhook` is authenticated by the gateway signature.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
    let cors = match HeaderValue::from_str(state.config.base_url.trim_end_matches('/')) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!("BASE_URL is not a valid origin, CORS disabled: {}", e);
            cors
        }
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/verify", post(auth::verify));

    let portal_routes = Router::new()
        .route("/login", post(portal::login))
        .route("/verify", post(portal::verify))
        .route("/logout", post(portal::logout))
        .route("/init", post(portal::init_attempt))
        .route("/start", post(portal::start_attempt))
        .route("/submit", post(portal::submit_answers));

    let api_routes = Router::new()
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/coins/purchase", post(coins::purchase))
        .route("/coins/verify", post(coins::verify))
        .route("/orders", get(coins::list_orders))
        .route("/tests", get(exams::list_tests).post(exams::create_test))
        .route("/tests/{id}", get(exams::get_test))
        .route("/tests/{id}/definition", put(exams::set_definition))
        .route("/tests/{id}/fund", post(exams::fund_test))
        .route("/tests/{id}/candidates", post(exams::assign_candidates))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/auth", auth_routes)
        .nest("/portal", portal_routes)
        .nest("/api", api_routes)
        .route("/webhook/razorpay", post(webhook::razorpay))
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
