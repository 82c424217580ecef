pub mod auth;
pub mod error;
mod extract;
pub mod rate_limit;
mod reports;
pub mod validation;
mod visitors;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, Uri,
    },
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::CorsConfig;
use crate::AppState;
use error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Login gets its own stricter tier on top of the global one
    let auth_routes = Router::new()
        .route(
            "/login",
            post(auth::login).layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit::rate_limit_auth,
            )),
        )
        .route("/register", post(auth::register))
        .route("/profile", get(auth::profile));

    let visitor_routes = Router::new()
        .route("/", post(visitors::create_visit).get(visitors::list_visits))
        .route("/active", get(visitors::list_active))
        .route("/:id", get(visitors::get_visit))
        .route("/:id/checkout", patch(visitors::check_out_visit))
        .route("/:id/cancel", patch(visitors::cancel_visit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let report_routes = Router::new()
        .route("/visits", get(reports::visits_report))
        .route("/users", get(reports::users_report))
        .route("/dashboard", get(reports::dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(health_check))
        .route("/api", get(api_index))
        .nest("/api/auth", auth_routes)
        .nest("/api/visitors", visitor_routes)
        .nest("/api/reports", report_routes)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ))
        .layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(&config.allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(
                origin = %config.allowed_origin,
                "Invalid CORS origin, cross-origin requests will be refused"
            );
            layer
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Visitor register is running",
        "timestamp": crate::db::format_timestamp(&crate::db::now()),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn api_index() -> Json<Value> {
    Json(json!({
        "message": "Visitor register API",
        "version": env!("CARGO_PKG_VERSION"),
        "documentation": "/api/health",
    }))
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(format!("Endpoint not found: {} {}", method, uri.path()))
}
