//! HTTP surface of the pagecraft backend.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// The full application: routes plus the middleware stack.
pub fn app(state: AppState) -> Router {
    routes::build_router(state)
        .layer(middleware::body_limit_layer())
        .layer(middleware::request_tracing::trace_layer())
        .layer(middleware::cors::cors_layer())
}
