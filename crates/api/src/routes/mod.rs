pub mod health;
pub mod pages;
pub mod projects;

use axum::Router;

use crate::state::AppState;

/// Assemble the full router with all route groups.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(projects::routes())
        .merge(pages::routes())
        .with_state(state)
}
