use axum::{extract::State, routing::get, Json, Router};
use pagecraft_core::store::Statement;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

/// Health check routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/ping", get(ping))
}

/// Round-trips a ping statement through the store.
async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.transactions().query(Statement::Ping).await?;

    Ok(Json(json!({
        "status": "ok",
        "database": "connected",
        "subscribers": state.event_bus().subscriber_count(),
    })))
}

async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
