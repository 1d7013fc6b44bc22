use axum::{
    extract::State,
    routing::{patch, post},
    Json, Router,
};
use pagecraft_core::model::{ElementChanges, ElementRecord, PageChanges, PageRecord};
use pagecraft_core::service::{ElementDraft, PageDraft};
use serde::Serialize;

use crate::auth::AuthActor;
use crate::error::ApiResult;
use crate::extract::{AppJson, AppPath};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user}/projects/{project}/pages", post(create_page))
        .route(
            "/users/{user}/projects/{project}/pages/{page}",
            patch(update_page).delete(delete_page),
        )
        .route(
            "/users/{user}/projects/{project}/pages/{page}/elements",
            post(create_element),
        )
        .route(
            "/users/{user}/projects/{project}/pages/{page}/elements/{element}",
            patch(update_element).delete(delete_element),
        )
}

#[derive(Debug, Serialize)]
struct PageResponse {
    status: &'static str,
    page: PageRecord,
}

#[derive(Debug, Serialize)]
struct ElementResponse {
    status: &'static str,
    element: ElementRecord,
}

fn page(status: &'static str, page: PageRecord) -> Json<PageResponse> {
    Json(PageResponse { status, page })
}

fn element(status: &'static str, element: ElementRecord) -> Json<ElementResponse> {
    Json(ElementResponse { status, element })
}

async fn create_page(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id)): AppPath<(i64, i64)>,
    AppJson(draft): AppJson<PageDraft>,
) -> ApiResult<Json<PageResponse>> {
    let created = state
        .pages()
        .create_page(&actor, user_id, project_id, draft)
        .await?;
    Ok(page("created", created))
}

async fn update_page(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id, page_id)): AppPath<(i64, i64, i64)>,
    AppJson(changes): AppJson<PageChanges>,
) -> ApiResult<Json<PageResponse>> {
    let updated = state
        .pages()
        .update_page(&actor, user_id, project_id, page_id, changes)
        .await?;
    Ok(page("updated", updated))
}

async fn delete_page(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id, page_id)): AppPath<(i64, i64, i64)>,
) -> ApiResult<Json<PageResponse>> {
    let deleted = state
        .pages()
        .delete_page(&actor, user_id, project_id, page_id)
        .await?;
    Ok(page("deleted", deleted))
}

async fn create_element(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id, page_id)): AppPath<(i64, i64, i64)>,
    AppJson(draft): AppJson<ElementDraft>,
) -> ApiResult<Json<ElementResponse>> {
    let created = state
        .pages()
        .create_element(&actor, user_id, project_id, page_id, draft)
        .await?;
    Ok(element("created", created))
}

async fn update_element(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id, page_id, element_id)): AppPath<(i64, i64, i64, i64)>,
    AppJson(changes): AppJson<ElementChanges>,
) -> ApiResult<Json<ElementResponse>> {
    let updated = state
        .pages()
        .update_element(&actor, user_id, project_id, page_id, element_id, changes)
        .await?;
    Ok(element("updated", updated))
}

async fn delete_element(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id, page_id, element_id)): AppPath<(i64, i64, i64, i64)>,
) -> ApiResult<Json<ElementResponse>> {
    let deleted = state
        .pages()
        .delete_element(&actor, user_id, project_id, page_id, element_id)
        .await?;
    Ok(element("deleted", deleted))
}
