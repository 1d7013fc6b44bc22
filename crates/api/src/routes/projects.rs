use axum::{
    extract::State,
    routing::{get, patch, post, put},
    Json, Router,
};
use pagecraft_core::model::{PageRecord, Project, ProjectChanges, ProjectRecord, ThumbnailSize};
use pagecraft_core::service::{CreatedProject, ProjectDraft, ProjectOwner};
use serde::{Deserialize, Serialize};

use crate::auth::AuthActor;
use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath};
use crate::state::AppState;

/// Path segment naming the caller's own token identity.
const TOKEN_OWNER: &str = "me";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{user}/projects", post(create_project))
        .route(
            "/users/{user}/projects/{project}",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/users/{user}/projects/{project}/remixes", put(remix_project))
        .route("/users/{user}/projects/{project}/feature", patch(feature_project))
}

/// `{"400": .., "1024": ..}`; an empty string clears that size.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ThumbnailBody {
    #[serde(rename = "400")]
    small: Option<String>,
    #[serde(rename = "1024")]
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateProjectBody {
    title: String,
    version: String,
    #[serde(default)]
    thumbnail: ThumbnailBody,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateProjectBody {
    title: Option<String>,
    #[serde(default)]
    thumbnail: ThumbnailBody,
}

#[derive(Debug, Deserialize)]
struct FeatureBody {
    featured: bool,
}

#[derive(Debug, Serialize)]
struct ProjectResponse {
    status: &'static str,
    project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<PageRecord>,
}

impl ProjectResponse {
    fn new(status: &'static str, project: ProjectRecord) -> Json<Self> {
        Json(Self {
            status,
            project: project.into(),
            page: None,
        })
    }

    fn created(created: CreatedProject) -> Json<Self> {
        Json(Self {
            status: "created",
            project: created.project.into(),
            page: Some(created.page),
        })
    }
}

/// `me` or a numeric user id.
fn parse_owner(segment: &str) -> ApiResult<ProjectOwner> {
    if segment == TOKEN_OWNER {
        return Ok(ProjectOwner::Token);
    }
    segment
        .parse()
        .map(ProjectOwner::Existing)
        .map_err(|_| ApiError::BadRequest(format!("invalid user id {segment:?}")))
}

async fn create_project(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath(user): AppPath<String>,
    AppJson(body): AppJson<CreateProjectBody>,
) -> ApiResult<Json<ProjectResponse>> {
    let owner = parse_owner(&user)?;
    let draft = ProjectDraft {
        title: body.title,
        version: body.version,
        thumbnail_400: body.thumbnail.small,
        thumbnail_1024: body.thumbnail.large,
    };
    let created = state.projects().create(&actor, owner, draft).await?;
    Ok(ProjectResponse::created(created))
}

async fn remix_project(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user, source_id)): AppPath<(String, i64)>,
) -> ApiResult<Json<ProjectResponse>> {
    let owner = parse_owner(&user)?;
    let created = state.projects().remix(&actor, owner, source_id).await?;
    Ok(ProjectResponse::created(created))
}

async fn get_project(
    State(state): State<AppState>,
    AppPath((user_id, project_id)): AppPath<(i64, i64)>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state.projects().get(user_id, project_id).await?;
    Ok(ProjectResponse::new("success", project))
}

async fn update_project(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id)): AppPath<(i64, i64)>,
    AppJson(body): AppJson<UpdateProjectBody>,
) -> ApiResult<Json<ProjectResponse>> {
    let mut changes = ProjectChanges {
        title: body.title,
        ..Default::default()
    };
    if let Some(small) = body.thumbnail.small {
        changes.set_thumbnail(ThumbnailSize::Small, small);
    }
    if let Some(large) = body.thumbnail.large {
        changes.set_thumbnail(ThumbnailSize::Large, large);
    }

    let project = state
        .projects()
        .update(&actor, user_id, project_id, changes)
        .await?;
    Ok(ProjectResponse::new("updated", project))
}

async fn feature_project(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id)): AppPath<(i64, i64)>,
    AppJson(body): AppJson<FeatureBody>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state
        .projects()
        .set_featured(&actor, user_id, project_id, body.featured)
        .await?;
    Ok(ProjectResponse::new("updated", project))
}

async fn delete_project(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    AppPath((user_id, project_id)): AppPath<(i64, i64)>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state.projects().delete(&actor, user_id, project_id).await?;
    Ok(ProjectResponse::new("deleted", project))
}
