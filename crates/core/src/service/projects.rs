//! Project write service.
//!
//! Each operation resolves its prerequisites (user, project, permission) first and
//! then runs its writes through one transaction. Missing rows are reported as
//! [`ServiceError::NotFound`]; any store failure is reported as
//! [`ServiceError::Store`] regardless of which statement failed.

use tracing::info;

use crate::error::{Missing, ServiceError, ServiceResult};
use crate::model::{
    Actor, NewPage, NewProject, OrderingKey, PageRecord, ProjectChanges, ProjectRecord, UserRecord,
};
use crate::store::{statement, step, RowSet, Statement, TransactionCoordinator};

/// Whose project is being created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOwner {
    /// An existing user, by id.
    Existing(i64),
    /// The caller's own token identity, created inside the transaction if absent.
    Token,
}

/// Caller-supplied fields of a new project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDraft {
    pub title: String,
    pub version: String,
    pub thumbnail_400: Option<String>,
    pub thumbnail_1024: Option<String>,
}

/// A created project and its initial page.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedProject {
    pub project: ProjectRecord,
    pub page: PageRecord,
}

#[derive(Clone)]
pub struct ProjectService {
    tx: TransactionCoordinator,
}

impl ProjectService {
    pub fn new(tx: TransactionCoordinator) -> Self {
        Self { tx }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        owner: ProjectOwner,
        draft: ProjectDraft,
    ) -> ServiceResult<CreatedProject> {
        if let ProjectOwner::Existing(user_id) = owner {
            self.require_user(user_id).await?;
            if !actor.owns(user_id) {
                return Err(ServiceError::PermissionDenied);
            }
        }
        self.insert(actor, owner, draft, None).await
    }

    /// Create a new project for `owner` whose lineage points at `source_id`.
    pub async fn remix(
        &self,
        actor: &Actor,
        owner: ProjectOwner,
        source_id: i64,
    ) -> ServiceResult<CreatedProject> {
        if let ProjectOwner::Existing(user_id) = owner {
            self.require_user(user_id).await?;
        }
        let source = self
            .tx
            .query(Statement::FindProjectById {
                project_id: source_id,
            })
            .await?
            .project()
            .cloned()
            .ok_or(ServiceError::NotFound(Missing::Project))?;
        if let ProjectOwner::Existing(user_id) = owner {
            if !actor.owns(user_id) {
                return Err(ServiceError::PermissionDenied);
            }
        }

        let draft = ProjectDraft {
            title: source.title,
            version: source.version,
            thumbnail_400: source.thumbnail_400,
            thumbnail_1024: source.thumbnail_1024,
        };
        self.insert(actor, owner, draft, Some(source.id)).await
    }

    /// Actor lookup (and creation), project insert and initial page insert, as
    /// one transaction.
    async fn insert(
        &self,
        actor: &Actor,
        owner: ProjectOwner,
        draft: ProjectDraft,
        remixed_from: Option<i64>,
    ) -> ServiceResult<CreatedProject> {
        let lookup = match owner {
            ProjectOwner::Existing(user_id) => Statement::FindUser { user_id },
            ProjectOwner::Token => Statement::FindUserByExternalId {
                external_id: actor.external_id.clone(),
            },
        };
        let new_user = actor.as_new_user();

        let results = self
            .tx
            .run(vec![
                statement(lookup),
                step(move |prev| {
                    Ok(match (owner, prev[0].user()) {
                        (ProjectOwner::Token, None) => Some(Statement::InsertUser(new_user)),
                        _ => None,
                    })
                }),
                step(move |prev| {
                    Ok(resolved_user(prev).map(|user| {
                        Statement::InsertProject(NewProject {
                            user_id: user.id,
                            remixed_from,
                            version: draft.version,
                            title: draft.title,
                            language: user.language.clone(),
                            thumbnail_400: draft.thumbnail_400,
                            thumbnail_1024: draft.thumbnail_1024,
                        })
                    }))
                }),
                step(|prev| {
                    Ok(prev[2].project().map(|project| {
                        Statement::InsertPage(NewPage {
                            project_id: project.id,
                            position: OrderingKey::ORIGIN,
                            styles: serde_json::json!({}),
                        })
                    }))
                }),
            ])
            .await?;

        // The project insert is skipped only when the owner row vanished between
        // the prerequisite check and the lookup step.
        let project = results[2]
            .project()
            .cloned()
            .ok_or(ServiceError::NotFound(Missing::User))?;
        let page = results[3]
            .page()
            .cloned()
            .ok_or(ServiceError::NotFound(Missing::Page))?;
        info!(
            project_id = project.id,
            user_id = project.user_id,
            remixed_from = ?project.remixed_from,
            "project created"
        );
        Ok(CreatedProject { project, page })
    }

    pub async fn get(&self, user_id: i64, project_id: i64) -> ServiceResult<ProjectRecord> {
        self.require_project(user_id, project_id).await
    }

    /// Apply title/thumbnail changes. Omitted fields are left untouched; an empty
    /// thumbnail clears that variant.
    pub async fn update(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        changes: ProjectChanges,
    ) -> ServiceResult<ProjectRecord> {
        let project = self.require_project(user_id, project_id).await?;
        if !actor.owns(project.user_id) {
            return Err(ServiceError::PermissionDenied);
        }
        let changes = ProjectChanges {
            featured: None,
            ..changes
        };
        if changes.is_empty() {
            return Ok(project);
        }
        self.write_project(project_id, changes).await
    }

    /// Moderators only.
    pub async fn set_featured(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        featured: bool,
    ) -> ServiceResult<ProjectRecord> {
        self.require_project(user_id, project_id).await?;
        if !actor.moderator {
            return Err(ServiceError::PermissionDenied);
        }
        let project = self
            .write_project(
                project_id,
                ProjectChanges {
                    featured: Some(featured),
                    ..Default::default()
                },
            )
            .await?;
        info!(project_id, featured, "project featured flag set");
        Ok(project)
    }

    /// Pages and elements go with the project through the store's cascades.
    pub async fn delete(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
    ) -> ServiceResult<ProjectRecord> {
        let project = self.require_project(user_id, project_id).await?;
        if !actor.can_delete(project.user_id) {
            return Err(ServiceError::PermissionDenied);
        }
        let results = self
            .tx
            .run(vec![statement(Statement::DeleteProject { project_id })])
            .await?;
        let deleted = first_project(&results)?;
        info!(project_id, "project deleted");
        Ok(deleted)
    }

    async fn write_project(
        &self,
        project_id: i64,
        changes: ProjectChanges,
    ) -> ServiceResult<ProjectRecord> {
        let results = self
            .tx
            .run(vec![statement(Statement::UpdateProject {
                project_id,
                changes,
            })])
            .await?;
        first_project(&results)
    }

    async fn require_user(&self, user_id: i64) -> ServiceResult<UserRecord> {
        self.tx
            .query(Statement::FindUser { user_id })
            .await?
            .user()
            .cloned()
            .ok_or(ServiceError::NotFound(Missing::User))
    }

    async fn require_project(&self, user_id: i64, project_id: i64) -> ServiceResult<ProjectRecord> {
        self.require_user(user_id).await?;
        self.tx
            .query(Statement::FindProject {
                user_id,
                project_id,
            })
            .await?
            .project()
            .cloned()
            .ok_or(ServiceError::NotFound(Missing::Project))
    }
}

/// The user found by the lookup step or created by the step after it.
fn resolved_user(prev: &[RowSet]) -> Option<&UserRecord> {
    prev[0].user().or_else(|| prev[1].user())
}

fn first_project(results: &[RowSet]) -> ServiceResult<ProjectRecord> {
    results
        .first()
        .and_then(RowSet::project)
        .cloned()
        .ok_or(ServiceError::NotFound(Missing::Project))
}
