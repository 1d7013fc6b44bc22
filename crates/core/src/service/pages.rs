//! Page and element writes.
//!
//! Every successful write publishes one [`StructuralChange`] after its transaction
//! commits, carrying the page's position as of the commit. Failed writes publish
//! nothing.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Missing, ServiceError, ServiceResult};
use crate::events::{ChangeKind, EventBus, StructuralChange};
use crate::model::{
    Actor, ElementChanges, ElementRecord, NewElement, NewPage, OrderingKey, PageChanges,
    PageRecord, ProjectRecord,
};
use crate::store::{statement, step, RowSet, Statement, TransactionCoordinator};

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageDraft {
    pub x: i32,
    pub y: i32,
    #[serde(default = "empty_object")]
    pub styles: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ElementDraft {
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default = "empty_object")]
    pub attributes: Value,
    #[serde(default = "empty_object")]
    pub styles: Value,
}

#[derive(Clone)]
pub struct PageService {
    tx: TransactionCoordinator,
    bus: EventBus,
}

impl PageService {
    pub fn new(tx: TransactionCoordinator, bus: EventBus) -> Self {
        Self { tx, bus }
    }

    pub async fn create_page(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        draft: PageDraft,
    ) -> ServiceResult<PageRecord> {
        let project = self.writable_project(actor, user_id, project_id).await?;
        let results = self
            .tx
            .run(vec![statement(Statement::InsertPage(NewPage {
                project_id,
                position: OrderingKey::new(draft.x, draft.y),
                styles: draft.styles,
            }))])
            .await?;
        let page = page_at(&results, 0)?;
        self.announce(&project, &page, ChangeKind::PageCreated).await;
        Ok(page)
    }

    /// A change of `x` or `y` is announced as a move from the old position.
    pub async fn update_page(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        page_id: i64,
        changes: PageChanges,
    ) -> ServiceResult<PageRecord> {
        let project = self.writable_project(actor, user_id, project_id).await?;
        let results = self
            .tx
            .run(vec![
                statement(Statement::FindPage {
                    project_id,
                    page_id,
                }),
                step(move |prev| {
                    Ok(prev[0].page().map(|_| Statement::UpdatePage {
                        project_id,
                        page_id,
                        changes,
                    }))
                }),
            ])
            .await?;
        let before = page_at(&results, 0)?;
        let page = page_at(&results, 1)?;

        let kind = if before.position() != page.position() {
            ChangeKind::PageMoved {
                from: before.position(),
            }
        } else {
            ChangeKind::PageUpdated
        };
        self.announce(&project, &page, kind).await;
        Ok(page)
    }

    pub async fn delete_page(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        page_id: i64,
    ) -> ServiceResult<PageRecord> {
        let project = self.writable_project(actor, user_id, project_id).await?;
        let results = self
            .tx
            .run(vec![statement(Statement::DeletePage {
                project_id,
                page_id,
            })])
            .await?;
        let page = page_at(&results, 0)?;
        self.announce(&project, &page, ChangeKind::PageDeleted).await;
        Ok(page)
    }

    pub async fn create_element(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        page_id: i64,
        draft: ElementDraft,
    ) -> ServiceResult<ElementRecord> {
        let project = self.writable_project(actor, user_id, project_id).await?;
        let results = self
            .tx
            .run(vec![
                find_page(project_id, page_id),
                step(move |prev| {
                    Ok(prev[0].page().map(|page| {
                        Statement::InsertElement(NewElement {
                            page_id: page.id,
                            element_type: draft.element_type,
                            attributes: draft.attributes,
                            styles: draft.styles,
                        })
                    }))
                }),
            ])
            .await?;
        let (page, element) = element_at(&results)?;
        self.announce(
            &project,
            &page,
            ChangeKind::ElementCreated {
                element_id: element.id,
            },
        )
        .await;
        Ok(element)
    }

    pub async fn update_element(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        page_id: i64,
        element_id: i64,
        changes: ElementChanges,
    ) -> ServiceResult<ElementRecord> {
        let project = self.writable_project(actor, user_id, project_id).await?;
        let results = self
            .tx
            .run(vec![
                find_page(project_id, page_id),
                step(move |prev| {
                    Ok(prev[0].page().map(|_| Statement::UpdateElement {
                        page_id,
                        element_id,
                        changes,
                    }))
                }),
            ])
            .await?;
        let (page, element) = element_at(&results)?;
        self.announce(&project, &page, ChangeKind::ElementUpdated { element_id })
            .await;
        Ok(element)
    }

    pub async fn delete_element(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
        page_id: i64,
        element_id: i64,
    ) -> ServiceResult<ElementRecord> {
        let project = self.writable_project(actor, user_id, project_id).await?;
        let results = self
            .tx
            .run(vec![
                find_page(project_id, page_id),
                step(move |prev| {
                    Ok(prev[0].page().map(|_| Statement::DeleteElement {
                        page_id,
                        element_id,
                    }))
                }),
            ])
            .await?;
        let (page, element) = element_at(&results)?;
        self.announce(&project, &page, ChangeKind::ElementDeleted { element_id })
            .await;
        Ok(element)
    }

    async fn writable_project(
        &self,
        actor: &Actor,
        user_id: i64,
        project_id: i64,
    ) -> ServiceResult<ProjectRecord> {
        self.tx
            .query(Statement::FindUser { user_id })
            .await?
            .user()
            .ok_or(ServiceError::NotFound(Missing::User))?;
        let project = self
            .tx
            .query(Statement::FindProject {
                user_id,
                project_id,
            })
            .await?
            .project()
            .cloned()
            .ok_or(ServiceError::NotFound(Missing::Project))?;
        if !actor.owns(project.user_id) {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(project)
    }

    async fn announce(&self, project: &ProjectRecord, page: &PageRecord, kind: ChangeKind) {
        let change = StructuralChange {
            project_id: project.id,
            owner_id: project.user_id,
            page_id: page.id,
            key: page.position(),
            kind,
        };
        let delivered = self.bus.publish(change).await;
        debug!(project_id = project.id, page_id = page.id, delivered, "structural change published");
    }
}

fn find_page(project_id: i64, page_id: i64) -> crate::store::Step {
    statement(Statement::FindPage {
        project_id,
        page_id,
    })
}

fn page_at(results: &[RowSet], index: usize) -> ServiceResult<PageRecord> {
    results
        .get(index)
        .and_then(RowSet::page)
        .cloned()
        .ok_or(ServiceError::NotFound(Missing::Page))
}

/// The page found by the first step and the element touched by the second.
fn element_at(results: &[RowSet]) -> ServiceResult<(PageRecord, ElementRecord)> {
    let page = page_at(results, 0)?;
    let element = results
        .get(1)
        .and_then(RowSet::element)
        .cloned()
        .ok_or(ServiceError::NotFound(Missing::Element))?;
    Ok((page, element))
}
