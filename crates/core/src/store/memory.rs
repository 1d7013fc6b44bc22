//! In-process store with PostgreSQL-like transaction semantics.
//!
//! Used by the test suites and for running the API without a database. An open
//! transaction holds the table lock until COMMIT/ROLLBACK, so transactions are
//! serialized; ROLLBACK (or dropping a connection mid-transaction) restores the
//! snapshot taken at BEGIN. Ids come from a sequence that, as in PostgreSQL, is
//! not rolled back.
//!
//! Faults can be injected one-shot on connection checkout or on any statement
//! kind; an injected statement fault reports SQLSTATE `42P01` unless another
//! code is given.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{Connection, RawStoreError, RowSet, Statement, StatementKind, Store};
use crate::model::{ElementRecord, PageRecord, ProjectRecord, UserRecord};

const UNDEFINED_TABLE: &str = "42P01";
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const ACTIVE_TRANSACTION: &str = "25001";

/// Where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    Acquire,
    Statement(StatementKind),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<i64, UserRecord>,
    projects: BTreeMap<i64, ProjectRecord>,
    pages: BTreeMap<i64, PageRecord>,
    elements: BTreeMap<i64, ElementRecord>,
}

#[derive(Default)]
struct Shared {
    tables: Arc<AsyncMutex<Tables>>,
    faults: Mutex<Vec<(FaultPoint, String)>>,
    executed: Mutex<Vec<StatementKind>>,
    checked_out: AtomicUsize,
    sequence: AtomicI64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn take_fault(&self, point: FaultPoint) -> Option<String> {
        let mut faults = lock(&self.faults);
        let index = faults.iter().position(|(p, _)| *p == point)?;
        Some(faults.remove(index).1)
    }

    fn next_id(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next matching checkout or statement with SQLSTATE `42P01`.
    pub fn fail_next(&self, point: FaultPoint) {
        self.fail_next_with(point, UNDEFINED_TABLE);
    }

    pub fn fail_next_with(&self, point: FaultPoint, code: &str) {
        lock(&self.shared.faults).push((point, code.to_string()));
    }

    /// Statements issued so far, including ones that failed.
    pub fn executed(&self) -> Vec<StatementKind> {
        lock(&self.shared.executed).clone()
    }

    pub fn clear_executed(&self) {
        lock(&self.shared.executed).clear();
    }

    /// Connections currently checked out.
    pub fn checked_out(&self) -> usize {
        self.shared.checked_out.load(Ordering::SeqCst)
    }

    /// Insert a user directly, bypassing statements.
    pub async fn seed_user(&self, external_id: &str, username: &str, moderator: bool) -> UserRecord {
        let now = Utc::now();
        let user = UserRecord {
            id: self.shared.next_id(),
            external_id: external_id.to_string(),
            username: username.to_string(),
            language: "en-US".to_string(),
            moderator,
            created_at: now,
            updated_at: now,
        };
        self.shared
            .tables
            .lock()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }

    pub async fn users(&self) -> Vec<UserRecord> {
        self.shared.tables.lock().await.users.values().cloned().collect()
    }

    pub async fn projects(&self) -> Vec<ProjectRecord> {
        self.shared.tables.lock().await.projects.values().cloned().collect()
    }

    pub async fn project(&self, project_id: i64) -> Option<ProjectRecord> {
        self.shared.tables.lock().await.projects.get(&project_id).cloned()
    }

    pub async fn pages(&self, project_id: i64) -> Vec<PageRecord> {
        self.shared
            .tables
            .lock()
            .await
            .pages
            .values()
            .filter(|page| page.project_id == project_id)
            .cloned()
            .collect()
    }

    pub async fn elements(&self, page_id: i64) -> Vec<ElementRecord> {
        self.shared
            .tables
            .lock()
            .await
            .elements
            .values()
            .filter(|element| element.page_id == page_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn acquire(&self) -> Result<Box<dyn Connection>, RawStoreError> {
        if self.shared.take_fault(FaultPoint::Acquire).is_some() {
            return Err(RawStoreError::Connection(
                "injected failure on connection checkout".into(),
            ));
        }
        self.shared.checked_out.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            shared: self.shared.clone(),
            open: None,
        }))
    }
}

struct OpenTransaction {
    tables: OwnedMutexGuard<Tables>,
    snapshot: Tables,
}

impl OpenTransaction {
    fn rollback(self) {
        let OpenTransaction { mut tables, snapshot } = self;
        *tables = snapshot;
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    open: Option<OpenTransaction>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn run(&mut self, statement: &Statement) -> Result<RowSet, RawStoreError> {
        let kind = statement.kind();
        lock(&self.shared.executed).push(kind);
        if let Some(code) = self.shared.take_fault(FaultPoint::Statement(kind)) {
            return Err(RawStoreError::database(
                code,
                format!("injected failure on {kind}"),
            ));
        }

        match statement {
            Statement::Begin => {
                if self.open.is_some() {
                    return Err(RawStoreError::database(
                        ACTIVE_TRANSACTION,
                        "there is already a transaction in progress",
                    ));
                }
                let tables = self.shared.tables.clone().lock_owned().await;
                let snapshot = tables.clone();
                self.open = Some(OpenTransaction { tables, snapshot });
                Ok(RowSet::empty())
            }
            Statement::Commit => {
                self.open = None;
                Ok(RowSet::empty())
            }
            Statement::Rollback => {
                if let Some(open) = self.open.take() {
                    open.rollback();
                }
                Ok(RowSet::empty())
            }
            Statement::Ping => Ok(RowSet::empty()),
            other => match self.open.as_mut() {
                Some(open) => open.tables.apply(other, &self.shared),
                None => self.shared.tables.lock().await.apply(other, &self.shared),
            },
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Some(open) = self.open.take() {
            open.rollback();
        }
        self.shared.checked_out.fetch_sub(1, Ordering::SeqCst);
    }
}

fn unique_violation(constraint: &str) -> RawStoreError {
    RawStoreError::database(
        UNIQUE_VIOLATION,
        format!("duplicate key value violates unique constraint \"{constraint}\""),
    )
}

fn foreign_key_violation(constraint: &str) -> RawStoreError {
    RawStoreError::database(
        FOREIGN_KEY_VIOLATION,
        format!("insert or update violates foreign key constraint \"{constraint}\""),
    )
}

impl Tables {
    fn position_taken(&self, project_id: i64, x: i32, y: i32, except: Option<i64>) -> bool {
        self.pages.values().any(|page| {
            page.project_id == project_id && page.x == x && page.y == y && Some(page.id) != except
        })
    }

    fn remove_page(&mut self, page_id: i64) -> Option<PageRecord> {
        let page = self.pages.remove(&page_id)?;
        self.elements.retain(|_, element| element.page_id != page_id);
        Some(page)
    }

    fn apply(&mut self, statement: &Statement, shared: &Shared) -> Result<RowSet, RawStoreError> {
        let now = Utc::now();
        match statement {
            Statement::Begin | Statement::Commit | Statement::Rollback | Statement::Ping => {
                Ok(RowSet::empty())
            }

            Statement::FindUser { user_id } => Ok(RowSet::from_rows(self.users.get(user_id).cloned())),
            Statement::FindUserByExternalId { external_id } => Ok(RowSet::from_rows(
                self.users
                    .values()
                    .find(|user| &user.external_id == external_id)
                    .cloned(),
            )),
            Statement::InsertUser(new) => {
                if self.users.values().any(|user| user.external_id == new.external_id) {
                    return Err(unique_violation("users_external_id_key"));
                }
                let user = UserRecord {
                    id: shared.next_id(),
                    external_id: new.external_id.clone(),
                    username: new.username.clone(),
                    language: new.language.clone(),
                    moderator: false,
                    created_at: now,
                    updated_at: now,
                };
                self.users.insert(user.id, user.clone());
                Ok(RowSet::single(user))
            }

            Statement::FindProject { user_id, project_id } => Ok(RowSet::from_rows(
                self.projects
                    .get(project_id)
                    .filter(|project| project.user_id == *user_id)
                    .cloned(),
            )),
            Statement::FindProjectById { project_id } => {
                Ok(RowSet::from_rows(self.projects.get(project_id).cloned()))
            }
            Statement::InsertProject(new) => {
                if !self.users.contains_key(&new.user_id) {
                    return Err(foreign_key_violation("projects_user_id_fkey"));
                }
                if let Some(source) = new.remixed_from {
                    if !self.projects.contains_key(&source) {
                        return Err(foreign_key_violation("projects_remixed_from_fkey"));
                    }
                }
                let project = ProjectRecord {
                    id: shared.next_id(),
                    user_id: new.user_id,
                    remixed_from: new.remixed_from,
                    version: new.version.clone(),
                    title: new.title.clone(),
                    language: new.language.clone(),
                    featured: false,
                    thumbnail_400: new.thumbnail_400.clone(),
                    thumbnail_1024: new.thumbnail_1024.clone(),
                    created_at: now,
                    updated_at: now,
                };
                self.projects.insert(project.id, project.clone());
                Ok(RowSet::single(project))
            }
            Statement::UpdateProject { project_id, changes } => {
                let Some(project) = self.projects.get_mut(project_id) else {
                    return Ok(RowSet::empty());
                };
                if let Some(title) = &changes.title {
                    project.title = title.clone();
                }
                if let Some(thumbnail) = &changes.thumbnail_400 {
                    project.thumbnail_400 = Some(thumbnail.clone());
                }
                if let Some(thumbnail) = &changes.thumbnail_1024 {
                    project.thumbnail_1024 = Some(thumbnail.clone());
                }
                if let Some(featured) = changes.featured {
                    project.featured = featured;
                }
                project.updated_at = now;
                Ok(RowSet::single(project.clone()))
            }
            Statement::DeleteProject { project_id } => {
                let Some(project) = self.projects.remove(project_id) else {
                    return Ok(RowSet::empty());
                };
                let page_ids: Vec<i64> = self
                    .pages
                    .values()
                    .filter(|page| page.project_id == *project_id)
                    .map(|page| page.id)
                    .collect();
                for page_id in page_ids {
                    self.remove_page(page_id);
                }
                for remix in self.projects.values_mut() {
                    if remix.remixed_from == Some(*project_id) {
                        remix.remixed_from = None;
                    }
                }
                Ok(RowSet::single(project))
            }

            Statement::FindPage { project_id, page_id } => Ok(RowSet::from_rows(
                self.pages
                    .get(page_id)
                    .filter(|page| page.project_id == *project_id)
                    .cloned(),
            )),
            Statement::FindCanonicalPage { project_id } => Ok(RowSet::from_rows(
                self.pages
                    .values()
                    .filter(|page| page.project_id == *project_id)
                    .min_by_key(|page| page.canonical_key())
                    .cloned(),
            )),
            Statement::InsertPage(new) => {
                if !self.projects.contains_key(&new.project_id) {
                    return Err(foreign_key_violation("pages_project_id_fkey"));
                }
                let (x, y) = (new.position.x, new.position.y);
                if self.position_taken(new.project_id, x, y, None) {
                    return Err(unique_violation("pages_project_id_x_y_key"));
                }
                let page = PageRecord {
                    id: shared.next_id(),
                    project_id: new.project_id,
                    x,
                    y,
                    styles: new.styles.clone(),
                    created_at: now,
                    updated_at: now,
                };
                self.pages.insert(page.id, page.clone());
                Ok(RowSet::single(page))
            }
            Statement::UpdatePage {
                project_id,
                page_id,
                changes,
            } => {
                let Some(current) = self.pages.get(page_id).filter(|p| p.project_id == *project_id)
                else {
                    return Ok(RowSet::empty());
                };
                let x = changes.x.unwrap_or(current.x);
                let y = changes.y.unwrap_or(current.y);
                if self.position_taken(*project_id, x, y, Some(*page_id)) {
                    return Err(unique_violation("pages_project_id_x_y_key"));
                }
                let Some(page) = self.pages.get_mut(page_id) else {
                    return Ok(RowSet::empty());
                };
                page.x = x;
                page.y = y;
                if let Some(styles) = &changes.styles {
                    page.styles = styles.clone();
                }
                page.updated_at = now;
                Ok(RowSet::single(page.clone()))
            }
            Statement::DeletePage { project_id, page_id } => {
                let owned = self
                    .pages
                    .get(page_id)
                    .is_some_and(|page| page.project_id == *project_id);
                if !owned {
                    return Ok(RowSet::empty());
                }
                Ok(RowSet::from_rows(self.remove_page(*page_id)))
            }

            Statement::InsertElement(new) => {
                if !self.pages.contains_key(&new.page_id) {
                    return Err(foreign_key_violation("elements_page_id_fkey"));
                }
                let element = ElementRecord {
                    id: shared.next_id(),
                    page_id: new.page_id,
                    element_type: new.element_type.clone(),
                    attributes: new.attributes.clone(),
                    styles: new.styles.clone(),
                    created_at: now,
                    updated_at: now,
                };
                self.elements.insert(element.id, element.clone());
                Ok(RowSet::single(element))
            }
            Statement::UpdateElement {
                page_id,
                element_id,
                changes,
            } => {
                let Some(element) = self
                    .elements
                    .get_mut(element_id)
                    .filter(|element| element.page_id == *page_id)
                else {
                    return Ok(RowSet::empty());
                };
                if let Some(element_type) = &changes.element_type {
                    element.element_type = element_type.clone();
                }
                if let Some(attributes) = &changes.attributes {
                    element.attributes = attributes.clone();
                }
                if let Some(styles) = &changes.styles {
                    element.styles = styles.clone();
                }
                element.updated_at = now;
                Ok(RowSet::single(element.clone()))
            }
            Statement::DeleteElement { page_id, element_id } => {
                let owned = self
                    .elements
                    .get(element_id)
                    .is_some_and(|element| element.page_id == *page_id);
                if !owned {
                    return Ok(RowSet::empty());
                }
                Ok(RowSet::from_rows(self.elements.remove(element_id)))
            }
        }
    }
}
