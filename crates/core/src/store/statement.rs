use std::fmt;

use crate::model::{
    ElementChanges, ElementRecord, NewElement, NewPage, NewProject, NewUser, PageChanges,
    PageRecord, ProjectChanges, ProjectRecord, UserRecord,
};

/// Every statement the backend issues. Each store backend maps a variant to its own
/// parameterized form.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Begin,
    Commit,
    Rollback,
    Ping,

    FindUser { user_id: i64 },
    FindUserByExternalId { external_id: String },
    InsertUser(NewUser),

    /// Project scoped to its owner.
    FindProject { user_id: i64, project_id: i64 },
    FindProjectById { project_id: i64 },
    InsertProject(NewProject),
    UpdateProject { project_id: i64, changes: ProjectChanges },
    DeleteProject { project_id: i64 },

    FindPage { project_id: i64, page_id: i64 },
    /// Lowest page of a project by `(x, y, id)`.
    FindCanonicalPage { project_id: i64 },
    InsertPage(NewPage),
    UpdatePage { project_id: i64, page_id: i64, changes: PageChanges },
    DeletePage { project_id: i64, page_id: i64 },

    InsertElement(NewElement),
    UpdateElement { page_id: i64, element_id: i64, changes: ElementChanges },
    DeleteElement { page_id: i64, element_id: i64 },
}

/// Discriminant of a [`Statement`], used for logging and fault targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Begin,
    Commit,
    Rollback,
    Ping,
    FindUser,
    FindUserByExternalId,
    InsertUser,
    FindProject,
    FindProjectById,
    InsertProject,
    UpdateProject,
    DeleteProject,
    FindPage,
    FindCanonicalPage,
    InsertPage,
    UpdatePage,
    DeletePage,
    InsertElement,
    UpdateElement,
    DeleteElement,
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Begin => StatementKind::Begin,
            Statement::Commit => StatementKind::Commit,
            Statement::Rollback => StatementKind::Rollback,
            Statement::Ping => StatementKind::Ping,
            Statement::FindUser { .. } => StatementKind::FindUser,
            Statement::FindUserByExternalId { .. } => StatementKind::FindUserByExternalId,
            Statement::InsertUser(_) => StatementKind::InsertUser,
            Statement::FindProject { .. } => StatementKind::FindProject,
            Statement::FindProjectById { .. } => StatementKind::FindProjectById,
            Statement::InsertProject(_) => StatementKind::InsertProject,
            Statement::UpdateProject { .. } => StatementKind::UpdateProject,
            Statement::DeleteProject { .. } => StatementKind::DeleteProject,
            Statement::FindPage { .. } => StatementKind::FindPage,
            Statement::FindCanonicalPage { .. } => StatementKind::FindCanonicalPage,
            Statement::InsertPage(_) => StatementKind::InsertPage,
            Statement::UpdatePage { .. } => StatementKind::UpdatePage,
            Statement::DeletePage { .. } => StatementKind::DeletePage,
            Statement::InsertElement(_) => StatementKind::InsertElement,
            Statement::UpdateElement { .. } => StatementKind::UpdateElement,
            Statement::DeleteElement { .. } => StatementKind::DeleteElement,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A row returned by a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    User(UserRecord),
    Project(ProjectRecord),
    Page(PageRecord),
    Element(ElementRecord),
}

impl From<UserRecord> for Row {
    fn from(row: UserRecord) -> Self {
        Row::User(row)
    }
}

impl From<ProjectRecord> for Row {
    fn from(row: ProjectRecord) -> Self {
        Row::Project(row)
    }
}

impl From<PageRecord> for Row {
    fn from(row: PageRecord) -> Self {
        Row::Page(row)
    }
}

impl From<ElementRecord> for Row {
    fn from(row: ElementRecord) -> Self {
        Row::Element(row)
    }
}

/// Rows returned by one statement. Mutations return the affected rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_rows<I, R>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Row>,
    {
        Self {
            rows: rows.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(row: impl Into<Row>) -> Self {
        Self {
            rows: vec![row.into()],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.rows.iter().find_map(|row| match row {
            Row::User(user) => Some(user),
            _ => None,
        })
    }

    pub fn project(&self) -> Option<&ProjectRecord> {
        self.rows.iter().find_map(|row| match row {
            Row::Project(project) => Some(project),
            _ => None,
        })
    }

    pub fn page(&self) -> Option<&PageRecord> {
        self.rows.iter().find_map(|row| match row {
            Row::Page(page) => Some(page),
            _ => None,
        })
    }

    pub fn element(&self) -> Option<&ElementRecord> {
        self.rows.iter().find_map(|row| match row {
            Row::Element(element) => Some(element),
            _ => None,
        })
    }
}
