use std::fmt;

use thiserror::Error;

/// Classification of a relational-store error. Internal only: the raw store
/// message never leaves the query executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Missing relation/column, syntax errors (SQLSTATE class 42).
    Schema,
    /// Integrity constraint violations (SQLSTATE class 23).
    Constraint,
    /// Pool exhaustion, I/O, closed connections (SQLSTATE class 08).
    Connection,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Schema => "schema error",
            FailureKind::Constraint => "constraint violation",
            FailureKind::Connection => "connection error",
            FailureKind::Unknown => "unknown store error",
        };
        f.write_str(name)
    }
}

/// Opaque store failure carrying only its classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("store failure: {kind}")]
pub struct StoreFailure {
    kind: FailureKind,
}

impl StoreFailure {
    pub fn new(kind: FailureKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

impl From<FailureKind> for StoreFailure {
    fn from(kind: FailureKind) -> Self {
        Self::new(kind)
    }
}

/// Entity that a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    User,
    Project,
    Page,
    Element,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Missing::User => "User",
            Missing::Project => "Project",
            Missing::Page => "Page",
            Missing::Element => "Element",
        };
        f.write_str(name)
    }
}

/// Errors returned by the write services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(Missing),

    #[error("insufficient permissions")]
    PermissionDenied,

    #[error(transparent)]
    Store(#[from] StoreFailure),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
