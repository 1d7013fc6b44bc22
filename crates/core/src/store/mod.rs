//! Relational store abstraction.
//!
//! A [`Store`] hands out pooled [`Connection`]s; a connection executes one
//! [`Statement`] at a time. Dropping a connection returns it to the pool, so
//! release happens on every exit path. Errors surface here in their native,
//! unclassified form ([`RawStoreError`]); the [`executor`] turns them into
//! [`StoreFailure`](crate::StoreFailure)s.

pub mod executor;
pub mod memory;
pub mod postgres;
pub mod statement;
pub mod transaction;

use async_trait::async_trait;
use thiserror::Error;

pub use executor::execute;
pub use memory::{FaultPoint, MemoryStore};
pub use postgres::PgStore;
pub use statement::{Row, RowSet, Statement, StatementKind};
pub use transaction::{statement, step, Step, TransactionCoordinator};

/// Native store error, before classification.
#[derive(Debug, Clone, Error)]
pub enum RawStoreError {
    /// Error reported by the database server, with its SQLSTATE when known.
    #[error("database error ({}): {message}", code.as_deref().unwrap_or("-"))]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Other(String),
}

impl RawStoreError {
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        RawStoreError::Database {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// A connection pool.
#[async_trait]
pub trait Store: Send + Sync {
    /// Check a connection out of the pool.
    async fn acquire(&self) -> Result<Box<dyn Connection>, RawStoreError>;
}

/// A checked-out connection. Returned to the pool on drop.
#[async_trait]
pub trait Connection: Send {
    async fn run(&mut self, statement: &Statement) -> Result<RowSet, RawStoreError>;
}
