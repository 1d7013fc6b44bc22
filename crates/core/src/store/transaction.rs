//! Transaction coordinator.
//!
//! Runs an ordered list of steps inside BEGIN/COMMIT on a single pooled connection.
//! Any failure rolls the transaction back and is returned unchanged; a failing
//! ROLLBACK is logged and never replaces the failure that triggered it. The connection is
//! owned by the running future, so it goes back to the pool on every exit path,
//! including cancellation and panics.

use std::sync::Arc;

use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use super::{execute, Connection, RowSet, Statement, Store};
use crate::error::{FailureKind, StoreFailure};

/// One step of a transaction. Receives the row sets of all earlier steps and
/// yields the statement to run, or `None` to record an empty row set.
pub type Step = Box<dyn FnOnce(&[RowSet]) -> Result<Option<Statement>, StoreFailure> + Send>;

/// A step that does not depend on earlier results.
pub fn statement(statement: Statement) -> Step {
    Box::new(move |_| Ok(Some(statement)))
}

/// A step built from earlier results.
pub fn step<F>(f: F) -> Step
where
    F: FnOnce(&[RowSet]) -> Result<Option<Statement>, StoreFailure> + Send + 'static,
{
    Box::new(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Began,
    Executing(usize),
    Committed,
    RolledBack,
}

#[derive(Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn Store>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run a single statement on its own connection, outside an explicit transaction.
    pub async fn query(&self, statement: Statement) -> Result<RowSet, StoreFailure> {
        let mut conn = self.acquire().await?;
        execute(conn.as_mut(), &statement).await
    }

    /// Run `steps` atomically and return one row set per step.
    pub async fn run(&self, steps: Vec<Step>) -> Result<Vec<RowSet>, StoreFailure> {
        let span = info_span!("transaction", id = %Uuid::new_v4(), steps = steps.len());
        self.run_steps(steps).instrument(span).await
    }

    async fn run_steps(&self, steps: Vec<Step>) -> Result<Vec<RowSet>, StoreFailure> {
        let mut conn = self.acquire().await?;
        let mut phase = Phase::Idle;
        debug!(?phase, "connection acquired");

        execute(conn.as_mut(), &Statement::Begin).await?;
        phase = Phase::Began;
        debug!(?phase, "transaction opened");

        let mut results: Vec<RowSet> = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            phase = Phase::Executing(index);
            let outcome = match step(&results) {
                Ok(Some(statement)) => execute(conn.as_mut(), &statement).await,
                Ok(None) => Ok(RowSet::empty()),
                Err(failure) => Err(failure),
            };
            match outcome {
                Ok(rows) => results.push(rows),
                Err(failure) => {
                    warn!(?phase, %failure, "step failed, rolling back");
                    rollback(conn.as_mut()).await;
                    debug!(phase = ?Phase::RolledBack, "transaction finished");
                    return Err(failure);
                }
            }
        }

        if let Err(failure) = execute(conn.as_mut(), &Statement::Commit).await {
            warn!(?phase, %failure, "commit failed");
            rollback(conn.as_mut()).await;
            debug!(phase = ?Phase::RolledBack, "transaction finished");
            return Err(failure);
        }

        phase = Phase::Committed;
        debug!(?phase, "transaction finished");
        Ok(results)
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, StoreFailure> {
        self.store.acquire().await.map_err(|err| {
            error!("failed to acquire a connection: {err}");
            StoreFailure::new(FailureKind::Connection)
        })
    }
}

/// Best effort; the caller reports the failure that triggered the rollback.
async fn rollback(conn: &mut dyn Connection) {
    if let Err(failure) = execute(conn, &Statement::Rollback).await {
        warn!(%failure, "rollback failed");
    }
}
