//! Query executor: one statement on one connection, with error classification.

use tracing::{debug, error};

use super::{Connection, RawStoreError, RowSet, Statement};
use crate::error::{FailureKind, StoreFailure};

/// Run a single statement. Never retries. The raw store error is logged here and
/// replaced by its classification.
pub async fn execute(
    conn: &mut dyn Connection,
    statement: &Statement,
) -> Result<RowSet, StoreFailure> {
    let kind = statement.kind();
    match conn.run(statement).await {
        Ok(rows) => {
            debug!(statement = %kind, rows = rows.len(), "statement executed");
            Ok(rows)
        }
        Err(err) => {
            let failure = classify(&err);
            error!(statement = %kind, classification = %failure, "statement failed: {err}");
            Err(StoreFailure::new(failure))
        }
    }
}

/// Map a native store error onto the closed failure taxonomy.
pub fn classify(err: &RawStoreError) -> FailureKind {
    match err {
        RawStoreError::Connection(_) => FailureKind::Connection,
        RawStoreError::Database { code: Some(code), .. } => classify_sqlstate(code),
        RawStoreError::Database { code: None, .. } | RawStoreError::Other(_) => {
            FailureKind::Unknown
        }
    }
}

fn classify_sqlstate(code: &str) -> FailureKind {
    match code.get(..2) {
        Some("42") => FailureKind::Schema,
        Some("23") => FailureKind::Constraint,
        Some("08") | Some("57") => FailureKind::Connection,
        _ => FailureKind::Unknown,
    }
}
