use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Invalidation, InvalidationSink};
use crate::error::StoreFailure;
use crate::events::{ChangeKind, MutationSubscriber, Notifier, StructuralChange, TailEvent, TailOutcome};
use crate::model::CanonicalKey;
use crate::store::{Statement, TransactionCoordinator};

/// Decides whether a structural change touched its project's canonical page.
///
/// Keeps the lowest known `(x, y, page id)` per project. An entry is hydrated from
/// the store on the first change seen for a project and afterwards only lowered by
/// incoming changes, except when the canonical page itself moves or is deleted,
/// which re-reads it. Projects are long-lived, so entries never expire.
pub struct CanonicalPageDetector {
    tx: TransactionCoordinator,
    sink: Arc<dyn InvalidationSink>,
    notifier: Notifier,
    known: Mutex<HashMap<i64, CanonicalKey>>,
}

impl CanonicalPageDetector {
    pub fn new(tx: TransactionCoordinator, sink: Arc<dyn InvalidationSink>, notifier: Notifier) -> Self {
        Self {
            tx,
            sink,
            notifier,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// The canonical key currently held for a project, if any.
    pub async fn known_minimum(&self, project_id: i64) -> Option<CanonicalKey> {
        self.known.lock().await.get(&project_id).copied()
    }

    /// Returns the page whose thumbnail must be regenerated, if any.
    async fn evaluate(&self, change: &StructuralChange) -> Result<Option<i64>, StoreFailure> {
        let project_id = change.project_id;
        let candidate = CanonicalKey::new(change.key, change.page_id);

        match change.kind {
            ChangeKind::PageDeleted | ChangeKind::PageMoved { .. } => {
                let held = self.known_minimum(project_id).await;
                if held.is_some_and(|key| key.page_id == change.page_id) {
                    // The canonical page itself left its slot; whichever page is
                    // lowest now needs a fresh thumbnail.
                    let current = self.rehydrate(project_id).await?;
                    return Ok(current.map(|key| key.page_id));
                }
                if matches!(change.kind, ChangeKind::PageDeleted) {
                    if held.is_none() {
                        self.rehydrate(project_id).await?;
                    }
                    return Ok(None);
                }
            }
            _ => {}
        }

        let held = match self.known_minimum(project_id).await {
            Some(key) => key,
            None => match self.rehydrate(project_id).await? {
                Some(key) => key,
                None => return Ok(None),
            },
        };

        if candidate > held {
            return Ok(None);
        }
        if candidate < held {
            let mut known = self.known.lock().await;
            let entry = known.entry(project_id).or_insert(candidate);
            if candidate < *entry {
                *entry = candidate;
            }
        }
        Ok(Some(change.page_id))
    }

    /// Replace the held key with the store's current canonical page.
    async fn rehydrate(&self, project_id: i64) -> Result<Option<CanonicalKey>, StoreFailure> {
        let rows = self
            .tx
            .query(Statement::FindCanonicalPage { project_id })
            .await?;
        let current = rows.page().map(|page| page.canonical_key());

        let mut known = self.known.lock().await;
        match current {
            Some(key) => known.insert(project_id, key),
            None => known.remove(&project_id),
        };
        debug!(project_id, ?current, "canonical page hydrated");
        Ok(current)
    }
}

#[async_trait]
impl MutationSubscriber for CanonicalPageDetector {
    async fn on_change(&self, change: &StructuralChange) {
        let project_id = change.project_id;
        let outcome = match self.evaluate(change).await {
            Ok(Some(page_id)) => {
                self.sink
                    .submit(Invalidation {
                        project_id,
                        owner_id: change.owner_id,
                        page_id,
                    })
                    .await;
                TailOutcome::Queued { page_id }
            }
            Ok(None) => TailOutcome::Suppressed,
            Err(failure) => {
                // Without the canonical page we cannot tell; never regenerate on a guess.
                warn!(project_id, page_id = change.page_id, %failure, "canonical page lookup failed");
                TailOutcome::Suppressed
            }
        };
        debug!(project_id, page_id = change.page_id, ?outcome, "structural change evaluated");
        self.notifier.tail(TailEvent { project_id, outcome });
    }
}
