use serde::{Deserialize, Serialize};

use crate::model::OrderingKey;

/// Structural change to a project's pages, emitted after the mutating
/// transaction has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralChange {
    pub project_id: i64,
    pub owner_id: i64,
    pub page_id: i64,
    /// Ordering key of the page after the mutation (before it, for deletions).
    pub key: OrderingKey,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeKind {
    PageCreated,
    PageUpdated,
    PageMoved { from: OrderingKey },
    PageDeleted,
    #[serde(rename_all = "camelCase")]
    ElementCreated { element_id: i64 },
    #[serde(rename_all = "camelCase")]
    ElementUpdated { element_id: i64 },
    #[serde(rename_all = "camelCase")]
    ElementDeleted { element_id: i64 },
}

/// Notifications broadcast to observers of the thumbnail pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    Change(StructuralChange),
    Tail(TailEvent),
}

/// What the pipeline did with one structural change or invalidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TailEvent {
    pub project_id: i64,
    pub outcome: TailOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TailOutcome {
    /// The change did not touch the canonical page.
    Suppressed,
    #[serde(rename_all = "camelCase")]
    Queued { page_id: i64 },
    #[serde(rename_all = "camelCase")]
    Regenerated { page_id: i64, screenshot: String },
    #[serde(rename_all = "camelCase")]
    Failed { page_id: i64, reason: String },
}

impl TailOutcome {
    /// Whether the regeneration path has finished with this signal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TailOutcome::Queued { .. })
    }
}
