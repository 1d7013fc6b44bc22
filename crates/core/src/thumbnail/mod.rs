//! Thumbnail regeneration pipeline.
//!
//! The [`CanonicalPageDetector`] listens to structural changes on the event bus
//! and emits an [`Invalidation`] only when the changed page is its project's
//! canonical (lowest-ordered) page. The [`ThumbnailWorker`] turns invalidations
//! into capture requests and persists the result, one FIFO queue per project.

pub mod capture;
pub mod detector;
pub mod worker;

use async_trait::async_trait;

pub use capture::{CaptureError, CaptureService, HttpCaptureService, RenderTarget};
pub use detector::CanonicalPageDetector;
pub use worker::{ThumbnailWorker, WorkerConfig};

/// The canonical page of a project changed and its thumbnail is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalidation {
    pub project_id: i64,
    pub owner_id: i64,
    pub page_id: i64,
}

/// Accepts invalidations without waiting for regeneration.
#[async_trait]
pub trait InvalidationSink: Send + Sync {
    async fn submit(&self, invalidation: Invalidation);
}
