use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn, Instrument};

use super::{CaptureService, Invalidation, InvalidationSink, RenderTarget};
use crate::events::{Notifier, TailEvent, TailOutcome};
use crate::model::ProjectChanges;
use crate::store::{statement, Statement, TransactionCoordinator};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL pages are rendered from, e.g. `https://pages.example.com`.
    pub page_render_url: String,
    /// How long a project's queue task waits for more work before retiring.
    pub idle_timeout: Duration,
}

/// Regenerates thumbnails in the background.
///
/// Each project gets its own unbounded FIFO queue drained by a dedicated task, so
/// invalidations for one project are applied in the order they were submitted
/// while different projects proceed independently.
#[derive(Clone)]
pub struct ThumbnailWorker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    capture: Arc<dyn CaptureService>,
    tx: TransactionCoordinator,
    notifier: Notifier,
    config: WorkerConfig,
    queues: Mutex<HashMap<i64, mpsc::UnboundedSender<Invalidation>>>,
}

impl ThumbnailWorker {
    pub fn new(
        capture: Arc<dyn CaptureService>,
        tx: TransactionCoordinator,
        notifier: Notifier,
        config: WorkerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                capture,
                tx,
                notifier,
                config,
                queues: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of projects with a live queue task.
    pub async fn active_queues(&self) -> usize {
        self.inner.queues.lock().await.len()
    }
}

#[async_trait]
impl InvalidationSink for ThumbnailWorker {
    async fn submit(&self, invalidation: Invalidation) {
        let project_id = invalidation.project_id;
        let mut queues = self.inner.queues.lock().await;
        let invalidation = match queues.get(&project_id) {
            Some(queue) => match queue.send(invalidation) {
                Ok(()) => return,
                // The task exited without deregistering; start a fresh one.
                Err(mpsc::error::SendError(invalidation)) => invalidation,
            },
            None => invalidation,
        };

        let (queue, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = queue.send(invalidation);
        queues.insert(project_id, queue);
        debug!(project_id, "thumbnail queue started");

        let inner = self.inner.clone();
        tokio::spawn(
            drain(inner, project_id, rx)
                .instrument(tracing::info_span!("thumbnail_queue", project_id)),
        );
    }
}

async fn drain(
    inner: Arc<WorkerInner>,
    project_id: i64,
    mut rx: mpsc::UnboundedReceiver<Invalidation>,
) {
    loop {
        match tokio::time::timeout(inner.config.idle_timeout, rx.recv()).await {
            Ok(Some(invalidation)) => inner.regenerate(invalidation).await,
            Ok(None) => break,
            Err(_) => {
                // Deregister under the map lock so no submission can slip in between
                // the emptiness check and the removal.
                let mut queues = inner.queues.lock().await;
                match rx.try_recv() {
                    Ok(invalidation) => {
                        drop(queues);
                        inner.regenerate(invalidation).await;
                    }
                    Err(_) => {
                        queues.remove(&project_id);
                        debug!(project_id, "thumbnail queue retired");
                        break;
                    }
                }
            }
        }
    }
}

impl WorkerInner {
    async fn regenerate(&self, invalidation: Invalidation) {
        let Invalidation {
            project_id,
            owner_id,
            page_id,
        } = invalidation;
        let target = RenderTarget::new(&self.config.page_render_url, owner_id, project_id, page_id);

        let outcome = match self.capture.capture(&target).await {
            Ok(screenshot) => match self.persist(project_id, &screenshot).await {
                Ok(()) => {
                    info!(project_id, page_id, %screenshot, "thumbnail regenerated");
                    TailOutcome::Regenerated {
                        page_id,
                        screenshot,
                    }
                }
                Err(reason) => {
                    warn!(project_id, page_id, %reason, "failed to store thumbnail");
                    TailOutcome::Failed { page_id, reason }
                }
            },
            Err(err) => {
                warn!(project_id, page_id, target = target.id(), "capture failed: {err}");
                TailOutcome::Failed {
                    page_id,
                    reason: err.to_string(),
                }
            }
        };

        self.notifier.tail(TailEvent {
            project_id,
            outcome,
        });
    }

    /// Both size variants come from the one capture.
    async fn persist(&self, project_id: i64, screenshot: &str) -> Result<(), String> {
        let results = self
            .tx
            .run(vec![statement(Statement::UpdateProject {
                project_id,
                changes: ProjectChanges::thumbnails(screenshot),
            })])
            .await
            .map_err(|failure| failure.to_string())?;
        if results.first().is_some_and(|rows| rows.is_empty()) {
            return Err("project no longer exists".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, PipelineEvent};
    use crate::model::NewProject;
    use crate::store::{FaultPoint, MemoryStore, StatementKind};
    use crate::thumbnail::CaptureError;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::broadcast;

    /// Replies with the scripted screenshots in order, after the scripted delays.
    struct ScriptedCapture {
        replies: StdMutex<Vec<(Duration, Result<String, String>)>>,
        requests: StdMutex<Vec<String>>,
    }

    impl ScriptedCapture {
        fn new(replies: Vec<(Duration, Result<String, String>)>) -> Arc<Self> {
            Arc::new(Self {
                replies: StdMutex::new(replies),
                requests: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CaptureService for ScriptedCapture {
        async fn capture(&self, target: &RenderTarget) -> Result<String, CaptureError> {
            self.requests.lock().unwrap().push(target.id().to_string());
            let (delay, reply) = self.replies.lock().unwrap().remove(0);
            tokio::time::sleep(delay).await;
            reply.map_err(CaptureError::Unavailable)
        }
    }

    async fn setup(
        capture: Arc<ScriptedCapture>,
    ) -> (MemoryStore, ThumbnailWorker, broadcast::Receiver<PipelineEvent>, i64) {
        let store = MemoryStore::new();
        let owner = store.seed_user("ext", "owner", false).await;
        let tx = TransactionCoordinator::new(Arc::new(store.clone()));
        let project = tx
            .query(Statement::InsertProject(NewProject {
                user_id: owner.id,
                remixed_from: None,
                version: "test".into(),
                title: "t".into(),
                language: "en-US".into(),
                thumbnail_400: None,
                thumbnail_1024: None,
            }))
            .await
            .unwrap()
            .project()
            .unwrap()
            .id;
        let bus = EventBus::new(64);
        let rx = bus.subscribe();
        let worker = ThumbnailWorker::new(
            capture,
            tx,
            bus.notifier(),
            WorkerConfig {
                page_render_url: "https://pages.example.com".into(),
                idle_timeout: Duration::from_millis(50),
            },
        );
        (store, worker, rx, project)
    }

    async fn next_outcome(rx: &mut broadcast::Receiver<PipelineEvent>) -> TailOutcome {
        loop {
            if let PipelineEvent::Tail(tail) = rx.recv().await.unwrap() {
                return tail.outcome;
            }
        }
    }

    fn invalidation(project_id: i64, page_id: i64) -> Invalidation {
        Invalidation {
            project_id,
            owner_id: 1,
            page_id,
        }
    }

    #[tokio::test]
    async fn persists_both_variants_from_one_capture() {
        let capture = ScriptedCapture::new(vec![(Duration::ZERO, Ok("shot-1.png".into()))]);
        let (store, worker, mut rx, project_id) = setup(capture.clone()).await;

        worker.submit(invalidation(project_id, 3)).await;
        let outcome = next_outcome(&mut rx).await;
        assert!(matches!(outcome, TailOutcome::Regenerated { page_id: 3, .. }));

        let project = store.project(project_id).await.unwrap();
        assert_eq!(project.thumbnail_400.as_deref(), Some("shot-1.png"));
        assert_eq!(project.thumbnail_1024.as_deref(), Some("shot-1.png"));
        assert_eq!(
            capture.requests.lock().unwrap().clone(),
            vec![RenderTarget::new("https://pages.example.com", 1, project_id, 3)
                .id()
                .to_string()]
        );
    }

    #[tokio::test]
    async fn same_project_is_applied_in_submission_order() {
        // The first capture is much slower than the second.
        let capture = ScriptedCapture::new(vec![
            (Duration::from_millis(80), Ok("old.png".into())),
            (Duration::ZERO, Ok("new.png".into())),
        ]);
        let (store, worker, mut rx, project_id) = setup(capture).await;

        worker.submit(invalidation(project_id, 3)).await;
        worker.submit(invalidation(project_id, 3)).await;

        assert!(matches!(
            next_outcome(&mut rx).await,
            TailOutcome::Regenerated { ref screenshot, .. } if screenshot == "old.png"
        ));
        assert!(matches!(
            next_outcome(&mut rx).await,
            TailOutcome::Regenerated { ref screenshot, .. } if screenshot == "new.png"
        ));
        let project = store.project(project_id).await.unwrap();
        assert_eq!(project.thumbnail_400.as_deref(), Some("new.png"));
    }

    #[tokio::test]
    async fn capture_failure_leaves_thumbnails_untouched() {
        let capture = ScriptedCapture::new(vec![(Duration::ZERO, Err("timeout".into()))]);
        let (store, worker, mut rx, project_id) = setup(capture).await;

        worker.submit(invalidation(project_id, 3)).await;
        assert!(matches!(next_outcome(&mut rx).await, TailOutcome::Failed { .. }));

        let project = store.project(project_id).await.unwrap();
        assert_eq!(project.thumbnail_400, None);
        assert_eq!(project.thumbnail_1024, None);
    }

    #[tokio::test]
    async fn store_failure_is_reported_not_raised() {
        let capture = ScriptedCapture::new(vec![(Duration::ZERO, Ok("shot.png".into()))]);
        let (store, worker, mut rx, project_id) = setup(capture).await;
        store.fail_next(FaultPoint::Statement(StatementKind::UpdateProject));

        worker.submit(invalidation(project_id, 3)).await;
        assert!(matches!(next_outcome(&mut rx).await, TailOutcome::Failed { .. }));
        assert_eq!(store.project(project_id).await.unwrap().thumbnail_400, None);
    }

    #[tokio::test]
    async fn idle_queue_retires_and_restarts() {
        let capture = ScriptedCapture::new(vec![
            (Duration::ZERO, Ok("a.png".into())),
            (Duration::ZERO, Ok("b.png".into())),
        ]);
        let (store, worker, mut rx, project_id) = setup(capture).await;

        worker.submit(invalidation(project_id, 3)).await;
        next_outcome(&mut rx).await;
        assert_eq!(worker.active_queues().await, 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(worker.active_queues().await, 0);

        worker.submit(invalidation(project_id, 3)).await;
        next_outcome(&mut rx).await;
        assert_eq!(
            store.project(project_id).await.unwrap().thumbnail_1024.as_deref(),
            Some("b.png")
        );
    }
}
