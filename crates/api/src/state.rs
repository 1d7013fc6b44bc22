use std::sync::Arc;

use pagecraft_core::events::EventBus;
use pagecraft_core::service::{PageService, ProjectService};
use pagecraft_core::store::{Store, TransactionCoordinator};
use pagecraft_core::thumbnail::{
    CanonicalPageDetector, CaptureService, ThumbnailWorker, WorkerConfig,
};

use crate::config::AppConfig;

/// Shared application state, passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    config: AppConfig,
    transactions: TransactionCoordinator,
    event_bus: EventBus,
    projects: ProjectService,
    pages: PageService,
}

impl AppState {
    /// Wire the services over `store` and attach the thumbnail pipeline to the bus.
    pub fn new(
        store: Arc<dyn Store>,
        config: AppConfig,
        event_bus: EventBus,
        capture: Arc<dyn CaptureService>,
    ) -> Self {
        let transactions = TransactionCoordinator::new(store);

        let worker = ThumbnailWorker::new(
            capture,
            transactions.clone(),
            event_bus.notifier(),
            WorkerConfig {
                page_render_url: config.page_render_url.clone(),
                idle_timeout: config.thumbnail_idle,
            },
        );
        event_bus.register(Arc::new(CanonicalPageDetector::new(
            transactions.clone(),
            Arc::new(worker),
            event_bus.notifier(),
        )));

        Self {
            inner: Arc::new(InnerState {
                projects: ProjectService::new(transactions.clone()),
                pages: PageService::new(transactions.clone(), event_bus.clone()),
                config,
                transactions,
                event_bus,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn transactions(&self) -> &TransactionCoordinator {
        &self.inner.transactions
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn projects(&self) -> &ProjectService {
        &self.inner.projects
    }

    pub fn pages(&self) -> &PageService {
        &self.inner.pages
    }
}
