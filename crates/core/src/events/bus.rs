use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::types::{PipelineEvent, StructuralChange, TailEvent};

/// Receives structural changes synchronously from [`EventBus::publish`].
/// Long-running work must be handed off, not awaited here.
#[async_trait]
pub trait MutationSubscriber: Send + Sync {
    async fn on_change(&self, change: &StructuralChange);
}

/// In-process event bus.
///
/// Structural changes are broadcast on a `tokio::broadcast` channel for observers
/// and then dispatched to registered subscribers in registration order before
/// `publish` returns. Tail outcomes reported through a [`Notifier`] share the
/// broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<PipelineEvent>>,
    subscribers: Arc<RwLock<Vec<Arc<dyn MutationSubscriber>>>>,
}

impl EventBus {
    /// Create a new event bus with the given broadcast capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a synchronous subscriber.
    pub fn register(&self, subscriber: Arc<dyn MutationSubscriber>) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }

    /// Broadcast a change, then dispatch it to every subscriber.
    /// Returns the number of subscribers invoked.
    pub async fn publish(&self, change: StructuralChange) -> usize {
        // No receivers is not an error.
        let _ = self.sender.send(PipelineEvent::Change(change.clone()));
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &subscribers {
            subscriber.on_change(&change).await;
        }
        subscribers.len()
    }

    /// Handle for reporting pipeline outcomes without holding the bus.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            sender: self.sender.clone(),
        }
    }

    /// Subscribe to the broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Number of active broadcast receivers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Broadcast-only handle given to pipeline components.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: Arc<broadcast::Sender<PipelineEvent>>,
}

impl Notifier {
    pub fn tail(&self, event: TailEvent) {
        let _ = self.sender.send(PipelineEvent::Tail(event));
    }
}
