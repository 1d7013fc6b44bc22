pub mod bus;
pub mod types;

pub use bus::{EventBus, MutationSubscriber, Notifier};
pub use types::{ChangeKind, PipelineEvent, StructuralChange, TailEvent, TailOutcome};
