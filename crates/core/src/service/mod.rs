//! Write services. Each operation checks its prerequisites, then commits its writes as a
//! single transaction through the [`TransactionCoordinator`](crate::store::TransactionCoordinator).

mod pages;
mod projects;

pub use pages::{ElementDraft, PageDraft, PageService};
pub use projects::{CreatedProject, ProjectDraft, ProjectOwner, ProjectService};
