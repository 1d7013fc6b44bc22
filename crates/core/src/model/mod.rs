pub mod page;
pub mod project;
pub mod user;

pub use page::{CanonicalKey, ElementChanges, ElementRecord, NewElement, NewPage, OrderingKey, PageChanges, PageRecord};
pub use project::{NewProject, Project, ProjectChanges, ProjectRecord, ThumbnailSize};
pub use user::{Actor, NewUser, UserRecord};
