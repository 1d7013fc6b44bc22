//! Core of the pagecraft backend: project/page models, the store abstraction with its
//! transaction coordinator, the write services, and the thumbnail pipeline that reacts to
//! structural page changes.

pub mod error;
pub mod events;
pub mod model;
pub mod service;
pub mod store;
pub mod thumbnail;

pub use error::{FailureKind, Missing, ServiceError, ServiceResult, StoreFailure};
