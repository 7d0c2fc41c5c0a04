//! Cloud reconciliation for the prompt collection.
//!
//! [`CloudSyncService`] pulls the shared document into a persisted cloud
//! cache (fully or per category) and proposes local prompts back through a
//! merge request. Results leave the crate wrapped in [`ServiceResponse`].

mod cache;
pub mod config;
pub mod error;
pub mod protocol;
pub mod push;
mod service;

pub use config::{AppConfig, ConfigError, ConfigLoader, RemoteConfig, StorageConfig};
pub use error::{PushStep, SyncError};
pub use protocol::{PushReport, RemovedCategory, ServiceResponse, SyncReport};
pub use push::MergePlan;
pub use service::{CloudSyncService, RemoteSnapshot, RemoteTarget};
