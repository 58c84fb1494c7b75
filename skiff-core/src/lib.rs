//! Skiff Core - temporary mirror lifecycle and background message routing
//!
//! This crate mirrors private repositories into short-lived public ones,
//! reclaims them after a fixed time-to-live, and routes messages from
//! connected front-ends to the right handler.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod operation;
pub mod record;
pub mod router;
pub mod scheduler;
pub mod secrets;
pub mod status;
pub mod traits;

#[cfg(test)]
pub(crate) mod fakes;

pub use config::{Config, GitHubConfig, LifecycleConfig, ProjectTarget, ServerConfig, UploadConfig};
pub use error::{Error, Result};
pub use lifecycle::{CleanupReport, ManagerDeps, TempRepoManager, TEMP_REPOS_KEY};
pub use memory::{InMemoryTracker, MemoryStore};
pub use operation::{Operation, OperationStatus};
pub use record::{temp_repo_name, TempRepoRecord};
pub use router::{ConnectionId, InboundMessage, OutboundMessage, Router};
pub use scheduler::Scheduler;
pub use secrets::Secrets;
pub use status::{silent_broadcaster, StatusBroadcaster, StatusKind, UploadStatus};
pub use traits::{
    Branch, BranchCommit, Clock, KeyValueStore, OperationTracker, ProgressFn, RemoteRepoService,
    RepositoryMetadata, SystemClock, TabOpener, UpdateFn, ZipEntry, ZipProcessor,
};
