//! Narrow interfaces to everything outside the orchestration core
//!
//! The lifecycle manager and router only ever talk to the outside world
//! through these traits, so every collaborator can be swapped for a fake in
//! tests or for a different host in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Progress callback handed to long-running remote operations (0..=100)
pub type ProgressFn<'a> = dyn Fn(u8) + Send + Sync + 'a;

/// Computes the next stored value from the current one, `None` when absent
pub type UpdateFn<'a> =
    dyn Fn(Option<serde_json::Value>) -> Result<serde_json::Value> + Send + Sync + 'a;

/// A branch as reported by the remote repository service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name
    pub name: String,
    /// Head commit of the branch
    pub commit: BranchCommit,
    /// Whether branch protection is enabled
    pub protected: bool,
}

/// Head commit reference of a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCommit {
    pub sha: String,
    pub url: String,
}

/// Repository metadata returned after a visibility change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub full_name: Option<String>,
    pub private: bool,
    pub html_url: Option<String>,
}

/// One file extracted from an uploaded ZIP archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Path relative to the project root, `/`-separated
    pub path: String,
    /// Raw file contents
    pub contents: Vec<u8>,
}

/// Durable string-keyed JSON store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Replace the value under `key` with `apply(current)` as one step
    ///
    /// The default reads then writes. Stores shared between processes must
    /// run both inside one write transaction. An error from `apply` leaves the
    /// stored value untouched.
    async fn update(&self, key: &str, apply: &UpdateFn<'_>) -> Result<()> {
        let current = self.get(key).await?;
        let next = apply(current)?;
        self.set(key, next).await
    }
}

/// Remote source-control host holding both the source and its mirrors
#[async_trait]
pub trait RemoteRepoService: Send + Sync {
    /// List the branches of `owner/repo`
    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>>;

    /// Create a temporary mirror repository for `source_repo`, returning its name
    async fn create_temporary_public_repo(
        &self,
        owner: &str,
        source_repo: &str,
        branch: Option<&str>,
    ) -> Result<String>;

    /// Copy the contents of the source branch into the mirror
    ///
    /// `on_progress` is invoked with non-decreasing percentages up to 100.
    async fn clone_repo_contents(
        &self,
        source_owner: &str,
        source_repo: &str,
        target_owner: &str,
        target_repo: &str,
        branch: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<()>;

    /// Change repository visibility
    async fn update_repo_visibility(
        &self,
        owner: &str,
        repo: &str,
        is_private: bool,
    ) -> Result<RepositoryMetadata>;

    /// Delete a repository
    async fn delete_repo(&self, owner: &str, repo: &str) -> Result<()>;
}

/// Records start/complete/fail events for tracked operations
#[async_trait]
pub trait OperationTracker: Send + Sync {
    async fn start_operation(
        &self,
        id: &str,
        op_type: &str,
        description: &str,
        metadata: Option<serde_json::Value>,
    );

    async fn complete_operation(&self, id: &str);

    async fn fail_operation(&self, id: &str, error: &str);
}

/// Opens browser tabs on the host
#[async_trait]
pub trait TabOpener: Send + Sync {
    async fn open_tab(&self, url: &str, active: bool) -> Result<()>;
}

/// Extracts uploaded project archives and pushes them to the project repo
#[async_trait]
pub trait ZipProcessor: Send + Sync {
    /// Extract the files of a ZIP archive
    async fn extract(&self, data: &[u8]) -> Result<Vec<ZipEntry>>;

    /// Upload extracted files for `project_id` as one logical commit
    async fn upload(&self, project_id: &str, entries: &[ZipEntry], commit_message: &str)
        -> Result<()>;
}

/// Source of wall-clock time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
