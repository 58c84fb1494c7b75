//! Temporary mirror lifecycle
//!
//! Imports a private repository by mirroring it into a short-lived public
//! repository, records every mirror that exists, and deletes expired mirrors
//! on a recurring cleanup pass. Any mirror that was created is recorded, even
//! when later pipeline steps fail, so cleanup can reclaim it. Failed deletes
//! keep their record and are retried on the next pass.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::LifecycleConfig;
use crate::record::{records_from_value, TempRepoRecord};
use crate::scheduler::Scheduler;
use crate::status::{ProgressGate, StatusBroadcaster, UploadStatus};
use crate::traits::{
    Branch, Clock, KeyValueStore, OperationTracker, ProgressFn, RemoteRepoService, TabOpener,
};
use crate::Result;

/// Storage key holding the list of live mirrors
pub const TEMP_REPOS_KEY: &str = "tempRepos";

/// Branch used when none is requested and discovery gives no answer
const FALLBACK_BRANCH: &str = "main";

/// Branch names preferred, in order, when no branch is requested
const PREFERRED_BRANCHES: [&str; 2] = ["main", "master"];

const OPERATION_TYPE_IMPORT: &str = "import";

/// Collaborators the manager is built from
#[derive(Clone)]
pub struct ManagerDeps {
    pub remote: Arc<dyn RemoteRepoService>,
    pub store: Arc<dyn KeyValueStore>,
    pub tracker: Arc<dyn OperationTracker>,
    pub tabs: Arc<dyn TabOpener>,
    pub clock: Arc<dyn Clock>,
    /// Receives import status when no per-call broadcaster is given
    pub broadcaster: StatusBroadcaster,
}

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Mirrors deleted in this pass
    pub deleted: Vec<String>,
    /// Mirrors whose deletion failed and will be retried
    pub failed: Vec<String>,
    /// Records left in storage after the pass
    pub retained: usize,
}

struct Inner {
    owner: String,
    config: LifecycleConfig,
    deps: ManagerDeps,
    /// Serializes read-modify-write cycles on the stored list
    records_lock: tokio::sync::Mutex<()>,
    scheduler: Scheduler,
}

/// Runs the import pipeline and the expiry cleanup scheduler
///
/// Cheap to clone; clones share state and the scheduler.
#[derive(Clone)]
pub struct TempRepoManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TempRepoManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempRepoManager")
            .field("owner", &self.inner.owner)
            .field("config", &self.inner.config)
            .field("cleanup_scheduled", &self.is_cleanup_scheduled())
            .finish_non_exhaustive()
    }
}

impl TempRepoManager {
    /// Create a manager, resuming cleanup if mirrors are already recorded
    pub async fn new(owner: impl Into<String>, deps: ManagerDeps, config: LifecycleConfig) -> Self {
        let manager = Self {
            inner: Arc::new(Inner {
                owner: owner.into(),
                config,
                deps,
                records_lock: tokio::sync::Mutex::new(()),
                scheduler: Scheduler::new("temp-repo-cleanup"),
            }),
        };

        match manager.read_records().await {
            Ok(records) if !records.is_empty() => {
                info!(count = records.len(), "Found recorded temp repos, resuming cleanup");
                manager.ensure_cleanup_scheduled();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read recorded temp repos at startup"),
        }

        manager
    }

    /// Account owning sources and mirrors
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.inner.config
    }

    pub fn is_cleanup_scheduled(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    /// All recorded mirrors; storage failures read as an empty list
    pub async fn get_temp_repos(&self) -> Vec<TempRepoRecord> {
        self.read_records().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read temp repos");
            Vec::new()
        })
    }

    /// Import `source_repo`, reporting status to the default broadcaster
    pub async fn import_private_repo(&self, source_repo: &str, branch: Option<&str>) {
        let broadcaster = self.inner.deps.broadcaster.clone();
        self.import_private_repo_with(source_repo, branch, broadcaster)
            .await;
    }

    /// Import `source_repo`, reporting status to `broadcaster`
    ///
    /// Errors end the pipeline and are reported once, as an `error` status
    /// and a failed operation; they are not returned.
    pub async fn import_private_repo_with(
        &self,
        source_repo: &str,
        branch: Option<&str>,
        broadcaster: StatusBroadcaster,
    ) {
        let tracker = &self.inner.deps.tracker;
        let operation_id = format!("{}-{}", OPERATION_TYPE_IMPORT, uuid::Uuid::new_v4());

        tracker
            .start_operation(
                &operation_id,
                OPERATION_TYPE_IMPORT,
                &format!("Import private repository {}", source_repo),
                Some(json!({ "repoName": source_repo, "branch": branch })),
            )
            .await;

        match self.run_import(source_repo, branch, &broadcaster).await {
            Ok(temp_repo) => {
                info!(source = source_repo, temp_repo = %temp_repo, "Private repository imported");
                tracker.complete_operation(&operation_id).await;
            }
            Err(e) => {
                error!(source = source_repo, error = %e, "Private repository import failed");
                broadcaster(UploadStatus::error(format!(
                    "Failed to import private repository: {}",
                    e
                )));
                tracker.fail_operation(&operation_id, &e.to_string()).await;
            }
        }
    }

    async fn run_import(
        &self,
        source_repo: &str,
        branch: Option<&str>,
        broadcaster: &StatusBroadcaster,
    ) -> Result<String> {
        let deps = &self.inner.deps;
        let owner = self.owner();
        let gate = ProgressGate::default();
        let publish = |progress: u8, message: &str| {
            broadcaster(UploadStatus::uploading(gate.advance(progress), message));
        };

        publish(10, "Preparing repository import");
        let branch = self.resolve_branch(source_repo, branch).await;

        let temp_repo = deps
            .remote
            .create_temporary_public_repo(owner, source_repo, Some(&branch))
            .await?;
        let created_at = deps.clock.now_millis();
        info!(temp_repo = %temp_repo, branch = %branch, "Created temporary repository");
        publish(30, "Created temporary repository");

        // From here on the mirror exists and must be recorded whatever happens.
        let populated: Result<()> = async {
            let on_progress = |percent: u8| {
                let scaled = 30 + u16::from(percent.min(100)) * 40 / 100;
                publish(scaled as u8, "Copying repository contents");
            };
            deps.remote
                .clone_repo_contents(
                    owner,
                    source_repo,
                    owner,
                    &temp_repo,
                    &branch,
                    Some(&on_progress as &ProgressFn<'_>),
                )
                .await?;
            publish(70, "Repository contents copied");

            deps.remote
                .update_repo_visibility(owner, &temp_repo, false)
                .await?;
            publish(90, "Temporary repository is public");
            Ok(())
        }
        .await;

        let record = TempRepoRecord {
            original_repo: source_repo.to_string(),
            temp_repo: temp_repo.clone(),
            created_at,
            owner: owner.to_string(),
            branch: branch.clone(),
        };
        if let Err(e) = self.append_record(record).await {
            warn!(temp_repo = %temp_repo, error = %e, "Failed to record temp repo, it will not be cleaned up");
        }
        self.ensure_cleanup_scheduled();

        populated?;

        deps.tabs.open_tab(&self.mirror_url(&temp_repo), true).await?;

        publish(100, "Import complete");
        broadcaster(UploadStatus::success(format!(
            "Imported {} into temporary repository {}",
            source_repo, temp_repo
        )));

        Ok(temp_repo)
    }

    /// Requested branch, else the best-known default of the source repo
    async fn resolve_branch(&self, source_repo: &str, requested: Option<&str>) -> String {
        if let Some(branch) = requested.map(str::trim).filter(|b| !b.is_empty()) {
            return branch.to_string();
        }

        match self
            .inner
            .deps
            .remote
            .list_branches(self.owner(), source_repo)
            .await
        {
            Ok(branches) => pick_default_branch(&branches).unwrap_or_else(|| {
                debug!(source = source_repo, "No preferred branch listed, using fallback");
                FALLBACK_BRANCH.to_string()
            }),
            Err(e) => {
                warn!(source = source_repo, error = %e, "Branch listing failed, using fallback");
                FALLBACK_BRANCH.to_string()
            }
        }
    }

    fn mirror_url(&self, temp_repo: &str) -> String {
        format!(
            "https://{}/{}/{}",
            self.inner.config.tab_host.trim_end_matches('/'),
            self.owner(),
            temp_repo
        )
    }

    /// Delete expired mirrors (every mirror when `force`)
    ///
    /// Never fails: per-record delete errors only keep that record for the
    /// next pass, and storage errors are logged.
    pub async fn cleanup_temp_repos(&self, force: bool) -> CleanupReport {
        let mut report = CleanupReport::default();
        let now = self.inner.deps.clock.now_millis();
        let max_age = self.inner.config.max_age_millis();

        let snapshot = {
            let _guard = self.inner.records_lock.lock().await;
            match self.read_records().await {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Cleanup could not read temp repos");
                    return report;
                }
            }
        };

        let mut deleted: HashSet<(String, String)> = HashSet::new();
        for record in &snapshot {
            if !force && !record.is_expired(now, max_age) {
                continue;
            }

            match self
                .inner
                .deps
                .remote
                .delete_repo(&record.owner, &record.temp_repo)
                .await
            {
                Ok(()) => {
                    info!(
                        temp_repo = %record.temp_repo,
                        age_ms = record.age_millis(now),
                        "Deleted temporary repository"
                    );
                    deleted.insert((record.owner.clone(), record.temp_repo.clone()));
                    report.deleted.push(record.temp_repo.clone());
                }
                Err(e) => {
                    warn!(temp_repo = %record.temp_repo, error = %e, "Failed to delete temporary repository, will retry");
                    report.failed.push(record.temp_repo.clone());
                }
            }
        }

        // Prune against the current list so records appended while deletes
        // were in flight survive, including those written by other processes.
        let _guard = self.inner.records_lock.lock().await;
        let retained = AtomicUsize::new(0);
        let prune = |current: Option<serde_json::Value>| -> Result<serde_json::Value> {
            let kept: Vec<TempRepoRecord> = records_from_value(current)
                .into_iter()
                .filter(|r| !deleted.contains(&(r.owner.clone(), r.temp_repo.clone())))
                .collect();
            retained.store(kept.len(), Ordering::Relaxed);
            Ok(serde_json::to_value(kept)?)
        };
        if let Err(e) = self.inner.deps.store.update(TEMP_REPOS_KEY, &prune).await {
            warn!(error = %e, "Failed to persist temp repos after cleanup");
        }
        report.retained = retained.load(Ordering::Relaxed);

        debug!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            retained = report.retained,
            "Cleanup pass finished"
        );
        report
    }

    /// Start the recurring cleanup if it is not already running
    pub fn ensure_cleanup_scheduled(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let started = self
            .inner
            .scheduler
            .start(self.inner.config.cleanup_interval, move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => TempRepoManager { inner }.cleanup_tick().await,
                        None => ControlFlow::Break(()),
                    }
                }
            });

        if started {
            info!(
                interval_ms = self.inner.config.cleanup_interval.as_millis() as u64,
                "Temp repo cleanup scheduled"
            );
        }
    }

    /// Stop the recurring cleanup
    pub fn stop_cleanup(&self) {
        self.inner.scheduler.stop();
    }

    async fn cleanup_tick(&self) -> ControlFlow<()> {
        self.cleanup_temp_repos(false).await;

        // Decide under the records lock so a concurrent import either lands
        // before this check or restarts the scheduler after it.
        let _guard = self.inner.records_lock.lock().await;
        match self.read_records().await {
            Ok(records) if records.is_empty() => {
                info!("No temp repos left, stopping cleanup");
                self.inner.scheduler.release();
                ControlFlow::Break(())
            }
            Ok(_) => ControlFlow::Continue(()),
            Err(e) => {
                warn!(error = %e, "Could not check remaining temp repos");
                ControlFlow::Continue(())
            }
        }
    }

    async fn append_record(&self, record: TempRepoRecord) -> Result<()> {
        let _guard = self.inner.records_lock.lock().await;
        let append = |current: Option<serde_json::Value>| -> Result<serde_json::Value> {
            let mut records = records_from_value(current);
            records.push(record.clone());
            Ok(serde_json::to_value(records)?)
        };
        self.inner.deps.store.update(TEMP_REPOS_KEY, &append).await
    }

    async fn read_records(&self) -> Result<Vec<TempRepoRecord>> {
        let value = self.inner.deps.store.get(TEMP_REPOS_KEY).await?;
        Ok(records_from_value(value))
    }
}

fn pick_default_branch(branches: &[Branch]) -> Option<String> {
    PREFERRED_BRANCHES
        .iter()
        .find_map(|preferred| branches.iter().find(|b| b.name == *preferred))
        .map(|b| b.name.clone())
}
