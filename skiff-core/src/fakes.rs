//! Scriptable collaborators shared by the lifecycle and router tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::memory::MemoryStore;
use crate::record::temp_repo_name;
use crate::status::{StatusBroadcaster, UploadStatus};
use crate::traits::{
    Branch, BranchCommit, Clock, KeyValueStore, ProgressFn, RemoteRepoService,
    RepositoryMetadata, TabOpener, ZipEntry, ZipProcessor,
};
use crate::{Error, Result};

/// Remote calls observed by `FakeRemote`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    ListBranches { repo: String },
    Create { source: String, branch: Option<String> },
    Clone { source: String, target: String, branch: String },
    Visibility { repo: String, private: bool },
    Delete { owner: String, repo: String },
}

#[derive(Default)]
pub struct FakeRemote {
    pub branches: Mutex<Vec<String>>,
    pub fail_list_branches: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_clone: AtomicBool,
    pub fail_visibility: AtomicBool,
    pub fail_delete: Mutex<HashSet<String>>,
    pub clone_progress: Mutex<Vec<u8>>,
    pub clone_delay: Mutex<Option<Duration>>,
    pub delete_delay: Mutex<Option<Duration>>,
    pub calls: Mutex<Vec<RemoteCall>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        let remote = Self::default();
        *remote.branches.lock().unwrap() = vec!["develop".to_string(), "main".to_string()];
        *remote.clone_progress.lock().unwrap() = vec![0, 25, 50, 75, 100];
        Arc::new(remote)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Delete { repo, .. } => Some(repo),
                _ => None,
            })
            .collect()
    }

    pub fn fail_delete_of(&self, repo: &str) {
        self.fail_delete.lock().unwrap().insert(repo.to_string());
    }

    pub fn allow_delete_of(&self, repo: &str) {
        self.fail_delete.lock().unwrap().remove(repo);
    }

    fn record(&self, call: RemoteCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteRepoService for FakeRemote {
    async fn list_branches(&self, _owner: &str, repo: &str) -> Result<Vec<Branch>> {
        self.record(RemoteCall::ListBranches {
            repo: repo.to_string(),
        });
        if self.fail_list_branches.load(Ordering::SeqCst) {
            return Err(Error::Remote("branch listing unavailable".to_string()));
        }
        Ok(self
            .branches
            .lock()
            .unwrap()
            .iter()
            .map(|name| Branch {
                name: name.clone(),
                commit: BranchCommit {
                    sha: "abc123".to_string(),
                    url: format!("https://api.example/commits/{}", name),
                },
                protected: false,
            })
            .collect())
    }

    async fn create_temporary_public_repo(
        &self,
        _owner: &str,
        source_repo: &str,
        branch: Option<&str>,
    ) -> Result<String> {
        self.record(RemoteCall::Create {
            source: source_repo.to_string(),
            branch: branch.map(String::from),
        });
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Remote("repository creation refused".to_string()));
        }
        Ok(temp_repo_name(source_repo, 0))
    }

    async fn clone_repo_contents(
        &self,
        _source_owner: &str,
        source_repo: &str,
        _target_owner: &str,
        target_repo: &str,
        branch: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<()> {
        self.record(RemoteCall::Clone {
            source: source_repo.to_string(),
            target: target_repo.to_string(),
            branch: branch.to_string(),
        });
        let delay = *self.clone_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let steps = self.clone_progress.lock().unwrap().clone();
        if let Some(report) = on_progress {
            for step in steps {
                report(step);
            }
        }
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(Error::Remote("clone failed halfway".to_string()));
        }
        Ok(())
    }

    async fn update_repo_visibility(
        &self,
        _owner: &str,
        repo: &str,
        is_private: bool,
    ) -> Result<RepositoryMetadata> {
        self.record(RemoteCall::Visibility {
            repo: repo.to_string(),
            private: is_private,
        });
        if self.fail_visibility.load(Ordering::SeqCst) {
            return Err(Error::Remote("visibility change rejected".to_string()));
        }
        Ok(RepositoryMetadata {
            name: repo.to_string(),
            full_name: None,
            private: is_private,
            html_url: None,
        })
    }

    async fn delete_repo(&self, owner: &str, repo: &str) -> Result<()> {
        self.record(RemoteCall::Delete {
            owner: owner.to_string(),
            repo: repo.to_string(),
        });
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_delete.lock().unwrap().contains(repo) {
            return Err(Error::Remote(format!("cannot delete {}", repo)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTabs {
    pub opened: Mutex<Vec<(String, bool)>>,
    pub fail: AtomicBool,
}

impl RecordingTabs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn urls(&self) -> Vec<String> {
        self.opened.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait]
impl TabOpener for RecordingTabs {
    async fn open_tab(&self, url: &str, active: bool) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Tab("no browser window".to_string()));
        }
        self.opened.lock().unwrap().push((url.to_string(), active));
        Ok(())
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(millis)))
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Store whose writes can be switched off
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("quota exceeded".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

#[derive(Default)]
pub struct FakeZip {
    pub uploads: Mutex<Vec<(String, usize, String)>>,
    pub fail_upload: AtomicBool,
    pub upload_delay: Mutex<Option<Duration>>,
}

impl FakeZip {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn uploads(&self) -> Vec<(String, usize, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZipProcessor for FakeZip {
    async fn extract(&self, data: &[u8]) -> Result<Vec<ZipEntry>> {
        if data.is_empty() {
            return Err(Error::Upload("empty archive".to_string()));
        }
        Ok(data
            .iter()
            .enumerate()
            .map(|(i, b)| ZipEntry {
                path: format!("file-{}.txt", i),
                contents: vec![*b],
            })
            .collect())
    }

    async fn upload(&self, project_id: &str, entries: &[ZipEntry], commit_message: &str) -> Result<()> {
        let delay = *self.upload_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(Error::Upload("push rejected".to_string()));
        }
        self.uploads.lock().unwrap().push((
            project_id.to_string(),
            entries.len(),
            commit_message.to_string(),
        ));
        Ok(())
    }
}

/// Broadcaster that keeps every status it is given
pub fn recording_broadcaster() -> (StatusBroadcaster, Arc<Mutex<Vec<UploadStatus>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let broadcaster: StatusBroadcaster = Arc::new(move |status| sink.lock().unwrap().push(status));
    (broadcaster, log)
}
