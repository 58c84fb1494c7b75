//! Background router
//!
//! Multiplexes many front-end connections onto the shared upload and import
//! handlers. Status for a unit of work goes back to the connection that
//! started it and nowhere else. Messages on one connection are handled in
//! arrival order; different connections are independent.

mod protocol;
mod registry;

pub use protocol::{InboundMessage, OutboundMessage};
pub use registry::{ConnectionId, ConnectionRegistry};

use std::sync::{Arc, Weak};

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::lifecycle::TempRepoManager;
use crate::status::{StatusBroadcaster, UploadStatus};
use crate::traits::{OperationTracker, ZipProcessor};
use crate::{Error, Result};

const OPERATION_TYPE_PUSH: &str = "push";

struct RouterInner {
    registry: ConnectionRegistry,
    manager: TempRepoManager,
    zip: Arc<dyn ZipProcessor>,
    tracker: Arc<dyn OperationTracker>,
    default_commit_message: String,
}

/// Routes front-end messages to the upload and import handlers
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("connections", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

/// Unregisters its connection when dropped
struct ConnectionGuard {
    router: Weak<RouterInner>,
    id: ConnectionId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.router.upgrade() {
            if inner.registry.unregister(self.id) {
                info!(connection = %self.id, "Port disconnected");
            }
        }
    }
}

impl Router {
    pub fn new(
        manager: TempRepoManager,
        zip: Arc<dyn ZipProcessor>,
        tracker: Arc<dyn OperationTracker>,
        default_commit_message: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                registry: ConnectionRegistry::new(),
                manager,
                zip,
                tracker,
                default_commit_message: default_commit_message.into(),
            }),
        }
    }

    pub fn manager(&self) -> &TempRepoManager {
        &self.inner.manager
    }

    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.inner.registry.contains(id)
    }

    /// Register a new connection whose outbound messages go to `outbound`
    pub fn connect(
        &self,
        name: impl Into<String>,
        tab_id: Option<u64>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) -> ConnectionId {
        let name = name.into();
        let id = self.inner.registry.register(name.clone(), tab_id, outbound);
        info!(connection = %id, port = %name, ?tab_id, "Port connected");
        id
    }

    /// Release a connection and its session state
    pub fn disconnect(&self, id: ConnectionId) {
        if self.inner.registry.unregister(id) {
            info!(connection = %id, "Port disconnected");
        }
    }

    /// Send a message to one connection, dropping it if the port is gone
    pub fn send(&self, id: ConnectionId, message: OutboundMessage) -> bool {
        self.inner.registry.send(id, message)
    }

    /// Broadcaster publishing to `id` only
    ///
    /// Holds the router weakly and looks the port up on every call, so an
    /// in-flight task never keeps a closed connection alive.
    pub fn broadcaster_for(&self, id: ConnectionId) -> StatusBroadcaster {
        let router = Arc::downgrade(&self.inner);
        Arc::new(move |status: UploadStatus| {
            if let Some(inner) = router.upgrade() {
                inner
                    .registry
                    .send(id, OutboundMessage::UploadStatus { status });
            }
        })
    }

    /// Run one connection to completion
    ///
    /// Messages from `inbound` are handled one at a time, in order. The
    /// connection is unregistered when `inbound` closes or this future is
    /// dropped.
    pub async fn serve_connection(
        &self,
        name: impl Into<String>,
        tab_id: Option<u64>,
        mut inbound: mpsc::Receiver<InboundMessage>,
        outbound: mpsc::UnboundedSender<OutboundMessage>,
    ) {
        let id = self.connect(name, tab_id, outbound);
        let _guard = ConnectionGuard {
            router: Arc::downgrade(&self.inner),
            id,
        };

        while let Some(message) = inbound.recv().await {
            self.handle_message(id, message).await;
        }
    }

    /// Dispatch one message from connection `id`
    pub async fn handle_message(&self, id: ConnectionId, message: InboundMessage) {
        debug!(connection = %id, kind = message.kind(), "Received message");
        if !self.is_connected(id) {
            warn!(connection = %id, kind = message.kind(), "Message from unknown connection");
        }

        match message {
            InboundMessage::ZipData { data, project_id } => {
                self.handle_zip_upload(id, data, project_id).await;
            }
            InboundMessage::Heartbeat => {
                debug!(connection = %id, "Heartbeat");
            }
            InboundMessage::SetCommitMessage { message } => {
                if !self.inner.registry.set_commit_message(id, message) {
                    debug!(connection = %id, "Commit message for disconnected port ignored");
                }
            }
            InboundMessage::ImportPrivateRepo { repo_name, branch } => {
                let manager = self.inner.manager.clone();
                let broadcaster = self.broadcaster_for(id);
                info!(connection = %id, repo = %repo_name, ?branch, "Import requested");
                tokio::spawn(async move {
                    manager
                        .import_private_repo_with(&repo_name, branch.as_deref(), broadcaster)
                        .await;
                });
            }
        }
    }

    async fn handle_zip_upload(&self, id: ConnectionId, data: Vec<u8>, project_id: String) {
        let broadcast = self.broadcaster_for(id);
        let commit_message = self
            .inner
            .registry
            .take_commit_message(id)
            .unwrap_or_else(|| self.inner.default_commit_message.clone());
        let operation_id = format!("{}-{}", OPERATION_TYPE_PUSH, uuid::Uuid::new_v4());

        self.inner
            .tracker
            .start_operation(
                &operation_id,
                OPERATION_TYPE_PUSH,
                &format!("Push project {}", project_id),
                Some(json!({ "projectId": project_id, "bytes": data.len() })),
            )
            .await;

        match self
            .upload_zip(&data, &project_id, &commit_message, &broadcast)
            .await
        {
            Ok(files) => {
                info!(connection = %id, project = %project_id, files, "ZIP upload finished");
                broadcast(UploadStatus::success(format!(
                    "Uploaded {} files for {}",
                    files, project_id
                )));
                self.inner.tracker.complete_operation(&operation_id).await;
            }
            Err(e) => {
                warn!(connection = %id, project = %project_id, error = %e, "ZIP upload failed");
                broadcast(UploadStatus::error(format!("Upload failed: {}", e)));
                self.inner
                    .tracker
                    .fail_operation(&operation_id, &e.to_string())
                    .await;
            }
        }
    }

    async fn upload_zip(
        &self,
        data: &[u8],
        project_id: &str,
        commit_message: &str,
        broadcast: &StatusBroadcaster,
    ) -> Result<usize> {
        broadcast(UploadStatus::uploading(10, "Processing ZIP file"));
        let entries = self.inner.zip.extract(data).await?;
        if entries.is_empty() {
            return Err(Error::Upload("ZIP archive contains no files".to_string()));
        }

        broadcast(UploadStatus::uploading(
            30,
            format!("Extracted {} files", entries.len()),
        ));
        broadcast(UploadStatus::uploading(60, "Uploading files to GitHub"));
        self.inner
            .zip
            .upload(project_id, &entries, commit_message)
            .await?;

        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::fakes::{recording_broadcaster, FakeRemote, FakeZip, ManualClock, RecordingTabs};
    use crate::lifecycle::ManagerDeps;
    use crate::memory::{InMemoryTracker, MemoryStore};
    use crate::operation::OperationStatus;
    use crate::status::StatusKind;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        router: Router,
        zip: Arc<FakeZip>,
        tracker: Arc<InMemoryTracker>,
        tabs: Arc<RecordingTabs>,
    }

    async fn harness() -> Harness {
        let clock = ManualClock::at(1_700_000_000_000);
        let tracker = Arc::new(InMemoryTracker::with_clock(clock.clone()));
        let tabs = RecordingTabs::new();
        let (broadcaster, _) = recording_broadcaster();
        let deps = ManagerDeps {
            remote: FakeRemote::new(),
            store: Arc::new(MemoryStore::new()),
            tracker: tracker.clone(),
            tabs: tabs.clone(),
            clock,
            broadcaster,
        };
        let manager = TempRepoManager::new("octo", deps, LifecycleConfig::default()).await;
        let zip = FakeZip::new();
        let router = Router::new(manager, zip.clone(), tracker.clone(), "Default commit");

        Harness {
            router,
            zip,
            tracker,
            tabs,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<UploadStatus> {
        let mut statuses = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let OutboundMessage::UploadStatus { status } = msg {
                statuses.push(status);
            }
        }
        statuses
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> UploadStatus {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(OutboundMessage::UploadStatus { status }) if status.is_terminal() => {
                        return status;
                    }
                    Some(_) => continue,
                    None => panic!("outbound channel closed"),
                }
            }
        })
        .await
        .expect("terminal status")
    }

    fn zip_message(project: &str) -> InboundMessage {
        InboundMessage::ZipData {
            data: vec![1, 2, 3],
            project_id: project.to_string(),
        }
    }

    #[tokio::test]
    async fn test_zip_upload_reports_only_to_origin() {
        let h = harness().await;
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = h.router.connect("bolt", Some(1), tx_a);
        let _b = h.router.connect("bolt", Some(2), tx_b);

        h.router.handle_message(a, zip_message("sb1-app")).await;

        let statuses = drain(&mut rx_a);
        let progress: Vec<Option<u8>> = statuses.iter().map(|s| s.progress).collect();
        assert_eq!(progress, vec![Some(10), Some(30), Some(60), Some(100)]);
        assert_eq!(statuses.last().unwrap().status, StatusKind::Success);
        assert!(drain(&mut rx_b).is_empty());

        assert_eq!(
            h.zip.uploads(),
            vec![("sb1-app".to_string(), 3, "Default commit".to_string())]
        );
        let ops = h.tracker.list();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type, "push");
        assert_eq!(ops[0].status, OperationStatus::Completed);
    }

    #[tokio::test]
    async fn test_zip_upload_failure_reports_error() {
        let h = harness().await;
        h.zip.fail_upload.store(true, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = h.router.connect("bolt", None, tx);

        h.router.handle_message(id, zip_message("sb1-app")).await;

        let statuses = drain(&mut rx);
        let last = statuses.last().unwrap();
        assert_eq!(last.status, StatusKind::Error);
        assert!(last.message.as_deref().unwrap().contains("push rejected"));
        assert_eq!(h.tracker.list()[0].status, OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_empty_archive_is_an_error() {
        let h = harness().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = h.router.connect("bolt", None, tx);

        h.router
            .handle_message(
                id,
                InboundMessage::ZipData {
                    data: vec![],
                    project_id: "p".to_string(),
                },
            )
            .await;

        let statuses = drain(&mut rx);
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].status, StatusKind::Error);
        assert!(h.zip.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_commit_message_consumed_by_next_upload_only() {
        let h = harness().await;
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = h.router.connect("bolt", None, tx_a);
        let b = h.router.connect("bolt", None, tx_b);

        h.router
            .handle_message(
                a,
                InboundMessage::SetCommitMessage {
                    message: "Add pricing page".to_string(),
                },
            )
            .await;
        h.router.handle_message(b, zip_message("other")).await;
        h.router.handle_message(a, zip_message("mine")).await;
        h.router.handle_message(a, zip_message("mine")).await;

        let messages: Vec<String> = h.zip.uploads().into_iter().map(|(_, _, m)| m).collect();
        assert_eq!(
            messages,
            vec!["Default commit", "Add pricing page", "Default commit"]
        );
    }

    #[tokio::test]
    async fn test_heartbeat_is_silent() {
        let h = harness().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = h.router.connect("bolt", None, tx);

        h.router.handle_message(id, InboundMessage::Heartbeat).await;

        assert!(rx.try_recv().is_err());
        assert!(h.tracker.list().is_empty());
    }

    #[tokio::test]
    async fn test_import_routed_to_originating_connection() {
        let h = harness().await;
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = h.router.connect("bolt", None, tx_a);
        let _b = h.router.connect("bolt", None, tx_b);

        h.router
            .handle_message(
                a,
                InboundMessage::ImportPrivateRepo {
                    repo_name: "secret".to_string(),
                    branch: None,
                },
            )
            .await;

        let terminal = next_terminal(&mut rx_a).await;
        assert_eq!(terminal.status, StatusKind::Success);
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(h.tabs.urls().len(), 1);
        assert_eq!(h.router.manager().get_temp_repos().await.len(), 1);
    }

    #[tokio::test]
    async fn test_serve_connection_processes_in_order_and_unregisters() {
        let h = harness().await;
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        in_tx
            .send(InboundMessage::SetCommitMessage {
                message: "ordered".to_string(),
            })
            .await
            .unwrap();
        in_tx.send(InboundMessage::Heartbeat).await.unwrap();
        in_tx.send(zip_message("proj")).await.unwrap();
        drop(in_tx);

        h.router.serve_connection("bolt", Some(9), in_rx, out_tx).await;

        assert_eq!(h.router.connection_count(), 0);
        assert_eq!(h.zip.uploads()[0].2, "ordered");
        assert_eq!(drain(&mut out_rx).last().unwrap().status, StatusKind::Success);
    }

    #[tokio::test]
    async fn test_disconnect_mid_upload_drops_status_silently() {
        let h = harness().await;
        *h.zip.upload_delay.lock().unwrap() = Some(Duration::from_millis(50));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = h.router.connect("bolt", None, tx);

        let router = h.router.clone();
        let upload = tokio::spawn(async move {
            router.handle_message(id, zip_message("proj")).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        h.router.disconnect(id);
        assert_eq!(h.router.connection_count(), 0);

        upload.await.unwrap();

        // The upload itself was not cancelled
        assert_eq!(h.zip.uploads().len(), 1);
        let statuses = drain(&mut rx);
        assert!(statuses.iter().all(|s| s.status == StatusKind::Uploading));
    }

    #[tokio::test]
    async fn test_aborted_connection_is_unregistered() {
        let h = harness().await;
        let (_in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::unbounded_channel();

        let router = h.router.clone();
        let task = tokio::spawn(async move {
            router.serve_connection("bolt", None, in_rx, out_tx).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.router.connection_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(h.router.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_connections_do_not_cross_talk() {
        let h = harness().await;
        let mut receivers = Vec::new();
        let mut tasks = Vec::new();

        for n in 0..4 {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = h.router.connect("bolt", Some(n), tx);
            receivers.push(rx);
            let router = h.router.clone();
            tasks.push(tokio::spawn(async move {
                router
                    .handle_message(
                        id,
                        InboundMessage::SetCommitMessage {
                            message: format!("commit {}", n),
                        },
                    )
                    .await;
                router
                    .handle_message(id, zip_message(&format!("proj-{}", n)))
                    .await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for (n, rx) in receivers.iter_mut().enumerate() {
            let statuses = drain(rx);
            assert_eq!(statuses.len(), 4);
            assert!(statuses
                .last()
                .unwrap()
                .message
                .as_deref()
                .unwrap()
                .contains(&format!("proj-{}", n)));
        }
        let mut uploads = h.zip.uploads();
        uploads.sort();
        for (n, (project, _, message)) in uploads.into_iter().enumerate() {
            assert_eq!(project, format!("proj-{}", n));
            assert_eq!(message, format!("commit {}", n));
        }
    }
}
