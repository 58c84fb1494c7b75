//! Upload/import status updates published to observers

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kind of status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Uploading,
    Success,
    Error,
}

/// A status update as seen by front-ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadStatus {
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl UploadStatus {
    pub fn uploading(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Uploading,
            message: Some(message.into()),
            progress: Some(progress.min(100)),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Success,
            message: Some(message.into()),
            progress: Some(100),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Error,
            message: Some(message.into()),
            progress: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StatusKind::Success | StatusKind::Error)
    }
}

/// Single-argument callback publishing status updates to one observer
pub type StatusBroadcaster = Arc<dyn Fn(UploadStatus) + Send + Sync>;

/// Broadcaster that drops every update
pub fn silent_broadcaster() -> StatusBroadcaster {
    Arc::new(|_| {})
}

/// Clamps reported progress so observers never see it go backwards
#[derive(Debug, Default)]
pub(crate) struct ProgressGate {
    high_water: AtomicU8,
}

impl ProgressGate {
    /// Record `progress` and return the value to publish
    pub(crate) fn advance(&self, progress: u8) -> u8 {
        let progress = progress.min(100);
        let previous = self.high_water.fetch_max(progress, Ordering::SeqCst);
        previous.max(progress)
    }
}
