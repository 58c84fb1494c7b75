//! Message protocol spoken between front-ends and the router
//!
//! Messages are JSON objects discriminated by a `type` field.

use serde::{Deserialize, Serialize};

use crate::status::UploadStatus;
use crate::Result;

/// Messages sent by a front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    /// Project archive to push to the project's repository
    ZipData {
        data: Vec<u8>,
        #[serde(rename = "projectId")]
        project_id: String,
    },
    /// Liveness probe
    Heartbeat,
    /// Commit message for the next upload on this connection
    SetCommitMessage { message: String },
    /// Mirror a private repository into a temporary public one
    ImportPrivateRepo {
        #[serde(rename = "repoName")]
        repo_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
}

impl InboundMessage {
    /// Protocol name of the message type, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::ZipData { .. } => "ZIP_DATA",
            InboundMessage::Heartbeat => "HEARTBEAT",
            InboundMessage::SetCommitMessage { .. } => "SET_COMMIT_MESSAGE",
            InboundMessage::ImportPrivateRepo { .. } => "IMPORT_PRIVATE_REPO",
        }
    }

    /// Decode one JSON message
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Messages sent to a front-end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    UploadStatus { status: UploadStatus },
    /// The front-end sent something the router could not decode
    ProtocolError { message: String },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
