//! Error types for Skiff

use thiserror::Error;

/// Result type alias for Skiff operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Skiff operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by the remote repository service
    #[error("Remote repository error: {0}")]
    Remote(String),

    /// Failure reported by the durable key-value store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Opening a browser tab failed
    #[error("Tab error: {0}")]
    Tab(String),

    /// ZIP extraction or upload failed
    #[error("Upload error: {0}")]
    Upload(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
