//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Repository not found or not accessible
    #[error("Repository {0} not found")]
    RepoNotFound(String),

    /// Rate limit exceeded
    #[error("GitHub rate limit exceeded: {0}")]
    RateLimited(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed ZIP archive
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify an octocrab error against `repo`
    pub(crate) fn from_api(err: octocrab::Error, repo: &str) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } if source.message.contains("Not Found") => {
                Error::RepoNotFound(repo.to_string())
            }
            octocrab::Error::GitHub { source, .. }
                if source.message.contains("Bad credentials") =>
            {
                Error::Auth("Invalid GitHub token".to_string())
            }
            octocrab::Error::GitHub { source, .. }
                if source.message.contains("rate limit") =>
            {
                Error::RateLimited(source.message.clone())
            }
            _ => Error::Api(err),
        }
    }
}

impl From<Error> for skiff_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Zip(e) => skiff_core::Error::Upload(e.to_string()),
            other => skiff_core::Error::Remote(other.to_string()),
        }
    }
}
