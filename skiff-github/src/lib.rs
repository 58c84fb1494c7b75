//! Skiff GitHub - GitHub integration for Skiff
//!
//! Implements the remote repository service used by the mirror lifecycle
//! and the ZIP processor used by the router's upload path.

mod client;
mod error;
mod mirror;
mod upload;

pub use client::{parse_repo_ref, GitHubClient};
pub use error::{Error, Result};
pub use mirror::GitHubMirrorService;
pub use upload::{extract_archive, ZipUploader};
