//! GitHub API client using octocrab

use crate::{Error, Result};
use octocrab::Octocrab;
use skiff_core::Secrets;
use tracing::{debug, info};

/// Authenticated GitHub API client
pub struct GitHubClient {
    client: Octocrab,
}

impl GitHubClient {
    /// Create a new client from the configured token
    ///
    /// Token is loaded from (in priority order):
    /// 1. SKIFF_GITHUB_TOKEN or GITHUB_TOKEN environment variable
    /// 2. ~/.config/skiff/secrets.toml
    pub fn new() -> Result<Self> {
        let secrets = Secrets::load().map_err(|e| Error::Auth(e.to_string()))?;

        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/skiff/secrets.toml"
                    .to_string(),
            )
        })?;

        Self::with_token(token)
    }

    /// Create a client for an explicit personal access token
    pub fn with_token(token: impl Into<String>) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!("Created GitHub client");
        Ok(Self { client })
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }

    /// Login of the account the token belongs to
    pub async fn authenticated_login(&self) -> Result<String> {
        debug!("Resolving authenticated user");
        let user = self.client.current().user().await.map_err(|e| match &e {
            octocrab::Error::GitHub { source, .. }
                if source.message.contains("Bad credentials") =>
            {
                Error::Auth("Invalid GitHub token".to_string())
            }
            _ => Error::Api(e),
        })?;

        info!(login = %user.login, "GitHub connection successful");
        Ok(user.login)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient").finish_non_exhaustive()
    }
}

/// Split a repository reference into an optional owner and a name
///
/// Supports formats:
/// - repo
/// - owner/repo
/// - https://github.com/owner/repo
/// - git@github.com:owner/repo.git
pub fn parse_repo_ref(input: &str) -> Result<(Option<String>, String)> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::Parse("Repository name is empty".to_string()));
    }

    if !input.contains(':') && !input.contains('/') {
        return Ok((None, input.trim_end_matches(".git").to_string()));
    }

    if !input.contains("://") && !input.contains('@') {
        let parts: Vec<&str> = input.split('/').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            return Ok((
                Some(parts[0].to_string()),
                parts[1].trim_end_matches(".git").to_string(),
            ));
        }
        return Err(Error::Parse(format!(
            "Invalid repository format: {}. Expected owner/repo",
            input
        )));
    }

    if input.starts_with("https://") || input.starts_with("http://") {
        let url = url::Url::parse(input).map_err(|e| Error::Parse(e.to_string()))?;
        let path = url.path().trim_start_matches('/').trim_end_matches(".git");
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() >= 2 && !parts[1].is_empty() {
            return Ok((Some(parts[0].to_string()), parts[1].to_string()));
        }
        return Err(Error::Parse(format!("Invalid GitHub URL path: {}", path)));
    }

    if input.starts_with("git@") {
        if let Some(path) = input.split(':').nth(1) {
            let path = path.trim_end_matches(".git");
            let parts: Vec<&str> = path.split('/').collect();
            if parts.len() >= 2 {
                return Ok((Some(parts[0].to_string()), parts[1].to_string()));
            }
        }
        return Err(Error::Parse(format!("Invalid SSH URL: {}", input)));
    }

    Err(Error::Parse(format!("Unrecognized repository format: {}", input)))
}
