//! Temporary mirror repositories on GitHub
//!
//! Mirrors are built through the REST API only: the source tree is walked
//! with the git trees endpoint and every blob is written into the mirror
//! through the contents endpoint. Nothing is cloned to local disk.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use skiff_core::{
    temp_repo_name, Branch, BranchCommit, ProgressFn, RemoteRepoService, RepositoryMetadata,
};
use tracing::{debug, info, warn};

use crate::{Error, GitHubClient, Result};

const API_BASE: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct GitTree {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitBlob {
    content: String,
    encoding: String,
}

/// `RemoteRepoService` backed by the GitHub REST API
#[derive(Debug, Clone)]
pub struct GitHubMirrorService {
    github: Arc<GitHubClient>,
    login: String,
}

impl GitHubMirrorService {
    /// `login` is the authenticated account; other owners are treated as orgs
    pub fn new(github: Arc<GitHubClient>, login: impl Into<String>) -> Self {
        Self {
            github,
            login: login.into(),
        }
    }

    fn create_route(&self, owner: &str) -> String {
        if owner.eq_ignore_ascii_case(&self.login) {
            "/user/repos".to_string()
        } else {
            format!("/orgs/{}/repos", owner)
        }
    }

    async fn copy_blob(
        &self,
        source: (&str, &str),
        target: (&str, &str),
        branch: &str,
        entry: &TreeEntry,
    ) -> crate::Result<()> {
        let client = self.github.client();
        let blob: GitBlob = client
            .get(
                format!("/repos/{}/{}/git/blobs/{}", source.0, source.1, entry.sha),
                None::<&()>,
            )
            .await
            .map_err(|e| Error::from_api(e, source.1))?;

        if blob.encoding != "base64" {
            return Err(Error::Parse(format!(
                "Unexpected blob encoding {} for {}",
                blob.encoding, entry.path
            )));
        }
        let content: String = blob.content.chars().filter(|c| !c.is_whitespace()).collect();

        let _: serde_json::Value = client
            .put(
                contents_route(target.0, target.1, &entry.path)?,
                Some(&mirror_commit_body(&entry.path, &content, branch)),
            )
            .await
            .map_err(|e| Error::from_api(e, target.1))?;

        Ok(())
    }
}

/// Contents API body committing one mirrored file onto `branch`
///
/// The first commit into the empty mirror creates `branch`.
fn mirror_commit_body(path: &str, content: &str, branch: &str) -> serde_json::Value {
    json!({
        "message": format!("Mirror {}", path),
        "content": content,
        "branch": branch,
    })
}

/// `/repos/{owner}/{repo}/contents/{path}` with each path segment escaped
fn contents_route(owner: &str, repo: &str, path: &str) -> Result<String> {
    let mut url = url::Url::parse(API_BASE).map_err(|e| Error::Parse(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| Error::Parse("API base cannot carry a path".to_string()))?
        .extend(["repos", owner, repo, "contents"])
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url.path().to_string())
}

#[async_trait]
impl RemoteRepoService for GitHubMirrorService {
    async fn list_branches(&self, owner: &str, repo: &str) -> skiff_core::Result<Vec<Branch>> {
        debug!(owner, repo, "Listing branches");
        let page = self
            .github
            .client()
            .repos(owner, repo)
            .list_branches()
            .per_page(100)
            .send()
            .await
            .map_err(|e| Error::from_api(e, repo))?;

        Ok(page
            .items
            .into_iter()
            .map(|b| Branch {
                name: b.name,
                commit: BranchCommit {
                    sha: b.commit.sha,
                    url: b.commit.url.to_string(),
                },
                protected: b.protected,
            })
            .collect())
    }

    async fn create_temporary_public_repo(
        &self,
        owner: &str,
        source_repo: &str,
        branch: Option<&str>,
    ) -> skiff_core::Result<String> {
        let name = temp_repo_name(source_repo, chrono::Utc::now().timestamp_millis());
        let description = format!(
            "Temporary mirror of {}/{}{}",
            owner,
            source_repo,
            branch.map(|b| format!(" ({})", b)).unwrap_or_default()
        );

        // Created private and only published once the contents are copied
        let repo: octocrab::models::Repository = self
            .github
            .client()
            .post(
                self.create_route(owner),
                Some(&json!({
                    "name": name,
                    "private": true,
                    "auto_init": false,
                    "description": description,
                })),
            )
            .await
            .map_err(|e| Error::from_api(e, &name))?;

        info!(owner, repo = %repo.name, "Created mirror repository");
        Ok(repo.name)
    }

    async fn clone_repo_contents(
        &self,
        source_owner: &str,
        source_repo: &str,
        target_owner: &str,
        target_repo: &str,
        branch: &str,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> skiff_core::Result<()> {
        let report = |p: u8| {
            if let Some(f) = on_progress {
                f(p);
            }
        };
        report(0);

        let tree: GitTree = self
            .github
            .client()
            .get(
                format!(
                    "/repos/{}/{}/git/trees/{}",
                    source_owner, source_repo, branch
                ),
                Some(&[("recursive", "1")]),
            )
            .await
            .map_err(|e| Error::from_api(e, source_repo))?;

        if tree.truncated {
            warn!(
                source_repo,
                branch, "Tree listing truncated, mirror will be incomplete"
            );
        }

        let blobs: Vec<&TreeEntry> = tree.tree.iter().filter(|e| e.kind == "blob").collect();
        let total = blobs.len();
        info!(source_repo, target_repo, branch, files = total, "Copying repository contents");

        for (copied, entry) in blobs.into_iter().enumerate() {
            self.copy_blob(
                (source_owner, source_repo),
                (target_owner, target_repo),
                branch,
                entry,
            )
            .await?;
            report(((copied + 1) * 100 / total) as u8);
        }

        report(100);
        Ok(())
    }

    async fn update_repo_visibility(
        &self,
        owner: &str,
        repo: &str,
        is_private: bool,
    ) -> skiff_core::Result<RepositoryMetadata> {
        let updated: octocrab::models::Repository = self
            .github
            .client()
            .patch(
                format!("/repos/{}/{}", owner, repo),
                Some(&json!({ "private": is_private })),
            )
            .await
            .map_err(|e| Error::from_api(e, repo))?;

        info!(owner, repo, is_private, "Updated repository visibility");
        Ok(RepositoryMetadata {
            name: updated.name,
            full_name: updated.full_name,
            private: updated.private.unwrap_or(is_private),
            html_url: updated.html_url.map(|u| u.to_string()),
        })
    }

    async fn delete_repo(&self, owner: &str, repo: &str) -> skiff_core::Result<()> {
        self.github
            .client()
            .repos(owner, repo)
            .delete()
            .await
            .map_err(|e| Error::from_api(e, repo))?;

        info!(owner, repo, "Deleted repository");
        Ok(())
    }
}
