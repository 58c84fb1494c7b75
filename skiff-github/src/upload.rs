//! ZIP project uploads
//!
//! Project archives arrive as raw bytes from the router. They are unpacked
//! in memory and every file is committed to the project's target repository
//! through the contents API, creating or updating as needed.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::sync::Arc;

use async_trait::async_trait;
use skiff_core::{Config, ZipEntry, ZipProcessor};
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

/// Paths never pushed from an archive
const SKIPPED_PREFIXES: [&str; 2] = [".git/", "node_modules/"];

/// Unpack a ZIP archive into its file entries
///
/// Directories are dropped. When every file shares one top-level directory
/// that directory is stripped, so `project/src/a.ts` becomes `src/a.ts`.
pub fn extract_archive(data: &[u8]) -> Result<Vec<ZipEntry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let Some(path) = file.enclosed_name() else {
            debug!(name = %file.name(), "Skipping entry with unsafe path");
            continue;
        };
        let path = path.to_string_lossy().replace('\\', "/");

        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)
            .map_err(|e| Error::Other(format!("Failed to read {}: {}", path, e)))?;
        entries.push(ZipEntry { path, contents });
    }

    strip_shared_root(&mut entries);
    entries.retain(|e| !is_skipped(&e.path));
    Ok(entries)
}

fn strip_shared_root(entries: &mut [ZipEntry]) {
    let roots: HashSet<Option<&str>> = entries
        .iter()
        .map(|e| e.path.split_once('/').map(|(root, _)| root))
        .collect();

    if roots.len() != 1 {
        return;
    }
    let Some(Some(root)) = roots.into_iter().next() else {
        return;
    };
    let prefix = format!("{}/", root);
    for entry in entries.iter_mut() {
        if let Some(rest) = entry.path.strip_prefix(&prefix) {
            entry.path = rest.to_string();
        }
    }
}

fn is_skipped(path: &str) -> bool {
    SKIPPED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix) || path.contains(&format!("/{}", prefix)))
}

/// `ZipProcessor` committing archive contents to GitHub
#[derive(Debug, Clone)]
pub struct ZipUploader {
    github: Arc<GitHubClient>,
    owner: String,
    config: Config,
}

impl ZipUploader {
    pub fn new(github: Arc<GitHubClient>, owner: impl Into<String>, config: Config) -> Self {
        Self {
            github,
            owner: owner.into(),
            config,
        }
    }

    async fn existing_sha(&self, repo: &str, path: &str, branch: &str) -> Option<String> {
        self.github
            .client()
            .repos(&self.owner, repo)
            .get_content()
            .path(path)
            .r#ref(branch)
            .send()
            .await
            .ok()
            .and_then(|items| items.items.into_iter().next())
            .map(|content| content.sha)
    }
}

#[async_trait]
impl ZipProcessor for ZipUploader {
    async fn extract(&self, data: &[u8]) -> skiff_core::Result<Vec<ZipEntry>> {
        let data = data.to_vec();
        let entries = tokio::task::spawn_blocking(move || extract_archive(&data))
            .await
            .map_err(|e| skiff_core::Error::Upload(format!("Extraction task failed: {}", e)))??;
        Ok(entries)
    }

    async fn upload(
        &self,
        project_id: &str,
        entries: &[ZipEntry],
        commit_message: &str,
    ) -> skiff_core::Result<()> {
        let target = self.config.project_target(project_id);
        info!(
            project_id,
            repo = %target.repo,
            branch = %target.branch,
            files = entries.len(),
            "Uploading project files"
        );

        let repos = self.github.client().repos(&self.owner, &target.repo);
        for entry in entries {
            match self.existing_sha(&target.repo, &entry.path, &target.branch).await {
                Some(sha) => {
                    debug!(path = %entry.path, "Updating file");
                    repos
                        .update_file(&entry.path, commit_message, &entry.contents, sha)
                        .branch(&target.branch)
                        .send()
                        .await
                        .map_err(|e| Error::from_api(e, &target.repo))?;
                }
                None => {
                    debug!(path = %entry.path, "Creating file");
                    repos
                        .create_file(&entry.path, commit_message, &entry.contents)
                        .branch(&target.branch)
                        .send()
                        .await
                        .map_err(|e| Error::from_api(e, &target.repo))?;
                }
            }
        }

        Ok(())
    }
}
