//! Wiring shared by every command that talks to GitHub

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use skiff_core::{
    Config, ManagerDeps, StatusBroadcaster, SystemClock, TabOpener, TempRepoManager,
};
use skiff_db::Database;
use skiff_github::{GitHubClient, GitHubMirrorService};
use tracing::info;

/// Opens mirror tabs by handing the URL to the user
#[derive(Debug, Default)]
pub struct ConsoleTabOpener;

#[async_trait]
impl TabOpener for ConsoleTabOpener {
    async fn open_tab(&self, url: &str, active: bool) -> skiff_core::Result<()> {
        info!(url, active, "Mirror ready");
        println!("Open: {}", url);
        Ok(())
    }
}

/// Everything a command needs to run the mirror lifecycle
pub struct AppContext {
    pub github: Arc<GitHubClient>,
    pub owner: String,
    pub db: Database,
    pub manager: TempRepoManager,
}

impl AppContext {
    /// Connect to GitHub and the local database and build the manager
    ///
    /// `broadcaster` receives status for imports started without a
    /// per-call broadcaster.
    pub async fn build(config: &Config, broadcaster: StatusBroadcaster) -> anyhow::Result<Self> {
        let github = Arc::new(GitHubClient::new().context("Failed to create GitHub client")?);
        let login = github
            .authenticated_login()
            .await
            .context("Failed to resolve the authenticated GitHub user")?;
        let owner = config.github.owner.clone().unwrap_or_else(|| login.clone());

        let db = Database::open_default()
            .await
            .context("Failed to open database")?;

        let deps = ManagerDeps {
            remote: Arc::new(GitHubMirrorService::new(github.clone(), login)),
            store: Arc::new(db.store()),
            tracker: Arc::new(db.operations()),
            tabs: Arc::new(ConsoleTabOpener),
            clock: Arc::new(SystemClock),
            broadcaster,
        };
        let manager = TempRepoManager::new(owner.clone(), deps, config.lifecycle.clone()).await;

        Ok(Self {
            github,
            owner,
            db,
            manager,
        })
    }
}
