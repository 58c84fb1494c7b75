//! Cleanup command - delete expired temporary mirrors

use clap::Args;
use skiff_core::{silent_broadcaster, Config};

use crate::context::AppContext;

/// Delete expired temporary mirrors
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Delete every tracked mirror regardless of age
    #[arg(short, long)]
    force: bool,
}

impl CleanupArgs {
    /// Execute the cleanup command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ctx = AppContext::build(config, silent_broadcaster()).await?;
        ctx.manager.stop_cleanup();

        let report = ctx.manager.cleanup_temp_repos(self.force).await;

        for repo in &report.deleted {
            println!("Deleted {}/{}", ctx.owner, repo);
        }
        for repo in &report.failed {
            println!("Failed to delete {}/{} (will retry)", ctx.owner, repo);
        }
        if report.deleted.is_empty() && report.failed.is_empty() {
            println!("Nothing to clean up.");
        }
        println!("{} mirror(s) still tracked.", report.retained);

        Ok(())
    }
}
