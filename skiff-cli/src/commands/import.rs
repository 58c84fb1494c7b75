//! Import command - mirror a private repository once

use std::sync::{Arc, Mutex};

use clap::Args;
use skiff_core::{silent_broadcaster, Config, StatusBroadcaster, StatusKind, UploadStatus};
use skiff_github::parse_repo_ref;

use crate::context::AppContext;

/// Mirror a private repository into a temporary public one
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Repository to mirror (`repo`, `owner/repo` or a GitHub URL)
    repo: String,

    /// Branch to mirror (defaults to main or master if listed, else main)
    #[arg(short, long)]
    branch: Option<String>,
}

impl ImportArgs {
    /// Execute the import command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let (owner, repo) = parse_repo_ref(&self.repo)?;
        let mut config = config.clone();
        if owner.is_some() {
            config.github.owner = owner;
        }

        let ctx = AppContext::build(&config, silent_broadcaster()).await?;

        let last: Arc<Mutex<Option<UploadStatus>>> = Arc::new(Mutex::new(None));
        let sink = last.clone();
        let progress: StatusBroadcaster = Arc::new(move |status: UploadStatus| {
            match (&status.status, status.progress) {
                (StatusKind::Uploading, Some(p)) => {
                    println!("[{:>3}%] {}", p, status.message.as_deref().unwrap_or(""));
                }
                _ => println!("{}", status.message.as_deref().unwrap_or("")),
            }
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(status);
            }
        });

        println!("Mirroring {}/{}", ctx.owner, repo);
        ctx.manager
            .import_private_repo_with(&repo, self.branch.as_deref(), progress)
            .await;
        ctx.manager.stop_cleanup();

        let outcome = last.lock().ok().and_then(|slot| slot.clone());
        match outcome {
            Some(status) if status.status == StatusKind::Success => {
                println!();
                println!(
                    "The mirror is deleted after {}s by `skiff serve` or `skiff cleanup`.",
                    config.lifecycle.max_age.as_secs()
                );
                Ok(())
            }
            Some(status) => anyhow::bail!(
                "{}",
                status.message.unwrap_or_else(|| "Import failed".to_string())
            ),
            None => anyhow::bail!("Import finished without reporting a status"),
        }
    }
}
