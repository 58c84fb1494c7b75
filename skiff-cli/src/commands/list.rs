//! List command - show tracked temporary mirrors

use chrono::{TimeZone, Utc};
use clap::Args;
use skiff_core::{silent_broadcaster, Clock, Config, SystemClock};

use crate::context::AppContext;

/// List tracked temporary mirrors
#[derive(Args, Debug)]
pub struct ListArgs {}

impl ListArgs {
    /// Execute the list command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ctx = AppContext::build(config, silent_broadcaster()).await?;
        ctx.manager.stop_cleanup();

        let records = ctx.manager.get_temp_repos().await;
        if records.is_empty() {
            println!("No temporary mirrors tracked.");
            return Ok(());
        }

        let now = SystemClock.now_millis();
        let max_age = config.lifecycle.max_age_millis();
        println!("Temporary mirrors:");
        println!();
        for record in &records {
            let created = Utc
                .timestamp_millis_opt(record.created_at)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| record.created_at.to_string());
            println!("  {}/{}", record.owner, record.temp_repo);
            println!("      Source: {}@{}", record.original_repo, record.branch);
            println!("      Created: {}", created);
            println!("      Age: {}s", record.age_millis(now) / 1000);
            if record.is_expired(now, max_age) {
                println!("      Status: Expired (pending cleanup)");
            }
            println!();
        }

        Ok(())
    }
}
