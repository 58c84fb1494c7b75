//! Operations command - show recent tracked operations

use chrono::{TimeZone, Utc};
use clap::Args;
use skiff_core::OperationStatus;
use skiff_db::Database;

/// Show recent tracked operations
#[derive(Args, Debug)]
pub struct OperationsArgs {
    /// Maximum number of operations to show
    #[arg(short, long, default_value_t = 20)]
    limit: u32,
}

impl OperationsArgs {
    /// Execute the operations command
    pub async fn execute(&self) -> anyhow::Result<()> {
        let db = Database::open_default()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
        let ops = db
            .operations()
            .list_recent(self.limit)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to query operations: {}", e))?;

        if ops.is_empty() {
            println!("No operations recorded.");
            return Ok(());
        }

        for op in &ops {
            let started = Utc
                .timestamp_millis_opt(op.start_time)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            let duration = op
                .end_time
                .map(|end| format!(" in {}ms", end - op.start_time))
                .unwrap_or_default();

            println!("{} [{}] {}{}", started, op.op_type, op.status, duration);
            println!("    {} ({})", op.description, op.id);
            if op.status == OperationStatus::Failed {
                if let Some(ref error) = op.error {
                    println!("    Error: {}", error);
                }
            }
        }

        Ok(())
    }
}
