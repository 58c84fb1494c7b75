//! Repository for tracked operations

use std::sync::Arc;

use async_trait::async_trait;
use skiff_core::{Clock, Operation, OperationStatus, SystemClock};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, warn};

use crate::{Error, Result};

type OperationRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    Option<i64>,
);

const SELECT_COLUMNS: &str =
    "SELECT id, op_type, status, description, metadata, error, start_time, end_time FROM operations";

/// Operation history stored in the `operations` table
///
/// Also acts as the `OperationTracker` for the lifecycle manager and router.
#[derive(Clone)]
pub struct OperationsRepo {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OperationsRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationsRepo").finish_non_exhaustive()
    }
}

impl OperationsRepo {
    /// Create a new repository instance
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Insert a started operation, replacing any previous one with the same id
    pub async fn insert(&self, op: &Operation) -> Result<()> {
        let metadata = op.metadata.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT OR REPLACE INTO operations
                (id, op_type, status, description, metadata, error, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&op.id)
        .bind(&op.op_type)
        .bind(op.status.as_str())
        .bind(&op.description)
        .bind(metadata)
        .bind(op.error.as_deref())
        .bind(op.start_time)
        .bind(op.end_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a started operation to `status`
    ///
    /// Returns false when the operation is unknown or already finished.
    pub async fn finish(&self, id: &str, status: OperationStatus, error: Option<&str>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE operations SET status = ?1, error = ?2, end_time = ?3
             WHERE id = ?4 AND status = 'started'",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(self.clock.now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Find an operation by id
    pub async fn get(&self, id: &str) -> Result<Option<Operation>> {
        let row: Option<OperationRow> = sqlx::query_as(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_row).transpose()
    }

    /// Most recent operations, newest first
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Operation>> {
        let rows: Vec<OperationRow> = sqlx::query_as(&format!(
            "{} ORDER BY start_time DESC, id DESC LIMIT ?1",
            SELECT_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }
}

fn map_row(row: OperationRow) -> Result<Operation> {
    let (id, op_type, status, description, metadata, error, start_time, end_time) = row;
    let status: OperationStatus = status
        .parse()
        .map_err(|e: skiff_core::Error| Error::InvalidData(e.to_string()))?;
    let metadata = metadata
        .as_deref()
        .map(|raw| serde_json::from_str(raw))
        .transpose()?;

    Ok(Operation {
        id,
        op_type,
        status,
        description,
        metadata,
        error,
        start_time,
        end_time,
    })
}

#[async_trait]
impl skiff_core::OperationTracker for OperationsRepo {
    async fn start_operation(
        &self,
        id: &str,
        op_type: &str,
        description: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let op = Operation::started(id, op_type, description, metadata, self.clock.now_millis());
        match self.insert(&op).await {
            Ok(()) => debug!(id, op_type, "Operation started"),
            Err(e) => warn!(id, error = %e, "Failed to record operation start"),
        }
    }

    async fn complete_operation(&self, id: &str) {
        match self.finish(id, OperationStatus::Completed, None).await {
            Ok(true) => debug!(id, "Operation completed"),
            Ok(false) => warn!(id, "Completion for unknown or finished operation ignored"),
            Err(e) => warn!(id, error = %e, "Failed to record operation completion"),
        }
    }

    async fn fail_operation(&self, id: &str, error: &str) {
        match self.finish(id, OperationStatus::Failed, Some(error)).await {
            Ok(true) => debug!(id, error, "Operation failed"),
            Ok(false) => warn!(id, "Failure for unknown or finished operation ignored"),
            Err(e) => warn!(id, error = %e, "Failed to record operation failure"),
        }
    }
}
