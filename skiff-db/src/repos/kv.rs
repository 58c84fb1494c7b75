//! SQLite-backed key-value store

use async_trait::async_trait;
use chrono::Utc;
use skiff_core::UpdateFn;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::{Error, Result};

/// `KeyValueStore` persisting JSON values in the `kv_store` table
///
/// Several processes may share the database file. `update` runs its read
/// and write inside one `BEGIN IMMEDIATE` transaction so they serialize.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store over `pool`
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn load(conn: &mut SqliteConnection, key: &str) -> Result<Option<serde_json::Value>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?1")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(|(raw,)| {
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "Stored value is not JSON, returning it as a string");
            serde_json::Value::String(raw)
        })
    }))
}

async fn save(conn: &mut SqliteConnection, key: &str, value: &serde_json::Value) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    sqlx::query(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(raw)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    debug!(key, "Stored value");
    Ok(())
}

#[async_trait]
impl skiff_core::KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> skiff_core::Result<Option<serde_json::Value>> {
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        Ok(load(&mut conn, key).await?)
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> skiff_core::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        Ok(save(&mut conn, key, &value).await?)
    }

    async fn remove(&self, key: &str) -> skiff_core::Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn update(&self, key: &str, apply: &UpdateFn<'_>) -> skiff_core::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(Error::from)?;
        // Takes the write lock up front; other writers wait on busy_timeout.
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(Error::from)?;

        let applied: skiff_core::Result<()> = async {
            let current = load(&mut conn, key).await?;
            let next = apply(current)?;
            save(&mut conn, key, &next).await?;
            Ok(())
        }
        .await;

        let end = if applied.is_ok() { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = sqlx::query(end).execute(&mut *conn).await {
            warn!(key, statement = end, error = %e, "Failed to end transaction, dropping connection");
            conn.close_on_drop();
            applied?;
            return Err(Error::from(e).into());
        }
        applied
    }
}
