use std::str::FromStr;

use crate::db::models::{KvRow, StorageKey};
use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database sees its own empty store.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (\
                key TEXT PRIMARY KEY NOT NULL,\
                value TEXT NOT NULL,\
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP\
            );",
        )
        .execute(&pool)
        .await?;

        info!("Key-value store ready at {}", database_url);
        Ok(Self { pool })
    }

    pub async fn get(&self, key: StorageKey) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: StorageKey, value: &str) -> Result<()> {
        debug!(key = key.as_str(), value, "kv_store set");
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key.as_str())
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn entries(&self) -> Result<Vec<KvRow>> {
        let rows = sqlx::query_as::<_, KvRow>("SELECT key, value FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
