use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{TargetId, TargetKind};
use crate::storage::{row_id, MetadataStore, OptionStore, StorageResult};

/// SQLite-backed option and metadata store. Values are kept as JSON text.
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create tables if they do not exist yet
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS target_meta (
                kind TEXT NOT NULL,
                target_id INTEGER NOT NULL,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL,
                PRIMARY KEY (kind, target_id, meta_key)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_target_meta_lookup ON target_meta(meta_key, meta_value)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_meta(&self, target: &TargetId, key: &str) -> StorageResult<Option<Value>> {
        let id = row_id(target)?;
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT meta_value FROM target_meta WHERE kind = ? AND target_id = ? AND meta_key = ?",
        )
        .bind(target.kind.as_str())
        .bind(id)
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_meta(&self, target: &TargetId, key: &str, value: Value) -> StorageResult<()> {
        let id = row_id(target)?;
        let raw = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO target_meta (kind, target_id, meta_key, meta_value)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind, target_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value
            "#,
        )
        .bind(target.kind.as_str())
        .bind(id)
        .bind(key)
        .bind(raw)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn targets_with_meta(&self, key: &str, value: &Value) -> StorageResult<Vec<TargetId>> {
        let raw = serde_json::to_string(value)?;
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT kind, target_id FROM target_meta
            WHERE meta_key = ? AND meta_value = ?
            ORDER BY kind, target_id
            "#,
        )
        .bind(key)
        .bind(raw)
        .fetch_all(self.pool.as_ref())
        .await?;

        let targets = rows
            .into_iter()
            .filter_map(|(kind, id)| {
                let kind = kind.parse::<TargetKind>().ok()?;
                let id = u64::try_from(id).ok()?;
                Some(TargetId { kind, id })
            })
            .collect();
        Ok(targets)
    }
}

#[async_trait]
impl OptionStore for SqliteStore {
    async fn get_option(&self, key: &str) -> StorageResult<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM options WHERE name = ?")
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?;

        match row {
            Some((raw,)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_option(&self, key: &str, value: Value) -> StorageResult<()> {
        let raw = serde_json::to_string(&value)?;
        sqlx::query(
            r#"
            INSERT INTO options (name, value) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(raw)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}
