//! SQLx-backed context store
//!
//! Keeps one row per session in SQLite. The full record lives in a JSON
//! `context_data` column; the columns next to it exist for versioning, expiry
//! sweeps and tenant lookups.

use super::model::ConversationContext;
use super::store::ContextStore;
use crate::config::DatabaseConfig;
use crate::error::{FlowError, Result};
use crate::utils::short_id;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

#[derive(Clone)]
pub struct SqliteContextStore {
    pool: SqlitePool,
}

impl SqliteContextStore {
    /// Open (or create) the store at the given file path.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Private in-memory database. The database lives only as long as its one
    /// connection, so that connection is never reaped or recycled.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open the store configured in `[database]`, creating its directory.
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowError::Storage(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        tracing::debug!("Opening context store at {}", config.path.display());
        Self::new(&config.path).await
    }

    async fn run_migrations(&self) -> Result<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS conversation_contexts (
                session_id      TEXT PRIMARY KEY,
                context_id      TEXT NOT NULL,
                tenant_id       TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                active_flow     TEXT,
                status          TEXT NOT NULL,
                version         INTEGER NOT NULL,
                context_data    TEXT NOT NULL,
                expires_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_contexts_expires
                ON conversation_contexts (expires_at);
            CREATE INDEX IF NOT EXISTS idx_contexts_tenant_user
                ON conversation_contexts (tenant_id, user_id)
        "#;

        // One statement per call
        for stmt in sql.split(';') {
            let trimmed = stmt.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn stored_version(&self, session_id: &str) -> Result<i64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM conversation_contexts WHERE session_id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.unwrap_or(0))
    }

    /// Number of stored contexts for a tenant
    pub async fn count_for_tenant(&self, tenant_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversation_contexts WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn decode(data: &str) -> Result<ConversationContext> {
    Ok(serde_json::from_str(data)?)
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn get(&self, session_id: &str) -> Result<Option<ConversationContext>> {
        let row = sqlx::query("SELECT context_data FROM conversation_contexts WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let data: String = r.try_get("context_data")?;
                Ok(Some(decode(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, context: &ConversationContext) -> Result<ConversationContext> {
        let mut stored = context.clone();
        stored.version = context.version + 1;
        let data = serde_json::to_string(&stored)?;
        let active_flow = stored.active_flow().map(|flow| flow.as_str());

        let result = if context.version == 0 {
            sqlx::query(
                "INSERT INTO conversation_contexts
                    (session_id, context_id, tenant_id, user_id, active_flow, status, version, context_data, expires_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(session_id) DO NOTHING",
            )
            .bind(&stored.session_id)
            .bind(stored.id.to_string())
            .bind(&stored.tenant_id)
            .bind(&stored.user_id)
            .bind(active_flow)
            .bind(stored.status.as_str())
            .bind(stored.version)
            .bind(&data)
            .bind(stored.expires_at.timestamp_millis())
            .bind(stored.updated_at.timestamp_millis())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE conversation_contexts
                 SET active_flow = ?, status = ?, version = ?, context_data = ?, expires_at = ?, updated_at = ?
                 WHERE session_id = ? AND version = ?",
            )
            .bind(active_flow)
            .bind(stored.status.as_str())
            .bind(stored.version)
            .bind(&data)
            .bind(stored.expires_at.timestamp_millis())
            .bind(stored.updated_at.timestamp_millis())
            .bind(&stored.session_id)
            .bind(context.version)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            let found = self.stored_version(&context.session_id).await?;
            tracing::warn!(
                "Context write rejected for session {}: expected v{}, found v{}",
                short_id(&context.session_id),
                context.version,
                found
            );
            return Err(FlowError::VersionConflict {
                session_id: context.session_id.clone(),
                expected: context.version,
                found,
            });
        }

        Ok(stored)
    }

    async fn extend_ttl(&self, session_id: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT context_data FROM conversation_contexts WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(false);
        };

        let data: String = row.try_get("context_data")?;
        let mut context = decode(&data)?;
        if expires_at > context.expires_at {
            context.expires_at = expires_at;
            sqlx::query(
                "UPDATE conversation_contexts SET context_data = ?, expires_at = ? WHERE session_id = ?",
            )
            .bind(serde_json::to_string(&context)?)
            .bind(expires_at.timestamp_millis())
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversation_contexts WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM conversation_contexts WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!("Cleaned up {} expired context(s)", removed);
        }
        Ok(removed)
    }
}
