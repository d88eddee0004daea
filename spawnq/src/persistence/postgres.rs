use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::config::PersistenceConfig;
use crate::error::PersistenceError;
use crate::persistence::ProxyInfoStore;
use crate::workload::ProxyInfo;

/// PostgreSQL-backed proxy info store.
///
/// One row per notebook; the snapshot lives in a JSONB column and is replaced
/// by a single `INSERT .. ON CONFLICT DO UPDATE` statement.
#[derive(Debug, Clone)]
pub struct PostgresProxyInfoStore {
    pool: PgPool,
}

impl PostgresProxyInfoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized by `config`.
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.acquire_timeout_seconds,
            ))
            .connect(&config.connection_string)
            .await
            .map_err(unavailable)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS spawnq_proxy_info (
                notebook_id TEXT PRIMARY KEY,
                proxy_info JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(err: sqlx::Error) -> PersistenceError {
    PersistenceError::Unavailable(err.to_string())
}

#[async_trait]
impl ProxyInfoStore for PostgresProxyInfoStore {
    async fn upsert(&self, notebook_id: &str, info: &ProxyInfo) -> Result<(), PersistenceError> {
        let document =
            serde_json::to_value(info).map_err(|e| PersistenceError::Codec(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO spawnq_proxy_info (notebook_id, proxy_info, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (notebook_id)
            DO UPDATE SET proxy_info = EXCLUDED.proxy_info,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(notebook_id)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        debug!(notebook_id, phase = %info.phase, "proxy info upserted");
        Ok(())
    }

    async fn load(&self, notebook_id: &str) -> Result<Option<ProxyInfo>, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT proxy_info
            FROM spawnq_proxy_info
            WHERE notebook_id = $1
            "#,
        )
        .bind(notebook_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let document: serde_json::Value = row
            .try_get("proxy_info")
            .map_err(|e| PersistenceError::Codec(e.to_string()))?;
        serde_json::from_value(document)
            .map(Some)
            .map_err(|e| PersistenceError::Codec(e.to_string()))
    }
}
