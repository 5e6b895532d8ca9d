//! L2: durable keyed tier backed by Postgres.
//!
//! Survives process restarts; the cache manager treats it as the primary
//! source of truth when L1 is cold or disabled.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::entry::{CacheEntry, CacheKey};
use crate::error::{CacheError, Result};

pub struct L2Store {
    pool: PgPool,
}

impl L2Store {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `cache_entries` table if it does not already exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cache_entries (
                source TEXT NOT NULL,
                ip TEXT NOT NULL,
                value JSONB NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (source, ip)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(CacheError::L2)?;
        Ok(())
    }

    #[instrument(skip(self), fields(source = %key.source, ip = %key.ip))]
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let row: Option<(serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
            "SELECT value, expires_at FROM cache_entries WHERE source = $1 AND ip = $2",
        )
        .bind(key.source.as_str())
        .bind(&key.ip)
        .fetch_optional(&self.pool)
        .await
        .map_err(CacheError::L2)?;

        Ok(row.map(|(value, expires_at)| CacheEntry { value, expires_at }))
    }

    #[instrument(skip(self, entry), fields(source = %key.source, ip = %key.ip))]
    pub async fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO cache_entries (source, ip, value, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source, ip) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            ",
        )
        .bind(key.source.as_str())
        .bind(&key.ip)
        .bind(&entry.value)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(CacheError::L2)?;

        Ok(())
    }

    /// Deletes expired rows. Safe to call opportunistically; never required
    /// for correctness since `get` treats an expired row as a miss.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(CacheError::L2)?;
        Ok(result.rows_affected())
    }
}
