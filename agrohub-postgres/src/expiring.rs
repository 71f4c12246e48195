use std::time::Duration;

use agrohub::errors::{Operation, StoreResult};
use agrohub::store::ExpiringStore;
use async_trait::async_trait;
use sqlx::{query, Pool, Postgres, Row};
use tracing::debug;

use crate::map_sqlx_error;

/// Verification codes and sessions kept in the `expiring_entries` table.
///
/// Expiry is judged by the database clock. Expired rows are purged
/// whenever a new entry is written.
#[derive(Debug, Clone)]
pub struct PostgresExpiringStore {
    pool: Pool<Postgres>,
}

impl PostgresExpiringStore {
    /// Wrap an existing pool. The schema must already be migrated.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExpiringStore for PostgresExpiringStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let purged = query("DELETE FROM expiring_entries WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::WriteEntry))?;
        if purged.rows_affected() > 0 {
            debug!(
                purged = purged.rows_affected(),
                "[postgres.expiring_put] expired entries removed"
            );
        }

        query(
            "INSERT INTO expiring_entries (key, value, expires_at)
             VALUES ($1, $2, now() + make_interval(secs => $3))
             ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteEntry))?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: String, ttl: Duration) -> StoreResult<bool> {
        // The conflict update only fires over an expired row.
        let written = query(
            "INSERT INTO expiring_entries (key, value, expires_at)
             VALUES ($1, $2, now() + make_interval(secs => $3))
             ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
                 WHERE expiring_entries.expires_at <= now()",
        )
        .bind(key)
        .bind(value)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteEntry))?;
        Ok(written.rows_affected() == 1)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        query("SELECT value FROM expiring_entries WHERE key = $1 AND expires_at > now()")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadEntry))?
            .map(|row| {
                row.try_get("value")
                    .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))
            })
            .transpose()
    }

    async fn take(&self, key: &str) -> StoreResult<Option<String>> {
        // DELETE ... RETURNING hands the row to exactly one concurrent caller.
        let row = query(
            "DELETE FROM expiring_entries WHERE key = $1
             RETURNING value, expires_at > now() AS live",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::WriteEntry))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let live: bool = row
            .try_get("live")
            .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))?;
        if !live {
            return Ok(None);
        }
        row.try_get("value")
            .map(Some)
            .map_err(|error| map_sqlx_error(error, Operation::DecodeRow))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        query("DELETE FROM expiring_entries WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::WriteEntry))?;
        Ok(())
    }
}
