//! PostgreSQL storage for the Agrohub marketplace
//!
//! [`PostgresMarketStore`] implements every marketplace storage trait on a
//! shared connection pool; [`PostgresExpiringStore`] keeps verification
//! codes and sessions in the same database.
//!
//! Order placement runs in one transaction whose stock decrement is a
//! conditional `UPDATE`: it only matches while the product still holds the
//! requested kilograms at the rate the order was priced at. Concurrent
//! buyers are serialized by the row lock, and a buyer who loses the race
//! sees the committed stock and is refused.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod expiring;
mod market;
mod rows;

use std::time::Duration;

use agrohub::errors::{Operation, StoreError};
use nutype::nutype;
use sqlx::migrate::MigrateError;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use thiserror::Error;
use tracing::{error, info, warn};

pub use expiring::PostgresExpiringStore;

/// Errors from setting up a [`PostgresMarketStore`].
#[derive(Debug, Error)]
pub enum PostgresStoreError {
    /// The pool could not open its first connection.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),
    /// Schema migrations did not apply.
    #[error("failed to apply postgres migrations")]
    MigrationFailed(#[source] MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// Must be at least 1, enforced by using `NonZeroU32` as the underlying type.
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(std::num::NonZeroU32);

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: std::num::NonZeroU32 =
            match std::num::NonZeroU32::new(10) {
                Some(v) => v,
                None => unreachable!(),
            };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Marketplace store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresMarketStore {
    pool: Pool<Postgres>,
}

impl PostgresMarketStore {
    /// Connect with the default configuration.
    pub async fn new<S: Into<String>>(connection_string: S) -> Result<Self, PostgresStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connect with a custom pool configuration.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresStoreError> {
        let connection_string = connection_string.into();
        let max_connections: std::num::NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresStoreError::ConnectionFailed)?;
        info!(
            max_connections = %config.max_connections,
            "[postgres.connect] connection pool ready"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool, e.g. one shared with other components.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), PostgresStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresStoreError::MigrationFailed)?;
        info!("[postgres.migrate] schema is up to date");
        Ok(())
    }

    /// An expiring store on the same pool.
    pub fn expiring_store(&self) -> PostgresExpiringStore {
        PostgresExpiringStore::from_pool(self.pool.clone())
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

fn sql_state(error: &sqlx::Error) -> Option<String> {
    match error {
        sqlx::Error::Database(db_error) => db_error.code().map(|code| code.into_owned()),
        _ => None,
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    sql_state(error).as_deref() == Some(UNIQUE_VIOLATION)
}

fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    sql_state(error).as_deref() == Some(FOREIGN_KEY_VIOLATION)
}

fn map_sqlx_error(error: sqlx::Error, operation: Operation) -> StoreError {
    if let Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED) = sql_state(&error).as_deref() {
        warn!(
            error = %error,
            operation = %operation,
            "[postgres.version_conflict] transaction lost a concurrent update"
        );
        return StoreError::VersionConflict;
    }

    error!(
        error = %error,
        operation = %operation,
        "[postgres.database_error] database operation failed"
    );
    StoreError::StoreFailure { operation }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = PostgresConfig::default();
        assert_eq!(config.max_connections.to_string(), "10");
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
    }

    #[test]
    fn non_database_errors_become_store_failures() {
        let mapped = map_sqlx_error(sqlx::Error::PoolTimedOut, Operation::PlaceOrder);
        assert_eq!(
            mapped,
            StoreError::StoreFailure {
                operation: Operation::PlaceOrder
            }
        );
    }

    #[test]
    fn row_not_found_is_not_a_constraint_violation() {
        let error = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&error));
        assert!(!is_foreign_key_violation(&error));
    }
}
