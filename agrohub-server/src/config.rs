//! Server settings read from the environment.

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use agrohub::auth::SESSION_TTL;
use agrohub::types::AdminUsername;
use agrohub_postgres::{MaxConnections, PostgresConfig};
use thiserror::Error;
use tracing::info;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "AGROHUB_DB_MAX_CONNECTIONS";
pub const DB_ACQUIRE_TIMEOUT_SECS: &str = "AGROHUB_DB_ACQUIRE_TIMEOUT_SECS";
pub const HOST: &str = "AGROHUB_HOST";
pub const PORT: &str = "AGROHUB_PORT";
pub const SESSION_TTL_SECS: &str = "AGROHUB_SESSION_TTL_SECS";
pub const ADMIN_USERNAME: &str = "AGROHUB_ADMIN_USERNAME";
pub const ADMIN_PASSWORD: &str = "AGROHUB_ADMIN_PASSWORD";
pub const ADMIN_PEPPER: &str = "AGROHUB_ADMIN_PEPPER";
pub const LOG_FORMAT: &str = "AGROHUB_LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
/// One year. Longer lifetimes overflow the expiry arithmetic of the stores.
const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// A setting that is missing or does not parse. Always names the variable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{variable} has invalid value '{value}': {reason}")]
    Invalid {
        variable: &'static str,
        value: String,
        reason: String,
    },

    #[error("{present} is set but {missing} is not")]
    Incomplete {
        present: &'static str,
        missing: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'json' or 'pretty', got '{other}'")),
        }
    }
}

/// Administrator account created or reset at startup.
#[derive(Clone)]
pub struct AdminBootstrap {
    pub username: AdminUsername,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub postgres: PostgresConfig,
    pub bind_address: SocketAddr,
    pub session_ttl: Duration,
    pub admin: Option<AdminBootstrap>,
    pub admin_pepper: String,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;

        let mut postgres = PostgresConfig::default();
        if let Some(raw) = lookup(DB_MAX_CONNECTIONS) {
            let max: NonZeroU32 = parse(DB_MAX_CONNECTIONS, &raw)?;
            postgres.max_connections = MaxConnections::new(max);
        }
        postgres.acquire_timeout = Duration::from_secs(parse_or(
            &lookup,
            DB_ACQUIRE_TIMEOUT_SECS,
            postgres.acquire_timeout.as_secs(),
        )?);

        let host: IpAddr = match lookup(HOST) {
            Some(raw) => parse(HOST, &raw)?,
            None => parse(HOST, DEFAULT_HOST)?,
        };
        let port: u16 = parse_or(&lookup, PORT, DEFAULT_PORT)?;

        let session_secs: u64 = parse_or(&lookup, SESSION_TTL_SECS, SESSION_TTL.as_secs())?;
        if !(1..=MAX_SESSION_TTL_SECS).contains(&session_secs) {
            return Err(ConfigError::Invalid {
                variable: SESSION_TTL_SECS,
                value: session_secs.to_string(),
                reason: format!("must be between 1 and {MAX_SESSION_TTL_SECS} seconds"),
            });
        }

        let admin = admin_bootstrap(&lookup)?;
        let admin_pepper = lookup(ADMIN_PEPPER).unwrap_or_default();
        if admin.is_some() && admin_pepper.is_empty() {
            return Err(ConfigError::Incomplete {
                present: ADMIN_USERNAME,
                missing: ADMIN_PEPPER,
            });
        }

        let log_format = match lookup(LOG_FORMAT) {
            Some(raw) => parse(LOG_FORMAT, &raw)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            database_url,
            postgres,
            bind_address: SocketAddr::new(host, port),
            session_ttl: Duration::from_secs(session_secs),
            admin,
            admin_pepper,
            log_format,
        })
    }

    /// Logs the effective settings, without secrets.
    pub fn log_summary(&self) {
        info!(
            bind_address = %self.bind_address,
            max_connections = %self.postgres.max_connections,
            acquire_timeout_secs = self.postgres.acquire_timeout.as_secs(),
            session_ttl_secs = self.session_ttl.as_secs(),
            admin_bootstrap = self.admin.is_some(),
            "[config.load] configuration loaded"
        );
    }
}

fn admin_bootstrap<F>(lookup: &F) -> Result<Option<AdminBootstrap>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match (lookup(ADMIN_USERNAME), lookup(ADMIN_PASSWORD)) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Incomplete {
            present: ADMIN_USERNAME,
            missing: ADMIN_PASSWORD,
        }),
        (None, Some(_)) => Err(ConfigError::Incomplete {
            present: ADMIN_PASSWORD,
            missing: ADMIN_USERNAME,
        }),
        (Some(username), Some(password)) => {
            if password.is_empty() {
                return Err(ConfigError::Invalid {
                    variable: ADMIN_PASSWORD,
                    value: String::new(),
                    reason: "must not be empty".to_string(),
                });
            }
            let username =
                AdminUsername::try_new(username.clone()).map_err(|error| ConfigError::Invalid {
                    variable: ADMIN_USERNAME,
                    value: username,
                    reason: error.to_string(),
                })?;
            Ok(Some(AdminBootstrap { username, password }))
        }
    }
}

fn parse<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|error: T::Err| ConfigError::Invalid {
        variable,
        value: raw.to_string(),
        reason: error.to_string(),
    })
}

fn parse_or<F, T>(lookup: &F, variable: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(variable).map_or(Ok(default), |raw| parse(variable, &raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = config_from(&[(DATABASE_URL, "postgres://localhost/agrohub")])
            .expect("database url alone should be enough");

        assert_eq!(config.bind_address, "0.0.0.0:8080".parse().expect("valid address"));
        assert_eq!(config.session_ttl, Duration::from_secs(604_800));
        assert_eq!(config.postgres.max_connections.to_string(), "10");
        assert_eq!(config.postgres.acquire_timeout, Duration::from_secs(30));
        assert!(config.admin.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(config_from(&[]).err(), Some(ConfigError::Missing(DATABASE_URL)));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let error = config_from(&[
            (DATABASE_URL, "postgres://localhost/agrohub"),
            (PORT, "eighty"),
        ])
        .expect_err("a non-numeric port should be rejected");

        assert!(error.to_string().starts_with("AGROHUB_PORT has invalid value 'eighty'"));
    }

    #[test]
    fn session_ttl_must_be_positive_and_at_most_a_year() {
        for raw in ["0", "31536001", "18446744073709551615"] {
            let error = config_from(&[
                (DATABASE_URL, "postgres://localhost/agrohub"),
                (SESSION_TTL_SECS, raw),
            ])
            .expect_err("out of range session lifetimes should be rejected");

            assert!(matches!(
                error,
                ConfigError::Invalid {
                    variable: SESSION_TTL_SECS,
                    ..
                }
            ));
        }

        let config = config_from(&[
            (DATABASE_URL, "postgres://localhost/agrohub"),
            (SESSION_TTL_SECS, "31536000"),
        ])
        .expect("a one year session lifetime should load");
        assert_eq!(config.session_ttl, Duration::from_secs(31_536_000));
    }

    #[test]
    fn zero_connections_are_rejected() {
        let error = config_from(&[
            (DATABASE_URL, "postgres://localhost/agrohub"),
            (DB_MAX_CONNECTIONS, "0"),
        ])
        .expect_err("zero connections should be rejected");

        assert!(matches!(
            error,
            ConfigError::Invalid {
                variable: DB_MAX_CONNECTIONS,
                ..
            }
        ));
    }

    #[test]
    fn admin_needs_username_password_and_pepper() {
        let missing_password = config_from(&[
            (DATABASE_URL, "postgres://localhost/agrohub"),
            (ADMIN_USERNAME, "root"),
        ]);
        assert_eq!(
            missing_password.err(),
            Some(ConfigError::Incomplete {
                present: ADMIN_USERNAME,
                missing: ADMIN_PASSWORD,
            })
        );

        let missing_pepper = config_from(&[
            (DATABASE_URL, "postgres://localhost/agrohub"),
            (ADMIN_USERNAME, "root"),
            (ADMIN_PASSWORD, "s3cret"),
        ]);
        assert_eq!(
            missing_pepper.err(),
            Some(ConfigError::Incomplete {
                present: ADMIN_USERNAME,
                missing: ADMIN_PEPPER,
            })
        );

        let complete = config_from(&[
            (DATABASE_URL, "postgres://localhost/agrohub"),
            (ADMIN_USERNAME, "root"),
            (ADMIN_PASSWORD, "s3cret"),
            (ADMIN_PEPPER, "pepper"),
            (LOG_FORMAT, "JSON"),
        ])
        .expect("complete admin settings should load");
        let admin = complete.admin.expect("admin bootstrap should be present");
        assert_eq!(admin.username.as_ref(), "root");
        assert_eq!(complete.log_format, LogFormat::Json);
        assert!(!format!("{admin:?}").contains("s3cret"));
    }
}
