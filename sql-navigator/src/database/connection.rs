//! Connection establishment
//!
//! Turns a [`ConnectionProfile`] into driver connect options, opens a pool and
//! proves it alive with a `SELECT 1` round trip before handing out a provider.

use crate::database::traits::DatabaseProvider;
use crate::dialect::DialectKind;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "mysql")]
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
#[cfg(feature = "postgres")]
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Connection data supplied by the caller
///
/// Deserializes from the connect request body. `databaseType` is resolved
/// case-insensitively; unknown names become [`DialectKind::Unsupported`].
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    #[serde(default)]
    pub host: String,

    /// Server port; the dialect's default port when absent
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,

    #[serde(default)]
    pub user: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// Database name (network dialects)
    #[serde(default)]
    pub database: String,

    #[serde(rename = "databaseType", default)]
    pub dialect: DialectKind,

    /// Database file (SQLite)
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Schema to browse (PostgreSQL); `public` when absent
    #[serde(default)]
    pub schema: Option<String>,
}

impl ConnectionProfile {
    /// The configured port, falling back to the dialect's well-known port
    pub fn port_or_default(&self) -> u16 {
        match (self.port, self.dialect) {
            (Some(port), _) => port,
            (None, DialectKind::PostgreSql) => DEFAULT_POSTGRES_PORT,
            (None, _) => DEFAULT_MYSQL_PORT,
        }
    }
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("dialect", &self.dialect)
            .field("file_path", &self.file_path)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Accepts the port as a number or as a (possibly empty) string
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", text))),
    }
}

/// Pool sizing applied to every connection a session opens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_seconds() -> u64 {
    30
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Driver connect options for one dialect
///
/// Displays as the dialect's conventional DSN with the password redacted, so
/// it is safe to log.
pub struct Dsn {
    dialect: DialectKind,
    redacted: String,
    options: DriverOptions,
}

enum DriverOptions {
    #[cfg(feature = "mysql")]
    MySql(MySqlConnectOptions),
    #[cfg(feature = "postgres")]
    Postgres(PgConnectOptions),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnectOptions),
}

impl Dsn {
    /// Build connect options from a profile
    ///
    /// Network dialects need a host and a user, SQLite needs a file path.
    pub fn build(profile: &ConnectionProfile) -> Result<Self> {
        let dialect = profile.dialect.ensure_supported("connect")?;

        if !dialect.is_file_based() {
            if profile.host.trim().is_empty() {
                return Err(Error::connection("host is required"));
            }
            if profile.user.trim().is_empty() {
                return Err(Error::connection("user is required"));
            }
        }

        match dialect {
            #[cfg(feature = "mysql")]
            DialectKind::MySql => {
                let port = profile.port_or_default();
                let mut options = MySqlConnectOptions::new()
                    .host(&profile.host)
                    .port(port)
                    .username(&profile.user)
                    .password(&profile.password);
                if !profile.database.is_empty() {
                    options = options.database(&profile.database);
                }

                Ok(Self {
                    dialect,
                    redacted: format!(
                        "{}:***@tcp({}:{})/{}",
                        profile.user, profile.host, port, profile.database
                    ),
                    options: DriverOptions::MySql(options),
                })
            }
            #[cfg(feature = "postgres")]
            DialectKind::PostgreSql => {
                let port = profile.port_or_default();
                let mut options = PgConnectOptions::new()
                    .host(&profile.host)
                    .port(port)
                    .username(&profile.user)
                    .password(&profile.password)
                    .ssl_mode(PgSslMode::Disable);
                if !profile.database.is_empty() {
                    options = options.database(&profile.database);
                }

                Ok(Self {
                    dialect,
                    redacted: format!(
                        "host={} port={} user={} password=*** dbname={} sslmode=disable",
                        profile.host, port, profile.user, profile.database
                    ),
                    options: DriverOptions::Postgres(options),
                })
            }
            #[cfg(feature = "sqlite")]
            DialectKind::Sqlite => {
                let path = profile
                    .file_path
                    .as_ref()
                    .filter(|path| !path.as_os_str().is_empty())
                    .ok_or_else(|| Error::connection("file path is required"))?;

                Ok(Self {
                    dialect,
                    redacted: path.display().to_string(),
                    options: DriverOptions::Sqlite(
                        SqliteConnectOptions::new().filename(path).foreign_keys(true),
                    ),
                })
            }
            other => Err(Error::unsupported(other, "connect")),
        }
    }

    pub fn dialect(&self) -> DialectKind {
        self.dialect
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.redacted)
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Dsn")
            .field("dialect", &self.dialect)
            .field("dsn", &self.redacted)
            .finish()
    }
}

/// Open a pool for `profile` and verify it with a liveness check
///
/// Build and liveness failures both surface as [`Error::ConnectionFailed`]. A pool
/// that fails its check is closed before returning.
#[tracing::instrument(skip_all, fields(dialect = %profile.dialect, host = %profile.host))]
pub async fn connect(
    profile: &ConnectionProfile,
    settings: &PoolSettings,
) -> Result<Arc<dyn DatabaseProvider>> {
    let Dsn {
        redacted, options, ..
    } = Dsn::build(profile)?;
    debug!(dsn = %redacted, "opening connection pool");

    let provider: Arc<dyn DatabaseProvider> = match options {
        #[cfg(feature = "mysql")]
        DriverOptions::MySql(options) => {
            let pool = MySqlPoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(settings.acquire_timeout())
                .connect_with(options)
                .await
                .map_err(Error::connection)?;
            Arc::new(crate::database::mysql::MySqlProvider::new(pool))
        }
        #[cfg(feature = "postgres")]
        DriverOptions::Postgres(options) => {
            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(settings.acquire_timeout())
                .connect_with(options)
                .await
                .map_err(Error::connection)?;
            Arc::new(crate::database::postgres::PostgresProvider::new(pool))
        }
        #[cfg(feature = "sqlite")]
        DriverOptions::Sqlite(options) => {
            let pool = SqlitePoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(settings.acquire_timeout())
                .connect_with(options)
                .await
                .map_err(Error::connection)?;
            Arc::new(crate::database::sqlite::SqliteProvider::new(pool))
        }
    };

    if let Err(error) = provider.ping().await {
        if let Err(close_error) = provider.close().await {
            warn!(%close_error, "failed to close pool after failed liveness check");
        }
        return Err(error);
    }

    info!(dsn = %redacted, "connected");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn network_profile(dialect: DialectKind) -> ConnectionProfile {
        ConnectionProfile {
            host: "db.internal".to_string(),
            port: None,
            user: "admin".to_string(),
            password: "hunter2".to_string(),
            database: "shop".to_string(),
            dialect,
            ..Default::default()
        }
    }

    #[test]
    fn test_profile_deserializes_request_body() {
        let profile: ConnectionProfile = serde_json::from_str(
            r#"{
                "host": "localhost",
                "port": "5433",
                "user": "postgres",
                "password": "secret",
                "database": "app",
                "databaseType": "PostgreSQL"
            }"#,
        )
        .unwrap();

        assert_eq!(profile.dialect, DialectKind::PostgreSql);
        assert_eq!(profile.port, Some(5433));
        assert_eq!(profile.port_or_default(), 5433);
        assert!(profile.file_path.is_none());
    }

    #[test]
    fn test_profile_port_defaults_per_dialect() {
        let profile: ConnectionProfile =
            serde_json::from_str(r#"{"databaseType": "mysql", "port": ""}"#).unwrap();
        assert_eq!(profile.port, None);
        assert_eq!(profile.port_or_default(), 3306);
        assert_eq!(network_profile(DialectKind::PostgreSql).port_or_default(), 5432);
    }

    #[test]
    fn test_profile_rejects_invalid_port() {
        let result: std::result::Result<ConnectionProfile, _> =
            serde_json::from_str(r#"{"databaseType": "mysql", "port": "http"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_hides_password() {
        let profile = network_profile(DialectKind::MySql);
        assert!(!format!("{:?}", profile).contains("hunter2"));
        assert!(!serde_json::to_string(&profile).unwrap().contains("hunter2"));
    }

    #[test]
    fn test_pool_settings_defaults() {
        let settings: PoolSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, PoolSettings::default());
        assert_eq!(settings.max_connections, 5);
        assert_eq!(settings.acquire_timeout(), Duration::from_secs(30));
    }

    #[cfg(feature = "mysql")]
    #[test]
    fn test_mysql_dsn_redacts_password() {
        let dsn = Dsn::build(&network_profile(DialectKind::MySql)).unwrap();
        assert_eq!(dsn.dialect(), DialectKind::MySql);
        assert_eq!(dsn.to_string(), "admin:***@tcp(db.internal:3306)/shop");
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_dsn_disables_ssl() {
        let dsn = Dsn::build(&network_profile(DialectKind::PostgreSql)).unwrap();
        assert_eq!(
            dsn.to_string(),
            "host=db.internal port=5432 user=admin password=*** dbname=shop sslmode=disable"
        );
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_dsn_is_file_path() {
        let profile = ConnectionProfile {
            dialect: DialectKind::Sqlite,
            file_path: Some(PathBuf::from("/tmp/app.db")),
            ..Default::default()
        };
        assert_eq!(Dsn::build(&profile).unwrap().to_string(), "/tmp/app.db");
    }

    #[test]
    fn test_dsn_requires_host_and_user() {
        let mut profile = network_profile(DialectKind::MySql);
        profile.host.clear();
        let error = Dsn::build(&profile).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConnectionFailed);

        let mut profile = network_profile(DialectKind::PostgreSql);
        profile.user = "  ".to_string();
        let error = Dsn::build(&profile).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConnectionFailed);
    }

    #[test]
    fn test_dsn_requires_sqlite_file() {
        let profile = ConnectionProfile {
            dialect: DialectKind::Sqlite,
            ..Default::default()
        };
        let error = Dsn::build(&profile).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConnectionFailed);
    }

    #[test]
    fn test_dsn_rejects_unsupported_dialect() {
        let error = Dsn::build(&network_profile(DialectKind::Unsupported)).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnsupportedDialect);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_connect_missing_sqlite_file_fails() {
        let directory = tempfile::tempdir().unwrap();
        let profile = ConnectionProfile {
            dialect: DialectKind::Sqlite,
            file_path: Some(directory.path().join("missing.db")),
            ..Default::default()
        };

        let error = connect(&profile, &PoolSettings::default()).await.err().unwrap();
        assert_eq!(error.kind(), ErrorKind::ConnectionFailed);
    }
}
