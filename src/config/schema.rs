//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for both tiers.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which half of the service pair a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Back-end tier owning the counter row.
    Api,
    /// Front-facing tier proxying `/send` to the API tier.
    Web,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Api => f.write_str("api"),
            Tier::Web => f.write_str("web"),
        }
    }
}

/// Root configuration for the service pair.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StackConfig {
    /// API tier listener.
    pub api: ApiConfig,

    /// Web tier listener, downstream URL and static assets.
    pub web: WebConfig,

    /// Counter store backend selection.
    pub store: StoreConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// API tier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:3030").
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3030".to_string(),
        }
    }
}

/// Web tier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Downstream URL fetched by `GET /send`.
    pub api_url: String,

    /// Directory served at `/`.
    pub static_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            api_url: String::new(),
            static_dir: "./static".to_string(),
        }
    }
}

/// Relational backend holding the counter row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Sqlite,
}

/// Counter store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Which backend to connect to.
    pub backend: StoreBackend,

    pub postgres: PostgresConfig,

    pub sqlite: SqliteConfig,
}

/// Transport security for the PostgreSQL connection, as libpq names it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP.
    Disable,
    /// Encrypt, without verifying the server certificate.
    #[default]
    Require,
    /// Encrypt and verify the certificate chain and host name.
    VerifyFull,
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SslMode::Disable => f.write_str("disable"),
            SslMode::Require => f.write_str("require"),
            SslMode::VerifyFull => f.write_str("verify-full"),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub username: String,
    pub password: String,
    /// Database host name or address.
    pub host: String,
    pub port: u16,
    pub dbname: String,
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    pub sslmode: SslMode,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            host: String::new(),
            port: 5432,
            dbname: String::new(),
            connect_timeout_secs: 5,
            sslmode: SslMode::Require,
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

/// SQLite settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "counter.db".to_string(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound for draining in-flight requests, in seconds.
    pub drain_timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
