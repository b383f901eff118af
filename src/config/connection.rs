//! External database connection parameters.
//!
//! Supports configuration via environment variables:
//! - `SCHEMALENS_DB_ENGINE`: Database engine (postgresql)
//! - `SCHEMALENS_DB_HOST`: Database server hostname
//! - `SCHEMALENS_DB_NAME`: Database name
//! - `SCHEMALENS_DB_PORT`: Port (optional, uses engine default)
//! - `SCHEMALENS_DB_USER` / `SCHEMALENS_DB_PASSWORD`: Credentials
//! - `SCHEMALENS_DB_SSL_MODE`: disable, require, verify-ca, verify-full

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported engine: {0}. Supported: postgresql")]
    UnsupportedEngine(String),

    #[error("Invalid ssl_mode '{0}'. Valid values: disable, require, verify-ca, verify-full")]
    InvalidSslMode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// PostgreSQL (information_schema catalog)
    #[serde(rename = "postgresql")]
    Postgres,
}

impl Engine {
    /// Parse engine from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Engine::Postgres),
            other => Err(ConfigError::UnsupportedEngine(other.to_string())),
        }
    }

    /// Canonical engine name, as stored on a profile.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgres => "postgresql",
        }
    }

    /// Get the default port for this engine.
    pub fn default_port(&self) -> u16 {
        match self {
            Engine::Postgres => 5432,
        }
    }
}

/// SSL verification modes, matching PostgreSQL's `sslmode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// Plain TCP connection.
    #[default]
    Disable,
    /// TLS without server certificate verification.
    Require,
    /// Verify the server certificate against the CA.
    VerifyCa,
    /// Full certificate and hostname verification.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode from a string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "disable" | "" => Ok(SslMode::Disable),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(ConfigError::InvalidSslMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Check if this mode requires TLS.
    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

/// SSL material attached to a connection profile (PEM-encoded).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslOptions {
    pub mode: SslMode,
    pub ca: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
}

/// Everything needed to open a connection to an external database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    /// Engine name as registered (validated at open time).
    pub engine: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub ssl: SslOptions,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("ssl_mode", &self.ssl.mode)
            .finish()
    }
}

impl ConnectParams {
    /// Create parameters for a PostgreSQL database on the default port.
    pub fn postgres(
        host: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            engine: Engine::Postgres.as_str().to_string(),
            host: host.into(),
            port: Engine::Postgres.default_port(),
            database: database.into(),
            username: username.into(),
            secret: secret.into(),
            ssl: SslOptions::default(),
        }
    }

    /// Load connection parameters from environment variables.
    ///
    /// Required: `SCHEMALENS_DB_HOST`, `SCHEMALENS_DB_NAME`, `SCHEMALENS_DB_USER`.
    /// Optional: `SCHEMALENS_DB_ENGINE` (default postgresql), `SCHEMALENS_DB_PORT`,
    /// `SCHEMALENS_DB_PASSWORD`, `SCHEMALENS_DB_SSL_MODE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let engine = match env::var("SCHEMALENS_DB_ENGINE") {
            Ok(s) => Engine::from_str(&s)?,
            Err(_) => Engine::Postgres,
        };

        let required = |name: &str| {
            env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
        };

        let host = required("SCHEMALENS_DB_HOST")?;
        let database = required("SCHEMALENS_DB_NAME")?;
        let username = required("SCHEMALENS_DB_USER")?;
        let secret = env::var("SCHEMALENS_DB_PASSWORD").unwrap_or_default();

        let port = env::var("SCHEMALENS_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| engine.default_port());

        let mode = match env::var("SCHEMALENS_DB_SSL_MODE") {
            Ok(s) => SslMode::parse(&s)?,
            Err(_) => SslMode::Disable,
        };

        Ok(Self {
            engine: engine.as_str().to_string(),
            host,
            port,
            database,
            username,
            secret,
            ssl: SslOptions {
                mode,
                ..SslOptions::default()
            },
        })
    }

    /// Resolve the engine, failing for anything other than a supported one.
    pub fn engine(&self) -> Result<Engine, ConfigError> {
        Engine::from_str(&self.engine)
    }

    /// Human-readable target without credentials, for logs.
    pub fn display_target(&self) -> String {
        format!("{}://{}:{}/{}", self.engine, self.host, self.port, self.database)
    }
}
