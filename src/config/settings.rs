//! TOML-based configuration for schemalens.
//!
//! Supports a config file (schemalens.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [store]
//! path = "./metadata.db"
//!
//! [connection]
//! connect_timeout_secs = 5
//!
//! [sync]
//! sample_limit = 10
//! sample_display = 5
//! count_rows = true
//!
//! [diagram]
//! grid_spacing = 300
//!
//! [profiles.shop]
//! owner = "alice"
//! host = "db.internal"
//! database = "shop"
//! username = "reader"
//! secret = "${SHOP_DB_PASSWORD}"
//! ssl_mode = "require"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::connection::{ConnectParams, Engine, SslMode, SslOptions};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Profile not found in config: {0}")]
    ProfileNotFound(String),

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to determine home directory")]
    NoHomeDir,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Local metadata store.
    pub store: StoreSettings,

    /// External connection behaviour.
    pub connection: ConnectionSettings,

    /// Sync engine tuning.
    pub sync: SyncSettings,

    /// ER diagram layout hints.
    pub diagram: DiagramSettings,

    /// Named connection profiles the CLI can register.
    pub profiles: BTreeMap<String, ProfileSettings>,
}

/// Local store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSettings {
    /// SQLite file path. Defaults to `~/.schemalens/metadata.db`.
    pub path: Option<String>,
}

/// External connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Bounded wait for opening a connection.
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Sync engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Distinct values fetched per column for synthesized descriptions.
    pub sample_limit: u32,

    /// Sample values quoted verbatim in a description.
    pub sample_display: usize,

    /// Refresh row counts for base tables.
    pub count_rows: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sample_limit: 10,
            sample_display: 5,
            count_rows: true,
        }
    }
}

/// Diagram layout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagramSettings {
    /// Distance between grid cells.
    pub grid_spacing: i64,

    /// Width hint for table nodes.
    pub node_width: u32,
}

impl Default for DiagramSettings {
    fn default() -> Self {
        Self {
            grid_spacing: 300,
            node_width: 220,
        }
    }
}

/// A connection profile declared in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileSettings {
    /// Owner of the profile.
    pub owner: String,

    /// Engine name (postgresql).
    #[serde(default = "default_engine")]
    pub engine: String,

    pub host: String,

    #[serde(default)]
    pub port: Option<u16>,

    pub database: String,

    pub username: String,

    /// Password (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub ssl_mode: Option<String>,

    /// Paths to PEM files.
    #[serde(default)]
    pub ssl_ca: Option<String>,
    #[serde(default)]
    pub ssl_cert: Option<String>,
    #[serde(default)]
    pub ssl_key: Option<String>,
}

fn default_engine() -> String {
    Engine::Postgres.as_str().to_string()
}

impl ProfileSettings {
    /// Build connection parameters, expanding environment variables and
    /// loading any PEM files referenced by path.
    pub fn to_connect_params(&self) -> Result<ConnectParams, SettingsError> {
        let port = match self.port {
            Some(port) => port,
            None => Engine::from_str(&self.engine)
                .map_err(|_| SettingsError::UnsupportedEngine(self.engine.clone()))?
                .default_port(),
        };

        let mode = match &self.ssl_mode {
            Some(s) => SslMode::parse(s).map_err(|e| SettingsError::InvalidConfig(e.to_string()))?,
            None => SslMode::Disable,
        };

        let read_pem = |path: &Option<String>| -> Result<Option<String>, SettingsError> {
            match path {
                Some(p) => Ok(Some(fs::read_to_string(expand_env_vars(p)?)?)),
                None => Ok(None),
            }
        };

        Ok(ConnectParams {
            engine: self.engine.clone(),
            host: expand_env_vars(&self.host)?,
            port,
            database: expand_env_vars(&self.database)?,
            username: expand_env_vars(&self.username)?,
            secret: expand_env_vars(&self.secret)?,
            ssl: SslOptions {
                mode,
                ca: read_pem(&self.ssl_ca)?,
                cert: read_pem(&self.ssl_cert)?,
                key: read_pem(&self.ssl_key)?,
            },
        })
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `SCHEMALENS_CONFIG`
    /// 2. `./schemalens.toml`
    /// 3. `~/.config/schemalens/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("SCHEMALENS_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("schemalens.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("schemalens").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a declared profile by name.
    pub fn get_profile(&self, name: &str) -> Result<&ProfileSettings, SettingsError> {
        self.profiles
            .get(name)
            .ok_or_else(|| SettingsError::ProfileNotFound(name.to_string()))
    }

    /// Resolve the store path, expanding env vars or falling back to the home directory.
    pub fn store_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.store.path {
            Some(path) => Ok(PathBuf::from(expand_env_vars(path)?)),
            None => {
                let base = dirs::home_dir().ok_or(SettingsError::NoHomeDir)?;
                Ok(base.join(".schemalens").join("metadata.db"))
            }
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // lone $
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
