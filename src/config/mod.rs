//! Configuration module for schemalens.
//!
//! Handles external connection parameters, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{ConfigError, ConnectParams, Engine, SslMode, SslOptions};
pub use settings::{
    expand_env_vars, ConnectionSettings, DiagramSettings, ProfileSettings, Settings,
    SettingsError, StoreSettings, SyncSettings,
};
