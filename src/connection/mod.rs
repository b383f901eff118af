//! Connection provider.
//!
//! Opens short-lived catalog sessions from stored profile credentials and
//! keeps the profile's status in step with every attempt:
//!
//! ```text
//! open() ──ok──▶ status = connected ──▶ LiveSession ──drop──▶ status = disconnected
//!    └───err───▶ status = error
//! ```
//!
//! The status reset lives in [`LiveSession`]'s `Drop`, so it runs on every
//! exit path of the caller, including `?` returns.

mod postgres;
mod tls;

pub use postgres::PgConnector;
pub use tls::TlsBuilder;

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::catalog::CatalogReader;
use crate::config::ConnectParams;
use crate::store::{ConnectionProfile, ConnectionStatus, MetadataStore, ProfileId, StoreError};

/// Errors opening a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Unsupported engine: {0}. Supported: postgresql")]
    UnsupportedEngine(String),

    #[error("Connection to {target} failed: {message}")]
    Failed { target: String, message: String },

    #[error("Connection to {target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ConnectError {
    pub fn failed(params: &ConnectParams, message: impl ToString) -> Self {
        Self::Failed {
            target: params.display_target(),
            message: message.to_string(),
        }
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;

/// Opens catalog sessions for a database engine.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: CatalogReader + 'static;

    /// Open one session. The engine has already been validated.
    async fn connect(&self, params: &ConnectParams) -> ConnectResult<Self::Session>;
}

/// Opens sessions for profiles and tracks their connectivity status.
pub struct ConnectionProvider<C: Connector> {
    store: Arc<MetadataStore>,
    connector: C,
    timeout: Duration,
}

impl<C: Connector> ConnectionProvider<C> {
    pub fn new(store: Arc<MetadataStore>, connector: C, timeout: Duration) -> Self {
        Self {
            store,
            connector,
            timeout,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a session for `profile`.
    ///
    /// Unsupported engines fail before any network I/O. The wait for the
    /// connection is bounded by the configured timeout; queries are not.
    pub async fn open(&self, profile: &ConnectionProfile) -> ConnectResult<LiveSession<C::Session>> {
        let params = &profile.params;

        let result = match params.engine() {
            Ok(_) => {
                debug!(profile = %profile.id, target = %params.display_target(), "opening connection");
                match tokio::time::timeout(self.timeout, self.connector.connect(params)).await {
                    Ok(result) => result,
                    Err(_) => Err(ConnectError::Timeout {
                        target: params.display_target(),
                        secs: self.timeout.as_secs(),
                    }),
                }
            }
            Err(_) => Err(ConnectError::UnsupportedEngine(params.engine.clone())),
        };

        match result {
            Ok(session) => {
                self.store.set_status(profile.id, ConnectionStatus::Connected)?;
                Ok(LiveSession {
                    session,
                    store: Arc::clone(&self.store),
                    profile: profile.id,
                })
            }
            Err(e) => {
                warn!(profile = %profile.id, error = %e, "connection failed");
                self.store.set_status(profile.id, ConnectionStatus::Error)?;
                Err(e)
            }
        }
    }
}

/// An open session that marks its profile `disconnected` when dropped.
pub struct LiveSession<S> {
    session: S,
    store: Arc<MetadataStore>,
    profile: ProfileId,
}

impl<S> Deref for LiveSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S> Drop for LiveSession<S> {
    fn drop(&mut self) {
        if let Err(e) = self
            .store
            .set_status(self.profile, ConnectionStatus::Disconnected)
        {
            warn!(profile = %self.profile, error = %e, "failed to reset connection status");
        }
    }
}
