//! Sync errors and machine-readable error kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::SyncPhase;
use crate::catalog::CatalogError;
use crate::connection::ConnectError;
use crate::store::{ProfileId, StoreError};

/// Tag callers branch on instead of matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionError,
    UnsupportedEngine,
    CatalogQueryError,
    PartialSync,
    StoreError,
    NotFound,
    NoSchema,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "connection_error",
            ErrorKind::UnsupportedEngine => "unsupported_engine",
            ErrorKind::CatalogQueryError => "catalog_query_error",
            ErrorKind::PartialSync => "partial_sync",
            ErrorKind::StoreError => "store_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoSchema => "no_schema",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error that aborts a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    Connection(ConnectError),

    #[error("Unsupported engine: {0}. Supported: postgresql")]
    UnsupportedEngine(String),

    #[error("Catalog query failed: {0}")]
    CatalogQuery(#[from] CatalogError),

    /// A phase failed after earlier phases had already written.
    #[error("Sync failed during {phase} after earlier phases were applied: {source}")]
    PartialSync {
        phase: SyncPhase,
        source: Box<SyncError>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Connection profile {0} not found")]
    ProfileNotFound(ProfileId),
}

impl From<ConnectError> for SyncError {
    fn from(e: ConnectError) -> Self {
        match e {
            ConnectError::UnsupportedEngine(engine) => SyncError::UnsupportedEngine(engine),
            ConnectError::Store(e) => SyncError::Store(e),
            other => SyncError::Connection(other),
        }
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Connection(_) => ErrorKind::ConnectionError,
            SyncError::UnsupportedEngine(_) => ErrorKind::UnsupportedEngine,
            SyncError::CatalogQuery(_) => ErrorKind::CatalogQueryError,
            SyncError::PartialSync { .. } => ErrorKind::PartialSync,
            SyncError::Store(e) if e.is_not_found() => ErrorKind::NotFound,
            SyncError::Store(_) => ErrorKind::StoreError,
            SyncError::ProfileNotFound(_) => ErrorKind::NotFound,
        }
    }

    /// The innermost error, looking through `PartialSync`.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::PartialSync { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
