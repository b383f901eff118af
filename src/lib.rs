//! # schemalens
//!
//! Catalog crawler and metadata reconciler for external databases.
//!
//! ## Architecture
//!
//! schemalens keeps a local copy of an external database's catalog, enriched
//! with descriptions that an LLM can consume:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          External database (PostgreSQL catalog)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [connection + catalog]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Live snapshot (tables, columns, foreign keys,        │
//! │     row counts, sample values)                           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sync + describe]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Local metadata store (SQLite) + ChangeLog            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [graph / summary / search / embedding]
//! ┌─────────────────────────────────────────────────────────┐
//! │  ER diagram, schema summary, search hits, embeddings     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`service::MetadataService`] is the entry point callers use.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod describe;
pub mod embedding;
pub mod graph;
pub mod search;
pub mod service;
pub mod store;
pub mod summary;
pub mod sync;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{CatalogReader, LiveColumn, LiveForeignKey, LiveTable};
    pub use crate::config::{ConnectParams, Settings};
    pub use crate::connection::{Connector, PgConnector};
    pub use crate::service::{DescriptionTarget, MetadataService, Outcome};
    pub use crate::store::{ColumnId, MetadataStore, NewProfile, ProfileId, TableId, TableKind};
    pub use crate::sync::{ChangeLog, ErrorKind, SyncReport};
}
