//! Idempotent schema reconciliation for Postgres vector tables.
//!
//! Given a table name and a desired logical schema — a server-generated UUID
//! key, a text column, a `vector(N)` embedding column, a JSONB metadata
//! column — `trueup` inspects the live catalog, classifies the divergence,
//! and takes the cheapest safe repair:
//!
//! - **absent table** → create it, with a GIN text-search index and a
//!   similarity index (HNSW, falling back to IVFFlat where the server lacks
//!   the access method)
//! - **columns fine, index missing** → create just the missing indexes
//! - **columns diverge** → destructively migrate (backup, drop, recreate,
//!   best-effort copy of recoverable columns) — but only when explicitly
//!   permitted; the default posture is to report and touch nothing
//! - **everything matches** → do nothing at all
//!
//! The store is the sole source of truth: no migration-version tables, no
//! state between invocations. Calling [`ensure_schema`] twice in a row on a
//! healthy table executes zero DDL the second time.
//!
//! # Example
//!
//! ```ignore
//! use trueup::{connect, ensure_schema, Credentials, DbConfig, ReconcileOptions};
//!
//! let config = DbConfig::new("db.internal", 5432, "app");
//! let creds = Credentials::from_json(&secret_payload)?;
//! let session = connect(&config, &creds).await?;
//!
//! let reconciled = ensure_schema(&session, "documents", &ReconcileOptions::default()).await?;
//! println!("{}", reconciled.message);
//! ```

mod catalog;
mod classify;
mod creds;
mod error;
mod index;
mod migrate;
mod pg;
mod reconcile;
mod session;
pub mod sql;
mod target;

pub use catalog::{CatalogState, ColumnDescriptor, IndexPresence, inspect, row_count};
pub use classify::{Decision, Divergence, classify};
pub use creds::{CredentialProvider, Credentials};
pub use error::{Error, SqlError};
pub use index::{IndexReport, ensure_indexes};
pub use migrate::{MigrationReport, run_destructive};
pub use pg::{DbConfig, PgSession, connect};
pub use reconcile::{
    Action, Outcome, Reconciled, ReconcileOptions, Status, ensure_schema,
};
pub use session::{Session, SqlFuture};
pub use target::{
    DEFAULT_DIMENSIONS, EMBEDDING_COLUMN, ID_COLUMN, METADATA_COLUMN, SchemaTarget, TEXT_COLUMN,
    VectorIndexMethod,
};

/// Result type for trueup operations.
pub type Result<T> = std::result::Result<T, Error>;
