//! The reconciliation orchestrator.
//!
//! `ensure_schema` is the one operation this crate exists for: inspect the
//! live catalog, classify the divergence, then create, repair, migrate, or
//! do nothing. Each terminal branch commits exactly once; every failure path
//! rolls back. The engine holds no state between invocations, so calling it
//! again after a partial failure is always safe.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{self, CatalogState};
use crate::classify::{Decision, Divergence, classify};
use crate::error::Error;
use crate::index::{self, IndexReport};
use crate::migrate;
use crate::session::Session;
use crate::sql;
use crate::target::{DEFAULT_DIMENSIONS, SchemaTarget, VectorIndexMethod};

/// Tuning knobs for a reconciliation run.
///
/// Passed in explicitly — the engine reads no ambient configuration.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Embedding dimensionality for the vector column.
    pub dimensions: u32,
    /// Permit the backup-drop-recreate path when columns diverge. Off by
    /// default: the safe posture is to report and leave the table alone.
    pub allow_destructive: bool,
    /// Serialize concurrent runs against the same table with a session
    /// advisory lock.
    pub advisory_lock: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
            allow_destructive: false,
            advisory_lock: true,
        }
    }
}

/// Which branch a reconciliation run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Schema already matched; zero DDL executed.
    None,
    CreatedFresh,
    RepairedIndexes,
    Migrated,
    /// Columns diverge but destruction was not permitted; nothing mutated.
    ManualMigrationRequired,
}

/// Result of a reconciliation run that did not error.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub action: Action,
    /// Backup table left behind by a migration, if one was taken.
    pub backup_table: Option<String>,
    pub message: String,
}

/// Bring `table` into agreement with the desired schema.
///
/// The session is used strictly sequentially and is left outside any
/// transaction on return, success or failure.
pub async fn ensure_schema(
    session: &dyn Session,
    table: &str,
    options: &ReconcileOptions,
) -> Result<Reconciled, Error> {
    let target = SchemaTarget::new(table, options.dimensions)?;

    if !options.advisory_lock {
        return reconcile(session, &target, options).await;
    }

    let key = sql::advisory_lock_key(target.table());
    session
        .execute(&format!("SELECT pg_advisory_lock({key})"))
        .await
        .map_err(|e| Error::Connection(format!("advisory lock acquisition failed: {e}")))?;
    let result = reconcile(session, &target, options).await;
    // Best effort: closing the session releases the lock anyway.
    let _ = session
        .execute(&format!("SELECT pg_advisory_unlock({key})"))
        .await;
    result
}

async fn reconcile(
    session: &dyn Session,
    target: &SchemaTarget,
    options: &ReconcileOptions,
) -> Result<Reconciled, Error> {
    let table = target.table();
    let state = catalog::inspect(session, table).await?;
    let decision = classify(&state);
    debug!(table, ?decision, "classified");

    match decision {
        Decision::SchemaOk => {
            info!(table, "schema matches; nothing to do");
            Ok(Reconciled {
                action: Action::None,
                backup_table: None,
                message: format!("table {table} already matches the desired schema"),
            })
        }
        Decision::NoTable => create_fresh(session, target).await,
        Decision::IndexRepairOnly => repair_indexes(session, target, &state).await,
        Decision::SchemaMismatch(divergences) => {
            if options.allow_destructive {
                migrate_mismatched(session, target, &state, &divergences).await
            } else {
                let listed = list(&divergences);
                warn!(table, divergences = %listed, "schema mismatch; destructive migration not permitted");
                Ok(Reconciled {
                    action: Action::ManualMigrationRequired,
                    backup_table: None,
                    message: format!("table {table} requires manual migration: {listed}"),
                })
            }
        }
    }
}

/// Same column + index DDL as a migration's recreate step, minus the
/// backup/drop — there is nothing pre-existing.
async fn create_fresh(session: &dyn Session, target: &SchemaTarget) -> Result<Reconciled, Error> {
    let table = target.table();
    session
        .execute("BEGIN")
        .await
        .map_err(|e| Error::Migration(format!("failed to open transaction: {e}")))?;

    let created = async {
        session
            .execute("CREATE EXTENSION IF NOT EXISTS vector")
            .await
            .map_err(|e| Error::Migration(format!("vector extension unavailable: {e}")))?;
        session
            .execute(&target.create_table_sql())
            .await
            .map_err(|e| Error::Migration(format!("create failed: {e}")))?;
        index::ensure_indexes(session, target, Default::default()).await
    }
    .await;

    match created {
        Ok(indexes) => {
            session
                .execute("COMMIT")
                .await
                .map_err(|e| Error::Migration(format!("commit failed: {e}")))?;
            info!(table, "created table and indexes");
            Ok(Reconciled {
                action: Action::CreatedFresh,
                backup_table: None,
                message: format!("created table {table}{}", similarity_note(&indexes)),
            })
        }
        Err(e) => {
            let _ = session.execute("ROLLBACK").await;
            Err(e)
        }
    }
}

async fn repair_indexes(
    session: &dyn Session,
    target: &SchemaTarget,
    state: &CatalogState,
) -> Result<Reconciled, Error> {
    let table = target.table();
    let present = state.indexes().unwrap_or_default();
    session
        .execute("BEGIN")
        .await
        .map_err(|e| Error::Migration(format!("failed to open transaction: {e}")))?;

    match index::ensure_indexes(session, target, present).await {
        Ok(indexes) => {
            session
                .execute("COMMIT")
                .await
                .map_err(|e| Error::Migration(format!("commit failed: {e}")))?;
            info!(table, "repaired indexes");
            Ok(Reconciled {
                action: Action::RepairedIndexes,
                backup_table: None,
                message: format!("repaired missing indexes on {table}{}", similarity_note(&indexes)),
            })
        }
        Err(e) => {
            let _ = session.execute("ROLLBACK").await;
            Err(e)
        }
    }
}

async fn migrate_mismatched(
    session: &dyn Session,
    target: &SchemaTarget,
    state: &CatalogState,
    divergences: &[Divergence],
) -> Result<Reconciled, Error> {
    let table = target.table();
    info!(table, divergences = %list(divergences), "migrating mismatched table");
    let report = migrate::run_destructive(session, target, state).await?;

    let backup_note = match &report.backup_table {
        Some(name) => format!("; backup retained as {name}"),
        None => "; table was empty, no backup taken".to_string(),
    };
    Ok(Reconciled {
        message: format!(
            "migrated table {table}{}{}",
            backup_note,
            similarity_note(&report.indexes)
        ),
        action: Action::Migrated,
        backup_table: report.backup_table,
    })
}

fn similarity_note(indexes: &IndexReport) -> String {
    if indexes.degraded {
        return " (no similarity index: no access method available)".to_string();
    }
    match indexes.similarity_created {
        Some(VectorIndexMethod::IvfFlat) => " (similarity index via ivfflat)".to_string(),
        _ => String::new(),
    }
}

fn list(divergences: &[Divergence]) -> String {
    divergences
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The record crossing the public boundary — always `{status, message}`,
/// never a panic or a raw error.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }

    /// Fold an engine result into the boundary record.
    pub fn from_result(result: Result<Reconciled, Error>) -> Self {
        match result {
            Ok(reconciled) => Outcome::success(reconciled.message),
            Err(e) => Outcome::error(e.to_string()),
        }
    }
}
