//! Destructive migration: backup, recreate, best-effort re-populate.
//!
//! Runs only when the classifier found a column-level mismatch and the
//! caller explicitly allowed destruction. The whole sequence is one
//! transaction: any structural failure rolls everything back and the
//! original table survives untouched. Backup tables are never dropped by
//! this engine — they are the recovery path when a migration turns out to
//! have been a mistake.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::catalog::{self, CatalogState, IndexPresence};
use crate::error::Error;
use crate::index::{self, IndexReport};
use crate::session::Session;
use crate::sql::{self, Ident};
use crate::target::{METADATA_COLUMN, SchemaTarget, TEXT_COLUMN};

const REPOPULATE_SAVEPOINT: &str = "repopulate";

/// What a destructive migration did.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Backup table holding the pre-migration rows, when there were any.
    pub backup_table: Option<String>,
    pub rows_backed_up: i64,
    /// Whether text/metadata were copied back into the new table.
    pub repopulated: bool,
    pub indexes: IndexReport,
}

/// Rebuild `target`'s table from scratch, preserving what can be preserved.
///
/// `original` is the pre-migration catalog state; it decides which columns
/// the re-populate step can copy. The caller has already classified the
/// divergence and confirmed destructive migration is permitted.
pub async fn run_destructive(
    session: &dyn Session,
    target: &SchemaTarget,
    original: &CatalogState,
) -> Result<MigrationReport, Error> {
    session
        .execute("BEGIN")
        .await
        .map_err(|e| Error::Migration(format!("failed to open transaction: {e}")))?;

    match migrate_in_txn(session, target, original).await {
        Ok(report) => {
            session
                .execute("COMMIT")
                .await
                .map_err(|e| Error::Migration(format!("commit failed: {e}")))?;
            info!(
                table = target.table(),
                backup = report.backup_table.as_deref().unwrap_or("<none>"),
                rows = report.rows_backed_up,
                "migration committed"
            );
            Ok(report)
        }
        Err(e) => {
            // Rolling back restores the original table exactly as it was.
            let _ = session.execute("ROLLBACK").await;
            Err(e)
        }
    }
}

async fn migrate_in_txn(
    session: &dyn Session,
    target: &SchemaTarget,
    original: &CatalogState,
) -> Result<MigrationReport, Error> {
    let table = target.table();
    let rows = catalog::row_count(session, table).await?;

    let backup_table = if rows > 0 {
        let name = sql::backup_table_name(table, Utc::now());
        session
            .execute(&format!(
                "CREATE TABLE {} AS TABLE {}",
                Ident(&name),
                Ident(table)
            ))
            .await
            .map_err(|e| Error::Migration(format!("backup copy failed: {e}")))?;
        info!(table, backup = %name, rows, "backed up existing rows");
        Some(name)
    } else {
        debug!(table, "table is empty, skipping backup");
        None
    };

    session
        .execute(&format!("DROP TABLE {}", Ident(table)))
        .await
        .map_err(|e| Error::Migration(format!("drop failed: {e}")))?;

    session
        .execute("CREATE EXTENSION IF NOT EXISTS vector")
        .await
        .map_err(|e| Error::Migration(format!("vector extension unavailable: {e}")))?;
    session
        .execute(&target.create_table_sql())
        .await
        .map_err(|e| Error::Migration(format!("recreate failed: {e}")))?;

    let indexes = index::ensure_indexes(session, target, IndexPresence::default()).await?;

    let mut repopulated = false;
    if let Some(backup) = &backup_table {
        repopulated = repopulate(session, table, backup, original).await?;
    }

    Ok(MigrationReport {
        backup_table,
        rows_backed_up: rows,
        repopulated,
        indexes,
    })
}

/// Copy recoverable columns back from the backup.
///
/// Embeddings are never carried over: they were produced against the old
/// schema and must be regenerated by the caller. Only columns the backup
/// actually has are copied, and nothing is copied at all when the original
/// had no text column. A failed copy is logged and absorbed — structural
/// correctness matters more than the convenience copy.
async fn repopulate(
    session: &dyn Session,
    table: &str,
    backup: &str,
    original: &CatalogState,
) -> Result<bool, Error> {
    if !original.has_column(TEXT_COLUMN) {
        debug!(table, "original had no text column, skipping re-populate");
        return Ok(false);
    }

    let mut columns = vec![TEXT_COLUMN];
    if original.has_column(METADATA_COLUMN) {
        columns.push(METADATA_COLUMN);
    }
    let column_list = columns
        .iter()
        .map(|c| sql::quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    session
        .execute(&format!("SAVEPOINT {}", REPOPULATE_SAVEPOINT))
        .await
        .map_err(|e| Error::Migration(format!("savepoint failed: {e}")))?;

    let copy = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        Ident(table),
        column_list,
        column_list,
        Ident(backup)
    );
    match session.execute(&copy).await {
        Ok(copied) => {
            session
                .execute(&format!("RELEASE SAVEPOINT {}", REPOPULATE_SAVEPOINT))
                .await
                .map_err(|e| Error::Migration(format!("savepoint release failed: {e}")))?;
            info!(table, copied, "re-populated recoverable columns from backup");
            Ok(true)
        }
        Err(e) => {
            session
                .execute(&format!("ROLLBACK TO SAVEPOINT {}", REPOPULATE_SAVEPOINT))
                .await
                .map_err(|e| Error::Migration(format!("savepoint rollback failed: {e}")))?;
            warn!(table, backup, error = %e, "re-populate failed; backup retained");
            Ok(false)
        }
    }
}
