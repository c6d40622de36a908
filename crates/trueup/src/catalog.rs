//! Catalog inspection: what does the table actually look like right now?
//!
//! The store is the sole source of truth. Nothing is cached between
//! invocations; every reconciliation starts with a fresh read of
//! `information_schema.columns` and `pg_indexes`. Absence of the table is a
//! normal result, not an error.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::Error;
use crate::session::Session;
use crate::sql;

const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text, udt_name::text \
     FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 \
     ORDER BY ordinal_position";

const INDEXES_SQL: &str = "SELECT indexdef::text FROM pg_indexes \
     WHERE schemaname = 'public' AND tablename = $1";

/// A column as recorded in the catalog.
///
/// `declared_type` is `information_schema`'s `data_type` (extension types
/// show up as `USER-DEFINED` there); `underlying_type` is `udt_name`, which
/// is what classification keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub underlying_type: String,
}

/// Which of the two expected indexes the table currently has.
///
/// The similarity flag is satisfied by either access method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexPresence {
    pub text_search: bool,
    pub similarity: bool,
}

/// Snapshot of a table's physical state, name-indexed once at inspection.
#[derive(Debug, Clone)]
pub struct CatalogState {
    columns: IndexMap<String, ColumnDescriptor>,
    indexes: Option<IndexPresence>,
}

impl CatalogState {
    /// Assemble a state from raw parts. `indexes` is `None` when the table
    /// does not exist (and only then).
    pub fn new(columns: Vec<ColumnDescriptor>, indexes: Option<IndexPresence>) -> Self {
        let columns = columns.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self { columns, indexes }
    }

    /// True when the table does not exist.
    pub fn absent(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Index presence, only meaningful when the table exists.
    pub fn indexes(&self) -> Option<IndexPresence> {
        self.indexes
    }
}

/// Read the current column and index state of `table`.
///
/// Read-only: never mutates the store. Connectivity or permission failures
/// surface as [`Error::Catalog`].
pub async fn inspect(session: &dyn Session, table: &str) -> Result<CatalogState, Error> {
    let rows = session
        .query(COLUMNS_SQL, &[table])
        .await
        .map_err(Error::Catalog)?;

    let columns: Vec<ColumnDescriptor> = rows
        .iter()
        .map(|row| ColumnDescriptor {
            name: text_at(row, 0),
            declared_type: text_at(row, 1),
            underlying_type: text_at(row, 2),
        })
        .collect();

    if columns.is_empty() {
        debug!(table, "table not present in catalog");
        return Ok(CatalogState::new(columns, None));
    }

    let defs = session
        .query(INDEXES_SQL, &[table])
        .await
        .map_err(Error::Catalog)?;
    let presence = index_presence(defs.iter().map(|row| text_at(row, 0)));

    debug!(
        table,
        columns = columns.len(),
        text_search = presence.text_search,
        similarity = presence.similarity,
        "inspected catalog state"
    );
    Ok(CatalogState::new(columns, Some(presence)))
}

/// Count the rows currently in `table`.
pub async fn row_count(session: &dyn Session, table: &str) -> Result<i64, Error> {
    session
        .query_i64(&format!("SELECT count(*) FROM {}", sql::Ident(table)), &[])
        .await
        .map_err(Error::Catalog)
}

fn text_at(row: &[Option<String>], i: usize) -> String {
    row.get(i).and_then(|v| v.clone()).unwrap_or_default()
}

/// Pattern-match index definitions for the two indexes we care about.
///
/// `pg_indexes.indexdef` is a reconstructed `CREATE INDEX` statement; the
/// text-search index shows up as a `to_tsvector` expression and the
/// similarity index by its access method clause.
fn index_presence(defs: impl Iterator<Item = String>) -> IndexPresence {
    let mut presence = IndexPresence::default();
    for def in defs {
        let def = def.to_lowercase();
        if def.contains("to_tsvector") {
            presence.text_search = true;
        }
        if def.contains("using hnsw") || def.contains("using ivfflat") {
            presence.similarity = true;
        }
    }
    presence
}
