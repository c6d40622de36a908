//! The desired logical schema and its DDL.
//!
//! One table shape, fixed for the life of this engine: a server-generated
//! UUID key, the source text, a `vector(N)` embedding column, and a JSONB
//! metadata column. Everything the classifier compares against and everything
//! the provisioner creates is derived from here, so there is exactly one
//! place that knows the column names.

use crate::error::Error;
use crate::sql::{self, Ident};

/// Identifier column: unique key, generated server-side.
pub const ID_COLUMN: &str = "id";
/// Source text column.
pub const TEXT_COLUMN: &str = "text";
/// Embedding column. One name, everywhere.
pub const EMBEDDING_COLUMN: &str = "embedding";
/// Semi-structured metadata column.
pub const METADATA_COLUMN: &str = "metadata";

/// Required underlying catalog type (`udt_name`) for the identifier column.
pub const ID_UDT: &str = "uuid";
/// Required underlying catalog type for the embedding column.
pub const EMBEDDING_UDT: &str = "vector";

/// Default embedding dimensionality.
pub const DEFAULT_DIMENSIONS: u32 = 1536;

/// Access methods for the similarity index, in preference order.
///
/// HNSW builds a graph index with better query latency; IVFFlat is the
/// clustering index older pgvector builds ship with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorIndexMethod {
    Hnsw,
    IvfFlat,
}

impl VectorIndexMethod {
    /// The catalog name of the access method (`pg_am.amname`).
    pub fn amname(&self) -> &'static str {
        match self {
            VectorIndexMethod::Hnsw => "hnsw",
            VectorIndexMethod::IvfFlat => "ivfflat",
        }
    }

    /// The method to try next when this one is unavailable.
    pub fn fallback(&self) -> Option<VectorIndexMethod> {
        match self {
            VectorIndexMethod::Hnsw => Some(VectorIndexMethod::IvfFlat),
            VectorIndexMethod::IvfFlat => None,
        }
    }
}

impl std::fmt::Display for VectorIndexMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.amname())
    }
}

/// The desired logical shape of an embeddings table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaTarget {
    table: String,
    dimensions: u32,
}

impl SchemaTarget {
    /// Build a target, validating the table name and dimensionality.
    ///
    /// Dimensionality is fixed for the table's lifetime; changing it later
    /// is a migration, not a repair.
    pub fn new(table: impl Into<String>, dimensions: u32) -> Result<Self, Error> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(Error::Configuration(
                "table name must be a non-empty string".into(),
            ));
        }
        if dimensions == 0 {
            return Err(Error::Configuration(
                "vector dimensionality must be a positive integer".into(),
            ));
        }
        Ok(Self { table, dimensions })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    /// `CREATE TABLE` for the desired schema.
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({} UUID PRIMARY KEY DEFAULT gen_random_uuid(), \
             {} TEXT, {} vector({}), {} JSONB)",
            Ident(&self.table),
            Ident(ID_COLUMN),
            Ident(TEXT_COLUMN),
            Ident(EMBEDDING_COLUMN),
            self.dimensions,
            Ident(METADATA_COLUMN),
        )
    }

    /// `CREATE INDEX` for the text-search index: a functional GIN index over
    /// the normalized-text projection of the text column.
    pub fn text_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING gin (to_tsvector('simple', {}))",
            Ident(sql::text_index_name(&self.table)),
            Ident(&self.table),
            Ident(TEXT_COLUMN),
        )
    }

    /// `CREATE INDEX` for the similarity index under the given access method.
    pub fn vector_index_sql(&self, method: VectorIndexMethod) -> String {
        let with = match method {
            VectorIndexMethod::Hnsw => "",
            VectorIndexMethod::IvfFlat => " WITH (lists = 100)",
        };
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} USING {} ({} vector_cosine_ops){}",
            Ident(sql::vector_index_name(&self.table, method.amname())),
            Ident(&self.table),
            method.amname(),
            Ident(EMBEDDING_COLUMN),
            with,
        )
    }
}
