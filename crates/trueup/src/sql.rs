//! SQL identifier helpers and derived object names.

use chrono::{DateTime, Utc};

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use trueup::sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes to avoid issues with reserved keywords (`user`, `table`,
/// and notably our own `text` column). Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Name of the GIN text-search index for a table.
pub fn text_index_name(table: &str) -> String {
    format!("{}_text_gin_idx", table)
}

/// Name of the similarity index for a table and access method.
pub fn vector_index_name(table: &str, method: &str) -> String {
    format!("{}_embedding_{}_idx", table, method)
}

/// Name of the backup table for one migration attempt.
///
/// The UTC timestamp suffix keeps names unique per attempt, so repeated
/// migrations never clobber an earlier backup.
pub fn backup_table_name(table: &str, at: DateTime<Utc>) -> String {
    format!("{}_backup_{}", table, at.format("%Y%m%d%H%M%S"))
}

/// Advisory-lock key for a table.
///
/// Derived from a blake3 hash of the table name, truncated to the signed
/// 64 bits `pg_advisory_lock` takes. Stable across processes and releases.
pub fn advisory_lock_key(table: &str) -> i64 {
    let hash = blake3::hash(table.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_le_bytes(bytes)
}
