//! Divergence classification.
//!
//! A pure decision over the inspected state: no I/O, no clock, no config.
//! Every invocation classifies fresh catalog state, which is what makes the
//! engine idempotent — there is no migration-version bookkeeping to drift.

use std::fmt;

use crate::catalog::CatalogState;
use crate::target::{
    EMBEDDING_COLUMN, EMBEDDING_UDT, ID_COLUMN, ID_UDT, METADATA_COLUMN,
};

/// What reconciliation must do for a table. Exactly one applies per
/// invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The table does not exist; create it from scratch.
    NoTable,
    /// Columns are as desired but at least one index is missing.
    IndexRepairOnly,
    /// A column is missing or has the wrong underlying type; only a
    /// migration can fix this.
    SchemaMismatch(Vec<Divergence>),
    /// Nothing to do.
    SchemaOk,
}

/// One specific way the physical table diverges from the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
    MissingColumn {
        column: &'static str,
    },
    WrongType {
        column: &'static str,
        expected: &'static str,
        actual: String,
    },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::MissingColumn { column } => {
                write!(f, "column \"{}\" is missing", column)
            }
            Divergence::WrongType {
                column,
                expected,
                actual,
            } => write!(
                f,
                "column \"{}\" has underlying type \"{}\", expected \"{}\"",
                column, actual, expected
            ),
        }
    }
}

/// Classify inspected state against the desired schema.
///
/// Column mismatches take precedence over index gaps: a table with a wrong
/// identifier type *and* a missing index is a [`Decision::SchemaMismatch`],
/// since that is the condition requiring a migration.
pub fn classify(state: &CatalogState) -> Decision {
    if state.absent() {
        return Decision::NoTable;
    }

    let mut divergences = Vec::new();
    check_column(state, ID_COLUMN, ID_UDT, &mut divergences);
    check_column(state, EMBEDDING_COLUMN, EMBEDDING_UDT, &mut divergences);
    if !state.has_column(METADATA_COLUMN) {
        divergences.push(Divergence::MissingColumn {
            column: METADATA_COLUMN,
        });
    }

    if !divergences.is_empty() {
        return Decision::SchemaMismatch(divergences);
    }

    let indexes = state.indexes().unwrap_or_default();
    if indexes.text_search && indexes.similarity {
        Decision::SchemaOk
    } else {
        Decision::IndexRepairOnly
    }
}

fn check_column(
    state: &CatalogState,
    column: &'static str,
    expected_udt: &'static str,
    out: &mut Vec<Divergence>,
) {
    match state.column(column) {
        None => out.push(Divergence::MissingColumn { column }),
        Some(c) if c.underlying_type != expected_udt => out.push(Divergence::WrongType {
            column,
            expected: expected_udt,
            actual: c.underlying_type.clone(),
        }),
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnDescriptor, IndexPresence};

    fn column(name: &str, declared: &str, udt: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.into(),
            declared_type: declared.into(),
            underlying_type: udt.into(),
        }
    }

    fn desired_columns() -> Vec<ColumnDescriptor> {
        vec![
            column("id", "uuid", "uuid"),
            column("text", "text", "text"),
            column("embedding", "USER-DEFINED", "vector"),
            column("metadata", "jsonb", "jsonb"),
        ]
    }

    fn both_indexes() -> IndexPresence {
        IndexPresence {
            text_search: true,
            similarity: true,
        }
    }

    #[test]
    fn empty_column_set_is_no_table() {
        let state = CatalogState::new(vec![], None);
        assert_eq!(classify(&state), Decision::NoTable);
    }

    #[test]
    fn matching_schema_with_both_indexes_is_ok() {
        let state = CatalogState::new(desired_columns(), Some(both_indexes()));
        assert_eq!(classify(&state), Decision::SchemaOk);
    }

    #[test]
    fn missing_index_alone_is_repair_only() {
        let state = CatalogState::new(
            desired_columns(),
            Some(IndexPresence {
                text_search: true,
                similarity: false,
            }),
        );
        assert_eq!(classify(&state), Decision::IndexRepairOnly);
    }

    #[test]
    fn wrong_identifier_type_is_mismatch() {
        let mut columns = desired_columns();
        columns[0] = column("id", "character varying", "varchar");
        let state = CatalogState::new(columns, Some(both_indexes()));
        match classify(&state) {
            Decision::SchemaMismatch(divergences) => {
                assert_eq!(
                    divergences,
                    vec![Divergence::WrongType {
                        column: "id",
                        expected: "uuid",
                        actual: "varchar".into(),
                    }]
                );
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn missing_metadata_alone_is_mismatch() {
        let columns = desired_columns()
            .into_iter()
            .filter(|c| c.name != "metadata")
            .collect();
        let state = CatalogState::new(columns, Some(both_indexes()));
        assert!(matches!(classify(&state), Decision::SchemaMismatch(_)));
    }

    #[test]
    fn column_mismatch_outranks_index_gap() {
        // Wrong id type *and* no indexes at all: the column problem decides.
        let mut columns = desired_columns();
        columns[0] = column("id", "character varying", "varchar");
        let state = CatalogState::new(columns, Some(IndexPresence::default()));
        assert!(matches!(classify(&state), Decision::SchemaMismatch(_)));
    }

    #[test]
    fn absent_text_column_does_not_block_ok() {
        // The text column is recoverable-data only; classification does not
        // gate on it.
        let columns = desired_columns()
            .into_iter()
            .filter(|c| c.name != "text")
            .collect();
        let state = CatalogState::new(columns, Some(both_indexes()));
        assert_eq!(classify(&state), Decision::SchemaOk);
    }
}
