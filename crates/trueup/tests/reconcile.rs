//! Engine tests against a scripted session.
//!
//! Every statement the engine issues is recorded; responses are scripted per
//! SQL substring. This exercises the orchestrator end to end — inspection,
//! classification, provisioning, migration, transaction control — without a
//! server.

use std::sync::Mutex;

use trueup::{
    Action, Error, ReconcileOptions, Session, SqlError, SqlFuture, ensure_schema,
};

#[derive(Clone)]
enum Response {
    Rows(Vec<Vec<Option<String>>>),
    Count(i64),
    Fail(SqlError),
}

struct Rule {
    needle: &'static str,
    response: Response,
}

#[derive(Default)]
struct MockSession {
    rules: Vec<Rule>,
    log: Mutex<Vec<String>>,
}

impl MockSession {
    fn new() -> Self {
        Self::default()
    }

    fn rows(mut self, needle: &'static str, rows: Vec<Vec<Option<String>>>) -> Self {
        self.rules.push(Rule {
            needle,
            response: Response::Rows(rows),
        });
        self
    }

    fn count(mut self, needle: &'static str, n: i64) -> Self {
        self.rules.push(Rule {
            needle,
            response: Response::Count(n),
        });
        self
    }

    fn fail(mut self, needle: &'static str, message: &str, code: &str) -> Self {
        self.rules.push(Rule {
            needle,
            response: Response::Fail(SqlError::new(message, Some(code))),
        });
        self
    }

    fn response_for(&self, sql: &str) -> Option<Response> {
        self.rules
            .iter()
            .find(|r| sql.contains(r.needle))
            .map(|r| r.response.clone())
    }

    fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn executed(&self, needle: &str) -> bool {
        self.statements().iter().any(|s| s.contains(needle))
    }

    fn count_matching(&self, needle: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }

    fn position(&self, needle: &str) -> Option<usize> {
        self.statements().iter().position(|s| s.contains(needle))
    }

    /// True when no statement would change the database.
    fn no_ddl(&self) -> bool {
        const MUTATING: &[&str] = &["CREATE", "DROP", "ALTER", "INSERT", "UPDATE", "DELETE"];
        !self
            .statements()
            .iter()
            .any(|s| MUTATING.iter().any(|verb| s.starts_with(verb)))
    }
}

impl Session for MockSession {
    fn execute<'a>(&'a self, sql: &'a str) -> SqlFuture<'a, u64> {
        self.log.lock().unwrap().push(sql.to_string());
        let response = self.response_for(sql);
        Box::pin(async move {
            match response {
                Some(Response::Fail(e)) => Err(e),
                _ => Ok(1),
            }
        })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        _params: &'a [&'a str],
    ) -> SqlFuture<'a, Vec<Vec<Option<String>>>> {
        self.log.lock().unwrap().push(sql.to_string());
        let response = self.response_for(sql);
        Box::pin(async move {
            match response {
                Some(Response::Fail(e)) => Err(e),
                Some(Response::Rows(rows)) => Ok(rows),
                _ => Ok(vec![]),
            }
        })
    }

    fn query_i64<'a>(&'a self, sql: &'a str, _params: &'a [&'a str]) -> SqlFuture<'a, i64> {
        self.log.lock().unwrap().push(sql.to_string());
        let response = self.response_for(sql);
        Box::pin(async move {
            match response {
                Some(Response::Fail(e)) => Err(e),
                Some(Response::Count(n)) => Ok(n),
                _ => Ok(0),
            }
        })
    }
}

fn col(name: &str, declared: &str, udt: &str) -> Vec<Option<String>> {
    vec![
        Some(name.to_string()),
        Some(declared.to_string()),
        Some(udt.to_string()),
    ]
}

fn desired_columns() -> Vec<Vec<Option<String>>> {
    vec![
        col("id", "uuid", "uuid"),
        col("text", "text", "text"),
        col("embedding", "USER-DEFINED", "vector"),
        col("metadata", "jsonb", "jsonb"),
    ]
}

fn indexdefs(text_search: bool, similarity_method: Option<&str>) -> Vec<Vec<Option<String>>> {
    let mut defs = vec![];
    if text_search {
        defs.push(vec![Some(
            "CREATE INDEX docs_text_gin_idx ON public.docs USING gin \
             (to_tsvector('simple'::regconfig, text))"
                .to_string(),
        )]);
    }
    if let Some(method) = similarity_method {
        defs.push(vec![Some(format!(
            "CREATE INDEX docs_embedding_{method}_idx ON public.docs USING {method} \
             (embedding vector_cosine_ops)"
        ))]);
    }
    defs
}

fn options() -> ReconcileOptions {
    ReconcileOptions {
        advisory_lock: false,
        ..ReconcileOptions::default()
    }
}

#[tokio::test]
async fn schema_ok_performs_no_ddl_even_when_called_twice() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, Some("hnsw")));

    let first = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(first.action, Action::None);

    let second = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(second.action, Action::None);

    assert!(session.no_ddl(), "log: {:?}", session.statements());
}

#[tokio::test]
async fn absent_table_is_created_fresh() {
    let session = MockSession::new()
        .rows("information_schema.columns", vec![])
        .count("pg_am", 1);

    let reconciled = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(reconciled.action, Action::CreatedFresh);
    assert_eq!(reconciled.backup_table, None);

    assert!(session.executed("BEGIN"));
    assert!(session.executed("CREATE EXTENSION IF NOT EXISTS vector"));
    assert!(session.executed("CREATE TABLE IF NOT EXISTS \"docs\""));
    assert!(session.executed("vector(1536)"));
    assert!(session.executed("to_tsvector('simple', \"text\")"));
    assert!(session.executed("USING hnsw"));
    assert!(session.executed("COMMIT"));
    assert!(!session.executed("DROP TABLE"));
}

#[tokio::test]
async fn missing_similarity_index_repairs_without_column_ddl() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, None))
        .count("pg_am", 1);

    let reconciled = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(reconciled.action, Action::RepairedIndexes);

    assert!(session.executed("USING hnsw"));
    assert!(!session.executed("CREATE TABLE"));
    assert!(!session.executed("CREATE INDEX IF NOT EXISTS \"docs_text_gin_idx\""));
}

#[tokio::test]
async fn hnsw_failure_falls_back_to_ivfflat_exactly_once() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, None))
        .count("pg_am", 1)
        .fail(
            "USING hnsw",
            "access method \"hnsw\" does not exist",
            "42704",
        );

    let reconciled = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(reconciled.action, Action::RepairedIndexes);

    assert_eq!(session.count_matching("USING hnsw"), 1);
    assert_eq!(session.count_matching("USING ivfflat"), 1);
    // The failed attempt is undone before the fallback runs.
    let rollback = session
        .position("ROLLBACK TO SAVEPOINT similarity_index")
        .expect("failed attempt must be rolled back");
    let fallback = session.position("USING ivfflat").unwrap();
    assert!(rollback < fallback);
    assert!(session.executed("COMMIT"));
}

#[tokio::test]
async fn unavailable_hnsw_skips_straight_to_ivfflat() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, None))
        .count("pg_am", 0);

    let reconciled = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(reconciled.action, Action::RepairedIndexes);
    assert_eq!(session.count_matching("USING hnsw"), 0);
    assert_eq!(session.count_matching("USING ivfflat"), 1);
}

#[tokio::test]
async fn no_access_method_at_all_degrades_without_failing() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, None))
        .count("pg_am", 0)
        .fail(
            "USING ivfflat",
            "access method \"ivfflat\" does not exist",
            "42704",
        );

    let reconciled = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(reconciled.action, Action::RepairedIndexes);
    assert!(reconciled.message.contains("no similarity index"));
    assert!(session.executed("COMMIT"));
}

#[tokio::test]
async fn other_index_failures_are_fatal() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, None))
        .count("pg_am", 1)
        .fail("USING hnsw", "permission denied for table docs", "42501");

    let err = ensure_schema(&session, "docs", &options())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Index(_)));
    assert!(session.executed("ROLLBACK"));
    assert!(!session.executed("COMMIT"));
}

#[tokio::test]
async fn mismatch_without_permission_mutates_nothing() {
    let mut columns = desired_columns();
    columns[0] = col("id", "character varying", "varchar");
    let session = MockSession::new()
        .rows("information_schema.columns", columns)
        .rows("pg_indexes", indexdefs(true, Some("hnsw")));

    let reconciled = ensure_schema(&session, "docs", &options()).await.unwrap();
    assert_eq!(reconciled.action, Action::ManualMigrationRequired);
    assert!(reconciled.message.contains("requires manual migration"));
    assert!(reconciled.message.contains("\"id\""));
    assert!(session.no_ddl(), "log: {:?}", session.statements());
    assert!(!session.executed("BEGIN"));
}

fn destructive() -> ReconcileOptions {
    ReconcileOptions {
        allow_destructive: true,
        advisory_lock: false,
        ..ReconcileOptions::default()
    }
}

fn mismatched_columns() -> Vec<Vec<Option<String>>> {
    let mut columns = desired_columns();
    columns[0] = col("id", "character varying", "varchar");
    columns
}

#[tokio::test]
async fn permitted_migration_backs_up_then_recreates() {
    let session = MockSession::new()
        .rows("information_schema.columns", mismatched_columns())
        .rows("pg_indexes", indexdefs(true, Some("hnsw")))
        .count("pg_am", 1)
        .count("count(*)", 10);

    let reconciled = ensure_schema(&session, "docs", &destructive())
        .await
        .unwrap();
    assert_eq!(reconciled.action, Action::Migrated);
    let backup = reconciled.backup_table.expect("backup must be taken");
    assert!(backup.starts_with("docs_backup_"));

    // Backup happens before the drop, the drop before the recreate.
    let backup_pos = session.position("AS TABLE \"docs\"").unwrap();
    let drop_pos = session.position("DROP TABLE \"docs\"").unwrap();
    let create_pos = session.position("CREATE TABLE IF NOT EXISTS \"docs\"").unwrap();
    assert!(backup_pos < drop_pos && drop_pos < create_pos);

    // Recoverable columns come back; embeddings never do.
    assert!(session.executed(
        "INSERT INTO \"docs\" (\"text\", \"metadata\") SELECT \"text\", \"metadata\" FROM"
    ));
    assert!(!session.executed("\"embedding\") SELECT"));
    assert!(session.executed("COMMIT"));
}

#[tokio::test]
async fn empty_table_migrates_without_backup() {
    let session = MockSession::new()
        .rows("information_schema.columns", mismatched_columns())
        .rows("pg_indexes", indexdefs(true, Some("hnsw")))
        .count("pg_am", 1)
        .count("count(*)", 0);

    let reconciled = ensure_schema(&session, "docs", &destructive())
        .await
        .unwrap();
    assert_eq!(reconciled.action, Action::Migrated);
    assert_eq!(reconciled.backup_table, None);
    assert!(!session.executed("_backup_"));
    assert!(reconciled.message.contains("no backup"));
}

#[tokio::test]
async fn migration_rolls_back_when_a_structural_step_fails() {
    let session = MockSession::new()
        .rows("information_schema.columns", mismatched_columns())
        .rows("pg_indexes", indexdefs(true, Some("hnsw")))
        .count("pg_am", 1)
        .count("count(*)", 10)
        .fail("DROP TABLE", "must be owner of table docs", "42501");

    let err = ensure_schema(&session, "docs", &destructive())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Migration(_)));
    assert!(session.executed("ROLLBACK"));
    assert!(!session.executed("COMMIT"));
}

#[tokio::test]
async fn repopulate_failure_is_absorbed_and_still_commits() {
    let session = MockSession::new()
        .rows("information_schema.columns", mismatched_columns())
        .rows("pg_indexes", indexdefs(true, Some("hnsw")))
        .count("pg_am", 1)
        .count("count(*)", 10)
        .fail("INSERT INTO", "value too long for type", "22001");

    let reconciled = ensure_schema(&session, "docs", &destructive())
        .await
        .unwrap();
    assert_eq!(reconciled.action, Action::Migrated);
    assert!(reconciled.backup_table.is_some());
    assert!(session.executed("ROLLBACK TO SAVEPOINT repopulate"));
    assert!(session.executed("COMMIT"));
}

#[tokio::test]
async fn missing_text_column_skips_repopulate_entirely() {
    // Original table has no text column: nothing recoverable to copy.
    let columns = vec![
        col("id", "character varying", "varchar"),
        col("embedding", "USER-DEFINED", "vector"),
        col("metadata", "jsonb", "jsonb"),
    ];
    let session = MockSession::new()
        .rows("information_schema.columns", columns)
        .rows("pg_indexes", indexdefs(true, Some("hnsw")))
        .count("pg_am", 1)
        .count("count(*)", 5);

    let reconciled = ensure_schema(&session, "docs", &destructive())
        .await
        .unwrap();
    assert_eq!(reconciled.action, Action::Migrated);
    assert!(reconciled.backup_table.is_some());
    assert!(!session.executed("INSERT INTO"));
}

#[tokio::test]
async fn advisory_lock_brackets_the_run() {
    let session = MockSession::new()
        .rows("information_schema.columns", desired_columns())
        .rows("pg_indexes", indexdefs(true, Some("hnsw")));

    let opts = ReconcileOptions::default();
    assert!(opts.advisory_lock);
    ensure_schema(&session, "docs", &opts).await.unwrap();

    let lock = session.position("pg_advisory_lock").unwrap();
    let unlock = session.position("pg_advisory_unlock").unwrap();
    assert!(lock < unlock);
}

#[tokio::test]
async fn empty_table_name_is_a_configuration_error() {
    let session = MockSession::new();
    let err = ensure_schema(&session, "   ", &options()).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(session.statements().is_empty());
}

#[tokio::test]
async fn catalog_failures_propagate_as_catalog_errors() {
    let session = MockSession::new().fail(
        "information_schema.columns",
        "permission denied for schema public",
        "42501",
    );

    let err = ensure_schema(&session, "docs", &options()).await.unwrap_err();
    assert!(matches!(err, Error::Catalog(_)));
}
