//! Index provisioning with access-method fallback.
//!
//! The text-search index always builds. The similarity index may not: the
//! server's pgvector build might predate HNSW, or the extension might be
//! missing entirely. We ask `pg_am` first and only fall back to matching the
//! server's error message when the probe itself is unusable. Each creation
//! attempt runs inside a savepoint so a failed statement can be undone
//! without losing DDL already applied in the surrounding transaction.

use tracing::{debug, warn};

use crate::catalog::IndexPresence;
use crate::error::Error;
use crate::session::Session;
use crate::target::{SchemaTarget, VectorIndexMethod};

const SAVEPOINT: &str = "similarity_index";

/// What the provisioner did for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Text-search index was created by this run.
    pub text_created: bool,
    /// Access method the similarity index was created with, if any was
    /// created by this run.
    pub similarity_created: Option<VectorIndexMethod>,
    /// No similarity index exists because no access method was available.
    pub degraded: bool,
}

/// Ensure both indexes exist, creating whichever `present` says is missing.
///
/// Must run inside an open transaction: the similarity attempts are
/// savepoint-scoped. A missing similarity access method degrades the table
/// (logged, non-fatal); any other failure propagates as [`Error::Index`].
pub async fn ensure_indexes(
    session: &dyn Session,
    target: &SchemaTarget,
    present: IndexPresence,
) -> Result<IndexReport, Error> {
    let mut report = IndexReport::default();

    if !present.text_search {
        session
            .execute(&target.text_index_sql())
            .await
            .map_err(Error::Index)?;
        debug!(table = target.table(), "created text-search index");
        report.text_created = true;
    }

    if !present.similarity {
        report.similarity_created = create_similarity_index(session, target).await?;
        report.degraded = report.similarity_created.is_none();
    }

    Ok(report)
}

/// Create the similarity index, preferring HNSW, falling back to IVFFlat.
///
/// Returns the method that succeeded, or `None` when no access method is
/// available on this server.
async fn create_similarity_index(
    session: &dyn Session,
    target: &SchemaTarget,
) -> Result<Option<VectorIndexMethod>, Error> {
    let mut method = VectorIndexMethod::Hnsw;

    // Ask the catalog before trying the statement; string-matching the
    // failure afterwards is the last resort, not the plan.
    if !access_method_available(session, method.amname()).await {
        debug!(
            method = method.amname(),
            "access method not in pg_am, starting from fallback"
        );
        method = VectorIndexMethod::IvfFlat;
    }

    loop {
        session
            .execute(&format!("SAVEPOINT {}", SAVEPOINT))
            .await
            .map_err(Error::Index)?;

        match session.execute(&target.vector_index_sql(method)).await {
            Ok(_) => {
                session
                    .execute(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
                    .await
                    .map_err(Error::Index)?;
                debug!(
                    table = target.table(),
                    method = method.amname(),
                    "created similarity index"
                );
                return Ok(Some(method));
            }
            Err(e) if e.is_missing_access_method(method.amname()) => {
                session
                    .execute(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))
                    .await
                    .map_err(Error::Index)?;
                match method.fallback() {
                    Some(fallback) => {
                        warn!(
                            table = target.table(),
                            unavailable = method.amname(),
                            fallback = fallback.amname(),
                            "access method unavailable, falling back"
                        );
                        method = fallback;
                    }
                    None => {
                        warn!(
                            table = target.table(),
                            "no similarity access method available; \
                             continuing without a similarity index"
                        );
                        return Ok(None);
                    }
                }
            }
            Err(e) => return Err(Error::Index(e)),
        }
    }
}

async fn access_method_available(session: &dyn Session, amname: &str) -> bool {
    match session
        .query_i64("SELECT count(*) FROM pg_am WHERE amname = $1", &[amname])
        .await
    {
        Ok(n) => n > 0,
        Err(e) => {
            debug!(amname, error = %e, "pg_am probe failed; will try the access method directly");
            true
        }
    }
}
