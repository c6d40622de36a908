//! The tokio-postgres backed [`Session`].
//!
//! One session per invocation, no pool: reconciliation is a short-lived,
//! strictly sequential job. The connection driver task is spawned off and
//! winds down when the client drops, so every exit path releases the
//! connection (and with it any advisory lock still held).

use std::time::Duration;

use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;
use tracing::{Instrument, debug_span, warn};

use crate::creds::Credentials;
use crate::error::{Error, SqlError};
use crate::session::{Session, SqlFuture};

/// Where to find the database. Credentials travel separately.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub connect_timeout: Duration,
}

impl DbConfig {
    pub fn new(host: impl Into<String>, port: u16, dbname: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            dbname: dbname.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// A [`Session`] over a live tokio-postgres client.
pub struct PgSession {
    client: tokio_postgres::Client,
}

/// Open a session, spawning the connection driver task.
pub async fn connect(config: &DbConfig, credentials: &Credentials) -> Result<PgSession, Error> {
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .dbname(&config.dbname)
        .user(&credentials.username)
        .password(&credentials.password)
        .connect_timeout(config.connect_timeout);

    let (client, connection) = pg
        .connect(NoTls)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("database connection error: {e}");
        }
    });

    Ok(PgSession { client })
}

impl Session for PgSession {
    fn execute<'a>(&'a self, sql: &'a str) -> SqlFuture<'a, u64> {
        Box::pin(async move {
            let span = debug_span!("db.execute", sql = %sql, affected = tracing::field::Empty);
            let affected = self
                .client
                .execute(sql, &[])
                .instrument(span.clone())
                .await
                .map_err(SqlError::from)?;
            span.record("affected", affected);
            Ok(affected)
        })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> SqlFuture<'a, Vec<Vec<Option<String>>>> {
        Box::pin(async move {
            let span = debug_span!("db.query", sql = %sql, rows = tracing::field::Empty);
            let sql_params: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p as &(dyn ToSql + Sync))
                .collect();
            let rows = self
                .client
                .query(sql, &sql_params)
                .instrument(span.clone())
                .await
                .map_err(SqlError::from)?;
            span.record("rows", rows.len());
            rows.iter()
                .map(|row| {
                    (0..row.len())
                        .map(|i| row.try_get::<_, Option<String>>(i))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()
                .map_err(SqlError::from)
        })
    }

    fn query_i64<'a>(&'a self, sql: &'a str, params: &'a [&'a str]) -> SqlFuture<'a, i64> {
        Box::pin(async move {
            let span = debug_span!("db.query", sql = %sql, rows = 1u64);
            let sql_params: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p as &(dyn ToSql + Sync))
                .collect();
            let row = self
                .client
                .query_one(sql, &sql_params)
                .instrument(span)
                .await
                .map_err(SqlError::from)?;
            row.try_get(0).map_err(SqlError::from)
        })
    }
}
