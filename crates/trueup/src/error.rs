use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("catalog read failed: {0}")]
    Catalog(SqlError),

    #[error("index creation failed: {0}")]
    Index(SqlError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("secret error: {0}")]
    Secret(String),
}

/// A database error flattened to what the engine needs: the server message
/// and the SQLSTATE code, when one was reported.
///
/// `tokio_postgres::Error` cannot be constructed outside the driver, which
/// would make scripted test sessions impossible. This type can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlError {
    pub message: String,
    pub code: Option<String>,
}

impl SqlError {
    pub fn new(message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            message: message.into(),
            code: code.map(|c| c.to_string()),
        }
    }

    /// True when the server rejected a statement because the named index
    /// access method does not exist (SQLSTATE 42704, undefined_object).
    ///
    /// When no SQLSTATE was captured we fall back to matching the message
    /// alone, the way the capability probe would.
    pub fn is_missing_access_method(&self, method: &str) -> bool {
        let undefined = self.code.as_deref().is_none_or(|c| c == "42704");
        undefined && self.message.contains("access method") && self.message.contains(method)
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (SQLSTATE {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<tokio_postgres::Error> for SqlError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => SqlError {
                message: db.message().to_string(),
                code: Some(db.code().code().to_string()),
            },
            None => SqlError {
                message: err.to_string(),
                code: None,
            },
        }
    }
}
