//! Credential collaborator interface.
//!
//! The engine never talks to a secret store itself; callers hand it a
//! provider. The payload shape is the usual `{"username", "password"}` JSON
//! object secret stores deliver.

use serde::Deserialize;

use crate::error::Error;

/// Database credentials, as delivered by a secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Parse the JSON payload a secret store hands back.
    pub fn from_json(payload: &str) -> Result<Self, Error> {
        serde_json::from_str(payload)
            .map_err(|e| Error::Secret(format!("malformed secret payload: {e}")))
    }
}

/// Supplies credentials for an opaque secret identifier.
pub trait CredentialProvider {
    fn get_credentials(&self, secret_id: &str) -> Result<Credentials, Error>;
}
