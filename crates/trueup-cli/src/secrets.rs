//! Credential providers for the CLI.
//!
//! Both read the usual `{"username", "password"}` JSON payload; they differ
//! only in where the secret identifier points.

use trueup::{CredentialProvider, Credentials, Error};

/// Reads the secret payload from a file path (the secret id).
pub struct FileCredentials;

impl CredentialProvider for FileCredentials {
    fn get_credentials(&self, secret_id: &str) -> trueup::Result<Credentials> {
        let payload = std::fs::read_to_string(secret_id)
            .map_err(|e| Error::Secret(format!("cannot read secret file {secret_id}: {e}")))?;
        Credentials::from_json(&payload)
    }
}

/// Reads the secret payload from an environment variable (the secret id).
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn get_credentials(&self, secret_id: &str) -> trueup::Result<Credentials> {
        let payload = std::env::var(secret_id)
            .map_err(|_| Error::Secret(format!("environment variable {secret_id} is not set")))?;
        Credentials::from_json(&payload)
    }
}
