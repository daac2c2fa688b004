//! OAuth client credentials (the "client secrets" file).
//!
//! These identify the application to the provider. They are needed for every
//! call to the token endpoint, so a refresh in a serverless invocation needs
//! them as much as the interactive consent flow does.

use std::fmt;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// OAuth 2.0 client ID and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Layout of a client secrets JSON file.
///
/// Google Cloud Console nests the values under `installed` or `web`; tools
/// such as gcloud write them at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a client secrets file.
    ///
    /// A missing file is reported with the download hint, since it is the
    /// usual first-run mistake.
    pub fn from_file(path: impl AsRef<Path>) -> AuthResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AuthError::configuration(format!(
                "client secrets file {} not found; download it from the Google Cloud Console \
                 (APIs & Services > Credentials) and save it at that path",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!(
                "failed to read client secrets file {}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Decodes a base64-encoded client secrets JSON document, the form used to
    /// pass the file through a serverless environment variable.
    pub fn from_base64(encoded: &str) -> AuthResult<Self> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            AuthError::configuration("client secrets variable is not valid base64").with_source(e)
        })?;
        let json = String::from_utf8(bytes).map_err(|e| {
            AuthError::configuration("client secrets variable is not UTF-8").with_source(e)
        })?;
        Self::from_json(&json)
    }

    /// Parses a client secrets JSON string in any of the supported layouts.
    pub fn from_json(json: &str) -> AuthResult<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json).map_err(|e| {
            AuthError::configuration("failed to parse client secrets JSON").with_source(e)
        })?;

        if let Some(secrets) = file.installed.or(file.web) {
            return Ok(Self::new(secrets.client_id, secrets.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(AuthError::configuration(
            "client secrets must contain an 'installed' or 'web' section, \
             or 'client_id' and 'client_secret' at the root",
        ))
    }

    /// Checks that both values are present.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::configuration("client_id is empty"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::configuration("client_secret is empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
