//! Authentication settings.
//!
//! Settings come from `~/.config/calbrief/config.toml` (every field optional)
//! and are then overlaid with the environment a serverless deployment uses:
//!
//! | Variable                    | Setting                                 |
//! |-----------------------------|-----------------------------------------|
//! | `TOKEN_PARAMETER_NAME`      | remote parameter holding the token      |
//! | `GOOGLE_CREDENTIALS_JSON`   | base64-encoded client secrets JSON      |
//! | `GOOGLE_TOKEN_JSON`         | base64-encoded token seeding the file   |
//! | `CALBRIEF_TOKEN_PATH`       | local token file                        |
//! | `CALBRIEF_CREDENTIALS_PATH` | client secrets file                     |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credentials::OAuthCredentials;
use crate::endpoint::TokenEndpoint;
use crate::error::{AuthError, AuthResult};
use crate::grant::{DEFAULT_CALLBACK_TIMEOUT, DEFAULT_PORT_RANGE, LoopbackGrant};
use crate::manager::{CredentialManager, ExecutionContext};
use crate::refresh::OAuthRefresh;
use crate::store::{
    FileTokenStore, ParameterStore, ParameterTokenStore, TokenStore, WriteThroughStore,
};
use crate::token::{ScopeSet, TokenRecord, scope_set};

pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

pub const ENV_TOKEN_PARAMETER: &str = "TOKEN_PARAMETER_NAME";
pub const ENV_CREDENTIALS_JSON: &str = "GOOGLE_CREDENTIALS_JSON";
pub const ENV_TOKEN_JSON: &str = "GOOGLE_TOKEN_JSON";
pub const ENV_TOKEN_PATH: &str = "CALBRIEF_TOKEN_PATH";
pub const ENV_CREDENTIALS_PATH: &str = "CALBRIEF_CREDENTIALS_PATH";

/// Whether the host can run a browser consent flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Interactive,
    NonInteractive,
}

/// Configuration for building a [`CredentialManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Local token file. Defaults to `<data dir>/calbrief/token.json`.
    pub token_path: Option<PathBuf>,

    /// Client secrets file. Defaults to `<config dir>/calbrief/credentials.json`.
    pub credentials_path: Option<PathBuf>,

    /// Base64 client secrets; only ever set from the environment.
    #[serde(skip)]
    pub credentials_base64: Option<String>,

    /// Base64 token record written to the token file when the file holds
    /// no usable record; only ever set from the environment.
    #[serde(skip)]
    pub token_seed_base64: Option<String>,

    /// Remote parameter holding the token. When set, it is authoritative
    /// and the token file becomes a cache.
    pub parameter_name: Option<String>,

    pub scopes: Vec<String>,

    /// Timeout for each token endpoint and parameter store call, in seconds.
    pub timeout_secs: u64,

    /// How long to wait for the browser redirect, in seconds.
    pub callback_timeout_secs: u64,

    pub loopback_port_range: (u16, u16),

    pub open_browser: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_path: None,
            credentials_path: None,
            credentials_base64: None,
            token_seed_base64: None,
            parameter_name: None,
            scopes: vec![CALENDAR_READONLY_SCOPE.to_string()],
            timeout_secs: 30,
            callback_timeout_secs: DEFAULT_CALLBACK_TIMEOUT.as_secs(),
            loopback_port_range: DEFAULT_PORT_RANGE,
            open_browser: true,
        }
    }
}

impl AuthSettings {
    /// Loads the default config file, or defaults if there is none.
    pub fn load_default() -> AuthResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            debug!("no config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> AuthResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuthError::configuration(format!("failed to read config {}", path.display()))
                .with_source(e)
        })?;
        toml::from_str(&content).map_err(|e| {
            AuthError::configuration(format!("failed to parse config {}", path.display()))
                .with_source(e)
        })
    }

    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calbrief")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calbrief")
    }

    /// Overlays the process environment.
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlays variables from `lookup`. Empty values are ignored.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = var(ENV_TOKEN_PARAMETER) {
            self.parameter_name = Some(name);
        }
        if let Some(encoded) = var(ENV_CREDENTIALS_JSON) {
            self.credentials_base64 = Some(encoded);
        }
        if let Some(encoded) = var(ENV_TOKEN_JSON) {
            self.token_seed_base64 = Some(encoded);
        }
        if let Some(path) = var(ENV_TOKEN_PATH) {
            self.token_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var(ENV_CREDENTIALS_PATH) {
            self.credentials_path = Some(PathBuf::from(path));
        }
        self
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("token.json"))
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| Self::default_config_dir().join("credentials.json"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    /// Loads the OAuth client credentials, preferring the environment
    /// variable over the file.
    pub fn credentials(&self) -> AuthResult<OAuthCredentials> {
        let credentials = match &self.credentials_base64 {
            Some(encoded) => OAuthCredentials::from_base64(encoded).map_err(|e| {
                AuthError::configuration(format!("{} is invalid: {}", ENV_CREDENTIALS_JSON, e.message()))
            })?,
            None => OAuthCredentials::from_file(self.credentials_path())?,
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Decodes the seed token, if one was provided.
    pub fn token_seed(&self) -> AuthResult<Option<TokenRecord>> {
        let Some(encoded) = &self.token_seed_base64 else {
            return Ok(None);
        };
        let invalid = |what: &str| {
            AuthError::configuration(format!("{} is not {}", ENV_TOKEN_JSON, what))
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| invalid("valid base64").with_source(e))?;
        let record = serde_json::from_slice(&bytes)
            .map_err(|e| invalid("a token record").with_source(e))?;
        Ok(Some(record))
    }

    pub fn required_scopes(&self) -> AuthResult<ScopeSet> {
        let scopes = scope_set(
            self.scopes
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty()),
        );
        if scopes.is_empty() {
            return Err(AuthError::configuration("at least one OAuth scope is required"));
        }
        Ok(scopes)
    }

    /// Builds the token store: the file alone, or the remote parameter with
    /// the file as its write-through cache. A seed token is written to the
    /// file first.
    pub async fn token_store(&self) -> AuthResult<Box<dyn TokenStore>> {
        let file = FileTokenStore::new(self.token_path());
        self.seed_token_file(&file).await?;

        let remote = match &self.parameter_name {
            Some(name) => Some(parameter_client(name, self.timeout()).await?),
            None => None,
        };
        Ok(self.compose_store(file, remote))
    }

    /// Writes the seed token unless the file already holds a record.
    async fn seed_token_file(&self, file: &FileTokenStore) -> AuthResult<()> {
        let Some(seed) = self.token_seed()? else {
            return Ok(());
        };
        if file.load().await?.is_some() {
            debug!("{} already holds a token, ignoring {}", file.describe(), ENV_TOKEN_JSON);
            return Ok(());
        }
        file.save(&seed).await?;
        info!("seeded {} from {}", file.describe(), ENV_TOKEN_JSON);
        Ok(())
    }

    fn compose_store(
        &self,
        file: FileTokenStore,
        remote: Option<Arc<dyn ParameterStore>>,
    ) -> Box<dyn TokenStore> {
        match (remote, &self.parameter_name) {
            (Some(client), Some(name)) => Box::new(WriteThroughStore::new(
                ParameterTokenStore::new(client, name.clone()),
                file,
            )),
            _ => Box::new(file),
        }
    }
}

#[cfg(feature = "ssm")]
async fn parameter_client(name: &str, timeout: Duration) -> AuthResult<Arc<dyn ParameterStore>> {
    debug!("using SSM parameter {}", name);
    Ok(Arc::new(crate::store::SsmParameterStore::from_env(timeout).await))
}

#[cfg(not(feature = "ssm"))]
async fn parameter_client(name: &str, _timeout: Duration) -> AuthResult<Arc<dyn ParameterStore>> {
    Err(AuthError::configuration(format!(
        "token parameter {} is configured but calbrief-auth was built without the `ssm` feature",
        name
    )))
}

impl CredentialManager {
    /// Assembles the store, refresh flow, and (when interactive) consent flow
    /// described by `settings`.
    ///
    /// Missing client credentials do not fail here: a valid stored token needs
    /// none, so the error is deferred to the first refresh or grant.
    pub async fn from_settings(settings: &AuthSettings, mode: ExecutionMode) -> AuthResult<Self> {
        let scopes = settings.required_scopes()?;
        let endpoint = TokenEndpoint::google(settings.timeout())?;

        let credentials = settings.credentials();
        if let Err(e) = &credentials {
            debug!("client credentials unavailable: {}", e);
        }

        let refresher = match &credentials {
            Ok(c) => OAuthRefresh::new(endpoint.clone(), c.clone()),
            Err(e) => OAuthRefresh::without_credentials(endpoint.clone(), e.message()),
        };

        let context = match mode {
            ExecutionMode::NonInteractive => ExecutionContext::NonInteractive,
            ExecutionMode::Interactive => {
                let grant = match credentials {
                    Ok(c) => LoopbackGrant::new(endpoint, c),
                    Err(e) => LoopbackGrant::without_credentials(endpoint, e.message()),
                }
                .with_port_range(settings.loopback_port_range)
                .with_callback_timeout(settings.callback_timeout());
                let grant = if settings.open_browser {
                    grant
                } else {
                    grant.without_browser()
                };
                ExecutionContext::interactive(grant)
            }
        };

        let store = settings.token_store().await?;
        debug!("credential store: {}", store.describe());

        Ok(CredentialManager::new(store, refresher, context, scopes))
    }
}
