//! Credential lifecycle for the calbrief calendar report.
//!
//! This crate acquires, validates, refreshes, and persists the Google OAuth
//! token the report needs, both on a workstation (where a browser consent
//! flow is available) and in a serverless invocation (where it is not).
//!
//! - [`CredentialManager`] - the `acquire()` state machine
//! - [`TokenStore`] - file, remote parameter, and write-through persistence
//! - [`classify`] - pure classification of a stored record
//! - [`RefreshFlow`] / [`GrantFlow`] - token endpoint exchanges
//! - [`AuthSettings`] - TOML and environment configuration
//!
//! # Architecture
//!
//! ```text
//!              acquire()
//!                  │
//!                  ▼
//!   ┌──────────────────────────────┐
//!   │      CredentialManager       │
//!   └──┬──────────┬─────────────┬──┘
//!      │          │             │
//!      ▼          ▼             ▼
//!  TokenStore  RefreshFlow   GrantFlow (interactive only)
//!      │          │             │
//!      │          └──────┬──────┘
//!      ▼                 ▼
//!  file / SSM      TokenEndpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use calbrief_auth::{AuthSettings, CredentialManager, ExecutionMode};
//!
//! let settings = AuthSettings::load_default()?.apply_env();
//! let manager = CredentialManager::from_settings(&settings, ExecutionMode::NonInteractive).await?;
//! let token = manager.acquire().await?;
//! let request = token.authorize(http.get(events_url));
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod grant;
pub mod manager;
pub mod refresh;
pub mod settings;
pub mod store;
pub mod token;
pub mod validator;

#[cfg(test)]
mod testing;

/// A boxed future, used to keep the store and flow traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use credentials::OAuthCredentials;
pub use endpoint::{GOOGLE_TOKEN_URL, TokenEndpoint, TokenResponse};
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use grant::{GrantFlow, LoopbackGrant};
pub use manager::{CredentialManager, ExecutionContext};
pub use refresh::{OAuthRefresh, RefreshFlow};
pub use settings::{AuthSettings, ExecutionMode};
pub use store::{
    FileTokenStore, ParameterStore, ParameterTokenStore, StoreError, TokenStore,
    WriteThroughStore,
};
#[cfg(feature = "ssm")]
pub use store::SsmParameterStore;
pub use token::{ScopeSet, TokenRecord, scope_set};
pub use validator::{Classification, classify};
