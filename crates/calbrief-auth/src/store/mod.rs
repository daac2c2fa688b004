//! Token persistence backends.
//!
//! A [`TokenStore`] only loads and saves a [`TokenRecord`]; it makes no
//! decisions about validity. Three backends exist:
//!
//! - [`FileTokenStore`] - JSON file, atomic replace on save
//! - [`ParameterTokenStore`] - named secret in a remote parameter store
//! - [`WriteThroughStore`] - remote authoritative, file as best-effort cache

mod file;
mod parameter;
#[cfg(feature = "ssm")]
mod ssm;
mod write_through;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::BoxFuture;
use crate::token::TokenRecord;

pub use file::FileTokenStore;
pub use parameter::{ParameterStore, ParameterTokenStore};
#[cfg(feature = "ssm")]
pub use ssm::SsmParameterStore;
pub use write_through::WriteThroughStore;

/// Failure of a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend refused access (missing IAM permission, KMS key policy).
    #[error("access denied to {0}")]
    AccessDenied(String),

    /// Another writer updated the same record concurrently.
    #[error("conflicting concurrent write to {0}")]
    Conflict(String),

    /// Timeout, throttling, or an unavailable backend.
    #[error("transient failure reaching {target}: {message}")]
    Transient { target: String, message: String },

    /// The backend rejected the request for a reason that will not go away.
    #[error("{target} rejected the request: {message}")]
    Rejected { target: String, message: String },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode token record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if the same call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Loads and saves the token record for one credential source.
///
/// `load` returns `Ok(None)` when nothing usable is stored, including a
/// corrupt record; only failures to reach the backend are errors.
pub trait TokenStore: Send + Sync {
    /// Human-readable location, used in logs and error messages.
    fn describe(&self) -> String;

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>>;

    /// Replaces the stored record. Last writer wins.
    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>>;
}

impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>> {
        (**self).load()
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).save(record)
    }
}

impl<T: TokenStore + ?Sized> TokenStore for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>> {
        (**self).load()
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        (**self).save(record)
    }
}
