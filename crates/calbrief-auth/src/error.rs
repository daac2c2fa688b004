//! Error types for credential acquisition.
//!
//! Every failure that leaves [`CredentialManager::acquire`] carries one of the
//! [`AuthErrorKind`] categories so the caller can decide whether to prompt the
//! user again, retry later, or abort.
//!
//! [`CredentialManager::acquire`]: crate::CredentialManager::acquire

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// The category of an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// Material needed for the chosen path is missing or invalid
    /// (client secrets, stored token in a non-interactive context, settings).
    Configuration,
    /// Reading or writing a token store failed.
    Persistence,
    /// Transient transport failure: timeout, connection refused, 5xx.
    Network,
    /// The provider rejected the refresh or the grant, or the user declined.
    Authorization,
    /// The stored token lacks scopes the caller requires.
    Scope,
}

impl AuthErrorKind {
    /// Returns true if the caller may retry the whole acquisition later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Persistence => "persistence_error",
            Self::Network => "network_error",
            Self::Authorization => "authorization_error",
            Self::Scope => "scope_error",
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while acquiring, refreshing, or persisting a token.
#[derive(Debug, Error)]
pub struct AuthError {
    kind: AuthErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Configuration, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Persistence, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Network, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Authorization, message)
    }

    pub fn scope(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Scope, message)
    }

    /// Wraps a store failure. Timeouts and throttling reaching a remote store
    /// are network errors; everything else is a persistence error.
    pub fn from_store(message: impl Into<String>, err: StoreError) -> Self {
        let kind = if err.is_transient() {
            AuthErrorKind::Network
        } else {
            AuthErrorKind::Persistence
        };
        Self::new(kind, message).with_source(err)
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> AuthErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        Self::from_store(message, err)
    }
}

/// A specialized Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_is_retryable() {
        assert!(AuthErrorKind::Network.is_retryable());
        assert!(!AuthErrorKind::Configuration.is_retryable());
        assert!(!AuthErrorKind::Persistence.is_retryable());
        assert!(!AuthErrorKind::Authorization.is_retryable());
        assert!(!AuthErrorKind::Scope.is_retryable());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = AuthError::authorization("refresh token revoked");
        assert_eq!(err.to_string(), "authorization_error: refresh token revoked");
        assert_eq!(err.kind(), AuthErrorKind::Authorization);
        assert_eq!(err.message(), "refresh token revoked");
    }

    #[test]
    fn store_errors_become_persistence_errors() {
        use std::error::Error;

        let err: AuthError = StoreError::AccessDenied("calbrief-token".to_string()).into();
        assert_eq!(err.kind(), AuthErrorKind::Persistence);
        assert!(err.message().contains("calbrief-token"));
        assert!(err.source().is_some());
    }

    #[test]
    fn transient_store_errors_are_retryable() {
        let err: AuthError = StoreError::Transient {
            target: "parameter /calbrief/token".to_string(),
            message: "operation timed out".to_string(),
        }
        .into();
        assert_eq!(err.kind(), AuthErrorKind::Network);
        assert!(err.is_retryable());
    }
}
