//! Client for the provider's OAuth token endpoint.
//!
//! Both the refresh flow and the consent flow end in a form-encoded POST to
//! the same endpoint; this module owns that request and maps its failures
//! onto [`AuthErrorKind`](crate::AuthErrorKind):
//!
//! - transport errors, timeouts, 429 and 5xx are `Network` (retryable)
//! - any other rejection, `invalid_grant` included, is `Authorization`

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::credentials::OAuthCredentials;
use crate::error::{AuthError, AuthResult};

/// Google's OAuth 2.0 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Successful response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated list of granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error body returned with 4xx responses (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP client bound to one token endpoint URL.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    url: String,
    http_client: reqwest::Client,
}

impl TokenEndpoint {
    /// Creates a client for Google's token endpoint.
    pub fn google(timeout: Duration) -> AuthResult<Self> {
        Self::new(GOOGLE_TOKEN_URL, timeout)
    }

    /// Creates a client for an arbitrary token endpoint URL.
    pub fn new(url: impl Into<String>, timeout: Duration) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("calbrief/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                AuthError::configuration("failed to create HTTP client").with_source(e)
            })?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Exchanges a refresh token for a new access token.
    pub async fn refresh(
        &self,
        credentials: &OAuthCredentials,
        refresh_token: &str,
    ) -> AuthResult<TokenResponse> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        self.post_form("token refresh", &params).await
    }

    /// Exchanges an authorization code (with its PKCE verifier) for tokens.
    pub async fn exchange_code(
        &self,
        credentials: &OAuthCredentials,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenResponse> {
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];
        self.post_form("token exchange", &params).await
    }

    async fn post_form(&self, operation: &str, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        debug!("{} request to {}", operation, self.url);

        let response = self
            .http_client
            .post(&self.url)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                AuthError::network(format!("{} {}", operation, reason)).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read {} response", operation)).with_source(e)
        })?;

        if !status.is_success() {
            let err = rejection(operation, status, &body);
            warn!("{} failed: {}", operation, err);
            return Err(err);
        }

        parse_token_response(operation, &body)
    }
}

/// Parses a 2xx body from the token endpoint.
fn parse_token_response(operation: &str, body: &str) -> AuthResult<TokenResponse> {
    let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
        AuthError::network(format!("invalid {} response", operation)).with_source(e)
    })?;

    if response.access_token.is_empty() {
        return Err(AuthError::network(format!(
            "{} response carried an empty access token",
            operation
        )));
    }

    Ok(response)
}

/// Maps a non-2xx response onto an error kind.
fn rejection(operation: &str, status: StatusCode, body: &str) -> AuthError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::network(format!("{} failed with HTTP {}", operation, status));
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) if err.error == "invalid_grant" => AuthError::authorization(format!(
            "{} rejected: the grant is revoked or expired ({})",
            operation,
            err.error_description.as_deref().unwrap_or("invalid_grant")
        )),
        Ok(err) => AuthError::authorization(format!(
            "{} rejected ({}): {}",
            operation,
            err.error,
            err.error_description.as_deref().unwrap_or("no description")
        )),
        Err(_) => AuthError::authorization(format!(
            "{} rejected with HTTP {}",
            operation, status
        )),
    }
}
