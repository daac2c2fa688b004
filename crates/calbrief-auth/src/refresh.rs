//! Refresh-token exchange.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::BoxFuture;
use crate::credentials::OAuthCredentials;
use crate::endpoint::TokenEndpoint;
use crate::error::{AuthError, AuthResult};
use crate::token::TokenRecord;

/// Exchanges a record's refresh token for a new access token.
///
/// Implementations return the superseding record; `record` itself is left
/// untouched. A rejected grant is reported as
/// [`AuthErrorKind::Authorization`](crate::AuthErrorKind::Authorization),
/// which the manager treats as "needs a new grant".
pub trait RefreshFlow: Send + Sync {
    fn refresh<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<TokenRecord>>;
}

impl<T: RefreshFlow + ?Sized> RefreshFlow for Arc<T> {
    fn refresh<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        (**self).refresh(record)
    }
}

/// [`RefreshFlow`] against the provider's token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthRefresh {
    endpoint: TokenEndpoint,
    credentials: Option<OAuthCredentials>,
    missing_hint: String,
}

impl OAuthRefresh {
    pub fn new(endpoint: TokenEndpoint, credentials: OAuthCredentials) -> Self {
        Self {
            endpoint,
            credentials: Some(credentials),
            missing_hint: String::new(),
        }
    }

    /// Creates a flow whose client credentials could not be loaded.
    ///
    /// Stores can still hold a valid token, so the manager is built anyway;
    /// the first refresh attempt fails with a configuration error that names
    /// `hint` as the place the credentials were expected.
    pub fn without_credentials(endpoint: TokenEndpoint, hint: impl Into<String>) -> Self {
        Self {
            endpoint,
            credentials: None,
            missing_hint: hint.into(),
        }
    }
}

impl RefreshFlow for OAuthRefresh {
    fn refresh<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(async move {
            let Some(credentials) = &self.credentials else {
                return Err(AuthError::configuration(format!(
                    "cannot refresh the token: OAuth client credentials are missing ({})",
                    self.missing_hint
                )));
            };

            let Some(refresh_token) = record.refresh_token() else {
                return Err(AuthError::authorization(
                    "stored token has no refresh token",
                ));
            };

            debug!("refreshing access token via {}", self.endpoint.url());
            let response = self.endpoint.refresh(credentials, refresh_token).await?;
            let renewed = record.superseded_by(response, Utc::now());

            info!(
                "refreshed access token, valid until {}",
                renewed.expiry().to_rfc3339()
            );
            Ok(renewed)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::error::AuthErrorKind;
    use crate::testing::{TokenServer, required_scopes};

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new("id.apps.googleusercontent.com", "secret")
    }

    fn endpoint() -> TokenEndpoint {
        TokenEndpoint::new("http://127.0.0.1:1/token", Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_names_the_source() {
        let flow = OAuthRefresh::without_credentials(endpoint(), "set GOOGLE_CREDENTIALS_JSON");
        let record = crate::testing::expired_record();

        let err = flow.refresh(&record).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Configuration);
        assert!(err.message().contains("GOOGLE_CREDENTIALS_JSON"));
    }

    #[tokio::test]
    async fn successful_refresh_keeps_the_refresh_token_and_scopes() {
        let server = TokenServer::respond(
            200,
            r#"{"access_token":"ya29.renewed","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .await;
        let endpoint = TokenEndpoint::new(server.url.clone(), Duration::from_secs(5)).unwrap();
        let flow = OAuthRefresh::new(endpoint, credentials());
        let record = crate::testing::expired_record();

        let before = Utc::now();
        let renewed = flow.refresh(&record).await.unwrap();

        assert_eq!(renewed.access_token(), "ya29.renewed");
        assert_eq!(renewed.refresh_token(), Some("refresh-1"));
        assert_eq!(renewed.scopes(), record.scopes());
        assert!(renewed.expiry() > before + ChronoDuration::minutes(55));
        assert_eq!(record.access_token(), "expired-access");

        let form = server.form().await;
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "refresh-1");
        assert_eq!(form["client_id"], "id.apps.googleusercontent.com");
    }

    #[tokio::test]
    async fn successful_refresh_adopts_a_rotated_refresh_token() {
        let server = TokenServer::respond(
            200,
            r#"{"access_token":"ya29.renewed","refresh_token":"refresh-2","expires_in":3599}"#,
        )
        .await;
        let endpoint = TokenEndpoint::new(server.url.clone(), Duration::from_secs(5)).unwrap();
        let flow = OAuthRefresh::new(endpoint, credentials());

        let renewed = flow.refresh(&crate::testing::expired_record()).await.unwrap();
        assert_eq!(renewed.refresh_token(), Some("refresh-2"));
        server.form().await;
    }

    #[tokio::test]
    async fn record_without_refresh_token_is_rejected_before_any_request() {
        let flow = OAuthRefresh::new(endpoint(), credentials());
        let record = TokenRecord::new(
            "a",
            None,
            Utc::now() - ChronoDuration::seconds(1),
            required_scopes(),
        );

        let err = flow.refresh(&record).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::Authorization);
    }
}
