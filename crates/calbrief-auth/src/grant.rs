//! Interactive authorization-code grant with PKCE.
//!
//! Used only when a person is at the keyboard:
//!
//! 1. Generate a code verifier, its SHA-256 challenge, and a CSRF state
//! 2. Bind a loopback listener on `127.0.0.1` in the configured port range
//! 3. Print the consent URL and try to open it in the browser
//! 4. Wait (bounded) for the provider to redirect back with a code
//! 5. Exchange the code and verifier for tokens

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::BoxFuture;
use crate::credentials::OAuthCredentials;
use crate::endpoint::TokenEndpoint;
use crate::error::{AuthError, AuthResult};
use crate::token::{ScopeSet, TokenRecord};

/// Google's OAuth 2.0 consent page.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

pub const DEFAULT_PORT_RANGE: (u16, u16) = (8080, 8090);

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Code verifier length in bytes, before base64 encoding.
const CODE_VERIFIER_LENGTH: usize = 32;

/// Obtains a brand-new token record through user consent.
///
/// The manager only calls this in an interactive context.
pub trait GrantFlow: Send + Sync {
    fn grant<'a>(&'a self, scopes: &'a ScopeSet) -> BoxFuture<'a, AuthResult<TokenRecord>>;
}

impl<T: GrantFlow + ?Sized> GrantFlow for Arc<T> {
    fn grant<'a>(&'a self, scopes: &'a ScopeSet) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        (**self).grant(scopes)
    }
}

/// [`GrantFlow`] using a loopback redirect listener.
#[derive(Debug, Clone)]
pub struct LoopbackGrant {
    endpoint: TokenEndpoint,
    credentials: Option<OAuthCredentials>,
    missing_hint: String,
    port_range: (u16, u16),
    callback_timeout: Duration,
    open_browser: bool,
}

impl LoopbackGrant {
    pub fn new(endpoint: TokenEndpoint, credentials: OAuthCredentials) -> Self {
        Self {
            endpoint,
            credentials: Some(credentials),
            missing_hint: String::new(),
            port_range: DEFAULT_PORT_RANGE,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            open_browser: true,
        }
    }

    /// Creates a flow whose client credentials could not be loaded. The
    /// failure surfaces only when a grant is actually needed, with `hint`
    /// explaining where they were expected.
    pub fn without_credentials(endpoint: TokenEndpoint, hint: impl Into<String>) -> Self {
        Self {
            credentials: None,
            missing_hint: hint.into(),
            ..Self::new(endpoint, OAuthCredentials::new("", ""))
        }
    }

    pub fn with_port_range(mut self, port_range: (u16, u16)) -> Self {
        self.port_range = port_range;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Only print the consent URL; never launch a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    async fn run(&self, scopes: &ScopeSet) -> AuthResult<TokenRecord> {
        let Some(credentials) = &self.credentials else {
            return Err(AuthError::configuration(format!(
                "cannot start the consent flow: OAuth client credentials are missing ({})",
                self.missing_hint
            )));
        };

        let pkce = PkceFlow::new();
        let (listener, port) = bind_loopback(self.port_range).await?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.build_auth_url(&credentials.client_id, &redirect_uri, scopes);

        eprintln!("\nOpen this URL in your browser to authorize calbrief:\n\n{}\n", auth_url);
        if self.open_browser
            && let Err(e) = open::that(&auth_url)
        {
            warn!("failed to open browser: {}", e);
        }

        info!("waiting for authorization on {}", redirect_uri);
        let callback = tokio::time::timeout(self.callback_timeout, wait_for_callback(&listener))
            .await
            .map_err(|_| {
                AuthError::authorization(format!(
                    "timed out after {}s waiting for authorization",
                    self.callback_timeout.as_secs()
                ))
            })??;

        let code = authorization_code(callback, &pkce.state)?;

        info!("received authorization code, exchanging for tokens");
        let response = self
            .endpoint
            .exchange_code(credentials, &code, &pkce.verifier, &redirect_uri)
            .await?;

        Ok(TokenRecord::issued(response, scopes, Utc::now()))
    }
}

impl GrantFlow for LoopbackGrant {
    fn grant<'a>(&'a self, scopes: &'a ScopeSet) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(self.run(scopes))
    }
}

/// PKCE verifier, challenge, and state for one consent round (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent URL, asking for offline access so a refresh token
    /// is issued.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &ScopeSet) -> String {
        let scope = scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Redirect received on the loopback listener.
#[derive(Debug, PartialEq, Eq)]
enum Callback {
    Authorized { code: String, state: Option<String> },
    Denied(String),
    Malformed,
}

async fn bind_loopback(port_range: (u16, u16)) -> AuthResult<(TcpListener, u16)> {
    for port in port_range.0..=port_range.1 {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            let port = listener
                .local_addr()
                .map_err(|e| AuthError::configuration("loopback listener has no address").with_source(e))?
                .port();
            debug!("bound loopback listener on port {}", port);
            return Ok((listener, port));
        }
    }
    Err(AuthError::configuration(format!(
        "no free loopback port in range {}-{}",
        port_range.0, port_range.1
    )))
}

/// Accepts connections until one hits `/callback`, answers it, and returns
/// what it carried. Other requests (favicon fetches) are dropped.
async fn wait_for_callback(listener: &TcpListener) -> AuthResult<Callback> {
    loop {
        let (mut stream, peer) = listener.accept().await.map_err(|e| {
            AuthError::authorization("loopback listener failed").with_source(e)
        })?;

        let (reader, mut writer) = stream.split();
        let mut request_line = String::new();
        if let Err(e) = BufReader::new(reader).read_line(&mut request_line).await {
            debug!("ignoring unreadable request from {}: {}", peer, e);
            continue;
        }

        let Some(callback) = parse_callback(&request_line) else {
            debug!("ignoring request from {}: {}", peer, request_line.trim_end());
            continue;
        };

        let page = match callback {
            Callback::Authorized { .. } => {
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
                <html><body><h1>Authorization complete</h1>\
                <p>You can close this window and return to the terminal.</p></body></html>"
            }
            _ => {
                "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
                <html><body><h1>Authorization failed</h1>\
                <p>You can close this window.</p></body></html>"
            }
        };
        if let Err(e) = writer.write_all(page.as_bytes()).await {
            debug!("failed to answer the browser: {}", e);
        }
        let _ = writer.shutdown().await;

        return Ok(callback);
    }
}

/// Parses `GET /callback?code=..&state=.. HTTP/1.1`. Returns `None` for any
/// request that is not the redirect.
fn parse_callback(request_line: &str) -> Option<Callback> {
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != "/callback" {
        return None;
    }

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = urlencoding::decode(value)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match key {
            "code" => code = Some(value),
            "state" => state = Some(value),
            "error" => error = Some(value),
            _ => {}
        }
    }

    Some(match (error, code) {
        (Some(error), _) => Callback::Denied(error),
        (None, Some(code)) if !code.is_empty() => Callback::Authorized { code, state },
        _ => Callback::Malformed,
    })
}

fn authorization_code(callback: Callback, expected_state: &str) -> AuthResult<String> {
    match callback {
        Callback::Authorized { code, state } if state.as_deref() == Some(expected_state) => {
            Ok(code)
        }
        Callback::Authorized { .. } => Err(AuthError::authorization(
            "authorization callback state does not match the request",
        )),
        Callback::Denied(error) => Err(AuthError::authorization(format!(
            "authorization was declined: {}",
            error
        ))),
        Callback::Malformed => Err(AuthError::authorization(
            "authorization callback carried no code",
        )),
    }
}
