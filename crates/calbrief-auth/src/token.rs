//! The persisted token record.
//!
//! A [`TokenRecord`] is never edited after it is issued: a refresh produces a
//! new record through [`TokenRecord::superseded_by`], which keeps the granted
//! scope set and adopts a rotated refresh token only when the provider sends
//! one.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::TokenResponse;

/// A set of OAuth scope strings, kept sorted so the JSON form is stable.
pub type ScopeSet = BTreeSet<String>;

/// Builds a [`ScopeSet`] from any list of scope names.
pub fn scope_set<I, S>(scopes: I) -> ScopeSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    scopes.into_iter().map(Into::into).collect()
}

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Subtracted from the provider lifetime so the token is refreshed before the
/// provider starts rejecting it.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// An access token with its refresh token, expiry, and granted scopes.
///
/// The serialized form is the local token file layout. Reading also accepts
/// the authorized-user JSON written by Google's client libraries, where the
/// access token is stored under `token`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expiry: DateTime<Utc>,
    #[serde(default)]
    scopes: ScopeSet,
}

impl TokenRecord {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expiry: DateTime<Utc>,
        scopes: ScopeSet,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expiry,
            scopes,
        }
    }

    /// Creates the record produced by an authorization-code exchange.
    ///
    /// The provider's `scope` field is authoritative when present, because the
    /// user may have unchecked some of the requested scopes on the consent page.
    pub fn issued(response: TokenResponse, requested: &ScopeSet, now: DateTime<Utc>) -> Self {
        let scopes = match response.scope.as_deref() {
            Some(granted) if !granted.trim().is_empty() => {
                scope_set(granted.split_whitespace())
            }
            _ => requested.clone(),
        };

        Self {
            expiry: expiry_from(response.expires_in, now),
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            scopes,
        }
    }

    /// Creates the record that replaces `self` after a successful refresh.
    pub fn superseded_by(&self, response: TokenResponse, now: DateTime<Utc>) -> Self {
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| self.refresh_token.clone());

        Self {
            expiry: expiry_from(response.expires_in, now),
            access_token: response.access_token,
            refresh_token,
            scopes: self.scopes.clone(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the refresh token if one is present and non-empty.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn expiry(&self) -> DateTime<Utc> {
        self.expiry
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    /// Returns true once `now` has reached the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Returns true if every required scope was granted.
    pub fn has_scopes(&self, required: &ScopeSet) -> bool {
        required.is_subset(&self.scopes)
    }

    /// Returns the required scopes this record was not granted.
    pub fn missing_scopes(&self, required: &ScopeSet) -> Vec<String> {
        required.difference(&self.scopes).cloned().collect()
    }

    /// Attaches the access token to an outbound request as a bearer credential.
    ///
    /// This is the only capability downstream calendar queries get: they never
    /// see the refresh token or the store.
    pub fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.access_token)
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiry", &self.expiry)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// The margin never takes more than half of a short lifetime, so a freshly
/// issued token is always usable for a moment.
fn expiry_from(expires_in: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
    let lifetime = expires_in.unwrap_or(DEFAULT_LIFETIME_SECS).max(0);
    let margin = EXPIRY_MARGIN_SECS.min(lifetime / 2);
    now + Duration::seconds(lifetime - margin)
}
