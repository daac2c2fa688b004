//! Classification of a loaded token record.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::token::{ScopeSet, TokenRecord};

/// What the manager may do with a loaded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Nothing was loaded.
    Absent,
    /// Not expired and carries every required scope.
    Valid,
    /// Expired, scopes sufficient, refresh token present.
    Refreshable,
    /// Expired with no refresh token; only a new grant helps.
    Terminal,
    /// Granted scopes do not cover the required ones. Takes precedence over
    /// expiry: a refresh cannot widen scopes, so only a new grant helps.
    ScopeMismatch,
}

impl Classification {
    /// Returns true if a new interactive grant is the only way forward.
    pub fn needs_grant(&self) -> bool {
        matches!(self, Self::Absent | Self::Terminal | Self::ScopeMismatch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Valid => "valid",
            Self::Refreshable => "refreshable",
            Self::Terminal => "terminal",
            Self::ScopeMismatch => "scope_mismatch",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `record` against the scopes the caller needs at time `now`.
pub fn classify(
    record: Option<&TokenRecord>,
    required: &ScopeSet,
    now: DateTime<Utc>,
) -> Classification {
    let Some(record) = record else {
        return Classification::Absent;
    };

    if !record.has_scopes(required) {
        Classification::ScopeMismatch
    } else if !record.is_expired_at(now) {
        Classification::Valid
    } else if record.refresh_token().is_some() {
        Classification::Refreshable
    } else {
        Classification::Terminal
    }
}
