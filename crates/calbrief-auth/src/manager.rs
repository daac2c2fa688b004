//! The credential lifecycle state machine.
//!
//! ```text
//!  Start ──load──▶ Loaded ──Valid──────────────────────────────▶ Valid
//!                    │
//!                    ├──Refreshable──▶ NeedsRefresh ──ok──▶ Persist ──▶ Valid
//!                    │                     │ rejected          ▲
//!                    │                     ▼                   │
//!                    └──Absent/Terminal/──▶ NeedsGrant ──ok────┘
//!                       ScopeMismatch          │ non-interactive
//!                                              ▼
//!                                            Failed
//! ```
//!
//! Each arrow is one method on [`CredentialManager`]; `acquire()` only drives
//! the loop. Nothing is saved unless a flow fully succeeded, so dropping the
//! `acquire()` future leaves the store as it was.

use std::fmt;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{AuthError, AuthErrorKind, AuthResult};
use crate::grant::GrantFlow;
use crate::refresh::RefreshFlow;
use crate::store::{StoreError, TokenStore};
use crate::token::{ScopeSet, TokenRecord};
use crate::validator::{Classification, classify};

/// Whether a person can complete a consent flow during this invocation.
pub enum ExecutionContext {
    Interactive(Box<dyn GrantFlow>),
    NonInteractive,
}

impl ExecutionContext {
    pub fn interactive(flow: impl GrantFlow + 'static) -> Self {
        Self::Interactive(Box::new(flow))
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive(_))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_interactive() {
            "Interactive"
        } else {
            "NonInteractive"
        })
    }
}

/// Why a fresh grant is needed.
#[derive(Debug)]
enum GrantReason {
    Absent,
    Terminal,
    ScopeMismatch(Vec<String>),
    Revoked(AuthError),
}

#[derive(Debug)]
enum State {
    Start,
    Loaded(Option<TokenRecord>),
    NeedsRefresh(TokenRecord),
    NeedsGrant(GrantReason),
    Persist(TokenRecord),
    Valid(TokenRecord),
    Failed(AuthError),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::Loaded(_) => "loaded",
            State::NeedsRefresh(_) => "needs-refresh",
            State::NeedsGrant(_) => "needs-grant",
            State::Persist(_) => "persist",
            State::Valid(_) => "valid",
            State::Failed(_) => "failed",
        }
    }
}

/// Acquires a usable, scope-checked access token.
///
/// One manager serves one invocation; it holds no global state and caches
/// nothing between `acquire()` calls, so every call re-reads the store.
pub struct CredentialManager {
    store: Box<dyn TokenStore>,
    refresher: Box<dyn RefreshFlow>,
    context: ExecutionContext,
    required_scopes: ScopeSet,
}

impl CredentialManager {
    pub fn new(
        store: impl TokenStore + 'static,
        refresher: impl RefreshFlow + 'static,
        context: ExecutionContext,
        required_scopes: ScopeSet,
    ) -> Self {
        Self {
            store: Box::new(store),
            refresher: Box::new(refresher),
            context,
            required_scopes,
        }
    }

    pub fn required_scopes(&self) -> &ScopeSet {
        &self.required_scopes
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Human-readable location of the stored token.
    pub fn store_description(&self) -> String {
        self.store.describe()
    }

    /// Returns a valid token, refreshing or granting and persisting as needed.
    ///
    /// The returned record is never expired at the time of the check and
    /// always covers the required scopes.
    pub async fn acquire(&self) -> AuthResult<TokenRecord> {
        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => self.load().await,
                State::Loaded(record) => self.decide(record.as_ref()),
                State::NeedsRefresh(record) => self.refresh(&record).await,
                State::NeedsGrant(reason) => self.grant(reason).await,
                State::Persist(record) => self.persist(record).await,
                State::Valid(record) => {
                    debug!("token valid until {}", record.expiry().to_rfc3339());
                    return Ok(record);
                }
                State::Failed(err) => {
                    warn!("credential acquisition failed: {}", err);
                    return Err(err);
                }
            };
            debug!("credential state -> {}", state.name());
        }
    }

    /// Classifies the stored record without running any flow.
    pub async fn status(&self) -> AuthResult<Classification> {
        let record = self.store.load().await?;
        Ok(classify(record.as_ref(), &self.required_scopes, Utc::now()))
    }

    /// `Start -> Loaded`
    async fn load(&self) -> State {
        match self.store.load().await {
            Ok(record) => State::Loaded(record),
            Err(e) => State::Failed(AuthError::from_store(
                format!("failed to load token from {}", self.store.describe()),
                e,
            )),
        }
    }

    /// `Loaded -> Valid | NeedsRefresh | NeedsGrant`
    fn decide(&self, record: Option<&TokenRecord>) -> State {
        let classification = classify(record, &self.required_scopes, Utc::now());
        debug!("stored token is {}", classification);

        match (classification, record) {
            (Classification::Valid, Some(record)) => State::Valid(record.clone()),
            (Classification::Refreshable, Some(record)) => State::NeedsRefresh(record.clone()),
            (Classification::ScopeMismatch, Some(record)) => State::NeedsGrant(
                GrantReason::ScopeMismatch(record.missing_scopes(&self.required_scopes)),
            ),
            (Classification::Terminal, _) => State::NeedsGrant(GrantReason::Terminal),
            _ => State::NeedsGrant(GrantReason::Absent),
        }
    }

    /// `NeedsRefresh -> Persist | NeedsGrant | Failed`
    async fn refresh(&self, record: &TokenRecord) -> State {
        match self.refresher.refresh(record).await {
            Ok(renewed) => self.usable(renewed),
            Err(e) if e.kind() == AuthErrorKind::Authorization => {
                warn!("refresh token rejected: {}", e);
                State::NeedsGrant(GrantReason::Revoked(e))
            }
            Err(e) => State::Failed(e),
        }
    }

    /// `NeedsGrant -> Persist | Failed`
    async fn grant(&self, reason: GrantReason) -> State {
        let flow = match &self.context {
            ExecutionContext::Interactive(flow) => flow,
            ExecutionContext::NonInteractive => {
                return State::Failed(self.non_interactive_error(reason));
            }
        };

        info!("starting interactive authorization ({:?})", reason);
        let record = match flow.grant(&self.required_scopes).await {
            Ok(record) => record,
            Err(e) => return State::Failed(e),
        };

        let missing = record.missing_scopes(&self.required_scopes);
        if !missing.is_empty() {
            return State::Failed(AuthError::scope(format!(
                "authorization did not grant the required scopes: {}",
                missing.join(", ")
            )));
        }
        self.usable(record)
    }

    /// Re-checks a record a flow just produced before it is persisted.
    fn usable(&self, record: TokenRecord) -> State {
        if record.is_expired_at(Utc::now()) {
            return State::Failed(AuthError::authorization(format!(
                "provider issued a token that expired at {}",
                record.expiry().to_rfc3339()
            )));
        }
        State::Persist(record)
    }

    /// `Persist -> Valid | Failed`
    ///
    /// A conflicting concurrent write is resolved by re-reading once: if the
    /// other writer's record is valid it is used instead of ours.
    async fn persist(&self, record: TokenRecord) -> State {
        let err = match self.store.save(&record).await {
            Ok(()) => return State::Valid(record),
            Err(e) if e.is_conflict() => e,
            Err(e) => return State::Failed(self.save_error(e)),
        };

        info!("concurrent update of {}, re-reading", self.store.describe());
        match self.store.load().await {
            Ok(Some(winner))
                if classify(Some(&winner), &self.required_scopes, Utc::now())
                    == Classification::Valid =>
            {
                State::Valid(winner)
            }
            Ok(_) => State::Failed(self.save_error(err)),
            Err(reload) => {
                warn!("re-read after conflict failed: {}", reload);
                State::Failed(self.save_error(err))
            }
        }
    }

    fn save_error(&self, err: StoreError) -> AuthError {
        AuthError::from_store(
            format!("failed to save token to {}", self.store.describe()),
            err,
        )
    }

    fn non_interactive_error(&self, reason: GrantReason) -> AuthError {
        let location = self.store.describe();
        match reason {
            GrantReason::Absent => AuthError::configuration(format!(
                "no stored token in {}; authorize once in an interactive session to create it",
                location
            )),
            GrantReason::Terminal => AuthError::authorization(format!(
                "token in {} has expired and carries no refresh token; re-authorize interactively",
                location
            )),
            GrantReason::Revoked(cause) => AuthError::authorization(format!(
                "refresh token in {} was rejected; re-authorize interactively",
                location
            ))
            .with_source(cause),
            GrantReason::ScopeMismatch(missing) => AuthError::scope(format!(
                "token in {} lacks required scopes: {}; re-authorize interactively to grant them",
                location,
                missing.join(", ")
            )),
        }
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("store", &self.store.describe())
            .field("context", &self.context)
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}
