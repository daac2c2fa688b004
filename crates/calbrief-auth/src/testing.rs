//! In-memory doubles for the store, refresh, and grant seams.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{Duration, DurationRound, Utc};

use crate::BoxFuture;
use crate::error::{AuthError, AuthResult};
use crate::grant::GrantFlow;
use crate::refresh::RefreshFlow;
use crate::store::{ParameterStore, StoreError, TokenStore};
use crate::token::{ScopeSet, TokenRecord, scope_set};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

pub fn required_scopes() -> ScopeSet {
    scope_set([CALENDAR_SCOPE])
}

fn whole_seconds(offset: Duration) -> chrono::DateTime<Utc> {
    (Utc::now() + offset)
        .duration_trunc(Duration::seconds(1))
        .unwrap()
}

pub fn valid_record() -> TokenRecord {
    TokenRecord::new(
        "valid-access",
        Some("refresh-1".to_string()),
        whole_seconds(Duration::hours(1)),
        required_scopes(),
    )
}

/// Record that expired one second ago and can be refreshed.
pub fn expired_record() -> TokenRecord {
    TokenRecord::new(
        "expired-access",
        Some("refresh-1".to_string()),
        Utc::now() - Duration::seconds(1),
        required_scopes(),
    )
}

#[derive(Default)]
pub struct MemoryParameterStore {
    values: Mutex<HashMap<String, (String, bool)>>,
    next_get_error: Mutex<Option<StoreError>>,
    next_put_error: Mutex<Option<StoreError>>,
}

impl MemoryParameterStore {
    pub fn insert(&self, name: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(name.to_string(), (value.to_string(), true));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.lock().unwrap().contains_key(name)
    }

    pub fn was_encrypted(&self, name: &str) -> bool {
        self.values
            .lock()
            .unwrap()
            .get(name)
            .is_some_and(|(_, encrypted)| *encrypted)
    }

    pub fn fail_next_get(&self, err: StoreError) {
        *self.next_get_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_put(&self, err: StoreError) {
        *self.next_put_error.lock().unwrap() = Some(err);
    }
}

impl ParameterStore for MemoryParameterStore {
    fn get<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            if let Some(err) = self.next_get_error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(self
                .values
                .lock()
                .unwrap()
                .get(name)
                .map(|(value, _)| value.clone()))
        })
    }

    fn put<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        encrypted: bool,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(err) = self.next_put_error.lock().unwrap().take() {
                return Err(err);
            }
            self.values
                .lock()
                .unwrap()
                .insert(name.to_string(), (value.to_string(), encrypted));
            Ok(())
        })
    }
}

/// Token store that counts calls and can simulate a losing concurrent write.
#[derive(Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    next_load_error: Mutex<Option<StoreError>>,
    next_save_error: Mutex<Option<StoreError>>,
    concurrent_winner: Mutex<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn with(record: TokenRecord) -> Self {
        let store = Self::default();
        store.set(record);
        store
    }

    pub fn set(&self, record: TokenRecord) {
        *self.record.lock().unwrap() = Some(record);
    }

    pub fn current(&self) -> Option<TokenRecord> {
        self.record.lock().unwrap().clone()
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_next_load(&self, err: StoreError) {
        *self.next_load_error.lock().unwrap() = Some(err);
    }

    pub fn fail_next_save(&self, err: StoreError) {
        *self.next_save_error.lock().unwrap() = Some(err);
    }

    /// The next save loses a race: `winner` lands in the store and the save
    /// reports a conflict.
    pub fn lose_next_save_to(&self, winner: TokenRecord) {
        *self.concurrent_winner.lock().unwrap() = Some(winner);
    }
}

impl TokenStore for MemoryTokenStore {
    fn describe(&self) -> String {
        "memory store".to_string()
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.next_load_error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(self.current())
        })
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if let Some(winner) = self.concurrent_winner.lock().unwrap().take() {
                self.set(winner);
                return Err(StoreError::Conflict("memory store".to_string()));
            }
            if let Some(err) = self.next_save_error.lock().unwrap().take() {
                return Err(err);
            }
            self.set(record.clone());
            Ok(())
        })
    }
}

/// Refresh flow that returns a fixed access token or a scripted error.
pub struct FakeRefresh {
    calls: AtomicUsize,
    failure: Mutex<Option<AuthError>>,
    issued: Option<TokenRecord>,
}

impl FakeRefresh {
    pub fn succeeding() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            issued: None,
        }
    }

    pub fn failing(err: AuthError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(Some(err)),
            issued: None,
        }
    }

    /// Returns `record` verbatim instead of deriving one from the input.
    pub fn returning(record: TokenRecord) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            issued: Some(record),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RefreshFlow for FakeRefresh {
    fn refresh<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failure.lock().unwrap().take() {
                return Err(err);
            }
            if let Some(record) = &self.issued {
                return Ok(record.clone());
            }
            Ok(TokenRecord::new(
                "refreshed-access",
                record.refresh_token().map(str::to_string),
                whole_seconds(Duration::hours(1)),
                record.scopes().clone(),
            ))
        })
    }
}

/// Grant flow that issues a record with the given scopes or a scripted error.
pub struct FakeGrant {
    calls: AtomicUsize,
    granted: ScopeSet,
    failure: Mutex<Option<AuthError>>,
}

impl FakeGrant {
    pub fn granting(granted: ScopeSet) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            granted,
            failure: Mutex::new(None),
        }
    }

    pub fn failing(err: AuthError) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            granted: ScopeSet::new(),
            failure: Mutex::new(Some(err)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GrantFlow for FakeGrant {
    fn grant<'a>(&'a self, _scopes: &'a ScopeSet) -> BoxFuture<'a, AuthResult<TokenRecord>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failure.lock().unwrap().take() {
                return Err(err);
            }
            Ok(TokenRecord::new(
                "granted-access",
                Some("granted-refresh".to_string()),
                whole_seconds(Duration::hours(1)),
                self.granted.clone(),
            ))
        })
    }
}

/// One-shot HTTP stub standing in for the token endpoint.
///
/// Accepts a single request, answers it with `status` and `body`, and hands
/// back the decoded form fields of the request.
pub struct TokenServer {
    pub url: String,
    request: tokio::task::JoinHandle<HashMap<String, String>>,
}

impl TokenServer {
    pub async fn respond(status: u16, body: &str) -> Self {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        let body = body.to_string();

        let request = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let (head_len, content_length) = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before the request was complete");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    break (pos + 4, length);
                }
            };
            while buf.len() < head_len + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before the body was complete");
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();

            let form = String::from_utf8(buf[head_len..head_len + content_length].to_vec()).unwrap();
            form.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| {
                    let decode = |s: &str| urlencoding::decode(&s.replace('+', " ")).unwrap().into_owned();
                    (decode(k), decode(v))
                })
                .collect()
        });

        Self { url, request }
    }

    /// Waits for the request and returns its form fields.
    pub async fn form(self) -> HashMap<String, String> {
        self.request.await.unwrap()
    }
}
