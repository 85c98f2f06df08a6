//! Mock implementations of the token ports
//!
//! Provides mock objects for testing purposes.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use ledgerlink_domain::{AuthError, LedgerError, Method, Result, TokenResponse, TokenState};
use parking_lot::Mutex;

use crate::auth::ports::{
    ConnectionListener, ExchangeContext, GrantType, LockClient, LockMarker, ObservedRequest,
    TokenExchanger, TokenRequest, TokenStore,
};

// Type aliases to reduce complexity
type LoadHook = Box<dyn Fn(usize) + Send + Sync>;
type Hook = Box<dyn Fn() + Send + Sync>;
type LockRegistry = Arc<Mutex<HashMap<String, LockMarker>>>;

/// Token store held in memory
///
/// ```ignore
/// use ledgerlink_core::testing::InMemoryTokenStore;
/// use ledgerlink_core::TokenStore;
///
/// let store = InMemoryTokenStore::new();
/// assert!(store.load().unwrap().is_none());
/// assert_eq!(store.load_count(), 1);
/// ```
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<Option<TokenState>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    on_load: Mutex<Option<LoadHook>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenState) -> Self {
        let store = Self::new();
        *store.tokens.lock() = Some(tokens);
        store
    }

    /// Replace the stored value without counting a save, as a peer process
    /// writing the backing file would
    pub fn put_silently(&self, tokens: TokenState) {
        *self.tokens.lock() = Some(tokens);
    }

    /// Run `hook` at the start of every load with the one-based load count
    pub fn on_load(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.on_load.lock() = Some(Box::new(hook));
    }

    /// Make subsequent saves fail with a storage error
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TokenStore for InMemoryTokenStore {
    fn load(&self) -> Result<Option<TokenState>> {
        let count = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.on_load.lock().as_ref() {
            hook(count);
        }
        Ok(self.tokens.lock().clone())
    }

    fn save(&self, state: &TokenState) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("simulated write failure".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.tokens.lock() = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.tokens.lock() = None;
        Ok(())
    }
}

/// Lock client over an in-memory registry
///
/// Clients created with [`InMemoryLockClient::sharing`] see the same markers,
/// which is how tests model two processes contending for one lock.
pub struct InMemoryLockClient {
    owner: String,
    registry: LockRegistry,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    on_acquire: Mutex<Option<Hook>>,
}

impl InMemoryLockClient {
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_registry(owner, Arc::new(Mutex::new(HashMap::new())))
    }

    /// A second client contending on `other`'s registry
    pub fn sharing(owner: impl Into<String>, other: &InMemoryLockClient) -> Self {
        Self::with_registry(owner, other.registry.clone())
    }

    fn with_registry(owner: impl Into<String>, registry: LockRegistry) -> Self {
        Self {
            owner: owner.into(),
            registry,
            acquires: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            on_acquire: Mutex::new(None),
        }
    }

    /// Run `hook` right after every successful acquire
    pub fn on_acquire(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_acquire.lock() = Some(Box::new(hook));
    }

    /// Number of `try_acquire` calls, successful or not
    pub fn acquire_count(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    /// Number of successful releases
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl LockClient for InMemoryLockClient {
    fn owner_id(&self) -> &str {
        &self.owner
    }

    fn try_acquire(&self, name: &str) -> Result<bool> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        {
            let mut registry = self.registry.lock();
            if registry.contains_key(name) {
                return Ok(false);
            }
            registry.insert(
                name.to_string(),
                LockMarker {
                    owner: self.owner.clone(),
                    pid: std::process::id(),
                    acquired_at: Utc::now(),
                },
            );
        }
        if let Some(hook) = self.on_acquire.lock().as_ref() {
            hook();
        }
        Ok(true)
    }

    fn release(&self, name: &str) -> Result<()> {
        match self.registry.lock().remove(name) {
            Some(_) => {
                self.releases.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(LedgerError::LockState(format!("lock '{}' is not held", name))),
        }
    }

    fn holder(&self, name: &str) -> Result<Option<LockMarker>> {
        Ok(self.registry.lock().get(name).cloned())
    }
}

#[derive(Debug)]
struct ExchangerState {
    live_refresh_tokens: HashSet<String>,
    issued: u32,
    requests: Vec<TokenRequest>,
    fail_next: Option<AuthError>,
    expires_in: u64,
}

/// Token endpoint double with single-use refresh tokens
///
/// Every successful exchange issues `access-N`/`refresh-N` and invalidates
/// the refresh token that was spent. Unknown or reused refresh tokens fail
/// with `400 invalid_grant`.
pub struct MockTokenExchanger {
    state: Mutex<ExchangerState>,
}

impl Default for MockTokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenExchanger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ExchangerState {
                live_refresh_tokens: HashSet::new(),
                issued: 0,
                requests: Vec::new(),
                fail_next: None,
                expires_in: 600,
            }),
        }
    }

    /// Lifetime reported in issued responses
    pub fn with_expires_in(self, secs: u64) -> Self {
        self.state.lock().expires_in = secs;
        self
    }

    /// Register a refresh token as valid, as if issued earlier
    pub fn issue_refresh_token(&self, token: &str) -> String {
        self.state.lock().live_refresh_tokens.insert(token.to_string());
        token.to_string()
    }

    /// Fail the next exchange with `error`
    pub fn fail_next(&self, error: AuthError) {
        self.state.lock().fail_next = Some(error);
    }

    pub fn requests(&self) -> Vec<TokenRequest> {
        self.state.lock().requests.clone()
    }

    pub fn exchange_count(&self) -> usize {
        self.state.lock().requests.len()
    }
}

impl TokenExchanger for MockTokenExchanger {
    fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());

        if let Some(error) = state.fail_next.take() {
            return Err(error.into());
        }

        let invalid = |message: &str| -> LedgerError {
            AuthError::Exchange { status: 400, message: message.to_string() }.into()
        };

        match request.grant_type() {
            Some(GrantType::AuthorizationCode) => {
                if request.get("code").map_or(true, str::is_empty) {
                    return Err(invalid("invalid_request"));
                }
            }
            Some(GrantType::RefreshToken) => {
                let spent = request.get("refresh_token").unwrap_or_default();
                if !state.live_refresh_tokens.remove(spent) {
                    return Err(invalid("invalid_grant"));
                }
            }
            None => return Err(invalid("unsupported_grant_type")),
        }

        state.issued += 1;
        let refresh_token = format!("refresh-{}", state.issued);
        state.live_refresh_tokens.insert(refresh_token.clone());

        Ok(TokenResponse {
            access_token: format!("access-{}", state.issued),
            refresh_token,
            expires_in: state.expires_in,
            token_type: Some("bearer".to_string()),
        })
    }
}

/// Hook invocation seen by a [`RecordingListener`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    BeforeExchange(GrantType),
    AfterExchange(GrantType),
    Request { method: Method, url: String },
}

/// Listener that records every hook call
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    requests: Mutex<Vec<ObservedRequest>>,
    extra_fields: Mutex<Vec<(String, String)>>,
    after_exchange: Mutex<Option<Hook>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field the listener will add to every token request
    pub fn add_form_field(&self, name: &str, value: &str) {
        self.extra_fields.lock().push((name.to_string(), value.to_string()));
    }

    /// Extra work to run inside `after_token_exchange`
    pub fn on_after_exchange(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.after_exchange.lock() = Some(Box::new(hook));
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    pub fn observed_requests(&self) -> Vec<ObservedRequest> {
        self.requests.lock().clone()
    }
}

impl ConnectionListener for RecordingListener {
    fn before_token_exchange(&self, context: &ExchangeContext, request: &mut TokenRequest) {
        for (name, value) in self.extra_fields.lock().iter() {
            request.set(name.as_str(), value.as_str());
        }
        self.events.lock().push(ListenerEvent::BeforeExchange(context.grant_type));
    }

    fn after_token_exchange(&self, context: &ExchangeContext, _tokens: &TokenState) {
        if let Some(hook) = self.after_exchange.lock().as_ref() {
            hook();
        }
        self.events.lock().push(ListenerEvent::AfterExchange(context.grant_type));
    }

    fn on_request(&self, request: &ObservedRequest) {
        self.requests.lock().push(request.clone());
        self.events
            .lock()
            .push(ListenerEvent::Request { method: request.method, url: request.url.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_registry_excludes_second_owner() {
        let a = InMemoryLockClient::new("a");
        let b = InMemoryLockClient::sharing("b", &a);

        assert!(a.try_acquire("refresh").unwrap());
        assert!(!b.try_acquire("refresh").unwrap());
        a.release("refresh").unwrap();
        assert!(b.try_acquire("refresh").unwrap());
    }

    #[test]
    fn test_release_without_marker_is_lock_state_error() {
        let lock = InMemoryLockClient::new("a");
        assert!(matches!(lock.release("refresh"), Err(LedgerError::LockState(_))));
    }
}
