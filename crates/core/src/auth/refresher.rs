//! Token refresh state machine
//!
//! Keeps one process's view of the shared token pair current. Refresh tokens
//! are single-use, so only the process holding the named refresh lock may
//! spend one. Everyone else waits for the holder to publish the new pair to
//! the token store.
//!
//! Ordering: the new token state is saved to the store before the lock is
//! released, so a peer that sees the lock free also sees the new token.

use std::sync::Arc;
use std::time::Duration;

use ledgerlink_common::resilience::{
    CancelFlag, Clock, PollExecutor, RetryConfig, RetryError, Sleeper, SystemClock,
};
use ledgerlink_domain::constants::AUTHORIZE_ENDPOINT;
use ledgerlink_domain::{
    AuthError, ClientConfig, Credentials, ExpiryPolicy, LedgerError, Result, TokenState,
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::ports::{
    ConnectionListener, ExchangeContext, GrantType, LockClient, NoopListener, TokenExchanger,
    TokenRequest, TokenStore,
};
use super::state::AuthState;

/// Build the provider consent URL the user must visit to obtain an
/// authorization code.
pub fn authorization_url(oauth_base: &str, credentials: &Credentials) -> String {
    format!(
        "{}/{}?client_id={}&redirect_uri={}&response_type=code",
        oauth_base.trim_end_matches('/'),
        AUTHORIZE_ENDPOINT,
        urlencoding::encode(&credentials.client_id),
        urlencoding::encode(&credentials.redirect_uri),
    )
}

/// Tuning for expiry checks and peer waiting.
#[derive(Debug, Clone, PartialEq)]
pub struct RefresherSettings {
    pub skew: Duration,
    pub expiry_policy: ExpiryPolicy,
    pub lock_name: String,
    pub poll: RetryConfig,
}

impl RefresherSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        let refresh = &config.refresh;
        Self {
            skew: refresh.skew(),
            expiry_policy: refresh.expiry_policy.clone(),
            lock_name: config.storage.lock_name.clone(),
            poll: RetryConfig::builder()
                .max_attempts(refresh.poll_rounds)
                .fixed_backoff(refresh.poll_delay())
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for RefresherSettings {
    fn default() -> Self {
        Self {
            skew: Duration::from_secs(ledgerlink_domain::constants::DEFAULT_EXPIRY_SKEW_SECS),
            expiry_policy: ExpiryPolicy::default(),
            lock_name: ledgerlink_domain::constants::DEFAULT_LOCK_NAME.to_string(),
            poll: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Default)]
struct RefresherInner {
    tokens: Option<TokenState>,
    authorization_code: Option<String>,
    state: AuthState,
}

/// Obtains and refreshes access tokens, coordinating with sibling processes.
///
/// Calls are serialised in-process by an internal mutex; cross-process
/// exclusion comes from the injected [`LockClient`].
pub struct TokenRefresher {
    credentials: Credentials,
    authorize_url: String,
    store: Arc<dyn TokenStore>,
    lock: Arc<dyn LockClient>,
    exchanger: Arc<dyn TokenExchanger>,
    listener: Arc<dyn ConnectionListener>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    settings: RefresherSettings,
    cancel: Option<CancelFlag>,
    inner: Mutex<RefresherInner>,
}

impl TokenRefresher {
    /// Create a refresher using the system clock and no listener.
    ///
    /// # Arguments
    /// * `credentials` - client credentials; an authorization code in them is
    ///   spent by the first exchange
    /// * `oauth_base` - OAuth2 root used to build the consent URL
    /// * `store` - shared token store
    /// * `lock` - cross-process refresh lock
    /// * `exchanger` - token endpoint client
    pub fn new(
        credentials: Credentials,
        oauth_base: &str,
        store: Arc<dyn TokenStore>,
        lock: Arc<dyn LockClient>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Self {
        let authorize_url = authorization_url(oauth_base, &credentials);
        let authorization_code = credentials.authorization_code.clone();
        Self {
            credentials,
            authorize_url,
            store,
            lock,
            exchanger,
            listener: Arc::new(NoopListener),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(SystemClock),
            settings: RefresherSettings::default(),
            cancel: None,
            inner: Mutex::new(RefresherInner { authorization_code, ..RefresherInner::default() }),
        }
    }

    pub fn with_settings(mut self, settings: RefresherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ConnectionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Use one source for both wall time and sleeping
    pub fn with_time_source<T: Clock + Sleeper>(mut self, source: Arc<T>) -> Self {
        self.clock = source.clone();
        self.sleeper = source;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Abort peer waits when `flag` is raised
    pub fn with_cancellation(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().state
    }

    /// Current in-memory tokens, without refreshing
    pub fn tokens(&self) -> Option<TokenState> {
        self.inner.lock().tokens.clone()
    }

    pub fn authorize_url(&self) -> &str {
        &self.authorize_url
    }

    pub fn owner_id(&self) -> &str {
        self.lock.owner_id()
    }

    pub fn settings(&self) -> &RefresherSettings {
        &self.settings
    }

    /// Seed tokens obtained elsewhere and publish them to the store.
    ///
    /// # Errors
    ///
    /// `AuthError::Store` if the store rejects the write; the in-memory copy
    /// is updated regardless.
    pub fn set_tokens(&self, tokens: TokenState) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.state = if self.is_expired(&tokens) {
            AuthState::TokenExpired
        } else {
            AuthState::TokenValid
        };
        inner.tokens = Some(tokens.clone());
        drop(inner);
        self.store.save(&tokens).map_err(store_error)
    }

    /// Provide an authorization code for the next exchange
    pub fn set_authorization_code(&self, code: impl Into<String>) {
        self.inner.lock().authorization_code = Some(code.into());
    }

    /// Whether `tokens` must be refreshed before use
    pub fn is_expired(&self, tokens: &TokenState) -> bool {
        tokens.is_expired_at(self.clock.now_utc(), self.settings.skew)
    }

    /// Return a usable access token, refreshing or waiting on a peer first if
    /// needed.
    ///
    /// # Errors
    ///
    /// - `AuthError::AuthorizationRequired` with no refresh token and no code
    /// - `AuthError::Exchange` / `MalformedTokenResponse` / `Transport` from
    ///   the token endpoint
    /// - `AuthError::PeerWaitTimeout` when a peer never published a token
    /// - `AuthError::Cancelled` when the wait was cancelled
    /// - `AuthError::Store` or `LedgerError::LockState` for shared-state
    ///   failures
    pub fn ensure_valid_token(&self) -> Result<String> {
        let mut inner = self.inner.lock();

        if let Some(tokens) = inner.tokens.as_ref().filter(|t| !self.is_expired(t)) {
            let access_token = tokens.access_token.clone();
            inner.state = AuthState::TokenValid;
            return Ok(access_token);
        }

        // Lock-free read: a peer may already have refreshed.
        if let Some(access_token) = self.adopt_stored(&mut inner)? {
            return Ok(access_token);
        }

        let has_refresh_token = inner.tokens.as_ref().is_some_and(TokenState::has_refresh_token);
        if !has_refresh_token && inner.authorization_code.is_none() {
            inner.state = AuthState::Unauthenticated;
            info!(authorize_url = %self.authorize_url, "token.authorization_required");
            return Err(AuthError::AuthorizationRequired {
                authorize_url: self.authorize_url.clone(),
            }
            .into());
        }

        inner.state = AuthState::TokenExpired;
        let lock_name = self.settings.lock_name.as_str();
        match self.lock.try_acquire(lock_name) {
            Ok(true) => self.refresh_holding_lock(&mut inner),
            Ok(false) => self.wait_for_peer(&mut inner),
            Err(err) => {
                inner.state = AuthState::Failed;
                warn!(lock = lock_name, error = %err, "lock.acquire_failed");
                Err(err)
            }
        }
    }

    /// Load the store into memory. Returns the access token when the stored
    /// pair is still valid.
    fn adopt_stored(&self, inner: &mut RefresherInner) -> Result<Option<String>> {
        let Some(stored) = self.store.load().map_err(store_error)? else {
            return Ok(None);
        };

        if self.is_expired(&stored) {
            // Still take it: its refresh token is the newest one known.
            inner.tokens = Some(stored);
            return Ok(None);
        }

        debug!(expires_at = %stored.expires_at, "token.adopted_from_store");
        let access_token = stored.access_token.clone();
        inner.tokens = Some(stored);
        inner.state = AuthState::TokenValid;
        Ok(Some(access_token))
    }

    fn refresh_holding_lock(&self, inner: &mut RefresherInner) -> Result<String> {
        let lock_name = self.settings.lock_name.as_str();
        inner.state = AuthState::Refreshing;
        debug!(lock = lock_name, owner = self.owner_id(), "lock.acquired");

        match self.exchange_holding_lock(inner) {
            Ok(access_token) => {
                if let Err(err) = self.lock.release(lock_name) {
                    warn!(lock = lock_name, error = %err, "lock.release_failed");
                } else {
                    debug!(lock = lock_name, "lock.released");
                }
                inner.state = AuthState::TokenValid;
                Ok(access_token)
            }
            Err(err) => {
                if let Err(release_err) = self.lock.release(lock_name) {
                    warn!(lock = lock_name, error = %release_err, "lock.release_failed");
                }
                inner.state = AuthState::Failed;
                warn!(error = %err, category = %err.category(), "token.refresh.failed");
                Err(err)
            }
        }
    }

    /// Everything that happens between acquire and release.
    fn exchange_holding_lock(&self, inner: &mut RefresherInner) -> Result<String> {
        // Double-check: a peer may have finished between our read and acquire.
        if let Some(access_token) = self.adopt_stored(inner)? {
            info!("token.refresh.skipped_peer_refreshed");
            return Ok(access_token);
        }

        let refresh_token =
            inner.tokens.as_ref().filter(|t| t.has_refresh_token()).map(|t| t.refresh_token.clone());
        let (grant_type, mut request) = match (&refresh_token, &inner.authorization_code) {
            (Some(refresh_token), _) => (
                GrantType::RefreshToken,
                TokenRequest::refresh_token(&self.credentials, refresh_token),
            ),
            (None, Some(code)) => (
                GrantType::AuthorizationCode,
                TokenRequest::authorization_code(&self.credentials, code),
            ),
            (None, None) => {
                return Err(AuthError::AuthorizationRequired {
                    authorize_url: self.authorize_url.clone(),
                }
                .into())
            }
        };

        let context = ExchangeContext { grant_type, owner_id: self.owner_id().to_string() };
        info!(grant_type = %grant_type, owner = %context.owner_id, "token.refresh.started");

        self.listener.before_token_exchange(&context, &mut request);
        let response = self.exchanger.exchange(&request)?;
        let tokens = response.into_state(self.clock.now_utc(), &self.settings.expiry_policy);

        self.store.save(&tokens).map_err(store_error)?;
        if grant_type == GrantType::AuthorizationCode {
            inner.authorization_code = None;
        }
        self.listener.after_token_exchange(&context, &tokens);

        info!(grant_type = %grant_type, expires_at = %tokens.expires_at, "token.refresh.completed");
        let access_token = tokens.access_token.clone();
        inner.tokens = Some(tokens);
        Ok(access_token)
    }

    fn wait_for_peer(&self, inner: &mut RefresherInner) -> Result<String> {
        inner.state = AuthState::WaitingOnPeer;
        let lock_name = self.settings.lock_name.as_str();
        let holder = self.lock.holder(lock_name).ok().flatten();
        info!(
            lock = lock_name,
            holder = holder.as_ref().map(|m| m.owner.as_str()).unwrap_or("unknown"),
            holder_pid = holder.as_ref().map(|m| m.pid),
            rounds = self.settings.poll.max_attempts,
            "lock.peer_wait.started"
        );

        let mut executor =
            PollExecutor::with_sleeper(self.settings.poll.clone(), self.sleeper.clone());
        if let Some(flag) = &self.cancel {
            executor = executor.with_cancel(flag.clone());
        }

        let outcome = executor.poll(|round| match self.store.load() {
            Ok(Some(tokens)) if !self.is_expired(&tokens) => Some(tokens),
            Ok(_) => {
                debug!(round, "lock.peer_wait.round");
                None
            }
            Err(err) => {
                warn!(round, error = %err, "lock.peer_wait.store_unreadable");
                None
            }
        });

        match outcome {
            Ok(outcome) => {
                info!(rounds = outcome.attempts, "lock.peer_wait.satisfied");
                let access_token = outcome.value.access_token.clone();
                inner.tokens = Some(outcome.value);
                inner.state = AuthState::TokenValid;
                Ok(access_token)
            }
            Err(err) => {
                inner.state = AuthState::Failed;
                Err(peer_wait_error(err))
            }
        }
    }
}

fn peer_wait_error(err: RetryError) -> LedgerError {
    match err {
        RetryError::AttemptsExhausted { attempts, waited } => {
            warn!(rounds = attempts, waited_ms = waited.as_millis() as u64, "lock.peer_wait.timeout");
            AuthError::PeerWaitTimeout {
                rounds: attempts,
                waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
            }
            .into()
        }
        RetryError::Cancelled { attempts } => {
            info!(rounds = attempts, "lock.peer_wait.cancelled");
            AuthError::Cancelled.into()
        }
        RetryError::InvalidConfiguration { message } => LedgerError::Config(message),
    }
}

fn store_error(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Auth(_) => err,
        other => AuthError::Store(other.to_string()).into(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use ledgerlink_common::testing::MockClock;

    use super::*;
    use crate::testing::{
        InMemoryLockClient, InMemoryTokenStore, ListenerEvent, MockTokenExchanger,
        RecordingListener,
    };

    const NOW: i64 = 1_700_000_000;

    fn at(offset: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(NOW + offset, 0).unwrap()
    }

    struct Harness {
        clock: Arc<MockClock>,
        store: Arc<InMemoryTokenStore>,
        lock: Arc<InMemoryLockClient>,
        exchanger: Arc<MockTokenExchanger>,
        listener: Arc<RecordingListener>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                clock: Arc::new(MockClock::at_epoch_secs(NOW as u64)),
                store: Arc::new(InMemoryTokenStore::new()),
                lock: Arc::new(InMemoryLockClient::new("owner-a")),
                exchanger: Arc::new(MockTokenExchanger::new()),
                listener: Arc::new(RecordingListener::new()),
            }
        }

        fn refresher(&self, credentials: Credentials) -> TokenRefresher {
            TokenRefresher::new(
                credentials,
                "https://provider.test/api/oauth2",
                self.store.clone(),
                self.lock.clone(),
                self.exchanger.clone(),
            )
            .with_listener(self.listener.clone())
            .with_time_source(self.clock.clone())
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("client", "secret", "https://app.test/callback")
    }

    #[test]
    fn test_authorization_url_is_encoded() {
        let url = authorization_url("https://provider.test/api/oauth2/", &credentials());
        assert_eq!(
            url,
            "https://provider.test/api/oauth2/auth?client_id=client&redirect_uri=https%3A%2F%2Fapp.test%2Fcallback&response_type=code"
        );
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the
    /// unauthenticated scenario.
    ///
    /// Assertions:
    /// - Confirms the error carries the consent URL.
    /// - Confirms no lock was taken and no exchange happened.
    #[test]
    fn test_without_refresh_token_or_code_requires_authorization() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());

        let err = refresher.ensure_valid_token().unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Auth(AuthError::AuthorizationRequired { ref authorize_url })
                if authorize_url.contains("response_type=code")
        ));
        assert_eq!(refresher.state(), AuthState::Unauthenticated);
        assert_eq!(h.exchanger.exchange_count(), 0);
        assert!(!h.lock.is_held("token_refresh").unwrap());
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the first
    /// acquisition scenario.
    ///
    /// Assertions:
    /// - Confirms `grant_type=authorization_code` is used.
    /// - Confirms the token is persisted and the lock released.
    /// - Confirms the code is not reused afterwards.
    #[test]
    fn test_authorization_code_exchange_persists_and_releases() {
        let h = Harness::new();
        let refresher = h.refresher(credentials().with_authorization_code("auth-code"));

        let access = refresher.ensure_valid_token().unwrap();

        let requests = h.exchanger.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].grant_type(), Some(GrantType::AuthorizationCode));
        assert_eq!(requests[0].get("code"), Some("auth-code"));
        assert_eq!(h.store.load().unwrap().unwrap().access_token, access);
        assert!(!h.lock.is_held("token_refresh").unwrap());
        assert_eq!(refresher.state(), AuthState::TokenValid);

        // Expire and refresh again: refresh_token grant this time.
        h.clock.advance_secs(3_600);
        refresher.ensure_valid_token().unwrap();
        assert_eq!(h.exchanger.requests()[1].grant_type(), Some(GrantType::RefreshToken));
    }

    #[test]
    fn test_valid_in_memory_token_skips_store_and_lock() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());
        refresher.set_tokens(TokenState::new("a-1", "r-1", at(600))).unwrap();
        h.store.clear().unwrap();

        assert_eq!(refresher.ensure_valid_token().unwrap(), "a-1");
        assert_eq!(h.store.load_count(), 0);
        assert_eq!(h.exchanger.exchange_count(), 0);
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the
    /// lock-free store read scenario.
    ///
    /// Assertions:
    /// - Confirms a valid token written by a peer is adopted without locking.
    #[test]
    fn test_expired_memory_adopts_fresh_store_token() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());
        refresher.set_tokens(TokenState::new("a-old", "r-old", at(-5))).unwrap();
        h.store.save(&TokenState::new("a-peer", "r-peer", at(900))).unwrap();

        assert_eq!(refresher.ensure_valid_token().unwrap(), "a-peer");
        assert_eq!(h.exchanger.exchange_count(), 0);
        assert_eq!(h.lock.acquire_count(), 0);
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the skew
    /// boundary scenario.
    ///
    /// Assertions:
    /// - Confirms a token inside the 10s skew window is refreshed.
    #[test]
    fn test_token_inside_skew_window_is_refreshed() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());
        let seeded = h.exchanger.issue_refresh_token("r-live");
        refresher.set_tokens(TokenState::new("a-1", seeded, at(10))).unwrap();

        let access = refresher.ensure_valid_token().unwrap();

        assert_ne!(access, "a-1");
        assert_eq!(h.exchanger.exchange_count(), 1);
    }

    #[test]
    fn test_refresh_token_is_single_use() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());
        let seeded = h.exchanger.issue_refresh_token("r-live");
        refresher.set_tokens(TokenState::new("a-1", seeded.clone(), at(-1))).unwrap();

        refresher.ensure_valid_token().unwrap();
        let persisted = h.store.load().unwrap().unwrap();
        assert_ne!(persisted.refresh_token, seeded);
        assert_eq!(h.store.save_count(), 2);

        // Spending the old refresh token again is rejected by the provider.
        let replay = h.exchanger.exchange(&TokenRequest::refresh_token(&credentials(), &seeded));
        assert!(matches!(
            replay,
            Err(LedgerError::Auth(AuthError::Exchange { status: 400, .. }))
        ));
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the failed
    /// exchange scenario.
    ///
    /// Assertions:
    /// - Confirms the lock is released before the error surfaces.
    /// - Confirms the state is `Failed` and nothing was saved.
    #[test]
    fn test_failed_exchange_releases_lock() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());
        refresher.set_tokens(TokenState::new("a-1", "r-unknown", at(-1))).unwrap();

        let err = refresher.ensure_valid_token().unwrap_err();

        assert!(matches!(err, LedgerError::Auth(AuthError::Exchange { status: 400, .. })));
        assert!(!h.lock.is_held("token_refresh").unwrap());
        assert_eq!(h.lock.release_count(), 1);
        assert_eq!(refresher.state(), AuthState::Failed);
        assert_eq!(h.store.save_count(), 1);
    }

    #[test]
    fn test_malformed_response_releases_lock() {
        let h = Harness::new();
        let refresher = h.refresher(credentials().with_authorization_code("code"));
        h.exchanger.fail_next(AuthError::MalformedTokenResponse("missing field".into()));

        let err = refresher.ensure_valid_token().unwrap_err();

        assert!(matches!(err, LedgerError::Auth(AuthError::MalformedTokenResponse(_))));
        assert!(!h.lock.is_held("token_refresh").unwrap());
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the
    /// double-check scenario.
    ///
    /// Assertions:
    /// - Confirms a token published between the first read and the acquire is
    ///   used instead of spending the refresh token.
    #[test]
    fn test_double_check_after_acquire_skips_exchange() {
        let h = Harness::new();
        let refresher = h.refresher(credentials());
        refresher.set_tokens(TokenState::new("a-old", "r-old", at(-1))).unwrap();

        let store = h.store.clone();
        h.lock.on_acquire(move || {
            store.save(&TokenState::new("a-peer", "r-peer", at(900))).unwrap();
        });

        assert_eq!(refresher.ensure_valid_token().unwrap(), "a-peer");
        assert_eq!(h.exchanger.exchange_count(), 0);
        assert!(!h.lock.is_held("token_refresh").unwrap());
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the
    /// peer-wait success scenario.
    ///
    /// Assertions:
    /// - Confirms the waiter sleeps before each probe and picks up the peer's
    ///   token on the third round.
    #[test]
    fn test_waiting_on_peer_picks_up_published_token() {
        let h = Harness::new();
        let peer = InMemoryLockClient::sharing("owner-b", &h.lock);
        assert!(peer.try_acquire("token_refresh").unwrap());

        let refresher = h.refresher(credentials());
        refresher.set_tokens(TokenState::new("a-old", "r-old", at(-1))).unwrap();

        let store = h.store.clone();
        let clock = h.clock.clone();
        h.store.on_load(move |loads| {
            if clock.sleep_count() == 3 && loads >= 1 {
                store.put_silently(TokenState::new("a-peer", "r-peer", at(900)));
            }
        });

        assert_eq!(refresher.ensure_valid_token().unwrap(), "a-peer");
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2); 3]);
        assert_eq!(h.exchanger.exchange_count(), 0);
        assert_eq!(refresher.state(), AuthState::TokenValid);
    }

    /// Validates `TokenRefresher::ensure_valid_token` behavior for the
    /// peer-wait timeout scenario.
    ///
    /// Assertions:
    /// - Confirms exactly six rounds of two seconds elapse.
    /// - Confirms the error is `PeerWaitTimeout`, never a hang.
    #[test]
    fn test_peer_wait_times_out_after_six_rounds() {
        let h = Harness::new();
        let peer = InMemoryLockClient::sharing("owner-b", &h.lock);
        assert!(peer.try_acquire("token_refresh").unwrap());

        let refresher = h.refresher(credentials());
        refresher.set_tokens(TokenState::new("a-old", "r-old", at(-1))).unwrap();

        let err = refresher.ensure_valid_token().unwrap_err();

        assert_eq!(
            err,
            LedgerError::Auth(AuthError::PeerWaitTimeout { rounds: 6, waited_ms: 12_000 })
        );
        assert_eq!(h.clock.sleep_count(), 6);
        assert_eq!(refresher.state(), AuthState::Failed);
        assert!(peer.is_held("token_refresh").unwrap());
    }

    #[test]
    fn test_peer_wait_can_be_cancelled() {
        let h = Harness::new();
        let peer = InMemoryLockClient::sharing("owner-b", &h.lock);
        assert!(peer.try_acquire("token_refresh").unwrap());

        let flag = CancelFlag::new();
        let refresher = h.refresher(credentials()).with_cancellation(flag.clone());
        refresher.set_tokens(TokenState::new("a-old", "r-old", at(-1))).unwrap();
        let clock = h.clock.clone();
        h.store.on_load(move |_| {
            if clock.sleep_count() == 2 {
                flag.cancel();
            }
        });

        let err = refresher.ensure_valid_token().unwrap_err();

        assert_eq!(err, LedgerError::Auth(AuthError::Cancelled));
        assert_eq!(h.clock.sleep_count(), 2);
    }

    /// Validates listener invocation order for the refresh scenario.
    ///
    /// Assertions:
    /// - Confirms `before_token_exchange` may add form fields.
    /// - Confirms `after_token_exchange` runs after the store write, while
    ///   the lock is still held.
    #[test]
    fn test_listener_hooks_wrap_the_exchange() {
        let h = Harness::new();
        h.listener.add_form_field("division", "42");
        let refresher = h.refresher(credentials().with_authorization_code("code"));

        let lock = h.lock.clone();
        let store = h.store.clone();
        h.listener.on_after_exchange(move || {
            assert!(lock.is_held("token_refresh").unwrap());
            assert!(store.load().unwrap().is_some());
        });

        refresher.ensure_valid_token().unwrap();

        assert_eq!(h.exchanger.requests()[0].get("division"), Some("42"));
        let events = h.listener.events();
        assert!(matches!(
            events.as_slice(),
            [
                ListenerEvent::BeforeExchange(GrantType::AuthorizationCode),
                ListenerEvent::AfterExchange(GrantType::AuthorizationCode)
            ]
        ));
    }

    #[test]
    fn test_fixed_offset_policy_ignores_provider_lifetime() {
        let h = Harness::new();
        let settings = RefresherSettings {
            expiry_policy: ExpiryPolicy::FixedOffset { secs: 600 },
            ..RefresherSettings::default()
        };
        let refresher =
            h.refresher(credentials().with_authorization_code("code")).with_settings(settings);

        refresher.ensure_valid_token().unwrap();

        assert_eq!(refresher.tokens().unwrap().expires_at, at(600));
    }

    #[test]
    fn test_store_failure_is_an_auth_error() {
        let h = Harness::new();
        let refresher = h.refresher(credentials().with_authorization_code("code"));
        h.store.fail_saves(true);

        let err = refresher.ensure_valid_token().unwrap_err();

        assert!(matches!(err, LedgerError::Auth(AuthError::Store(_))));
        assert!(!h.lock.is_held("token_refresh").unwrap());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ClientConfig::new("https://provider.test", credentials());
        config.refresh.poll_rounds = 3;
        config.refresh.poll_delay_ms = 50;
        config.storage.lock_name = "acme".to_string();

        let settings = RefresherSettings::from_config(&config);

        assert_eq!(settings.lock_name, "acme");
        assert_eq!(settings.poll.max_attempts, 3);
        assert_eq!(settings.poll.total_wait(), Duration::from_millis(150));
    }
}
