//! Authenticated connection to the accounting API
//!
//! A [`Connection`] signs every request with a bearer token obtained from the
//! [`TokenRefresher`], scopes resource paths to the tenant division, and
//! normalises the `{"d": ...}` response envelope.
//!
//! Pagination is explicit: a list response's `d.__next` is remembered and
//! returned in the [`Page`], never followed automatically.

use std::sync::Arc;

use ledgerlink_common::resilience::{CancelFlag, Clock, Sleeper};
use ledgerlink_core::{
    extract_error_message, unwrap_envelope, AuthState, ConnectionListener, LockClient,
    NoopListener, ObservedRequest, Query, RefresherSettings, TokenExchanger, TokenRefresher,
    TokenStore, Unwrapped,
};
use ledgerlink_domain::constants::CURRENT_ME_PATH;
use ledgerlink_domain::{
    ClientConfig, Cursor, Division, LedgerError, Method, Page, RateLimits, Result, TokenState,
};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{FileLockClient, FileTokenStore, HttpTokenExchanger};
use crate::http::{HttpClient, HttpResponse};

const JSON: &str = "application/json";
const PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";
const CURRENT_DIVISION_FIELD: &str = "CurrentDivision";

/// Where a request goes.
enum Target<'a> {
    /// Division-relative resource path
    Resource(&'a str),
    /// Absolute URL or division-independent path, used as given
    Verbatim(String),
}

#[derive(Debug, Default)]
struct Session {
    division: Option<Division>,
    next: Option<Cursor>,
    rate_limits: RateLimits,
}

/// Blocking client for one tenant of the accounting API.
///
/// Safe to share between threads; refreshes are serialised in-process by the
/// refresher and across processes by its [`LockClient`].
pub struct Connection {
    config: ClientConfig,
    api_base: String,
    http: HttpClient,
    refresher: TokenRefresher,
    listener: Arc<dyn ConnectionListener>,
    session: Mutex<Session>,
}

impl Connection {
    /// Connection backed by the file token store and file lock from
    /// `config.storage`.
    ///
    /// # Errors
    ///
    /// `LedgerError::Config` if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ConnectionBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ConnectionBuilder {
        ConnectionBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Consent page the user must visit to obtain an authorization code
    pub fn authorization_url(&self) -> &str {
        self.refresher.authorize_url()
    }

    /// Seed tokens obtained elsewhere and publish them to the token store.
    pub fn set_tokens(&self, tokens: TokenState) -> Result<()> {
        self.refresher.set_tokens(tokens)
    }

    /// Authorization code returned to the redirect URI.
    pub fn set_authorization_code(&self, code: impl Into<String>) {
        self.refresher.set_authorization_code(code);
    }

    /// Current in-memory tokens, for callers persisting them externally
    pub fn tokens(&self) -> Option<TokenState> {
        self.refresher.tokens()
    }

    pub fn auth_state(&self) -> AuthState {
        self.refresher.state()
    }

    /// Lock owner id of this connection
    pub fn owner_id(&self) -> &str {
        self.refresher.owner_id()
    }

    /// Obtain a usable access token now, refreshing if needed.
    pub fn ensure_valid_token(&self) -> Result<String> {
        self.refresher.ensure_valid_token()
    }

    /// Rate-limit headers from the most recent response
    pub fn rate_limits(&self) -> RateLimits {
        self.session.lock().rate_limits.clone()
    }

    /// Skip the `current/Me` lookup and scope requests to `division`.
    pub fn set_division(&self, division: Division) {
        self.session.lock().division = Some(division);
    }

    /// Tenant division, resolved through `current/Me` on first use.
    ///
    /// # Errors
    ///
    /// Any request error, or `LedgerError::Protocol` when the response has
    /// no `CurrentDivision`.
    pub fn division(&self) -> Result<Division> {
        if let Some(division) = self.session.lock().division.clone() {
            return Ok(division);
        }

        let query = Query::new().select([CURRENT_DIVISION_FIELD]);
        let target = Target::Verbatim(self.api_url(CURRENT_ME_PATH));
        let me = self.send(Method::Get, target, None, &query, &[], true)?.payload.unwrap_or_default();

        let division = match &me {
            Value::Array(items) => items.first(),
            other => Some(other),
        }
        .and_then(|me| me.get(CURRENT_DIVISION_FIELD))
        .and_then(Division::from_json)
        .ok_or_else(|| {
            LedgerError::Protocol(format!(
                "{} response has no {}",
                CURRENT_ME_PATH, CURRENT_DIVISION_FIELD
            ))
        })?;

        info!(division = %division, "connection.division_resolved");
        self.session.lock().division = Some(division.clone());
        Ok(division)
    }

    /// Cursor remembered from the most recent response, without clearing it
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.session.lock().next.clone()
    }

    /// Take the remembered cursor, leaving none behind
    pub fn take_next_cursor(&self) -> Option<Cursor> {
        self.session.lock().next.take()
    }

    /// Send a request and return the unwrapped payload.
    ///
    /// `path` is relative to the division (`crm/Accounts`) unless it is an
    /// absolute URL or the `current/Me` endpoint. A single-element result set
    /// is collapsed to the element, except on a `GET` of the remembered
    /// `__next` cursor, which always yields the list. Empty and `204`
    /// responses yield `None`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::Auth` when no valid token can be obtained; nothing is
    ///   sent in that case
    /// - `LedgerError::Api` for non-2xx responses
    /// - `LedgerError::Transport` when no response was received
    /// - `LedgerError::Protocol` for bodies outside the envelope format
    pub fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: Option<&Query>,
        headers: &[(&str, &str)],
    ) -> Result<Option<Value>> {
        let empty = Query::new();
        let collapse_single = !(method == Method::Get && self.is_remembered_cursor(path));
        let target = self.target_for(path);
        Ok(self.send(method, target, body, query.unwrap_or(&empty), headers, collapse_single)?.payload)
    }

    pub fn get(&self, path: &str, query: &Query) -> Result<Option<Value>> {
        self.execute(Method::Get, path, None, Some(query), &[])
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.execute(Method::Post, path, Some(body), None, &[])
    }

    pub fn put(&self, path: &str, body: &Value) -> Result<Option<Value>> {
        self.execute(Method::Put, path, Some(body), None, &[])
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        self.execute(Method::Delete, path, None, None, &[]).map(|_| ())
    }

    /// First page of a collection plus the cursor to the next one.
    pub fn list(&self, path: &str, query: &Query) -> Result<Page<Value>> {
        let unwrapped = self.send(Method::Get, self.target_for(path), None, query, &[], true)?;
        Ok(into_page(unwrapped))
    }

    /// Page at `cursor`. A one-row page is still returned as a list.
    pub fn next_page(&self, cursor: &Cursor) -> Result<Page<Value>> {
        let target = Target::Verbatim(cursor.as_str().to_string());
        let unwrapped = self.send(Method::Get, target, None, &Query::new(), &[], false)?;
        Ok(into_page(unwrapped))
    }

    fn is_remembered_cursor(&self, path: &str) -> bool {
        self.session.lock().next.as_ref().is_some_and(|cursor| cursor.as_str() == path)
    }

    fn target_for<'a>(&self, path: &'a str) -> Target<'a> {
        let trimmed = path.trim_start_matches('/');
        if is_absolute(path) {
            Target::Verbatim(path.to_string())
        } else if is_division_independent(trimmed) {
            Target::Verbatim(self.api_url(trimmed))
        } else {
            Target::Resource(trimmed)
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn send(
        &self,
        method: Method,
        target: Target<'_>,
        body: Option<&Value>,
        query: &Query,
        extra_headers: &[(&str, &str)],
        collapse_single: bool,
    ) -> Result<Unwrapped> {
        let access_token = self.refresher.ensure_valid_token()?;

        let mut url = match target {
            Target::Verbatim(url) => url,
            Target::Resource(path) => {
                let division = self.division()?;
                format!("{}/{}/{}", self.api_base, division, path)
            }
        };
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query.to_query_string());
        }

        let mut headers = vec![
            (AUTHORIZATION.as_str().to_string(), format!("Bearer {access_token}")),
            (ACCEPT.as_str().to_string(), JSON.to_string()),
            (CONTENT_TYPE.as_str().to_string(), JSON.to_string()),
            (PREFER.to_string(), RETURN_REPRESENTATION.to_string()),
        ];
        for (name, value) in extra_headers {
            match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
                Some(slot) => slot.1 = (*value).to_string(),
                None => headers.push(((*name).to_string(), (*value).to_string())),
            }
        }

        self.listener.on_request(&ObservedRequest::new(method, url.clone(), &headers));

        let mut builder = self.http.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = self.http.send(builder)?;
        self.record_rate_limits(&response);

        if !response.is_success() {
            return Err(api_error(&response, method, &url));
        }

        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(Unwrapped::empty());
        }

        let unwrapped = unwrap_envelope(&response.body, collapse_single)?;
        self.session.lock().next = unwrapped.next.clone();
        Ok(unwrapped)
    }

    fn record_rate_limits(&self, response: &HttpResponse) {
        let limits = RateLimits::from_headers(|name| response.header(name));
        if !limits.is_empty() {
            if limits.minutely_remaining == Some(0) || limits.remaining == Some(0) {
                warn!(
                    remaining = ?limits.remaining,
                    minutely_remaining = ?limits.minutely_remaining,
                    "http.rate_limit.exhausted"
                );
            }
            self.session.lock().rate_limits = limits;
        }
    }
}

/// Builder for [`Connection`] with replaceable collaborators.
pub struct ConnectionBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn TokenStore>>,
    lock: Option<Arc<dyn LockClient>>,
    exchanger: Option<Arc<dyn TokenExchanger>>,
    listener: Arc<dyn ConnectionListener>,
    http: Option<HttpClient>,
    clock: Option<Arc<dyn Clock>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    cancel: Option<CancelFlag>,
}

impl ConnectionBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            lock: None,
            exchanger: None,
            listener: Arc::new(NoopListener),
            http: None,
            clock: None,
            sleeper: None,
            cancel: None,
        }
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn lock_client(mut self, lock: Arc<dyn LockClient>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn token_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.exchanger = Some(exchanger);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ConnectionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    /// Use one source for wall time and peer-wait sleeping
    pub fn time_source<T: Clock + Sleeper>(mut self, source: Arc<T>) -> Self {
        self.clock = Some(source.clone());
        self.sleeper = Some(source);
        self
    }

    /// Abort peer waits when `flag` is raised
    pub fn cancellation(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn build(self) -> Result<Connection> {
        let config = self.config;
        config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => HttpClient::from_config(&config.http)?,
        };
        let oauth_base = config.oauth_base();

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileTokenStore::from_config(&config.storage)));
        let lock = self
            .lock
            .unwrap_or_else(|| Arc::new(FileLockClient::from_config(&config.storage)));
        let exchanger = self
            .exchanger
            .unwrap_or_else(|| Arc::new(HttpTokenExchanger::new(http.clone(), &oauth_base)));

        let mut refresher =
            TokenRefresher::new(config.credentials.clone(), &oauth_base, store, lock, exchanger)
                .with_settings(RefresherSettings::from_config(&config))
                .with_listener(self.listener.clone());
        if let Some(clock) = self.clock {
            refresher = refresher.with_clock(clock);
        }
        if let Some(sleeper) = self.sleeper {
            refresher = refresher.with_sleeper(sleeper);
        }
        if let Some(flag) = self.cancel {
            refresher = refresher.with_cancellation(flag);
        }

        debug!(api_base = %config.api_base(), owner = %refresher.owner_id(), "connection.created");

        Ok(Connection {
            api_base: config.api_base(),
            session: Mutex::new(Session { division: config.division.clone(), ..Session::default() }),
            config,
            http,
            refresher,
            listener: self.listener,
        })
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("https://") || path.starts_with("http://")
}

fn is_division_independent(path: &str) -> bool {
    let endpoint = path.split(['?', '(']).next().unwrap_or(path);
    endpoint.eq_ignore_ascii_case(CURRENT_ME_PATH)
}

fn into_page(unwrapped: Unwrapped) -> Page<Value> {
    let next = unwrapped.next.clone();
    Page::new(unwrapped.into_items(), next)
}

fn api_error(response: &HttpResponse, method: Method, url: &str) -> LedgerError {
    let mut message = extract_error_message(&response.body);
    if message.is_empty() {
        message = response.reason.clone().unwrap_or_else(|| "request failed".to_string());
    }
    warn!(%method, status = response.status, error = %message, url = %strip_query(url), "http.request.rejected");
    LedgerError::api(response.status, message)
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use ledgerlink_core::testing::{InMemoryLockClient, InMemoryTokenStore, MockTokenExchanger};
    use ledgerlink_domain::Credentials;

    use super::*;

    fn connection() -> Connection {
        let config = ClientConfig::new(
            "https://start.example.com",
            Credentials::new("client", "secret", "https://app/cb"),
        );
        Connection::builder(config)
            .token_store(Arc::new(InMemoryTokenStore::new()))
            .lock_client(Arc::new(InMemoryLockClient::new("owner-a")))
            .token_exchanger(Arc::new(MockTokenExchanger::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_targets_follow_url_rules() {
        let conn = connection();

        assert!(matches!(conn.target_for("crm/Accounts"), Target::Resource("crm/Accounts")));
        assert!(matches!(conn.target_for("/crm/Accounts"), Target::Resource("crm/Accounts")));
        assert!(matches!(
            conn.target_for("current/Me"),
            Target::Verbatim(ref url) if url == "https://start.example.com/api/v1/current/Me"
        ));
        assert!(matches!(
            conn.target_for("https://other/api/v1/1/crm/Accounts?$skiptoken=x"),
            Target::Verbatim(ref url) if url == "https://other/api/v1/1/crm/Accounts?$skiptoken=x"
        ));
    }

    #[test]
    fn test_authorization_url_uses_oauth_base() {
        let conn = connection();
        assert!(conn
            .authorization_url()
            .starts_with("https://start.example.com/api/oauth2/auth?client_id=client"));
    }

    /// Validates `Connection::execute` behavior for the unauthenticated
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms an authorization-required error is returned.
    /// - Confirms the configured division is used without a lookup.
    #[test]
    fn test_execute_without_tokens_requires_authorization() {
        let conn = connection();
        conn.set_division(Division::new("17"));

        let err = conn.get("crm/Accounts", &Query::new()).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Auth(ledgerlink_domain::AuthError::AuthorizationRequired { .. })
        ));
        assert_eq!(conn.division().unwrap(), Division::new("17"));
        assert_eq!(conn.auth_state(), AuthState::Unauthenticated);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ClientConfig::new("ftp://nope", Credentials::new("c", "s", "https://app/cb"));
        assert!(matches!(Connection::new(config), Err(LedgerError::Config(_))));
    }
}
