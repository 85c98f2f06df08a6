//! Port interfaces for token management

use chrono::{DateTime, Utc};
use ledgerlink_domain::{
    impl_domain_status_conversions, Credentials, Method, Result, TokenResponse, TokenState,
};
use serde::{Deserialize, Serialize};

/// Durable token storage shared between processes on one host.
///
/// Reads are lock-free. Writers hold the refresh lock, so implementations
/// only need read-after-write consistency, not transactions.
pub trait TokenStore: Send + Sync {
    /// Current token state, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<TokenState>>;

    /// Replace the stored token state
    fn save(&self, state: &TokenState) -> Result<()>;

    /// Forget the stored token state
    fn clear(&self) -> Result<()>;
}

/// Content of a lock marker: who took it and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    pub owner: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Lock ownership as seen by one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    HeldByUs,
    HeldByPeer(LockMarker),
}

/// Named mutual exclusion across independent OS processes.
///
/// Exclusion relies only on atomic create in [`LockClient::try_acquire`]. The
/// owner id is written into the marker for diagnostics and for
/// [`LockClient::status`].
pub trait LockClient: Send + Sync {
    /// Process-unique identity written into markers this client creates
    fn owner_id(&self) -> &str;

    /// Create the marker exclusively. `Ok(false)` when it already exists.
    fn try_acquire(&self, name: &str) -> Result<bool>;

    /// Remove the marker.
    ///
    /// # Errors
    ///
    /// `LedgerError::LockState` when no marker exists.
    fn release(&self, name: &str) -> Result<()>;

    /// Current marker, if any
    fn holder(&self, name: &str) -> Result<Option<LockMarker>>;

    /// Whether any process holds the lock
    fn is_held(&self, name: &str) -> Result<bool> {
        Ok(self.holder(name)?.is_some())
    }

    /// Distinguish "we hold it" from "a peer holds it"
    fn status(&self, name: &str) -> Result<LockStatus> {
        Ok(match self.holder(name)? {
            None => LockStatus::Free,
            Some(marker) if marker.owner == self.owner_id() => LockStatus::HeldByUs,
            Some(marker) => LockStatus::HeldByPeer(marker),
        })
    }
}

/// OAuth2 grant used for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl_domain_status_conversions!(GrantType {
    AuthorizationCode => "authorization_code",
    RefreshToken => "refresh_token",
});

/// Form-encoded body of a token endpoint request.
///
/// Listeners may add or replace fields before it is sent.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    fields: Vec<(String, String)>,
}

impl TokenRequest {
    /// `grant_type=authorization_code` request consuming `code`
    pub fn authorization_code(credentials: &Credentials, code: &str) -> Self {
        let mut request = Self::base(GrantType::AuthorizationCode, credentials);
        request.set("code", code);
        request
    }

    /// `grant_type=refresh_token` request spending `refresh_token`
    pub fn refresh_token(credentials: &Credentials, refresh_token: &str) -> Self {
        let mut request = Self::base(GrantType::RefreshToken, credentials);
        request.set("refresh_token", refresh_token);
        request
    }

    fn base(grant: GrantType, credentials: &Credentials) -> Self {
        let mut request = Self { fields: Vec::with_capacity(5) };
        request.set("grant_type", grant.to_string());
        request.set("client_id", &credentials.client_id);
        request.set("client_secret", &credentials.client_secret);
        request.set("redirect_uri", &credentials.redirect_uri);
        request
    }

    /// Insert or replace a field
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.fields.iter().position(|(key, _)| key == name)?;
        Some(self.fields.remove(index).1)
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn grant_type(&self) -> Option<GrantType> {
        self.get("grant_type").and_then(|grant| grant.parse().ok())
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|(key, _)| key.as_str()).collect();
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.get("grant_type"))
            .field("fields", &names)
            .finish()
    }
}

/// Performs the HTTP exchange against the provider's token endpoint.
pub trait TokenExchanger: Send + Sync {
    /// POST the form and decode the token response.
    ///
    /// # Errors
    ///
    /// - `AuthError::Exchange` for non-success statuses
    /// - `AuthError::MalformedTokenResponse` when the body lacks token fields
    /// - `AuthError::Transport` when the endpoint is unreachable
    fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse>;
}

/// What a listener learns about an exchange in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeContext {
    pub grant_type: GrantType,
    /// Lock owner id of the client doing the exchange
    pub owner_id: String,
}

/// A request about to be sent, as shown to listeners.
///
/// The `Authorization` header value is redacted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl ObservedRequest {
    pub const REDACTED: &'static str = "Bearer <redacted>";

    /// Snapshot of a request with the `Authorization` value masked
    pub fn new(method: Method, url: impl Into<String>, headers: &[(String, String)]) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.clone(), Self::REDACTED.to_string())
                } else {
                    (name.clone(), value.clone())
                }
            })
            .collect();
        Self { method, url: url.into(), headers }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Optional lifecycle hooks invoked synchronously by the client.
///
/// Hooks cannot fail; errors inside them are the implementor's concern.
pub trait ConnectionListener: Send + Sync {
    /// Called with the outgoing token request before it is sent
    fn before_token_exchange(&self, _context: &ExchangeContext, _request: &mut TokenRequest) {}

    /// Called after new tokens were saved to the store, while the refresh
    /// lock is still held
    fn after_token_exchange(&self, _context: &ExchangeContext, _tokens: &TokenState) {}

    /// Called with the final method, URL and headers of every API request
    fn on_request(&self, _request: &ObservedRequest) {}
}

/// Listener that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl ConnectionListener for NoopListener {}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials::new("client", "secret", "https://app/cb")
    }

    #[test]
    fn test_refresh_request_fields() {
        let request = TokenRequest::refresh_token(&credentials(), "r-1");

        assert_eq!(request.grant_type(), Some(GrantType::RefreshToken));
        assert_eq!(request.get("refresh_token"), Some("r-1"));
        assert_eq!(request.get("client_secret"), Some("secret"));
        assert_eq!(request.get("code"), None);
    }

    #[test]
    fn test_set_replaces_existing_field() {
        let mut request = TokenRequest::authorization_code(&credentials(), "abc");
        request.set("code", "xyz");
        request.set("scope", "read");

        assert_eq!(request.get("code"), Some("xyz"));
        assert_eq!(request.fields().len(), 6);
        assert_eq!(request.remove("scope"), Some("read".to_string()));
    }

    #[test]
    fn test_debug_hides_values() {
        let request = TokenRequest::refresh_token(&credentials(), "very-secret-refresh");
        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("very-secret-refresh"));
        assert!(!rendered.contains("\"secret\""));
    }

    struct FixedLock {
        owner: String,
        marker: Option<LockMarker>,
    }

    impl LockClient for FixedLock {
        fn owner_id(&self) -> &str {
            &self.owner
        }
        fn try_acquire(&self, _name: &str) -> Result<bool> {
            Ok(self.marker.is_none())
        }
        fn release(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        fn holder(&self, _name: &str) -> Result<Option<LockMarker>> {
            Ok(self.marker.clone())
        }
    }

    #[test]
    fn test_observed_request_masks_authorization() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer at-1".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        let observed = ObservedRequest::new(Method::Get, "https://api/v1/1/crm/Accounts", &headers);
        assert_eq!(observed.header("authorization"), Some(ObservedRequest::REDACTED));
        assert_eq!(observed.header("accept"), Some("application/json"));
    }

    /// Validates `LockClient::status` default behavior for the owner
    /// comparison scenario.
    ///
    /// Assertions:
    /// - Confirms an absent marker is `Free`.
    /// - Confirms our own owner id maps to `HeldByUs`.
    /// - Confirms a foreign owner maps to `HeldByPeer`.
    #[test]
    fn test_status_compares_owner() {
        let marker = |owner: &str| LockMarker {
            owner: owner.to_string(),
            pid: 7,
            acquired_at: Utc::now(),
        };

        let free = FixedLock { owner: "me".into(), marker: None };
        assert_eq!(free.status("refresh").unwrap(), LockStatus::Free);
        assert!(!free.is_held("refresh").unwrap());

        let ours = FixedLock { owner: "me".into(), marker: Some(marker("me")) };
        assert_eq!(ours.status("refresh").unwrap(), LockStatus::HeldByUs);

        let theirs = FixedLock { owner: "me".into(), marker: Some(marker("peer")) };
        assert!(matches!(theirs.status("refresh").unwrap(), LockStatus::HeldByPeer(m) if m.owner == "peer"));
        assert!(theirs.is_held("refresh").unwrap());
    }
}
