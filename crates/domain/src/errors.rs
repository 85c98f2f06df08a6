//! Error types used throughout the client
//!
//! Every failure surfaced to callers is a [`LedgerError`]. Transport and HTTP
//! failures are translated at the request boundary; raw `reqwest` or `io`
//! errors never escape the public API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;

/// Failures obtaining or refreshing an access token.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AuthError {
    /// Neither a refresh token nor an authorization code is available; the
    /// user must visit the consent page first.
    #[error("Authorization required: visit {authorize_url}")]
    AuthorizationRequired { authorize_url: String },

    /// The token endpoint answered with a non-success status.
    #[error("Token exchange failed ({status}): {message}")]
    Exchange { status: u16, message: String },

    /// The token endpoint could not be reached.
    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    /// A 200 response whose body lacked the expected token fields.
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// Another process held the refresh lock and never published a valid
    /// token within the polling budget.
    #[error("Timed out after {rounds} rounds ({waited_ms} ms) waiting for another process to refresh the token")]
    PeerWaitTimeout { rounds: u32, waited_ms: u64 },

    /// Waiting on a peer refresh was cancelled by the caller.
    #[error("Waiting for token refresh was cancelled")]
    Cancelled,

    /// The shared token store could not be read or written.
    #[error("Token store error: {0}")]
    Store(String),
}

/// Main error type for Ledgerlink
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum LedgerError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-2xx response from a resource endpoint. `message` already carries
    /// the status, see [`LedgerError::api`].
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Lock state error: {0}")]
    LockState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Stable label for each error family, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Auth,
    Api,
    Transport,
    Protocol,
    LockState,
    Config,
    Storage,
}

impl_domain_status_conversions!(ErrorCategory {
    Auth => "auth",
    Api => "api",
    Transport => "transport",
    Protocol => "protocol",
    LockState => "lock_state",
    Config => "config",
    Storage => "storage",
});

impl LedgerError {
    /// Build an API error from a status and the provider's message.
    pub fn api(status: u16, provider_message: impl AsRef<str>) -> Self {
        Self::Api { status, message: format!("Error {}: {}", status, provider_message.as_ref()) }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(_) => ErrorCategory::Auth,
            Self::Api { .. } => ErrorCategory::Api,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::LockState(_) => ErrorCategory::LockState,
            Self::Config(_) => ErrorCategory::Config,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }

    /// HTTP status for API and token-exchange failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Auth(AuthError::Exchange { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// True for 401 responses, which usually mean a peer invalidated the
    /// token this request was signed with.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("Invalid JSON: {}", err))
    }
}

/// Result type alias for Ledgerlink operations
pub type Result<T> = std::result::Result<T, LedgerError>;
