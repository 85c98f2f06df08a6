//! Token refresher states

use ledgerlink_domain::impl_domain_status_conversions;

/// Where the refresher stands with respect to a usable access token.
///
/// Transitions:
/// - `Unauthenticated` when neither a refresh token nor an authorization code
///   is known; the caller must send the user to the consent page
/// - `TokenExpired -> Refreshing` when the lock was acquired
/// - `TokenExpired -> WaitingOnPeer` when another process holds the lock
/// - `Refreshing -> TokenValid` after a successful exchange, else `Failed`
/// - `WaitingOnPeer -> TokenValid` once the store shows a fresh token, else
///   `Failed` after the polling budget runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    TokenValid,
    TokenExpired,
    Refreshing,
    WaitingOnPeer,
    Failed,
}

impl_domain_status_conversions!(AuthState {
    Unauthenticated => "unauthenticated",
    TokenValid => "token_valid",
    TokenExpired => "token_expired",
    Refreshing => "refreshing",
    WaitingOnPeer => "waiting_on_peer",
    Failed => "failed",
});

impl AuthState {
    /// States from which a request may be signed without further work
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::TokenValid)
    }
}
