//! # Ledgerlink Core
//!
//! Pure client logic - no HTTP, filesystem or process code.
//!
//! This crate contains:
//! - Port interfaces (traits) for token storage, the cross-process refresh
//!   lock, the token endpoint and lifecycle listeners
//! - The token refresh state machine
//! - Response envelope normalisation and pagination cursor extraction
//! - OData query building for generic resources
//!
//! ## Architecture Principles
//! - Only depends on `ledgerlink-common` and `ledgerlink-domain`
//! - All external effects via traits in [`auth::ports`]
//! - Everything is synchronous; waiting happens through an injected sleeper

pub mod auth;
pub mod envelope;
pub mod resources;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::ports::{
    ConnectionListener, ExchangeContext, GrantType, LockClient, LockMarker, LockStatus,
    NoopListener, ObservedRequest, TokenExchanger, TokenRequest, TokenStore,
};
pub use auth::refresher::{RefresherSettings, TokenRefresher};
pub use auth::state::AuthState;
pub use envelope::{extract_error_message, unwrap_envelope, Unwrapped};
pub use resources::{Query, ResourceDescriptor};
