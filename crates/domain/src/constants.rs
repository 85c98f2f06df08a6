//! Domain constants
//!
//! Path segments and defaults shared by the configuration layer and the
//! connection.

// Endpoint layout relative to the provider base URL
pub const API_PATH: &str = "/api/v1";
pub const OAUTH_PATH: &str = "/api/oauth2";
pub const AUTHORIZE_ENDPOINT: &str = "auth";
pub const TOKEN_ENDPOINT: &str = "token";

/// Caller-identity resource; addressed without a division prefix
pub const CURRENT_ME_PATH: &str = "current/Me";

// Token refresh defaults
pub const DEFAULT_EXPIRY_SKEW_SECS: u64 = 10;
pub const DEFAULT_POLL_ROUNDS: u32 = 6;
pub const DEFAULT_POLL_DELAY_MS: u64 = 2_000;

// Storage defaults
pub const DEFAULT_TOKEN_PATH: &str = ".ledgerlink/tokens.json";
pub const DEFAULT_LOCK_DIR: &str = ".ledgerlink";
pub const DEFAULT_LOCK_NAME: &str = "token_refresh";
pub const DEFAULT_STALE_LOCK_SECS: u64 = 120;

// HTTP defaults
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("ledgerlink/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_LOG_FILTER: &str = "info";
