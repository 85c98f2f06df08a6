//! Client configuration structures
//!
//! Deserialised from TOML or JSON by the infra config loader. Every section
//! except `base_url` and `credentials` has defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    API_PATH, DEFAULT_EXPIRY_SKEW_SECS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOCK_DIR,
    DEFAULT_LOCK_NAME, DEFAULT_LOG_FILTER, DEFAULT_POLL_DELAY_MS, DEFAULT_POLL_ROUNDS,
    DEFAULT_STALE_LOCK_SECS, DEFAULT_TOKEN_PATH, DEFAULT_USER_AGENT, OAUTH_PATH,
};
use crate::errors::{LedgerError, Result};
use crate::types::{Credentials, Division};

// Clamp for absurd provider lifetimes (ten years)
const MAX_LIFETIME_SECS: u64 = 315_360_000;

/// How `expires_at` is derived from a token response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// `now + expires_in` as reported by the provider
    #[default]
    #[serde(rename = "provider")]
    ProviderLifetime,
    /// `now + secs`, ignoring the provider's lifetime
    FixedOffset { secs: u64 },
}

impl ExpiryPolicy {
    pub fn expires_at(&self, now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
        let secs = match self {
            Self::ProviderLifetime => expires_in,
            Self::FixedOffset { secs } => *secs,
        };
        let secs = i64::try_from(secs.min(MAX_LIFETIME_SECS)).unwrap_or(0);
        let offset = chrono::Duration::seconds(secs);
        now.checked_add_signed(offset).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Where tokens and the refresh lock marker live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub token_path: PathBuf,
    pub lock_dir: PathBuf,
    pub lock_name: String,
    /// Age after which a lock marker is considered abandoned; 0 never
    /// reclaims.
    pub stale_lock_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            lock_dir: PathBuf::from(DEFAULT_LOCK_DIR),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            stale_lock_secs: DEFAULT_STALE_LOCK_SECS,
        }
    }
}

impl StorageConfig {
    pub fn stale_after(&self) -> Option<Duration> {
        (self.stale_lock_secs > 0).then(|| Duration::from_secs(self.stale_lock_secs))
    }
}

/// Token refresh and peer-wait tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub skew_secs: u64,
    pub expiry_policy: ExpiryPolicy,
    pub poll_rounds: u32,
    pub poll_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            skew_secs: DEFAULT_EXPIRY_SKEW_SECS,
            expiry_policy: ExpiryPolicy::default(),
            poll_rounds: DEFAULT_POLL_ROUNDS,
            poll_delay_ms: DEFAULT_POLL_DELAY_MS,
        }
    }
}

impl RefreshConfig {
    pub fn skew(&self) -> Duration {
        Duration::from_secs(self.skew_secs)
    }

    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS, user_agent: DEFAULT_USER_AGENT.to_string() }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: DEFAULT_LOG_FILTER.to_string(), json: false }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Provider root, e.g. `https://start.exactonline.nl`
    pub base_url: String,
    /// Overrides `{base_url}/api/v1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Overrides `{base_url}/api/oauth2`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_url: Option<String>,
    pub credentials: Credentials,
    /// Skips the `current/Me` lookup when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<Division>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            api_url: None,
            oauth_url: None,
            credentials,
            division: None,
            storage: StorageConfig::default(),
            refresh: RefreshConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Resource API root without a trailing slash.
    pub fn api_base(&self) -> String {
        match &self.api_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}{}", self.base_url.trim_end_matches('/'), API_PATH),
        }
    }

    /// OAuth2 root without a trailing slash.
    pub fn oauth_base(&self) -> String {
        match &self.oauth_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}{}", self.base_url.trim_end_matches('/'), OAUTH_PATH),
        }
    }

    /// Reject configurations the client cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [
            ("base_url", Some(&self.base_url)),
            ("api_url", self.api_url.as_ref()),
            ("oauth_url", self.oauth_url.as_ref()),
        ] {
            if let Some(url) = url {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(LedgerError::Config(format!(
                        "{} must be an http(s) URL, got '{}'",
                        field, url
                    )));
                }
            }
        }

        let creds = &self.credentials;
        for (field, value) in [
            ("client_id", &creds.client_id),
            ("client_secret", &creds.client_secret),
            ("redirect_uri", &creds.redirect_uri),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::Config(format!("credentials.{} must not be empty", field)));
            }
        }

        if self.refresh.poll_rounds == 0 {
            return Err(LedgerError::Config("refresh.poll_rounds must be at least 1".to_string()));
        }
        if self.storage.lock_name.trim().is_empty() {
            return Err(LedgerError::Config("storage.lock_name must not be empty".to_string()));
        }

        Ok(())
    }
}
