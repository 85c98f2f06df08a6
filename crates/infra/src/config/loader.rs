//! Configuration loader
//!
//! Loads [`ClientConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `LEDGERLINK_BASE_URL`: provider root URL
//! - `LEDGERLINK_CLIENT_ID`, `LEDGERLINK_CLIENT_SECRET`,
//!   `LEDGERLINK_REDIRECT_URI`: OAuth2 client registration
//!
//! Optional:
//! - `LEDGERLINK_AUTHORIZATION_CODE`: code returned to the redirect URI
//! - `LEDGERLINK_DIVISION`: fixed division, skips the `current/Me` lookup
//! - `LEDGERLINK_TOKEN_PATH`: token file location
//! - `LEDGERLINK_LOCK_DIR`: directory holding refresh lock markers
//! - `LEDGERLINK_STALE_LOCK_SECS`: stale marker window, `0` disables reclaim
//! - `LEDGERLINK_LOG_JSON`: emit JSON log lines (true/false)
//!
//! ## File Locations
//! The loader probes `ledgerlink.{toml,json}` and `config.{toml,json}` in the
//! current directory and its two parents, then next to the executable.

use std::path::{Path, PathBuf};

use ledgerlink_domain::{ClientConfig, Credentials, Division, LedgerError, Result};

pub const ENV_BASE_URL: &str = "LEDGERLINK_BASE_URL";
pub const ENV_CLIENT_ID: &str = "LEDGERLINK_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "LEDGERLINK_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "LEDGERLINK_REDIRECT_URI";
pub const ENV_AUTHORIZATION_CODE: &str = "LEDGERLINK_AUTHORIZATION_CODE";
pub const ENV_DIVISION: &str = "LEDGERLINK_DIVISION";
pub const ENV_TOKEN_PATH: &str = "LEDGERLINK_TOKEN_PATH";
pub const ENV_LOCK_DIR: &str = "LEDGERLINK_LOCK_DIR";
pub const ENV_STALE_LOCK_SECS: &str = "LEDGERLINK_STALE_LOCK_SECS";
pub const ENV_LOG_JSON: &str = "LEDGERLINK_LOG_JSON";

const FILE_STEMS: [&str; 2] = ["ledgerlink", "config"];
const FILE_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `LedgerError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The loaded configuration fails validation
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("config.loaded_from_env");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "config.env_incomplete");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `LedgerError::Config` if required variables are missing or
/// optional ones have invalid values.
pub fn load_from_env() -> Result<ClientConfig> {
    let mut credentials = Credentials::new(
        env_var(ENV_CLIENT_ID)?,
        env_var(ENV_CLIENT_SECRET)?,
        env_var(ENV_REDIRECT_URI)?,
    );
    if let Some(code) = env_opt(ENV_AUTHORIZATION_CODE) {
        credentials = credentials.with_authorization_code(code);
    }

    let mut config = ClientConfig::new(env_var(ENV_BASE_URL)?, credentials);

    config.division = env_opt(ENV_DIVISION).map(Division::new);
    if let Some(path) = env_opt(ENV_TOKEN_PATH) {
        config.storage.token_path = PathBuf::from(path);
    }
    if let Some(dir) = env_opt(ENV_LOCK_DIR) {
        config.storage.lock_dir = PathBuf::from(dir);
    }
    if let Some(secs) = env_opt(ENV_STALE_LOCK_SECS) {
        config.storage.stale_lock_secs = secs.parse::<u64>().map_err(|e| {
            LedgerError::Config(format!("Invalid {}: {}", ENV_STALE_LOCK_SECS, e))
        })?;
    }
    config.logging.json = env_bool(ENV_LOG_JSON, config.logging.json);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations. Format is detected by
/// file extension.
///
/// # Errors
/// Returns `LedgerError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid or validation fails
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(LedgerError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            LedgerError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "config.loading_file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| LedgerError::Config(format!("Failed to read config file: {}", e)))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content, choosing the format by the
/// extension of `path`.
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| LedgerError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| LedgerError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(LedgerError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
        dirs.push(cwd.join("../.."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| {
            FILE_STEMS.iter().flat_map(move |stem| {
                FILE_EXTENSIONS.iter().map(move |ext| dir.join(format!("{}.{}", stem, ext)))
            })
        })
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        LedgerError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Set and non-blank
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`
/// (case-insensitive); anything else yields `default`.
fn env_bool(key: &str, default: bool) -> bool {
    match env_opt(key).map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
