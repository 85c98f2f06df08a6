//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;
use std::time::Duration;

use ledgerlink_domain::{Division, ExpiryPolicy, LedgerError};
use ledgerlink_infra::config;
use tempfile::NamedTempFile;

/// Copy `contents` to a temp path with `extension` so the loader picks the
/// right format.
fn write_config(contents: &str, extension: &str) -> std::path::PathBuf {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file.write_all(contents.as_bytes()).expect("Failed to write to temp file");

    let path = temp_file.path().with_extension(extension);
    std::fs::copy(temp_file.path(), &path).expect("Failed to copy file");
    path
}

#[test]
fn test_load_config_from_toml_file() {
    let path = write_config(
        r#"
base_url = "https://start.example.com"
division = "17"

[credentials]
client_id = "client-1"
client_secret = "s3cret"
redirect_uri = "https://app.example/callback"

[storage]
token_path = "/var/lib/ledgerlink/tokens.json"
lock_dir = "/var/lib/ledgerlink"
stale_lock_secs = 300

[refresh]
skew_secs = 30
poll_rounds = 4
poll_delay_ms = 500
expiry_policy = { kind = "fixed_offset", secs = 600 }

[logging]
filter = "ledgerlink=debug"
json = true
"#,
        "toml",
    );

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();
    let config = result.expect("Failed to load config from TOML file");

    assert_eq!(config.api_base(), "https://start.example.com/api/v1");
    assert_eq!(config.division, Some(Division::new("17")));
    assert_eq!(config.credentials.client_id, "client-1");
    assert_eq!(config.credentials.authorization_code, None);
    assert_eq!(config.storage.stale_after(), Some(Duration::from_secs(300)));
    assert_eq!(config.refresh.skew(), Duration::from_secs(30));
    assert_eq!(config.refresh.poll_rounds, 4);
    assert_eq!(config.refresh.expiry_policy, ExpiryPolicy::FixedOffset { secs: 600 });
    assert!(config.logging.json);
}

#[test]
fn test_load_config_from_json_file_with_defaults() {
    let path = write_config(
        r#"{
            "base_url": "https://start.example.com",
            "oauth_url": "https://login.example.com/oauth2/",
            "credentials": {
                "client_id": "client-1",
                "client_secret": "s3cret",
                "redirect_uri": "https://app.example/callback",
                "authorization_code": "code-1"
            }
        }"#,
        "json",
    );

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();
    let config = result.expect("Failed to load config from JSON file");

    assert_eq!(config.oauth_base(), "https://login.example.com/oauth2");
    assert_eq!(config.credentials.authorization_code.as_deref(), Some("code-1"));
    assert_eq!(config.refresh.poll_rounds, 6);
    assert_eq!(config.refresh.poll_delay(), Duration::from_secs(2));
    assert_eq!(config.refresh.expiry_policy, ExpiryPolicy::ProviderLifetime);
    assert_eq!(config.storage.stale_after(), Some(Duration::from_secs(120)));
    assert_eq!(config.http.timeout(), Duration::from_secs(30));
}

#[test]
fn test_load_config_rejects_invalid_values() {
    let path = write_config(
        r#"
base_url = "start.example.com"

[credentials]
client_id = "client-1"
client_secret = "s3cret"
redirect_uri = "https://app.example/callback"
"#,
        "toml",
    );

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    match result {
        Err(LedgerError::Config(msg)) => assert!(msg.contains("base_url"), "{msg}"),
        other => panic!("Expected Config error, got {:?}", other),
    }
}

#[test]
fn test_load_config_with_invalid_format() {
    let path = write_config(r#"{ "this is": "not valid" "#, "json");

    let result = config::load_from_file(Some(path.clone()));
    std::fs::remove_file(&path).ok();

    match result {
        Err(LedgerError::Config(msg)) => {
            assert!(msg.contains("Invalid JSON"), "Error message should mention invalid JSON");
        }
        other => panic!("Expected Config error, got {:?}", other),
    }
}
