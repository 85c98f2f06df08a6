//! Shared fixtures for the infra integration tests.
#![allow(dead_code, clippy::expect_used)]

use std::path::Path;

use chrono::{Duration, Utc};
use ledgerlink_domain::{ClientConfig, Credentials, TokenState};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_ID: &str = "client-1";
pub const CLIENT_SECRET: &str = "s3cret";
pub const REDIRECT_URI: &str = "https://app.example/callback";

/// Config pointing every URL at `server_uri` and all shared state into `dir`.
pub fn test_config(server_uri: &str, dir: &Path) -> ClientConfig {
    let mut config =
        ClientConfig::new(server_uri, Credentials::new(CLIENT_ID, CLIENT_SECRET, REDIRECT_URI));
    config.storage.token_path = dir.join("tokens.json");
    config.storage.lock_dir = dir.join("locks");
    config.refresh.poll_rounds = 6;
    config.refresh.poll_delay_ms = 25;
    config.http.timeout_secs = 5;
    config
}

pub fn valid_tokens(access: &str, refresh: &str) -> TokenState {
    TokenState::new(access, refresh, Utc::now() + Duration::hours(1))
}

pub fn expired_tokens(access: &str, refresh: &str) -> TokenState {
    TokenState::new(access, refresh, Utc::now() - Duration::minutes(5))
}

/// `{"d": value}`
pub fn envelope(value: Value) -> Value {
    json!({ "d": value })
}

/// `{"d": {"results": items, "__next": next}}`
pub fn results(items: Value, next: Option<&str>) -> Value {
    match next {
        Some(next) => json!({ "d": { "results": items, "__next": next } }),
        None => json!({ "d": { "results": items } }),
    }
}

/// Token endpoint answering every grant with the given pair.
pub async fn mount_token_endpoint(server: &MockServer, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path("/api/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 600,
            "token_type": "bearer"
        })))
        .mount(server)
        .await;
}

/// `current/Me` answering with `division`.
pub async fn mount_current_me(server: &MockServer, division: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v1/current/Me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(results(json!([{ "CurrentDivision": division }]), None)),
        )
        .mount(server)
        .await;
}

/// Run blocking client code off the async test runtime.
pub async fn blocking<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task panicked")
}
