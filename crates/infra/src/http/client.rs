//! Blocking HTTP transport shared by the token exchanger and the connection.

use std::time::Duration;

use ledgerlink_domain::constants::{DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use ledgerlink_domain::{HttpConfig, LedgerError, Method};
use reqwest::blocking::{Client as ReqwestClient, RequestBuilder};
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::errors::InfraError;

/// Fully read HTTP response.
///
/// The body is buffered so callers can inspect status, headers and payload
/// without holding on to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: Option<String>,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<String>) -> Self {
        Self { status, reason: None, headers, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup, first value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }
}

/// Blocking HTTP client with timeout and identification defaults.
///
/// Every call is a single attempt. Failed business requests are surfaced to
/// the caller unchanged because a replayed POST is not idempotent.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, LedgerError> {
        Self::builder().build()
    }

    /// Client configured from the `[http]` section.
    pub fn from_config(config: &HttpConfig) -> Result<Self, LedgerError> {
        Self::builder().timeout(config.timeout()).user_agent(config.user_agent.clone()).build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(to_reqwest_method(method), url)
    }

    /// Execute the request and buffer the response.
    ///
    /// Non-2xx statuses are returned as responses, not errors; only
    /// failures that never produced a status become `LedgerError`s.
    pub fn send(&self, builder: RequestBuilder) -> Result<HttpResponse, LedgerError> {
        let request = builder.build().map_err(|err| LedgerError::from(InfraError::from(err)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %redact_query(&url), "http.request.sent");

        let response = self.client.execute(request).map_err(|err| {
            debug!(%method, url = %redact_query(&url), error = %err, "http.request.failed");
            LedgerError::from(InfraError::from(err))
        })?;

        let status = response.status();
        let headers = collect_headers(response.headers());
        let body = response.text().map_err(|err| LedgerError::from(InfraError::from(err)))?;

        debug!(
            %method,
            url = %redact_query(&url),
            status = status.as_u16(),
            bytes = body.len(),
            "http.response.received"
        );

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().map(str::to_string),
            headers,
            body,
        })
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient, LedgerError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| LedgerError::from(InfraError::from(err)))?;

        Ok(HttpClient { client })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

/// Query strings may carry skip tokens and filters; keep logs to the path.
fn redact_query(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.to_string()
}
