//! Token endpoint client

use ledgerlink_core::{extract_error_message, TokenExchanger, TokenRequest};
use ledgerlink_domain::constants::TOKEN_ENDPOINT;
use ledgerlink_domain::{AuthError, LedgerError, Method, Result, TokenResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{info, warn};

use crate::http::HttpClient;

/// [`TokenExchanger`] posting form-encoded grants to `{oauth_base}/token`.
#[derive(Clone)]
pub struct HttpTokenExchanger {
    http: HttpClient,
    token_url: String,
}

impl HttpTokenExchanger {
    pub fn new(http: HttpClient, oauth_base: &str) -> Self {
        let token_url = format!("{}/{}", oauth_base.trim_end_matches('/'), TOKEN_ENDPOINT);
        Self { http, token_url }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl TokenExchanger for HttpTokenExchanger {
    fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse> {
        let grant = request.get("grant_type").unwrap_or("unknown");
        info!(grant_type = grant, url = %self.token_url, "token.exchange.sent");

        let builder = self
            .http
            .request(Method::Post, &self.token_url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(request.fields());

        let response = self.http.send(builder).map_err(|err| match err {
            LedgerError::Transport(message) => AuthError::Transport(message).into(),
            other => other,
        })?;

        if response.status != 200 {
            let mut message = extract_error_message(&response.body);
            if message.is_empty() {
                message = response.reason.clone().unwrap_or_else(|| "token exchange rejected".into());
            }
            warn!(grant_type = grant, status = response.status, error = %message, "token.exchange.rejected");
            return Err(AuthError::Exchange { status: response.status, message }.into());
        }

        let tokens = TokenResponse::parse(&response.body)?;
        info!(grant_type = grant, expires_in = tokens.expires_in, "token.exchange.completed");
        Ok(tokens)
    }
}
