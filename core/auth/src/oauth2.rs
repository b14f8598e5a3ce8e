//! Requests to OAuth2 style token endpoints.
use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use time::OffsetDateTime;

use portal_models::token::TokenPair;

/// String to set as the user agent in HTTP request.
static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Lifetime assumed for access tokens issued without an expiry.
const DEFAULT_TOKEN_LIFETIME: time::Duration = time::Duration::days(365);

/// Errors requesting tokens from a token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token endpoint returned a response that could not be decoded.
    #[error("invalid response from token endpoint: {0}")]
    InvalidResponse(String),

    /// The token endpoint refused the grant.
    #[error("token endpoint rejected the request with status {0}")]
    Rejected(StatusCode),

    /// The token endpoint failed to process the request.
    #[error("token endpoint failed with status {0}")]
    ServerError(StatusCode),

    /// The token endpoint could not be reached.
    #[error("unable to reach token endpoint")]
    Unreachable(#[source] reqwest::Error),
}

impl TokenError {
    /// The request was refused by the token endpoint because of the grant or credentials.
    pub fn is_rejected(&self) -> bool {
        matches!(self, TokenError::Rejected(_))
    }
}

/// Token endpoint response payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,

    #[serde(default)]
    expires_in: Option<i64>,

    #[serde(default)]
    refresh_token: Option<String>,
}

/// Build an HTTP client to talk to token endpoints.
pub fn client(skip_ssl_validation: bool, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .danger_accept_invalid_certs(skip_ssl_validation)
        .timeout(timeout)
        .user_agent(CLIENT_USER_AGENT)
        .build()
}

/// Request a token pair with the given grant form.
///
/// Client credentials are sent with HTTP basic authentication.
pub async fn request_token(
    client: &Client,
    url: &str,
    client_id: &str,
    client_secret: &str,
    form: &[(&str, &str)],
) -> Result<TokenPair, TokenError> {
    let issued_at = OffsetDateTime::now_utc();
    let response = client
        .post(url)
        .basic_auth(client_id, Some(client_secret))
        .header(reqwest::header::ACCEPT, "application/json")
        .form(form)
        .send()
        .await
        .map_err(TokenError::Unreachable)?;

    let status = response.status();
    if status.is_client_error() {
        return Err(TokenError::Rejected(status));
    }
    if !status.is_success() {
        return Err(TokenError::ServerError(status));
    }

    let text = response.text().await.map_err(TokenError::Unreachable)?;
    let response: TokenResponse = serde_json::from_str(&text)
        .map_err(|error| TokenError::InvalidResponse(error.to_string()))?;
    Ok(decode(response, issued_at))
}

fn decode(response: TokenResponse, issued_at: OffsetDateTime) -> TokenPair {
    let lifetime = response
        .expires_in
        .map(time::Duration::seconds)
        .unwrap_or(DEFAULT_TOKEN_LIFETIME);
    TokenPair {
        access_token: response.access_token,
        expires_at: issued_at + lifetime,
        refresh_token: response.refresh_token,
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::TokenResponse;

    #[test]
    fn decode_with_expiry() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token": "abc", "expires_in": 60, "refresh_token": "def", "scope": "x"}"#,
        )
        .unwrap();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let tokens = super::decode(response, now);
        assert_eq!(tokens.access_token, "abc");
        assert_eq!(tokens.expires_at, now + time::Duration::seconds(60));
        assert_eq!(tokens.refresh_token.as_deref(), Some("def"));
    }

    #[test]
    fn decode_without_expiry() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token": "abc", "token_type": "bearer"}"#).unwrap();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let tokens = super::decode(response, now);
        assert_eq!(tokens.expires_at, now + super::DEFAULT_TOKEN_LIFETIME);
        assert!(tokens.refresh_token.is_none());
    }
}
