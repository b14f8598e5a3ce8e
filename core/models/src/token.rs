//! Access and refresh tokens issued by upstream services.
use time::OffsetDateTime;

/// Plain text access and refresh tokens as returned by an authentication endpoint.
///
/// Values of this type must only exist in memory while they are used.
#[derive(Clone, Eq, PartialEq)]
pub struct TokenPair {
    /// Bearer token to present to the upstream service.
    pub access_token: String,

    /// Time after which the access token is no longer accepted.
    pub expires_at: OffsetDateTime,

    /// Token to request a new access token with, if the service issued one.
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Check if the access token is still valid at the given time.
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Encrypted access and refresh tokens as kept in storage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SealedTokens {
    /// Encrypted bearer token.
    pub access_token: Vec<u8>,

    /// Time after which the access token is no longer accepted.
    pub expires_at: OffsetDateTime,

    /// Time the tokens were issued (or last refreshed).
    pub issued_at: OffsetDateTime,

    /// Encrypted refresh token, if the service issued one.
    pub refresh_token: Option<Vec<u8>>,
}

/// Encrypted tokens owned by a session for a specific upstream target.
///
/// The target is a cluster GUID for cluster credentials or a provider ID for VCS credentials.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CredentialRecord {
    /// Session that owns the credentials.
    pub session_id: String,

    /// Upstream the credentials are valid for.
    pub target: String,

    /// The encrypted tokens.
    pub tokens: SealedTokens,
}
