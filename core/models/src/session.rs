//! Server side records of browser sessions.
use time::OffsetDateTime;

use crate::token::SealedTokens;

/// Server side record of an authenticated browser session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Session {
    /// Time the session was created.
    pub created_at: OffsetDateTime,

    /// Time after which the session is no longer valid.
    pub expires_at: OffsetDateTime,

    /// Opaque identifier of the session.
    pub id: String,

    /// Last time a request was made with this session.
    pub last_access: OffsetDateTime,

    /// Encrypted SSO tokens obtained at login.
    pub sso_tokens: SealedTokens,

    /// ID of the user owning the session.
    pub user_id: String,

    /// Name of the user owning the session.
    pub user_name: String,
}

impl Session {
    /// Check if the session is still valid at the given time.
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

/// Information needed to create a new session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewSession {
    /// Encrypted SSO tokens obtained at login.
    pub sso_tokens: SealedTokens,

    /// ID of the user owning the session.
    pub user_id: String,

    /// Name of the user owning the session.
    pub user_name: String,
}
