//! Anti-forgery state of VCS OAuth flows.
use time::OffsetDateTime;

/// State token issued when a session starts an OAuth flow with a VCS provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OAuthState {
    /// Time after which the state token is no longer accepted.
    pub expires_at: OffsetDateTime,

    /// ID of the VCS provider the flow was started for.
    pub provider: String,

    /// Session that started the flow.
    pub session_id: String,

    /// Random state token sent to the provider.
    pub state: String,
}

impl OAuthState {
    /// Check if the state token can still be used at the given time.
    pub fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}
