//! Identities of users making requests.
use serde::Deserialize;
use serde::Serialize;

/// Claims extracted from the SSO token of a session.
///
/// Identities are derived on each request and never persisted on their own.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// The user is allowed to manage the cluster registry.
    pub admin: bool,

    /// Identity provider that issued the SSO token, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Scopes granted to the SSO token.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Unique identifier of the user with the identity provider.
    pub user_id: String,

    /// Human friendly name of the user.
    pub user_name: String,
}

/// Result of the authentication process for a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthContext {
    /// Claims of the authenticated user.
    pub identity: Identity,

    /// Identifier of the session the request belongs to.
    pub session_id: String,
}
