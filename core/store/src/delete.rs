//! Portal Proxy persistent store operations to delete records.
use portal_models::oauth::OAuthState;
use time::OffsetDateTime;

use self::seal::SealDeleteOp;

/// Internal trait to enable delete operations on the persistent store.
pub trait DeleteOp: Into<DeleteOps> + SealDeleteOp {
    /// Type returned by the matching delete operation.
    type Response: From<DeleteResponses>;
}

/// List of all delete operations the persistent store must implement.
pub enum DeleteOps {
    /// Delete the credentials of a session for a cluster.
    ClusterToken(DeleteClusterToken),

    /// Delete and return an OAuth state token, if it exists.
    ConsumeOAuthState(ConsumeOAuthState),

    /// Delete all OAuth state tokens that expired before the given time.
    ExpiredOAuthStates(OffsetDateTime),

    /// Delete all cluster and VCS credentials of a session.
    SessionCredentials(DeleteSessionCredentials),

    /// Mark a cluster as removed, ignoring unknown or already removed clusters.
    UnregisterCluster(UnregisterCluster),
}

/// List of all responses from delete operations.
pub enum DeleteResponses {
    /// Return the consumed [`OAuthState`], if one was found.
    OAuthState(Option<OAuthState>),

    /// The operation completed successfully and does not return data.
    Success,
}

// --- High level delete operations --- //
/// Delete the credentials of a session for a cluster.
#[derive(Clone, Debug)]
pub struct DeleteClusterToken {
    /// GUID of the cluster the credentials are for.
    pub guid: String,

    /// Session owning the credentials.
    pub session_id: String,
}

/// Delete all OAuth state tokens that expired before the given time.
pub struct DeleteExpiredOAuthStates(pub OffsetDateTime);

/// Delete all cluster and VCS credentials of a session.
#[derive(Clone, Debug)]
pub struct DeleteSessionCredentials {
    /// Session owning the credentials.
    pub session_id: String,
}
impl From<&str> for DeleteSessionCredentials {
    fn from(value: &str) -> Self {
        DeleteSessionCredentials {
            session_id: value.to_string(),
        }
    }
}

/// Delete and return an OAuth state token, if it exists.
///
/// Each state token can only be consumed once.
#[derive(Clone, Debug)]
pub struct ConsumeOAuthState {
    /// The state token to consume.
    pub state: String,
}

/// Mark a cluster as removed.
///
/// Credentials for removed clusters are kept but are no longer used.
#[derive(Clone, Debug)]
pub struct UnregisterCluster {
    /// GUID of the cluster to unregister.
    pub guid: String,
}
impl From<String> for UnregisterCluster {
    fn from(value: String) -> Self {
        UnregisterCluster { guid: value }
    }
}
impl From<&str> for UnregisterCluster {
    fn from(value: &str) -> Self {
        UnregisterCluster {
            guid: value.to_string(),
        }
    }
}

// --- Create internal implementation details follow --- //
/// Private module to seal implementation details.
mod seal {
    /// Super-trait to seal the [`DeleteOp`](super::DeleteOp) trait.
    pub trait SealDeleteOp {}
}

// --- Implement DeleteOp and super traits on types for transparent operations --- //
impl DeleteOp for DeleteClusterToken {
    type Response = ();
}
impl SealDeleteOp for DeleteClusterToken {}
impl From<DeleteClusterToken> for DeleteOps {
    fn from(value: DeleteClusterToken) -> Self {
        DeleteOps::ClusterToken(value)
    }
}

impl DeleteOp for ConsumeOAuthState {
    type Response = Option<OAuthState>;
}
impl SealDeleteOp for ConsumeOAuthState {}
impl From<ConsumeOAuthState> for DeleteOps {
    fn from(value: ConsumeOAuthState) -> Self {
        DeleteOps::ConsumeOAuthState(value)
    }
}

impl DeleteOp for DeleteExpiredOAuthStates {
    type Response = ();
}
impl SealDeleteOp for DeleteExpiredOAuthStates {}
impl From<DeleteExpiredOAuthStates> for DeleteOps {
    fn from(value: DeleteExpiredOAuthStates) -> Self {
        DeleteOps::ExpiredOAuthStates(value.0)
    }
}

impl DeleteOp for DeleteSessionCredentials {
    type Response = ();
}
impl SealDeleteOp for DeleteSessionCredentials {}
impl From<DeleteSessionCredentials> for DeleteOps {
    fn from(value: DeleteSessionCredentials) -> Self {
        DeleteOps::SessionCredentials(value)
    }
}

impl DeleteOp for UnregisterCluster {
    type Response = ();
}
impl SealDeleteOp for UnregisterCluster {}
impl From<UnregisterCluster> for DeleteOps {
    fn from(value: UnregisterCluster) -> Self {
        DeleteOps::UnregisterCluster(value)
    }
}

// --- Implement DeleteResponses conversions on return types for transparent operations --- //
impl From<DeleteResponses> for () {
    fn from(value: DeleteResponses) -> Self {
        match value {
            DeleteResponses::Success => (),
            _ => panic!("unexpected result type for the given delete operation"),
        }
    }
}
impl From<DeleteResponses> for Option<OAuthState> {
    fn from(value: DeleteResponses) -> Self {
        match value {
            DeleteResponses::OAuthState(state) => state,
            _ => panic!("unexpected result type for the given delete operation"),
        }
    }
}
