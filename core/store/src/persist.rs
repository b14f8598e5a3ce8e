//! Portal Proxy persistent store operations to persist records.
use portal_models::cluster::ClusterRegistration;
use portal_models::oauth::OAuthState;
use portal_models::token::CredentialRecord;

use self::seal::SealPersistOp;

/// Internal trait to enable persist operations on the persistent store.
pub trait PersistOp: Into<PersistOps> + SealPersistOp {
    /// Type returned by the matching persist operation.
    type Response: From<PersistResponses>;
}

/// List of all persist operations the persistent store must implement.
pub enum PersistOps {
    /// Register a new cluster.
    ///
    /// Backends must fail with [`DuplicateCluster`](portal_errors::DuplicateCluster)
    /// if a registered cluster of the same kind already uses the same endpoint.
    Cluster(ClusterRegistration),

    /// Insert or update the credentials of a session for a cluster.
    ClusterToken(CredentialRecord),

    /// Persist the state token of a new VCS OAuth flow.
    OAuthState(OAuthState),

    /// Insert or update the credentials of a session for a VCS provider.
    VcsToken(CredentialRecord),
}

/// List of all responses from persist operations.
pub enum PersistResponses {
    /// The operation completed successfully and does not return data.
    Success,
}

// --- High level persist operations --- //
/// Insert or update the credentials of a session for a cluster.
///
/// The record `target` is the GUID of the cluster.
#[derive(Clone, Debug)]
pub struct PersistClusterToken(pub CredentialRecord);

/// Insert or update the credentials of a session for a VCS provider.
///
/// The record `target` is the ID of the VCS provider.
#[derive(Clone, Debug)]
pub struct PersistVcsToken(pub CredentialRecord);

// --- Create internal implementation details follow --- //
/// Private module to seal implementation details.
mod seal {
    /// Super-trait to seal the [`PersistOp`](super::PersistOp) trait.
    pub trait SealPersistOp {}
}

// --- Implement PersistOp and super traits on types for transparent operations --- //
impl PersistOp for ClusterRegistration {
    type Response = ();
}
impl SealPersistOp for ClusterRegistration {}
impl From<ClusterRegistration> for PersistOps {
    fn from(value: ClusterRegistration) -> Self {
        PersistOps::Cluster(value)
    }
}

impl PersistOp for PersistClusterToken {
    type Response = ();
}
impl SealPersistOp for PersistClusterToken {}
impl From<PersistClusterToken> for PersistOps {
    fn from(value: PersistClusterToken) -> Self {
        PersistOps::ClusterToken(value.0)
    }
}

impl PersistOp for OAuthState {
    type Response = ();
}
impl SealPersistOp for OAuthState {}
impl From<OAuthState> for PersistOps {
    fn from(value: OAuthState) -> Self {
        PersistOps::OAuthState(value)
    }
}

impl PersistOp for PersistVcsToken {
    type Response = ();
}
impl SealPersistOp for PersistVcsToken {}
impl From<PersistVcsToken> for PersistOps {
    fn from(value: PersistVcsToken) -> Self {
        PersistOps::VcsToken(value.0)
    }
}

// --- Implement PersistResponses conversions on return types for transparent operations --- //
impl From<PersistResponses> for () {
    fn from(value: PersistResponses) -> Self {
        match value {
            PersistResponses::Success => (),
        }
    }
}
