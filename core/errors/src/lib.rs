//! Common errors from and for Portal Proxy implementation.
//!
//! Errors are plain structs so they can be attached to [`anyhow::Error`]s and later
//! recovered with [`anyhow::Error::downcast_ref`] (or [`ErrorKind::of`]) by the API layer
//! to pick the correct HTTP response status.

/// Broad classification of the errors in this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The payload or parameters of the request are not valid.
    BadRequest,

    /// The request conflicts with existing state.
    Conflict,

    /// The caller is known but not allowed to perform the request.
    Forbidden,

    /// The requested resource does not exist.
    NotFound,

    /// The caller must (re)authenticate.
    Unauthorized,

    /// The service is temporarily refusing requests and the caller should retry.
    Unavailable,

    /// An upstream service could not be reached or failed.
    Upstream,
}

impl ErrorKind {
    /// Look for an error with a known classification in the error or its context.
    pub fn of(error: &anyhow::Error) -> Option<ErrorKind> {
        ErrorKind::classify(error).map(|(kind, _)| kind)
    }

    /// Look for an error with a known classification and return it with its message.
    ///
    /// Errors are checked in a fixed order so more specific errors win over generic ones
    /// when both are attached to the same chain.
    pub fn classify(error: &anyhow::Error) -> Option<(ErrorKind, String)> {
        macro_rules! classify {
            ($($error:ty => $kind:expr,)*) => {
                $(
                    if let Some(known) = error.downcast_ref::<$error>() {
                        return Some(($kind, known.to_string()));
                    }
                )*
            };
        }
        classify! {
            UpgradeInProgress => ErrorKind::Unavailable,
            Forbidden => ErrorKind::Forbidden,
            ClusterRejected => ErrorKind::Unauthorized,
            ClusterUnreachable => ErrorKind::Upstream,
            DuplicateCluster => ErrorKind::Conflict,
            InvalidOAuthState => ErrorKind::BadRequest,
            NotLoggedInToCluster => ErrorKind::Unauthorized,
            ReauthenticationRequired => ErrorKind::Unauthorized,
            VcsNotLinked => ErrorKind::Unauthorized,
            ClusterNotFound => ErrorKind::NotFound,
            VcsProviderNotFound => ErrorKind::NotFound,
            UpstreamFailure => ErrorKind::Upstream,
            Unauthorized => ErrorKind::Unauthorized,
            BadRequest => ErrorKind::BadRequest,
        }
        None
    }
}

/// The request payload or parameters are not valid.
#[derive(Debug, thiserror::Error)]
#[error("invalid request: {reason}")]
pub struct BadRequest {
    pub reason: String,
}

impl BadRequest {
    /// The request payload or parameters are not valid.
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The requested cluster is not registered.
#[derive(Debug, thiserror::Error)]
#[error("cluster '{guid}' is not registered")]
pub struct ClusterNotFound {
    pub guid: String,
}

impl ClusterNotFound {
    /// The requested cluster is not registered.
    pub fn new<S: Into<String>>(guid: S) -> Self {
        Self { guid: guid.into() }
    }
}

/// The cluster authentication endpoint refused the provided credentials.
#[derive(Debug, thiserror::Error)]
#[error("cluster '{guid}' rejected the provided credentials")]
pub struct ClusterRejected {
    pub guid: String,
}

impl ClusterRejected {
    /// The cluster authentication endpoint refused the provided credentials.
    pub fn new<S: Into<String>>(guid: S) -> Self {
        Self { guid: guid.into() }
    }
}

/// The cluster authentication endpoint could not be reached.
#[derive(Debug, thiserror::Error)]
#[error("cluster '{guid}' could not be reached")]
pub struct ClusterUnreachable {
    pub guid: String,
}

impl ClusterUnreachable {
    /// The cluster authentication endpoint could not be reached.
    pub fn new<S: Into<String>>(guid: S) -> Self {
        Self { guid: guid.into() }
    }
}

/// A cluster of the same kind is already registered with the same endpoint.
#[derive(Debug, thiserror::Error)]
#[error("a '{kind}' cluster is already registered for endpoint '{endpoint}'")]
pub struct DuplicateCluster {
    pub endpoint: String,
    pub kind: String,
}

impl DuplicateCluster {
    /// A cluster of the same kind is already registered with the same endpoint.
    pub fn new<S1: Into<String>, S2: Into<String>>(kind: S1, endpoint: S2) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind: kind.into(),
        }
    }
}

/// The caller is not allowed to perform the requested operation.
#[derive(Debug, thiserror::Error)]
#[error("user '{user_id}' is not allowed to {operation}")]
pub struct Forbidden {
    pub operation: String,
    pub user_id: String,
}

impl Forbidden {
    /// The caller is not allowed to perform the requested operation.
    pub fn new<S1: Into<String>, S2: Into<String>>(user_id: S1, operation: S2) -> Self {
        Self {
            operation: operation.into(),
            user_id: user_id.into(),
        }
    }
}

/// The OAuth state token is unknown, expired or issued to a different session.
#[derive(Debug, thiserror::Error)]
#[error("the OAuth state token is not valid for this session")]
pub struct InvalidOAuthState;

/// The session has no usable credentials for the cluster.
#[derive(Debug, thiserror::Error)]
#[error("not logged in to cluster '{guid}'")]
pub struct NotLoggedInToCluster {
    pub guid: String,
}

impl NotLoggedInToCluster {
    /// The session has no usable credentials for the cluster.
    pub fn new<S: Into<String>>(guid: S) -> Self {
        Self { guid: guid.into() }
    }
}

/// Stored upstream credentials were refused and could not be refreshed.
#[derive(Debug, thiserror::Error)]
#[error("credentials for '{target}' expired, please login again")]
pub struct ReauthenticationRequired {
    pub target: String,
}

impl ReauthenticationRequired {
    /// Stored upstream credentials were refused and could not be refreshed.
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// The request is not authenticated or the credentials are not valid.
#[derive(Debug, thiserror::Error)]
#[error("authentication required")]
pub struct Unauthorized;

/// The service is being upgraded and requests should be retried later.
#[derive(Debug, thiserror::Error)]
#[error("service upgrade in progress, retry in {retry_after} seconds")]
pub struct UpgradeInProgress {
    pub retry_after: u64,
}

/// An upstream service could not be reached or returned an invalid response.
#[derive(Debug, thiserror::Error)]
#[error("upstream '{target}' request failed")]
pub struct UpstreamFailure {
    pub target: String,
}

impl UpstreamFailure {
    /// An upstream service could not be reached or returned an invalid response.
    pub fn new<S: Into<String>>(target: S) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// The session has not linked an account with the VCS provider.
#[derive(Debug, thiserror::Error)]
#[error("no '{provider}' account linked to this session")]
pub struct VcsNotLinked {
    pub provider: String,
}

impl VcsNotLinked {
    /// The session has not linked an account with the VCS provider.
    pub fn new<S: Into<String>>(provider: S) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

/// The requested VCS provider is not configured.
#[derive(Debug, thiserror::Error)]
#[error("VCS provider '{provider}' is not configured")]
pub struct VcsProviderNotFound {
    pub provider: String,
}

impl VcsProviderNotFound {
    /// The requested VCS provider is not configured.
    pub fn new<S: Into<String>>(provider: S) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::ErrorKind;

    #[test]
    fn classify_context_in_chain() {
        let error = anyhow::anyhow!("connection refused")
            .context(super::ClusterUnreachable::new("abc"));
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Upstream));
    }

    #[test]
    fn classify_root_cause() {
        let error: anyhow::Result<()> =
            Err(anyhow::anyhow!(super::Unauthorized)).context("loading session");
        let error = error.unwrap_err();
        let (kind, message) = ErrorKind::classify(&error).unwrap();
        assert_eq!(kind, ErrorKind::Unauthorized);
        assert_eq!(message, "authentication required");
    }

    #[test]
    fn classify_unknown() {
        let error = anyhow::anyhow!("disk on fire");
        assert_eq!(ErrorKind::of(&error), None);
    }
}
