//! Portal Proxy persistent store operations to query records.
use anyhow::Result;
use futures::Stream;

use portal_models::cluster::ClusterConnection;
use portal_models::cluster::ClusterRegistration;
use portal_models::token::CredentialRecord;

use self::seal::SealQueryOp;

/// Internal trait to enable query operations on the persistent store.
pub trait QueryOp: Into<QueryOps> + SealQueryOp {
    /// Type returned by the matching query operation.
    type Response: From<QueryResponses>;
}

/// List of all query operations the persistent store must implement.
pub enum QueryOps {
    /// Query a registered cluster by GUID.
    Cluster(LookupCluster),

    /// Query the credentials of a session for a cluster.
    ClusterToken(LookupClusterToken),

    /// List all registered clusters with the credentials state of a session, sorted by name.
    ListClusterConnections(ListClusterConnections),

    /// List all registered clusters, sorted by name.
    ListClusters,

    /// Query the latest schema version applied to the store, if any.
    SchemaVersion(LookupSchemaVersion),

    /// Query the credentials of a session for a VCS provider.
    VcsToken(LookupVcsToken),
}

/// List of all responses from query operations.
pub enum QueryResponses {
    /// Return a [`ClusterRegistration`], if one was found matching the query.
    Cluster(Option<ClusterRegistration>),

    /// Return a [`Stream`] of [`ClusterConnection`] objects.
    ClusterConnections(ClusterConnectionStream),

    /// Return a [`Stream`] of [`ClusterRegistration`] objects.
    Clusters(ClusterStream),

    /// Return a [`CredentialRecord`], if one was found matching the query.
    Credentials(Option<CredentialRecord>),

    /// Return the latest applied schema version, if any.
    SchemaVersion(Option<i64>),
}

// --- Operations return types -- //
/// Alias for a heap-allocated [`Stream`] of cluster registrations.
pub type ClusterStream = std::pin::Pin<Box<dyn Stream<Item = Result<ClusterRegistration>> + Send>>;

/// Alias for a heap-allocated [`Stream`] of clusters with session credentials state.
pub type ClusterConnectionStream =
    std::pin::Pin<Box<dyn Stream<Item = Result<ClusterConnection>> + Send>>;

// --- High level query operations --- //
/// List all registered clusters with the credentials state of a session, sorted by name.
#[derive(Clone, Debug)]
pub struct ListClusterConnections {
    /// Session to report the credentials state for.
    pub session_id: String,
}

/// List all registered clusters, sorted by name.
pub struct ListClusters;

/// Lookup a registered cluster by GUID.
///
/// Removed clusters are never returned.
#[derive(Clone, Debug)]
pub struct LookupCluster {
    /// GUID of the cluster to lookup.
    pub guid: String,
}
impl From<String> for LookupCluster {
    fn from(value: String) -> Self {
        LookupCluster { guid: value }
    }
}
impl From<&str> for LookupCluster {
    fn from(value: &str) -> Self {
        LookupCluster {
            guid: value.to_string(),
        }
    }
}

/// Lookup the credentials of a session for a cluster.
#[derive(Clone, Debug)]
pub struct LookupClusterToken {
    /// GUID of the cluster the credentials are for.
    pub guid: String,

    /// Session owning the credentials.
    pub session_id: String,
}

/// Lookup the latest schema version applied to the store.
pub struct LookupSchemaVersion;

/// Lookup the credentials of a session for a VCS provider.
#[derive(Clone, Debug)]
pub struct LookupVcsToken {
    /// ID of the VCS provider the credentials are for.
    pub provider: String,

    /// Session owning the credentials.
    pub session_id: String,
}

// --- Internal implementation details follow --- //
/// Private module to seal implementation details.
mod seal {
    /// Super-trait to seal the [`QueryOp`](super::QueryOp) trait.
    pub trait SealQueryOp {}
}

// --- Implement QueryOp and super traits on types for transparent operations --- //
impl SealQueryOp for ListClusterConnections {}
impl QueryOp for ListClusterConnections {
    type Response = ClusterConnectionStream;
}
impl From<ListClusterConnections> for QueryOps {
    fn from(value: ListClusterConnections) -> Self {
        QueryOps::ListClusterConnections(value)
    }
}

impl SealQueryOp for ListClusters {}
impl QueryOp for ListClusters {
    type Response = ClusterStream;
}
impl From<ListClusters> for QueryOps {
    fn from(_: ListClusters) -> Self {
        QueryOps::ListClusters
    }
}

impl SealQueryOp for LookupCluster {}
impl QueryOp for LookupCluster {
    type Response = Option<ClusterRegistration>;
}
impl From<LookupCluster> for QueryOps {
    fn from(value: LookupCluster) -> Self {
        QueryOps::Cluster(value)
    }
}

impl SealQueryOp for LookupClusterToken {}
impl QueryOp for LookupClusterToken {
    type Response = Option<CredentialRecord>;
}
impl From<LookupClusterToken> for QueryOps {
    fn from(value: LookupClusterToken) -> Self {
        QueryOps::ClusterToken(value)
    }
}

impl SealQueryOp for LookupSchemaVersion {}
impl QueryOp for LookupSchemaVersion {
    type Response = Option<i64>;
}
impl From<LookupSchemaVersion> for QueryOps {
    fn from(value: LookupSchemaVersion) -> Self {
        QueryOps::SchemaVersion(value)
    }
}

impl SealQueryOp for LookupVcsToken {}
impl QueryOp for LookupVcsToken {
    type Response = Option<CredentialRecord>;
}
impl From<LookupVcsToken> for QueryOps {
    fn from(value: LookupVcsToken) -> Self {
        QueryOps::VcsToken(value)
    }
}

// --- Implement QueryResponses conversions on return types for transparent operations --- //
impl From<QueryResponses> for Option<ClusterRegistration> {
    fn from(value: QueryResponses) -> Self {
        match value {
            QueryResponses::Cluster(cluster) => cluster,
            _ => panic!("unexpected result type for the given query operation"),
        }
    }
}
impl From<QueryResponses> for ClusterConnectionStream {
    fn from(value: QueryResponses) -> Self {
        match value {
            QueryResponses::ClusterConnections(stream) => stream,
            _ => panic!("unexpected result type for the given query operation"),
        }
    }
}
impl From<QueryResponses> for ClusterStream {
    fn from(value: QueryResponses) -> Self {
        match value {
            QueryResponses::Clusters(stream) => stream,
            _ => panic!("unexpected result type for the given query operation"),
        }
    }
}
impl From<QueryResponses> for Option<CredentialRecord> {
    fn from(value: QueryResponses) -> Self {
        match value {
            QueryResponses::Credentials(record) => record,
            _ => panic!("unexpected result type for the given query operation"),
        }
    }
}
impl From<QueryResponses> for Option<i64> {
    fn from(value: QueryResponses) -> Self {
        match value {
            QueryResponses::SchemaVersion(version) => version,
            _ => panic!("unexpected result type for the given query operation"),
        }
    }
}
