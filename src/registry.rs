//! Register, unregister and list the backend clusters users can connect to.
//!
//! Registry mutations are restricted to admin users.
//! Unregistering a cluster hides it from listings and dispatch but does not remove
//! credentials sessions hold for it: those are simply ignored until the session ends.
use anyhow::Result;
use futures::TryStreamExt;
use time::OffsetDateTime;
use uuid::Uuid;

use portal_context::Context;
use portal_errors::BadRequest;
use portal_errors::ClusterNotFound;
use portal_errors::Forbidden;
use portal_errors::Unauthorized;
use portal_models::auth::Identity;
use portal_models::cluster::ClusterConnection;
use portal_models::cluster::ClusterKind;
use portal_models::cluster::ClusterRegistration;
use portal_store::delete::UnregisterCluster;
use portal_store::query::ListClusterConnections;
use portal_store::query::ListClusters;
use portal_store::query::LookupCluster;
use portal_store::Store;

/// Request to add a cluster to the registry.
#[derive(Clone, Debug)]
pub struct RegisterCluster {
    pub api_endpoint: String,
    pub kind: ClusterKind,
    pub name: String,
    pub skip_ssl_validation: bool,
}

/// Registry of backend clusters on top of the persistent store.
#[derive(Clone)]
pub struct Registry {
    store: Store,
}

impl Registry {
    pub fn new(store: &Store) -> Registry {
        Registry {
            store: store.clone(),
        }
    }

    /// All registered clusters, sorted by name.
    pub async fn list(&self, context: &Context) -> Result<Vec<ClusterRegistration>> {
        let clusters = self.store.query(context, ListClusters).await?;
        clusters.try_collect().await
    }

    /// Registered clusters the calling session holds credentials for.
    pub async fn list_registered(&self, context: &Context) -> Result<Vec<ClusterConnection>> {
        let connections = self.connections(context).await?;
        let connections = connections
            .into_iter()
            .filter(|connection| connection.token_expiry.is_some())
            .collect();
        Ok(connections)
    }

    /// All registered clusters along with the calling session credentials state.
    pub async fn connections(&self, context: &Context) -> Result<Vec<ClusterConnection>> {
        let session_id = context.session_id().ok_or(Unauthorized)?;
        let op = ListClusterConnections {
            session_id: session_id.to_string(),
        };
        let connections = self.store.query(context, op).await?;
        connections.try_collect().await
    }

    /// Find a registered cluster by GUID.
    pub async fn lookup(&self, context: &Context, guid: &str) -> Result<ClusterRegistration> {
        let cluster = self.store.query(context, LookupCluster::from(guid)).await?;
        let cluster = cluster.ok_or_else(|| ClusterNotFound::new(guid))?;
        Ok(cluster)
    }

    /// Add a new cluster to the registry.
    pub async fn register(
        &self,
        context: &Context,
        request: RegisterCluster,
    ) -> Result<ClusterRegistration> {
        let identity = require_admin(context, "register clusters")?;
        let name = request.name.trim();
        if name.is_empty() {
            anyhow::bail!(BadRequest::new("cluster name must not be empty"));
        }
        let api_endpoint = normalise_endpoint(&request.api_endpoint)?;

        let cluster = ClusterRegistration {
            api_endpoint,
            created_at: OffsetDateTime::now_utc(),
            created_by: identity.user_id.clone(),
            guid: Uuid::new_v4().to_string(),
            kind: request.kind,
            name: name.to_string(),
            skip_ssl_validation: request.skip_ssl_validation,
        };
        self.store.persist(context, cluster.clone()).await?;
        slog::info!(
            context.logger, "Registered new cluster";
            "guid" => &cluster.guid,
            "kind" => cluster.kind.as_str(),
            "api_endpoint" => &cluster.api_endpoint,
        );
        Ok(cluster)
    }

    /// Remove a cluster from the registry.
    ///
    /// Unregistering an unknown or already removed cluster is not an error.
    pub async fn unregister(&self, context: &Context, guid: &str) -> Result<()> {
        require_admin(context, "unregister clusters")?;
        self.store
            .delete(context, UnregisterCluster::from(guid))
            .await?;
        slog::info!(context.logger, "Unregistered cluster"; "guid" => guid);
        Ok(())
    }
}

/// Ensure the request is made by an admin user.
pub fn require_admin<'a>(context: &'a Context, operation: &str) -> Result<&'a Identity> {
    let identity = context.identity().ok_or(Unauthorized)?;
    if !identity.admin {
        anyhow::bail!(Forbidden::new(&identity.user_id, operation));
    }
    Ok(identity)
}

/// Validate a cluster API endpoint and strip trailing slashes.
fn normalise_endpoint(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    let url = reqwest::Url::parse(endpoint)
        .map_err(|error| BadRequest::new(format!("invalid api_endpoint: {}", error)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        anyhow::bail!(BadRequest::new("api_endpoint must be an http(s) URL"));
    }
    Ok(endpoint.trim_end_matches('/').to_string())
}
