//! SQL statements to implement the [`StoreBackend`] and [`SessionsBackend`] with SQLite.
use anyhow::Result;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

use portal_context::Context;
use portal_store::delete::DeleteOps;
use portal_store::delete::DeleteResponses;
use portal_store::persist::PersistOps;
use portal_store::persist::PersistResponses;
use portal_store::query::QueryOps;
use portal_store::query::QueryResponses;
use portal_store::StoreBackend;

use crate::telemetry::CountErrExt;

mod cluster;
mod credentials;
mod oauth_state;
mod sessions;

pub use self::sessions::SQLiteSessions;

const PING_SQL: &str = "SELECT 1;";

const SCHEMA_VERSION_SQL: &str = r#"
SELECT MAX(version)
FROM refinery_schema_history__store
;"#;

/// Implementation of the [`StoreBackend`] interface using SQLite.
pub struct SQLiteStore {
    /// Connection to the SQLite DB persisting data.
    connection: Connection,
}

impl SQLiteStore {
    /// Initialise a new SQLite backed [`StoreBackend`].
    pub fn new(connection: Connection) -> Self {
        SQLiteStore { connection }
    }
}

#[async_trait::async_trait]
impl StoreBackend for SQLiteStore {
    async fn close(&self, _: &Context) -> Result<()> {
        close(&self.connection).await
    }

    async fn delete(&self, context: &Context, op: DeleteOps) -> Result<DeleteResponses> {
        let connection = &self.connection;
        match op {
            DeleteOps::ClusterToken(token) => {
                self::credentials::delete_cluster_token(context, connection, token)
                    .await
                    .map(|_| DeleteResponses::Success)
            }
            DeleteOps::ConsumeOAuthState(state) => {
                let state = self::oauth_state::consume(context, connection, state).await?;
                Ok(DeleteResponses::OAuthState(state))
            }
            DeleteOps::ExpiredOAuthStates(now) => {
                self::oauth_state::delete_expired(context, connection, now)
                    .await
                    .map(|_| DeleteResponses::Success)
            }
            DeleteOps::SessionCredentials(session) => {
                self::credentials::delete_session(context, connection, session)
                    .await
                    .map(|_| DeleteResponses::Success)
            }
            DeleteOps::UnregisterCluster(cluster) => {
                self::cluster::unregister(context, connection, cluster)
                    .await
                    .map(|_| DeleteResponses::Success)
            }
        }
    }

    async fn ping(&self, _: &Context) -> Result<()> {
        ping(&self.connection).await
    }

    async fn query(&self, context: &Context, op: QueryOps) -> Result<QueryResponses> {
        let connection = &self.connection;
        match op {
            QueryOps::Cluster(lookup) => {
                let cluster = self::cluster::lookup(context, connection, lookup).await?;
                Ok(QueryResponses::Cluster(cluster))
            }
            QueryOps::ClusterToken(lookup) => {
                let record =
                    self::credentials::lookup_cluster_token(context, connection, lookup).await?;
                Ok(QueryResponses::Credentials(record))
            }
            QueryOps::ListClusterConnections(list) => {
                let clusters = self::cluster::list_connections(context, connection, list).await?;
                Ok(QueryResponses::ClusterConnections(clusters))
            }
            QueryOps::ListClusters => {
                let clusters = self::cluster::list(context, connection).await?;
                Ok(QueryResponses::Clusters(clusters))
            }
            QueryOps::SchemaVersion(_) => {
                let version = schema_version(connection).await?;
                Ok(QueryResponses::SchemaVersion(version))
            }
            QueryOps::VcsToken(lookup) => {
                let record =
                    self::credentials::lookup_vcs_token(context, connection, lookup).await?;
                Ok(QueryResponses::Credentials(record))
            }
        }
    }

    async fn persist(&self, context: &Context, op: PersistOps) -> Result<PersistResponses> {
        let connection = &self.connection;
        match op {
            PersistOps::Cluster(cluster) => self::cluster::register(context, connection, cluster)
                .await
                .map(|_| PersistResponses::Success),
            PersistOps::ClusterToken(record) => {
                self::credentials::persist_cluster_token(context, connection, record)
                    .await
                    .map(|_| PersistResponses::Success)
            }
            PersistOps::OAuthState(state) => self::oauth_state::persist(context, connection, state)
                .await
                .map(|_| PersistResponses::Success),
            PersistOps::VcsToken(record) => {
                self::credentials::persist_vcs_token(context, connection, record)
                    .await
                    .map(|_| PersistResponses::Success)
            }
        }
    }
}

/// Close a connection, ignoring connections that are already closed.
pub(crate) async fn close(connection: &Connection) -> Result<()> {
    match connection.clone().close().await {
        Ok(()) => Ok(()),
        Err(tokio_rusqlite::Error::ConnectionClosed) => Ok(()),
        Err(error) => Err(error.into()),
    }
}

/// Check a connection can execute statements.
pub(crate) async fn ping(connection: &Connection) -> Result<()> {
    let (err_count, _timer) = crate::telemetry::observe_op("ping");
    connection
        .call(|connection| {
            connection.query_row(PING_SQL, [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
        .count_on_err(err_count)?;
    Ok(())
}

/// Lookup the latest migration applied to the persistent store schema.
async fn schema_version(connection: &Connection) -> Result<Option<i64>> {
    let (err_count, _timer) = crate::telemetry::observe_op("schema.version");
    let version = connection
        .call(|connection| {
            let version = connection.query_row(SCHEMA_VERSION_SQL, [], |row| row.get(0))?;
            Ok(version)
        })
        .await
        .count_on_err(err_count)?;
    Ok(version)
}

/// Encode a timestamp as milliseconds since the UNIX epoch for storage.
pub(crate) fn encode_time(time: OffsetDateTime) -> i64 {
    (time.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Decode a timestamp stored as milliseconds since the UNIX epoch.
pub(crate) fn decode_time(millis: i64) -> Result<OffsetDateTime> {
    let nanos = i128::from(millis) * 1_000_000;
    let time = OffsetDateTime::from_unix_timestamp_nanos(nanos)?;
    Ok(time)
}
