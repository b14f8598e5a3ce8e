//! Persistent store operations on the registry of backend clusters.
use anyhow::Result;
use futures::StreamExt;
use tokio_rusqlite::Connection;

use portal_context::Context;
use portal_errors::DuplicateCluster;
use portal_models::cluster::ClusterConnection;
use portal_models::cluster::ClusterKind;
use portal_models::cluster::ClusterRegistration;
use portal_store::delete::UnregisterCluster;
use portal_store::query::ClusterConnectionStream;
use portal_store::query::ClusterStream;
use portal_store::query::ListClusterConnections;
use portal_store::query::LookupCluster;

use super::decode_time;
use super::encode_time;
use crate::telemetry::CountErrExt;

const DUPLICATE_SQL: &str = r#"
SELECT COUNT(*)
FROM store_cluster
WHERE
    kind = ?1
    AND api_endpoint = ?2
    AND removed = 0
;"#;

const LIST_SQL: &str = r#"
SELECT guid, name, kind, api_endpoint, skip_ssl_validation, created_at, created_by
FROM store_cluster
WHERE removed = 0
ORDER BY name ASC, guid ASC
;"#;

const LIST_CONNECTIONS_SQL: &str = r#"
SELECT
    cluster.guid, cluster.name, cluster.kind, cluster.api_endpoint,
    cluster.skip_ssl_validation, cluster.created_at, cluster.created_by,
    token.expires_at AS token_expiry
FROM store_cluster AS cluster
LEFT JOIN store_cluster_token AS token
ON
    token.cluster_guid = cluster.guid
    AND token.session_id = ?1
WHERE cluster.removed = 0
ORDER BY cluster.name ASC, cluster.guid ASC
;"#;

const LOOKUP_SQL: &str = r#"
SELECT guid, name, kind, api_endpoint, skip_ssl_validation, created_at, created_by
FROM store_cluster
WHERE
    guid = ?1
    AND removed = 0
;"#;

const REGISTER_SQL: &str = r#"
INSERT INTO store_cluster (
    guid, name, kind, api_endpoint, skip_ssl_validation, created_at, created_by
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
;"#;

const UNREGISTER_SQL: &str = r#"
UPDATE store_cluster
SET removed = 1
WHERE
    guid = ?1
    AND removed = 0
;"#;

/// Raw cluster record as read from the DB, before decoding.
struct ClusterRow {
    api_endpoint: String,
    created_at: i64,
    created_by: String,
    guid: String,
    kind: String,
    name: String,
    skip_ssl_validation: bool,
}

impl ClusterRow {
    fn decode(self) -> Result<ClusterRegistration> {
        let kind: ClusterKind = self.kind.parse()?;
        Ok(ClusterRegistration {
            api_endpoint: self.api_endpoint,
            created_at: decode_time(self.created_at)?,
            created_by: self.created_by,
            guid: self.guid,
            kind,
            name: self.name,
            skip_ssl_validation: self.skip_ssl_validation,
        })
    }

    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<ClusterRow> {
        Ok(ClusterRow {
            api_endpoint: row.get("api_endpoint")?,
            created_at: row.get("created_at")?,
            created_by: row.get("created_by")?,
            guid: row.get("guid")?,
            kind: row.get("kind")?,
            name: row.get("name")?,
            skip_ssl_validation: row.get("skip_ssl_validation")?,
        })
    }
}

/// Return all registered clusters, sorted by name.
pub async fn list(_: &Context, connection: &Connection) -> Result<ClusterStream> {
    let (err_count, _timer) = crate::telemetry::observe_op("cluster.list");
    let rows = connection
        .call(|connection| {
            let mut statement = connection.prepare_cached(LIST_SQL)?;
            let mut rows = statement.query([])?;
            let mut clusters = Vec::new();
            while let Some(row) = rows.next()? {
                clusters.push(ClusterRow::from_row(row)?);
            }
            Ok(clusters)
        })
        .await
        .count_on_err(err_count)?;

    let clusters = futures::stream::iter(rows)
        .map(ClusterRow::decode)
        .boxed();
    Ok(clusters)
}

/// Return all registered clusters along with the credentials state of a session.
pub async fn list_connections(
    _: &Context,
    connection: &Connection,
    list: ListClusterConnections,
) -> Result<ClusterConnectionStream> {
    let (err_count, _timer) = crate::telemetry::observe_op("cluster.listConnections");
    let rows = connection
        .call(move |connection| {
            let mut statement = connection.prepare_cached(LIST_CONNECTIONS_SQL)?;
            let mut rows = statement.query([list.session_id])?;
            let mut clusters = Vec::new();
            while let Some(row) = rows.next()? {
                let cluster = ClusterRow::from_row(row)?;
                let token_expiry: Option<i64> = row.get("token_expiry")?;
                clusters.push((cluster, token_expiry));
            }
            Ok(clusters)
        })
        .await
        .count_on_err(err_count)?;

    let clusters = futures::stream::iter(rows)
        .map(|(cluster, token_expiry)| {
            let cluster = cluster.decode()?;
            let token_expiry = token_expiry.map(decode_time).transpose()?;
            Ok(ClusterConnection {
                cluster,
                token_expiry,
            })
        })
        .boxed();
    Ok(clusters)
}

/// Lookup a registered cluster, if one exists.
pub async fn lookup(
    _: &Context,
    connection: &Connection,
    cluster: LookupCluster,
) -> Result<Option<ClusterRegistration>> {
    let (err_count, timer) = crate::telemetry::observe_op("cluster.lookup");
    let row = connection
        .call(move |connection| {
            let mut statement = connection.prepare_cached(LOOKUP_SQL)?;
            let mut rows = statement.query([cluster.guid])?;
            let row = match rows.next()? {
                None => None,
                Some(row) => Some(ClusterRow::from_row(row)?),
            };
            Ok(row)
        })
        .await
        .count_on_err(err_count)?;

    drop(timer);
    row.map(ClusterRow::decode).transpose()
}

/// Register a new cluster, unless one of the same kind already uses the endpoint.
pub async fn register(
    _: &Context,
    connection: &Connection,
    cluster: ClusterRegistration,
) -> Result<()> {
    let kind = cluster.kind.as_str();
    let endpoint = cluster.api_endpoint.clone();
    let created_at = encode_time(cluster.created_at);
    let (err_count, _timer) = crate::telemetry::observe_op("cluster.register");
    let registered = connection
        .call(move |connection| {
            let transaction = connection.transaction()?;
            let duplicates: i64 = transaction.query_row(
                DUPLICATE_SQL,
                rusqlite::params![kind, cluster.api_endpoint],
                |row| row.get(0),
            )?;
            if duplicates > 0 {
                return Ok(false);
            }
            transaction.execute(
                REGISTER_SQL,
                rusqlite::params![
                    cluster.guid,
                    cluster.name,
                    kind,
                    cluster.api_endpoint,
                    cluster.skip_ssl_validation,
                    created_at,
                    cluster.created_by,
                ],
            )?;
            transaction.commit()?;
            Ok(true)
        })
        .await
        .count_on_err(err_count)?;

    if !registered {
        anyhow::bail!(DuplicateCluster::new(kind, endpoint));
    }
    Ok(())
}

/// Mark a cluster as removed, ignoring unknown or already removed clusters.
pub async fn unregister(
    _: &Context,
    connection: &Connection,
    cluster: UnregisterCluster,
) -> Result<()> {
    let (err_count, _timer) = crate::telemetry::observe_op("cluster.unregister");
    connection
        .call(move |connection| {
            connection.execute(UNREGISTER_SQL, [cluster.guid])?;
            Ok(())
        })
        .await
        .count_on_err(err_count)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use time::OffsetDateTime;

    use portal_errors::DuplicateCluster;
    use portal_models::cluster::ClusterConnection;
    use portal_models::cluster::ClusterKind;
    use portal_models::cluster::ClusterRegistration;
    use portal_models::token::CredentialRecord;
    use portal_models::token::SealedTokens;
    use portal_store::delete::UnregisterCluster;
    use portal_store::persist::PersistClusterToken;
    use portal_store::query::ListClusterConnections;
    use portal_store::query::ListClusters;
    use portal_store::query::LookupCluster;

    /// Return a [`ClusterRegistration`] object to use in tests.
    fn mock_cluster(guid: &str, name: &str, endpoint: &str) -> ClusterRegistration {
        ClusterRegistration {
            api_endpoint: endpoint.into(),
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            created_by: "admin".into(),
            guid: guid.into(),
            kind: ClusterKind::Hcf,
            name: name.into(),
            skip_ssl_validation: false,
        }
    }

    #[tokio::test]
    async fn register_lookup_unregister() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;
        let cluster = mock_cluster("guid-1", "one", "https://api.one");

        // Check lookup without record.
        let record = store
            .query(&context, LookupCluster::from("guid-1"))
            .await
            .expect("store lookup failed");
        assert!(record.is_none());

        // Check registering (and looking up) a record.
        store.persist(&context, cluster.clone()).await.unwrap();
        let record = store
            .query(&context, LookupCluster::from("guid-1"))
            .await
            .unwrap();
        assert_eq!(record, Some(cluster));

        // Check unregistering a record hides it.
        store
            .delete(&context, UnregisterCluster::from("guid-1"))
            .await
            .unwrap();
        let record = store
            .query(&context, LookupCluster::from("guid-1"))
            .await
            .unwrap();
        assert!(record.is_none());

        // Check unregistering again is a no-op.
        store
            .delete(&context, UnregisterCluster::from("guid-1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn register_rejects_duplicate_endpoint() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;
        store
            .persist(&context, mock_cluster("guid-1", "one", "https://api.one"))
            .await
            .unwrap();
        let error = store
            .persist(&context, mock_cluster("guid-2", "two", "https://api.one"))
            .await
            .unwrap_err();
        assert!(error.is::<DuplicateCluster>());

        // Same endpoint with a different kind is allowed.
        let mut other = mock_cluster("guid-3", "three", "https://api.one");
        other.kind = ClusterKind::Hce;
        store.persist(&context, other).await.unwrap();

        // Endpoints of removed clusters can be registered again.
        store
            .delete(&context, UnregisterCluster::from("guid-1"))
            .await
            .unwrap();
        store
            .persist(&context, mock_cluster("guid-4", "four", "https://api.one"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_sorted_by_name() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;
        store
            .persist(&context, mock_cluster("guid-1", "zeta", "https://api.one"))
            .await
            .unwrap();
        store
            .persist(&context, mock_cluster("guid-2", "alpha", "https://api.two"))
            .await
            .unwrap();
        store
            .persist(&context, mock_cluster("guid-3", "gone", "https://api.three"))
            .await
            .unwrap();
        store
            .delete(&context, UnregisterCluster::from("guid-3"))
            .await
            .unwrap();

        let clusters: Vec<ClusterRegistration> = store
            .query(&context, ListClusters)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let names: Vec<&str> = clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn list_connections_reports_session_tokens() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;
        store
            .persist(&context, mock_cluster("guid-1", "one", "https://api.one"))
            .await
            .unwrap();
        store
            .persist(&context, mock_cluster("guid-2", "two", "https://api.two"))
            .await
            .unwrap();
        let expires_at = OffsetDateTime::from_unix_timestamp(1_800_000_000).unwrap();
        let record = CredentialRecord {
            session_id: "session-1".into(),
            target: "guid-2".into(),
            tokens: SealedTokens {
                access_token: vec![1, 2, 3],
                expires_at,
                issued_at: expires_at,
                refresh_token: None,
            },
        };
        store
            .persist(&context, PersistClusterToken(record))
            .await
            .unwrap();

        let list = ListClusterConnections {
            session_id: "session-1".into(),
        };
        let connections: Vec<ClusterConnection> = store
            .query(&context, list)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].token_expiry, None);
        assert_eq!(connections[1].token_expiry, Some(expires_at));

        let list = ListClusterConnections {
            session_id: "session-2".into(),
        };
        let connections: Vec<ClusterConnection> = store
            .query(&context, list)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(connections.iter().all(|c| c.token_expiry.is_none()));
    }
}
