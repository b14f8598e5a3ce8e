//! Persistent store operations on encrypted session credentials for clusters and VCS providers.
use anyhow::Result;
use tokio_rusqlite::Connection;

use portal_context::Context;
use portal_models::token::CredentialRecord;
use portal_models::token::SealedTokens;
use portal_store::delete::DeleteClusterToken;
use portal_store::delete::DeleteSessionCredentials;
use portal_store::query::LookupClusterToken;
use portal_store::query::LookupVcsToken;

use super::decode_time;
use super::encode_time;
use crate::telemetry::CountErrExt;

const CLUSTER_DELETE_SQL: &str = r#"
DELETE FROM store_cluster_token
WHERE
    session_id = ?1
    AND cluster_guid = ?2
;"#;

const CLUSTER_LOOKUP_SQL: &str = r#"
SELECT access_token, refresh_token, expires_at, issued_at
FROM store_cluster_token
WHERE
    session_id = ?1
    AND cluster_guid = ?2
;"#;

const CLUSTER_PERSIST_SQL: &str = r#"
INSERT INTO store_cluster_token (
    session_id, cluster_guid, access_token, refresh_token, expires_at, issued_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(session_id, cluster_guid)
DO UPDATE SET
    access_token=?3,
    refresh_token=?4,
    expires_at=?5,
    issued_at=?6
;"#;

const SESSION_DELETE_CLUSTER_SQL: &str = r#"
DELETE FROM store_cluster_token
WHERE session_id = ?1
;"#;

const SESSION_DELETE_VCS_SQL: &str = r#"
DELETE FROM store_vcs_token
WHERE session_id = ?1
;"#;

const VCS_LOOKUP_SQL: &str = r#"
SELECT access_token, refresh_token, expires_at, issued_at
FROM store_vcs_token
WHERE
    session_id = ?1
    AND provider_id = ?2
;"#;

const VCS_PERSIST_SQL: &str = r#"
INSERT INTO store_vcs_token (
    session_id, provider_id, access_token, refresh_token, expires_at, issued_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(session_id, provider_id)
DO UPDATE SET
    access_token=?3,
    refresh_token=?4,
    expires_at=?5,
    issued_at=?6
;"#;

/// Raw token columns as read from the DB, before decoding.
struct TokenRow {
    access_token: Vec<u8>,
    expires_at: i64,
    issued_at: i64,
    refresh_token: Option<Vec<u8>>,
}

impl TokenRow {
    fn decode(self, session_id: String, target: String) -> Result<CredentialRecord> {
        let tokens = SealedTokens {
            access_token: self.access_token,
            expires_at: decode_time(self.expires_at)?,
            issued_at: decode_time(self.issued_at)?,
            refresh_token: self.refresh_token,
        };
        Ok(CredentialRecord {
            session_id,
            target,
            tokens,
        })
    }
}

/// Delete the credentials of a session for a cluster, ignoring missing records.
pub async fn delete_cluster_token(
    _: &Context,
    connection: &Connection,
    token: DeleteClusterToken,
) -> Result<()> {
    let (err_count, _timer) = crate::telemetry::observe_op("clusterToken.delete");
    connection
        .call(move |connection| {
            connection.execute(
                CLUSTER_DELETE_SQL,
                rusqlite::params![token.session_id, token.guid],
            )?;
            Ok(())
        })
        .await
        .count_on_err(err_count)?;
    Ok(())
}

/// Delete all cluster and VCS credentials owned by a session.
pub async fn delete_session(
    _: &Context,
    connection: &Connection,
    session: DeleteSessionCredentials,
) -> Result<()> {
    let (err_count, _timer) = crate::telemetry::observe_op("credentials.deleteSession");
    connection
        .call(move |connection| {
            let transaction = connection.transaction()?;
            transaction.execute(SESSION_DELETE_CLUSTER_SQL, [&session.session_id])?;
            transaction.execute(SESSION_DELETE_VCS_SQL, [&session.session_id])?;
            transaction.commit()?;
            Ok(())
        })
        .await
        .count_on_err(err_count)?;
    Ok(())
}

/// Lookup the credentials of a session for a cluster, if any.
pub async fn lookup_cluster_token(
    context: &Context,
    connection: &Connection,
    token: LookupClusterToken,
) -> Result<Option<CredentialRecord>> {
    let (err_count, _timer) = crate::telemetry::observe_op("clusterToken.lookup");
    lookup(
        context,
        connection,
        CLUSTER_LOOKUP_SQL,
        token.session_id,
        token.guid,
    )
    .await
    .count_on_err(err_count)
}

/// Lookup the credentials of a session for a VCS provider, if any.
pub async fn lookup_vcs_token(
    context: &Context,
    connection: &Connection,
    token: LookupVcsToken,
) -> Result<Option<CredentialRecord>> {
    let (err_count, _timer) = crate::telemetry::observe_op("vcsToken.lookup");
    lookup(
        context,
        connection,
        VCS_LOOKUP_SQL,
        token.session_id,
        token.provider,
    )
    .await
    .count_on_err(err_count)
}

/// Insert or update the credentials of a session for a cluster.
pub async fn persist_cluster_token(
    context: &Context,
    connection: &Connection,
    record: CredentialRecord,
) -> Result<()> {
    let (err_count, _timer) = crate::telemetry::observe_op("clusterToken.persist");
    persist(context, connection, CLUSTER_PERSIST_SQL, record)
        .await
        .count_on_err(err_count)
}

/// Insert or update the credentials of a session for a VCS provider.
pub async fn persist_vcs_token(
    context: &Context,
    connection: &Connection,
    record: CredentialRecord,
) -> Result<()> {
    let (err_count, _timer) = crate::telemetry::observe_op("vcsToken.persist");
    persist(context, connection, VCS_PERSIST_SQL, record)
        .await
        .count_on_err(err_count)
}

async fn lookup(
    _: &Context,
    connection: &Connection,
    sql: &'static str,
    session_id: String,
    target: String,
) -> Result<Option<CredentialRecord>> {
    let (row, session_id, target) = connection
        .call(move |connection| {
            let mut statement = connection.prepare_cached(sql)?;
            let mut rows = statement.query([&session_id, &target])?;
            let row = match rows.next()? {
                None => None,
                Some(row) => Some(TokenRow {
                    access_token: row.get("access_token")?,
                    expires_at: row.get("expires_at")?,
                    issued_at: row.get("issued_at")?,
                    refresh_token: row.get("refresh_token")?,
                }),
            };
            Ok((row, session_id, target))
        })
        .await?;
    row.map(|row| row.decode(session_id, target)).transpose()
}

async fn persist(
    _: &Context,
    connection: &Connection,
    sql: &'static str,
    record: CredentialRecord,
) -> Result<()> {
    let expires_at = encode_time(record.tokens.expires_at);
    let issued_at = encode_time(record.tokens.issued_at);
    connection
        .call(move |connection| {
            connection.execute(
                sql,
                rusqlite::params![
                    record.session_id,
                    record.target,
                    record.tokens.access_token,
                    record.tokens.refresh_token,
                    expires_at,
                    issued_at,
                ],
            )?;
            Ok(())
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use portal_models::token::CredentialRecord;
    use portal_models::token::SealedTokens;
    use portal_store::delete::DeleteClusterToken;
    use portal_store::delete::DeleteSessionCredentials;
    use portal_store::persist::PersistClusterToken;
    use portal_store::persist::PersistVcsToken;
    use portal_store::query::LookupClusterToken;
    use portal_store::query::LookupVcsToken;

    fn mock_record(session_id: &str, target: &str, access: u8) -> CredentialRecord {
        let issued_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        CredentialRecord {
            session_id: session_id.into(),
            target: target.into(),
            tokens: SealedTokens {
                access_token: vec![access; 16],
                expires_at: issued_at + time::Duration::hours(1),
                issued_at,
                refresh_token: Some(vec![42; 16]),
            },
        }
    }

    fn cluster_lookup(session_id: &str, guid: &str) -> LookupClusterToken {
        LookupClusterToken {
            guid: guid.into(),
            session_id: session_id.into(),
        }
    }

    #[tokio::test]
    async fn cluster_token_delete_get_persist() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;

        // Check lookup without record.
        let record = store
            .query(&context, cluster_lookup("session", "guid"))
            .await
            .expect("store lookup failed");
        assert!(record.is_none());

        // Check persisting, updating and looking up a record.
        let record = mock_record("session", "guid", 1);
        store
            .persist(&context, PersistClusterToken(record))
            .await
            .unwrap();
        let record = mock_record("session", "guid", 2);
        store
            .persist(&context, PersistClusterToken(record.clone()))
            .await
            .unwrap();
        let actual = store
            .query(&context, cluster_lookup("session", "guid"))
            .await
            .unwrap();
        assert_eq!(actual, Some(record));

        // Check deleting the record.
        let delete = DeleteClusterToken {
            guid: "guid".into(),
            session_id: "session".into(),
        };
        store.delete(&context, delete.clone()).await.unwrap();
        let actual = store
            .query(&context, cluster_lookup("session", "guid"))
            .await
            .unwrap();
        assert!(actual.is_none());
        store.delete(&context, delete).await.unwrap();
    }

    #[tokio::test]
    async fn vcs_tokens_are_separate_from_cluster_tokens() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;
        let mut record = mock_record("session", "github", 3);
        record.tokens.refresh_token = None;
        store
            .persist(&context, PersistVcsToken(record.clone()))
            .await
            .unwrap();

        let lookup = LookupVcsToken {
            provider: "github".into(),
            session_id: "session".into(),
        };
        let actual = store.query(&context, lookup).await.unwrap();
        assert_eq!(actual, Some(record));
        let actual = store
            .query(&context, cluster_lookup("session", "github"))
            .await
            .unwrap();
        assert!(actual.is_none());
    }

    #[tokio::test]
    async fn delete_session_credentials() {
        let context = portal_context::Context::fixture();
        let store = crate::statements::tests::store().await;
        store
            .persist(&context, PersistClusterToken(mock_record("one", "guid", 1)))
            .await
            .unwrap();
        store
            .persist(&context, PersistVcsToken(mock_record("one", "github", 1)))
            .await
            .unwrap();
        store
            .persist(&context, PersistClusterToken(mock_record("two", "guid", 2)))
            .await
            .unwrap();

        store
            .delete(&context, DeleteSessionCredentials::from("one"))
            .await
            .unwrap();

        let actual = store
            .query(&context, cluster_lookup("one", "guid"))
            .await
            .unwrap();
        assert!(actual.is_none());
        let lookup = LookupVcsToken {
            provider: "github".into(),
            session_id: "one".into(),
        };
        let actual = store.query(&context, lookup).await.unwrap();
        assert!(actual.is_none());
        let actual = store
            .query(&context, cluster_lookup("two", "guid"))
            .await
            .unwrap();
        assert!(actual.is_some());
    }
}
