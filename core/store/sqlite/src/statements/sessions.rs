//! Session store operations on browser sessions.
use anyhow::Result;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

use portal_context::Context;
use portal_models::session::Session;
use portal_models::token::SealedTokens;
use portal_store::SessionsBackend;

use super::decode_time;
use super::encode_time;
use crate::telemetry::CountErrExt;

const CREATE_SQL: &str = r#"
INSERT INTO sessions_session (
    id, user_id, user_name,
    sso_access_token, sso_refresh_token, sso_expires_at, sso_issued_at,
    created_at, last_access, expires_at
)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
;"#;

const DELETE_SQL: &str = r#"
DELETE FROM sessions_session
WHERE id = ?1
;"#;

const EXPIRED_SQL: &str = r#"
SELECT id
FROM sessions_session
WHERE expires_at <= ?1
ORDER BY id ASC
;"#;

const EXPIRED_DELETE_SQL: &str = r#"
DELETE FROM sessions_session
WHERE expires_at <= ?1
;"#;

const LOOKUP_SQL: &str = r#"
SELECT
    id, user_id, user_name,
    sso_access_token, sso_refresh_token, sso_expires_at, sso_issued_at,
    created_at, last_access, expires_at
FROM sessions_session
WHERE id = ?1
;"#;

const TOUCH_SQL: &str = r#"
UPDATE sessions_session
SET
    last_access = ?2,
    expires_at = ?3
WHERE id = ?1
;"#;

/// Raw session record as read from the DB, before decoding.
struct SessionRow {
    created_at: i64,
    expires_at: i64,
    id: String,
    last_access: i64,
    sso_access_token: Vec<u8>,
    sso_expires_at: i64,
    sso_issued_at: i64,
    sso_refresh_token: Option<Vec<u8>>,
    user_id: String,
    user_name: String,
}

impl SessionRow {
    fn decode(self) -> Result<Session> {
        let sso_tokens = SealedTokens {
            access_token: self.sso_access_token,
            expires_at: decode_time(self.sso_expires_at)?,
            issued_at: decode_time(self.sso_issued_at)?,
            refresh_token: self.sso_refresh_token,
        };
        Ok(Session {
            created_at: decode_time(self.created_at)?,
            expires_at: decode_time(self.expires_at)?,
            id: self.id,
            last_access: decode_time(self.last_access)?,
            sso_tokens,
            user_id: self.user_id,
            user_name: self.user_name,
        })
    }
}

/// Implementation of the [`SessionsBackend`] interface using SQLite.
pub struct SQLiteSessions {
    /// Connection to the SQLite DB persisting sessions.
    connection: Connection,
}

impl SQLiteSessions {
    /// Initialise a new SQLite backed [`SessionsBackend`].
    pub fn new(connection: Connection) -> Self {
        SQLiteSessions { connection }
    }
}

#[async_trait::async_trait]
impl SessionsBackend for SQLiteSessions {
    async fn cleanup(&self, _: &Context, now: OffsetDateTime) -> Result<Vec<String>> {
        let now = encode_time(now);
        let (err_count, _timer) = crate::telemetry::observe_op("sessions.cleanup");
        let expired = self
            .connection
            .call(move |connection| {
                let transaction = connection.transaction()?;
                let mut expired = Vec::new();
                {
                    let mut statement = transaction.prepare_cached(EXPIRED_SQL)?;
                    let mut rows = statement.query([now])?;
                    while let Some(row) = rows.next()? {
                        let id: String = row.get("id")?;
                        expired.push(id);
                    }
                }
                transaction.execute(EXPIRED_DELETE_SQL, [now])?;
                transaction.commit()?;
                Ok(expired)
            })
            .await
            .count_on_err(err_count)?;
        Ok(expired)
    }

    async fn close(&self, _: &Context) -> Result<()> {
        super::close(&self.connection).await
    }

    async fn create(&self, _: &Context, session: Session) -> Result<()> {
        let created_at = encode_time(session.created_at);
        let expires_at = encode_time(session.expires_at);
        let last_access = encode_time(session.last_access);
        let sso_expires_at = encode_time(session.sso_tokens.expires_at);
        let sso_issued_at = encode_time(session.sso_tokens.issued_at);
        let (err_count, _timer) = crate::telemetry::observe_op("sessions.create");
        self.connection
            .call(move |connection| {
                connection.execute(
                    CREATE_SQL,
                    rusqlite::params![
                        session.id,
                        session.user_id,
                        session.user_name,
                        session.sso_tokens.access_token,
                        session.sso_tokens.refresh_token,
                        sso_expires_at,
                        sso_issued_at,
                        created_at,
                        last_access,
                        expires_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .count_on_err(err_count)?;
        Ok(())
    }

    async fn destroy(&self, _: &Context, id: &str) -> Result<()> {
        let id = id.to_string();
        let (err_count, _timer) = crate::telemetry::observe_op("sessions.destroy");
        self.connection
            .call(move |connection| {
                connection.execute(DELETE_SQL, [id])?;
                Ok(())
            })
            .await
            .count_on_err(err_count)?;
        Ok(())
    }

    async fn load(&self, _: &Context, id: &str) -> Result<Option<Session>> {
        let id = id.to_string();
        let (err_count, timer) = crate::telemetry::observe_op("sessions.load");
        let row = self
            .connection
            .call(move |connection| {
                let mut statement = connection.prepare_cached(LOOKUP_SQL)?;
                let mut rows = statement.query([id])?;
                let row = match rows.next()? {
                    None => None,
                    Some(row) => Some(SessionRow {
                        created_at: row.get("created_at")?,
                        expires_at: row.get("expires_at")?,
                        id: row.get("id")?,
                        last_access: row.get("last_access")?,
                        sso_access_token: row.get("sso_access_token")?,
                        sso_expires_at: row.get("sso_expires_at")?,
                        sso_issued_at: row.get("sso_issued_at")?,
                        sso_refresh_token: row.get("sso_refresh_token")?,
                        user_id: row.get("user_id")?,
                        user_name: row.get("user_name")?,
                    }),
                };
                Ok(row)
            })
            .await
            .count_on_err(err_count)?;

        drop(timer);
        row.map(SessionRow::decode).transpose()
    }

    async fn ping(&self, _: &Context) -> Result<()> {
        super::ping(&self.connection).await
    }

    async fn touch(
        &self,
        _: &Context,
        id: &str,
        last_access: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<()> {
        let id = id.to_string();
        let last_access = encode_time(last_access);
        let expires_at = encode_time(expires_at);
        let (err_count, _timer) = crate::telemetry::observe_op("sessions.touch");
        self.connection
            .call(move |connection| {
                connection.execute(TOUCH_SQL, rusqlite::params![id, last_access, expires_at])?;
                Ok(())
            })
            .await
            .count_on_err(err_count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use portal_context::Context;
    use portal_models::session::NewSession;
    use portal_models::token::SealedTokens;

    fn new_session(user: &str) -> NewSession {
        let issued_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        NewSession {
            sso_tokens: SealedTokens {
                access_token: vec![1, 2, 3],
                expires_at: issued_at + time::Duration::minutes(10),
                issued_at,
                refresh_token: Some(vec![4, 5, 6]),
            },
            user_id: format!("{}-id", user),
            user_name: user.into(),
        }
    }

    #[tokio::test]
    async fn create_load_destroy() {
        let context = Context::fixture();
        let sessions = crate::statements::tests::sessions(Duration::from_secs(600)).await;
        let session = sessions.create(&context, new_session("alice")).await.unwrap();

        let loaded = sessions.load(&context, &session.id).await.unwrap();
        let loaded = loaded.expect("session not found");
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.user_name, "alice");
        assert_eq!(loaded.sso_tokens, session.sso_tokens);

        sessions.destroy(&context, &session.id).await.unwrap();
        let loaded = sessions.load(&context, &session.id).await.unwrap();
        assert!(loaded.is_none());
        sessions.destroy(&context, &session.id).await.unwrap();
    }

    #[tokio::test]
    async fn touch_updates_expiry() {
        let context = Context::fixture();
        let sessions = crate::statements::tests::sessions(Duration::from_secs(600)).await;
        let session = sessions.create(&context, new_session("alice")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        sessions.touch(&context, &session.id).await.unwrap();

        let loaded = sessions
            .load(&context, &session.id)
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.last_access > session.last_access);
        assert!(loaded.expires_at > session.expires_at);
    }

    #[tokio::test]
    async fn cleanup_returns_expired_ids() {
        let context = Context::fixture();
        let sessions = crate::statements::tests::sessions(Duration::ZERO).await;
        let first = sessions.create(&context, new_session("alice")).await.unwrap();
        let second = sessions.create(&context, new_session("bob")).await.unwrap();

        // Expired sessions are not returned.
        let loaded = sessions.load(&context, &first.id).await.unwrap();
        assert!(loaded.is_none());

        let mut expected = vec![first.id, second.id];
        expected.sort();
        let removed = sessions.cleanup(&context).await.unwrap();
        assert_eq!(removed, expected);
        let removed = sessions.cleanup(&context).await.unwrap();
        assert!(removed.is_empty());
    }
}
