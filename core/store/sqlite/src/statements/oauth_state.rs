//! Persistent store operations on the anti-forgery state of VCS OAuth flows.
use anyhow::Result;
use time::OffsetDateTime;
use tokio_rusqlite::Connection;

use portal_context::Context;
use portal_models::oauth::OAuthState;
use portal_store::delete::ConsumeOAuthState;

use super::decode_time;
use super::encode_time;
use crate::telemetry::CountErrExt;

const CONSUME_SQL: &str = r#"
DELETE FROM store_oauth_state
WHERE state = ?1
RETURNING state, session_id, provider_id, expires_at
;"#;

const DELETE_EXPIRED_SQL: &str = r#"
DELETE FROM store_oauth_state
WHERE expires_at <= ?1
;"#;

const PERSIST_SQL: &str = r#"
INSERT INTO store_oauth_state (state, session_id, provider_id, expires_at)
VALUES (?1, ?2, ?3, ?4)
;"#;

/// Delete and return an OAuth state, if one exists.
pub async fn consume(
    _: &Context,
    connection: &Connection,
    state: ConsumeOAuthState,
) -> Result<Option<OAuthState>> {
    let (err_count, timer) = crate::telemetry::observe_op("oauthState.consume");
    let row = connection
        .call(move |connection| {
            let mut statement = connection.prepare_cached(CONSUME_SQL)?;
            let mut rows = statement.query([state.state])?;
            let row = match rows.next()? {
                None => None,
                Some(row) => {
                    let state: String = row.get("state")?;
                    let session_id: String = row.get("session_id")?;
                    let provider: String = row.get("provider_id")?;
                    let expires_at: i64 = row.get("expires_at")?;
                    Some((state, session_id, provider, expires_at))
                }
            };
            Ok(row)
        })
        .await
        .count_on_err(err_count)?;

    drop(timer);
    match row {
        None => Ok(None),
        Some((state, session_id, provider, expires_at)) => Ok(Some(OAuthState {
            expires_at: decode_time(expires_at)?,
            provider,
            session_id,
            state,
        })),
    }
}

/// Delete all OAuth states that expired by the given time.
pub async fn delete_expired(
    _: &Context,
    connection: &Connection,
    now: OffsetDateTime,
) -> Result<()> {
    let now = encode_time(now);
    let (err_count, _timer) = crate::telemetry::observe_op("oauthState.deleteExpired");
    connection
        .call(move |connection| {
            connection.execute(DELETE_EXPIRED_SQL, [now])?;
            Ok(())
        })
        .await
        .count_on_err(err_count)?;
    Ok(())
}

/// Persist the state of a new OAuth flow.
pub async fn persist(_: &Context, connection: &Connection, state: OAuthState) -> Result<()> {
    let expires_at = encode_time(state.expires_at);
    let (err_count, _timer) = crate::telemetry::observe_op("oauthState.persist");
    connection
        .call(move |connection| {
            connection.execute(
                PERSIST_SQL,
                rusqlite::params![state.state, state.session_id, state.provider, expires_at],
            )?;
            Ok(())
        })
        .await
        .count_on_err(err_count)?;
    Ok(())
}
