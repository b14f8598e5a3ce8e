//! Server side store of browser sessions.
//!
//! Sessions are identified by opaque, unguessable, IDs handed to browsers in a signed cookie.
//! The [`Sessions`] interface implements session lifetime rules on top of a [`SessionsBackend`]:
//!
//! - Sessions expire after a configurable idle time.
//! - Each authenticated request extends the lifetime of the session ([`Sessions::touch`]).
//! - Expired sessions are treated as missing and periodically removed ([`Sessions::cleanup`]).
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use rand::RngCore;
use time::OffsetDateTime;

use portal_context::Context;
use portal_models::session::NewSession;
use portal_models::session::Session;

/// Number of random bytes in a session ID.
const SESSION_ID_BYTES: usize = 32;

/// Create, access and destroy browser sessions.
#[derive(Clone)]
pub struct Sessions {
    inner: Arc<dyn SessionsBackend>,
    ttl: time::Duration,
}

impl Sessions {
    /// Remove all sessions that expired and return their IDs.
    ///
    /// Cleanup is idempotent and safe to run concurrently with other operations.
    pub async fn cleanup(&self, context: &Context) -> Result<Vec<String>> {
        let now = OffsetDateTime::now_utc();
        self.inner.cleanup(context, now).await
    }

    /// Close the connection to the session store.
    pub async fn close(&self, context: &Context) -> Result<()> {
        self.inner.close(context).await
    }

    /// Create a new session for an authenticated user.
    pub async fn create(&self, context: &Context, session: NewSession) -> Result<Session> {
        let now = OffsetDateTime::now_utc();
        let session = Session {
            created_at: now,
            expires_at: now + self.ttl,
            id: generate_id(),
            last_access: now,
            sso_tokens: session.sso_tokens,
            user_id: session.user_id,
            user_name: session.user_name,
        };
        self.inner.create(context, session.clone()).await?;
        Ok(session)
    }

    /// Destroy a session, ignoring unknown sessions.
    pub async fn destroy(&self, context: &Context, id: &str) -> Result<()> {
        self.inner.destroy(context, id).await
    }

    /// Load a live session by ID.
    ///
    /// Unknown and expired sessions are both reported as `None`.
    pub async fn load(&self, context: &Context, id: &str) -> Result<Option<Session>> {
        let now = OffsetDateTime::now_utc();
        let session = self.inner.load(context, id).await?;
        Ok(session.filter(|session| session.is_live(now)))
    }

    /// Initialise a [`Sessions`] store around a backend.
    pub fn new<B>(backend: B, ttl: Duration) -> Sessions
    where
        B: SessionsBackend + 'static,
    {
        let ttl = time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX);
        Sessions {
            inner: Arc::new(backend),
            ttl,
        }
    }

    /// Check the session store is reachable and able to serve requests.
    pub async fn ping(&self, context: &Context) -> Result<()> {
        self.inner.ping(context).await
    }

    /// Record activity on a session and extend its lifetime.
    pub async fn touch(&self, context: &Context, id: &str) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.ttl;
        self.inner.touch(context, id, now, expires_at).await
    }

    /// Lifetime of idle sessions.
    pub fn ttl(&self) -> time::Duration {
        self.ttl
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Sessions {
    /// Initialise a new sessions backend fixture for unit tests.
    pub fn fixture() -> Self {
        Self::new(crate::SessionsFixture::default(), Duration::from_secs(600))
    }
}

/// Operations implemented by Session Stores supported by Portal Proxy.
#[async_trait::async_trait]
pub trait SessionsBackend: Send + Sync {
    /// Remove all sessions that expired before the given time and return their IDs.
    async fn cleanup(&self, context: &Context, now: OffsetDateTime) -> Result<Vec<String>>;

    /// Close the connection to the session store.
    async fn close(&self, context: &Context) -> Result<()>;

    /// Store a new session.
    async fn create(&self, context: &Context, session: Session) -> Result<()>;

    /// Remove a session, ignoring unknown sessions.
    async fn destroy(&self, context: &Context, id: &str) -> Result<()>;

    /// Load a session by ID, regardless of its expiry.
    async fn load(&self, context: &Context, id: &str) -> Result<Option<Session>>;

    /// Check the session store is reachable and able to serve requests.
    async fn ping(&self, context: &Context) -> Result<()>;

    /// Update the last access and expiry time of a session, ignoring unknown sessions.
    async fn touch(
        &self,
        context: &Context,
        id: &str,
        last_access: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<()>;
}

/// Generate a new random session ID.
pub fn generate_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::OffsetDateTime;

    use portal_context::Context;
    use portal_models::session::NewSession;
    use portal_models::token::SealedTokens;

    use super::Sessions;
    use crate::SessionsFixture;

    fn new_session() -> NewSession {
        let now = OffsetDateTime::now_utc();
        NewSession {
            sso_tokens: SealedTokens {
                access_token: vec![1, 2, 3],
                expires_at: now + time::Duration::minutes(10),
                issued_at: now,
                refresh_token: None,
            },
            user_id: "user-1".into(),
            user_name: "alice".into(),
        }
    }

    #[test]
    fn ids_are_unique() {
        let one = super::generate_id();
        let two = super::generate_id();
        assert_ne!(one, two);
        assert_eq!(one.len(), 43);
    }

    #[tokio::test]
    async fn create_then_load() {
        let context = Context::fixture();
        let sessions = Sessions::fixture();
        let session = sessions.create(&context, new_session()).await.unwrap();
        let loaded = sessions.load(&context, &session.id).await.unwrap();
        assert_eq!(loaded, Some(session));
    }

    #[tokio::test]
    async fn destroy_then_load() {
        let context = Context::fixture();
        let sessions = Sessions::fixture();
        let session = sessions.create(&context, new_session()).await.unwrap();
        sessions.destroy(&context, &session.id).await.unwrap();
        let loaded = sessions.load(&context, &session.id).await.unwrap();
        assert_eq!(loaded, None);
    }

    #[tokio::test]
    async fn expired_sessions_are_missing() {
        let context = Context::fixture();
        let sessions = Sessions::new(SessionsFixture::default(), Duration::ZERO);
        let session = sessions.create(&context, new_session()).await.unwrap();
        let loaded = sessions.load(&context, &session.id).await.unwrap();
        assert_eq!(loaded, None);

        let removed = sessions.cleanup(&context).await.unwrap();
        assert_eq!(removed, vec![session.id.clone()]);
        let removed = sessions.cleanup(&context).await.unwrap();
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn touch_extends_expiry() {
        let context = Context::fixture();
        let sessions = Sessions::fixture();
        let session = sessions.create(&context, new_session()).await.unwrap();
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
}
