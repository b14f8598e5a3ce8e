//! In-memory token issuers for unit tests.
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use time::OffsetDateTime;

use portal_context::Context;
use portal_errors::ClusterRejected;
use portal_errors::ClusterUnreachable;
use portal_errors::InvalidOAuthState;
use portal_errors::ReauthenticationRequired;
use portal_errors::Unauthorized;
use portal_models::auth::Identity;
use portal_models::cluster::ClusterRegistration;
use portal_models::token::TokenPair;

use crate::cluster::ClusterAuthBackend;
use crate::sso::IdentityProviderBackend;
use crate::vcs::VcsClient;
use crate::vcs::VcsOAuthBackend;

/// Lifetime of tokens issued by fixtures.
const FIXTURE_TOKEN_LIFETIME: time::Duration = time::Duration::minutes(10);

fn tokens(access_token: String, refresh_token: Option<String>) -> TokenPair {
    TokenPair {
        access_token,
        expires_at: OffsetDateTime::now_utc() + FIXTURE_TOKEN_LIFETIME,
        refresh_token,
    }
}

/// Identity provider with a fixed set of users.
///
/// Access tokens are unsigned JWTs carrying the user [`Identity`].
#[derive(Clone, Default)]
pub struct IdentityProviderFixture {
    users: Arc<Mutex<HashMap<String, (String, Identity)>>>,
}

impl IdentityProviderFixture {
    /// Scope granted to admin users.
    pub const ADMIN_SCOPE: &'static str = "stackato.admin";

    /// Register a user that can login with the given password.
    pub fn add_user(&self, user_name: &str, password: &str, admin: bool) {
        let mut scopes = vec!["openid".to_string()];
        if admin {
            scopes.push(Self::ADMIN_SCOPE.to_string());
        }
        let identity = Identity {
            admin,
            issuer: Some("fixture".into()),
            scopes,
            user_id: format!("{}-id", user_name),
            user_name: user_name.to_string(),
        };
        self.users
            .lock()
            .expect("IdentityProviderFixture::users lock poisoned")
            .insert(user_name.to_string(), (password.to_string(), identity));
    }
}

#[async_trait::async_trait]
impl IdentityProviderBackend for IdentityProviderFixture {
    async fn login(&self, _: &Context, username: &str, password: &str) -> Result<TokenPair> {
        let users = self
            .users
            .lock()
            .expect("IdentityProviderFixture::users lock poisoned");
        match users.get(username) {
            Some((expected, identity)) if expected == password => {
                let access_token = crate::claims::unsigned_token(identity);
                Ok(tokens(access_token, Some(format!("refresh-{}", username))))
            }
            _ => anyhow::bail!(Unauthorized),
        }
    }

    async fn refresh(&self, _: &Context, refresh_token: &str) -> Result<TokenPair> {
        let username = refresh_token
            .strip_prefix("refresh-")
            .ok_or(Unauthorized)?;
        let users = self
            .users
            .lock()
            .expect("IdentityProviderFixture::users lock poisoned");
        let (_, identity) = users.get(username).ok_or(Unauthorized)?;
        let access_token = crate::claims::unsigned_token(identity);
        Ok(tokens(access_token, Some(refresh_token.to_string())))
    }
}

/// Cluster authentication that accepts a fixed password for any user.
///
/// Issued access tokens are numbered so tests can tell refreshed tokens apart.
#[derive(Clone)]
pub struct ClusterAuthFixture {
    issued: Arc<AtomicUsize>,
    reachable: Arc<AtomicBool>,
    refresh_allowed: Arc<AtomicBool>,
}

impl ClusterAuthFixture {
    /// Password accepted by the fixture.
    pub const PASSWORD: &'static str = "cluster-secret";

    /// Number of token pairs issued so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Control if the fixture behaves as if the cluster could be reached.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Control if refresh tokens are accepted.
    pub fn set_refresh_allowed(&self, allowed: bool) {
        self.refresh_allowed.store(allowed, Ordering::SeqCst);
    }

    fn issue(&self, cluster: &ClusterRegistration) -> TokenPair {
        let count = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access_token = format!("{}-access-{}", cluster.guid, count);
        let refresh_token = format!("{}-refresh", cluster.guid);
        tokens(access_token, Some(refresh_token))
    }
}

impl Default for ClusterAuthFixture {
    fn default() -> Self {
        ClusterAuthFixture {
            issued: Arc::new(AtomicUsize::new(0)),
            reachable: Arc::new(AtomicBool::new(true)),
            refresh_allowed: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[async_trait::async_trait]
impl ClusterAuthBackend for ClusterAuthFixture {
    async fn login(
        &self,
        _: &Context,
        cluster: &ClusterRegistration,
        _: &str,
        password: &str,
    ) -> Result<TokenPair> {
        if !self.reachable.load(Ordering::SeqCst) {
            anyhow::bail!(ClusterUnreachable::new(&cluster.guid));
        }
        if password != Self::PASSWORD {
            anyhow::bail!(ClusterRejected::new(&cluster.guid));
        }
        Ok(self.issue(cluster))
    }

    async fn refresh(
        &self,
        _: &Context,
        cluster: &ClusterRegistration,
        _: &str,
    ) -> Result<TokenPair> {
        if !self.reachable.load(Ordering::SeqCst) {
            anyhow::bail!(ClusterUnreachable::new(&cluster.guid));
        }
        if !self.refresh_allowed.load(Ordering::SeqCst) {
            anyhow::bail!(ReauthenticationRequired::new(&cluster.guid));
        }
        Ok(self.issue(cluster))
    }
}

/// VCS OAuth client that accepts a single authorisation code.
#[derive(Clone, Default)]
pub struct VcsOAuthFixture;

impl VcsOAuthFixture {
    /// Authorisation code accepted by the fixture.
    pub const CODE: &'static str = "good-code";
}

#[async_trait::async_trait]
impl VcsOAuthBackend for VcsOAuthFixture {
    async fn exchange(
        &self,
        _: &Context,
        provider: &VcsClient,
        _: &str,
        code: &str,
    ) -> Result<TokenPair> {
        if code != Self::CODE {
            anyhow::bail!(InvalidOAuthState);
        }
        let access_token = format!("{}-token", provider.id);
        Ok(tokens(access_token, None))
    }

    async fn refresh(
        &self,
        _: &Context,
        provider: &VcsClient,
        _: &str,
        _: &str,
    ) -> Result<TokenPair> {
        anyhow::bail!(ReauthenticationRequired::new(&provider.id))
    }
}
