//! Authenticate users with the SSO identity provider.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

use portal_conf::SsoConf;
use portal_context::Context;
use portal_errors::Unauthorized;
use portal_errors::UpstreamFailure;
use portal_models::token::TokenPair;

use crate::oauth2::TokenError;

/// Name used to report identity provider errors.
const SSO_TARGET: &str = "sso";

/// Operations implemented by SSO identity providers.
#[async_trait::async_trait]
pub trait IdentityProviderBackend: Send + Sync {
    /// Exchange user credentials for a token pair.
    ///
    /// Must fail with [`Unauthorized`] if the credentials are refused.
    async fn login(&self, context: &Context, username: &str, password: &str) -> Result<TokenPair>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, context: &Context, refresh_token: &str) -> Result<TokenPair>;
}

/// Authenticate users with the configured SSO identity provider.
#[derive(Clone)]
pub struct IdentityProvider {
    inner: Arc<dyn IdentityProviderBackend>,
}

impl IdentityProvider {
    /// Exchange user credentials for a token pair.
    pub async fn login(
        &self,
        context: &Context,
        username: &str,
        password: &str,
    ) -> Result<TokenPair> {
        self.inner.login(context, username, password).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, context: &Context, refresh_token: &str) -> Result<TokenPair> {
        self.inner.refresh(context, refresh_token).await
    }
}

impl<T> From<T> for IdentityProvider
where
    T: IdentityProviderBackend + 'static,
{
    fn from(value: T) -> Self {
        let inner = Arc::new(value);
        IdentityProvider { inner }
    }
}

/// UAA style identity provider using the OAuth2 password grant.
pub struct UaaIdentityProvider {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl UaaIdentityProvider {
    /// Initialise a client for the configured identity provider.
    pub fn new(conf: &SsoConf) -> Result<UaaIdentityProvider> {
        let timeout = Duration::from_secs(conf.timeout_sec);
        let client = crate::oauth2::client(conf.skip_ssl_validation, timeout)?;
        Ok(UaaIdentityProvider {
            client,
            client_id: conf.client_id.clone(),
            client_secret: conf.client_secret.clone(),
            token_url: conf.token_url.clone(),
        })
    }

    async fn token(&self, context: &Context, form: &[(&str, &str)]) -> Result<TokenPair> {
        let result = crate::oauth2::request_token(
            &self.client,
            &self.token_url,
            &self.client_id,
            &self.client_secret,
            form,
        )
        .await;
        match result {
            Ok(tokens) => Ok(tokens),
            Err(error) if error.is_rejected() => {
                slog::debug!(
                    context.logger, "Identity provider rejected the grant";
                    "error" => %error,
                );
                Err(anyhow::anyhow!(error).context(Unauthorized))
            }
            Err(error) => Err(map_failure(error)),
        }
    }
}

#[async_trait::async_trait]
impl IdentityProviderBackend for UaaIdentityProvider {
    async fn login(&self, context: &Context, username: &str, password: &str) -> Result<TokenPair> {
        let form = [
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ];
        self.token(context, &form).await
    }

    async fn refresh(&self, context: &Context, refresh_token: &str) -> Result<TokenPair> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token(context, &form).await
    }
}

fn map_failure(error: TokenError) -> anyhow::Error {
    anyhow::anyhow!(error).context(UpstreamFailure::new(SSO_TARGET))
}

#[cfg(test)]
mod tests {
    use portal_context::Context;
    use portal_errors::Unauthorized;

    use super::IdentityProvider;
    use crate::fixture::IdentityProviderFixture;

    #[tokio::test]
    async fn fixture_login() {
        let context = Context::fixture();
        let fixture = IdentityProviderFixture::default();
        fixture.add_user("alice", "secret", false);
        let sso = IdentityProvider::from(fixture);

        let tokens = sso.login(&context, "alice", "secret").await.unwrap();
        let identity = crate::claims::identity(&tokens.access_token, "stackato.admin").unwrap();
        assert_eq!(identity.user_name, "alice");

        let error = sso.login(&context, "alice", "wrong").await.unwrap_err();
        assert!(error.is::<Unauthorized>());
    }
}
