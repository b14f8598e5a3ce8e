//! Link user sessions to version control providers with OAuth.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use reqwest::Url;
use serde::Serialize;

use portal_cipher::Cipher;
use portal_conf::VcsProviderConf;
use portal_context::Context;
use portal_errors::ReauthenticationRequired;
use portal_errors::UpstreamFailure;
use portal_errors::VcsProviderNotFound;
use portal_models::token::TokenPair;

/// Timeout for requests to VCS token endpoints.
const VCS_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// The authorize URL of a VCS provider is not valid.
#[derive(Debug, thiserror::Error)]
#[error("the authorize URL for VCS provider '{provider}' is not valid")]
pub struct InvalidAuthorizeUrl {
    pub provider: String,
}

/// Configuration of a VCS provider with its client secret kept encrypted.
#[derive(Clone, Debug)]
pub struct VcsClient {
    /// Base URL of the provider REST API.
    pub api_url: String,

    /// URL of the provider OAuth authorisation page.
    pub authorize_url: String,

    /// URL the provider redirects users to after authorisation.
    pub callback_url: String,

    /// OAuth client ID registered with the provider.
    pub client_id: String,

    /// Unique identifier of the provider.
    pub id: String,

    /// Human readable name of the provider.
    pub label: String,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// Encrypted OAuth client secret.
    pub sealed_client_secret: Vec<u8>,

    /// Skip TLS certificate validation of the provider.
    pub skip_ssl_validation: bool,

    /// URL of the provider OAuth token endpoint.
    pub token_url: String,
}

impl VcsClient {
    /// Decrypt the OAuth client secret for immediate use.
    pub fn client_secret(&self, cipher: &Cipher) -> Result<String> {
        cipher.decrypt_string(&self.sealed_client_secret)
    }

    /// Seal a provider configuration with the given cipher.
    pub fn seal(conf: &VcsProviderConf, cipher: &Cipher) -> Result<VcsClient> {
        let sealed_client_secret = cipher.encrypt(conf.client_secret.as_bytes())?;
        Ok(VcsClient {
            api_url: conf.api_url.clone(),
            authorize_url: conf.authorize_url.clone(),
            callback_url: conf.callback_url.clone(),
            client_id: conf.client_id.clone(),
            id: conf.id.clone(),
            label: conf.label.clone(),
            scopes: conf.scopes.clone(),
            sealed_client_secret,
            skip_ssl_validation: conf.skip_ssl_validation,
            token_url: conf.token_url.clone(),
        })
    }
}

/// Public details of a VCS provider, safe to return to browsers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VcsClientInfo {
    pub api_url: String,
    pub id: String,
    pub label: String,
}

impl From<&VcsClient> for VcsClientInfo {
    fn from(value: &VcsClient) -> Self {
        VcsClientInfo {
            api_url: value.api_url.clone(),
            id: value.id.clone(),
            label: value.label.clone(),
        }
    }
}

/// Set of VCS providers configured at startup.
#[derive(Clone, Default)]
pub struct VcsProviders {
    providers: Arc<BTreeMap<String, VcsClient>>,
}

impl VcsProviders {
    /// Load providers from configuration, encrypting their client secrets.
    pub fn from_conf(conf: &[VcsProviderConf], cipher: &Cipher) -> Result<VcsProviders> {
        let mut providers = BTreeMap::new();
        for provider in conf {
            let client = VcsClient::seal(provider, cipher)?;
            providers.insert(client.id.clone(), client);
        }
        Ok(VcsProviders {
            providers: Arc::new(providers),
        })
    }

    /// Lookup a provider by ID.
    pub fn get(&self, id: &str) -> Result<&VcsClient> {
        self.providers
            .get(id)
            .ok_or_else(|| anyhow::anyhow!(VcsProviderNotFound::new(id)))
    }

    /// Iterate over configured providers, sorted by ID.
    pub fn iter(&self) -> impl Iterator<Item = &VcsClient> {
        self.providers.values()
    }
}

/// Build the URL to redirect browsers to when starting an OAuth flow.
pub fn authorize_url(provider: &VcsClient, state: &str) -> Result<String> {
    let mut url = Url::parse(&provider.authorize_url).map_err(|error| {
        let provider = provider.id.clone();
        anyhow::anyhow!(error).context(InvalidAuthorizeUrl { provider })
    })?;
    url.query_pairs_mut()
        .append_pair("client_id", &provider.client_id)
        .append_pair("redirect_uri", &provider.callback_url)
        .append_pair("response_type", "code")
        .append_pair("scope", &provider.scopes.join(" "))
        .append_pair("state", state);
    Ok(url.to_string())
}

/// Operations implemented by VCS OAuth clients.
#[async_trait::async_trait]
pub trait VcsOAuthBackend: Send + Sync {
    /// Exchange an authorisation code for a token pair.
    async fn exchange(
        &self,
        context: &Context,
        provider: &VcsClient,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenPair>;

    /// Exchange a refresh token for a new token pair.
    ///
    /// Must fail with [`ReauthenticationRequired`] if the refresh token was refused.
    async fn refresh(
        &self,
        context: &Context,
        provider: &VcsClient,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenPair>;
}

/// Exchange codes and refresh tokens with VCS providers.
#[derive(Clone)]
pub struct VcsOAuth {
    inner: Arc<dyn VcsOAuthBackend>,
}

impl VcsOAuth {
    /// Exchange an authorisation code for a token pair.
    pub async fn exchange(
        &self,
        context: &Context,
        provider: &VcsClient,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenPair> {
        self.inner
            .exchange(context, provider, client_secret, code)
            .await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(
        &self,
        context: &Context,
        provider: &VcsClient,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenPair> {
        self.inner
            .refresh(context, provider, client_secret, refresh_token)
            .await
    }
}

impl<T> From<T> for VcsOAuth
where
    T: VcsOAuthBackend + 'static,
{
    fn from(value: T) -> Self {
        let inner = Arc::new(value);
        VcsOAuth { inner }
    }
}

/// VCS OAuth over HTTP(S).
pub struct HttpVcsOAuth {
    insecure: Client,
    strict: Client,
}

impl HttpVcsOAuth {
    /// Initialise clients for VCS token endpoints.
    pub fn new() -> Result<HttpVcsOAuth> {
        Ok(HttpVcsOAuth {
            insecure: crate::oauth2::client(true, VCS_TOKEN_TIMEOUT)?,
            strict: crate::oauth2::client(false, VCS_TOKEN_TIMEOUT)?,
        })
    }

    fn client(&self, provider: &VcsClient) -> &Client {
        match provider.skip_ssl_validation {
            true => &self.insecure,
            false => &self.strict,
        }
    }
}

#[async_trait::async_trait]
impl VcsOAuthBackend for HttpVcsOAuth {
    async fn exchange(
        &self,
        _: &Context,
        provider: &VcsClient,
        client_secret: &str,
        code: &str,
    ) -> Result<TokenPair> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider.callback_url.as_str()),
        ];
        crate::oauth2::request_token(
            self.client(provider),
            &provider.token_url,
            &provider.client_id,
            client_secret,
            &form,
        )
        .await
        .map_err(|error| anyhow::anyhow!(error).context(UpstreamFailure::new(&provider.id)))
    }

    async fn refresh(
        &self,
        _: &Context,
        provider: &VcsClient,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenPair> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let result = crate::oauth2::request_token(
            self.client(provider),
            &provider.token_url,
            &provider.client_id,
            client_secret,
            &form,
        )
        .await;
        match result {
            Ok(tokens) => Ok(tokens),
            Err(error) if error.is_rejected() => {
                Err(anyhow::anyhow!(error).context(ReauthenticationRequired::new(&provider.id)))
            }
            Err(error) => Err(anyhow::anyhow!(error).context(UpstreamFailure::new(&provider.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use portal_cipher::Cipher;
    use portal_conf::VcsProviderConf;
    use portal_errors::VcsProviderNotFound;

    use super::VcsProviders;

    pub fn github() -> VcsProviderConf {
        VcsProviderConf {
            api_url: "https://api.github.com".into(),
            authorize_url: "https://github.com/login/oauth/authorize".into(),
            callback_url: "https://portal.example.com/v1/vcs/oauth/callback".into(),
            client_id: "client".into(),
            client_secret: "hush".into(),
            id: "github".into(),
            label: "GitHub".into(),
            scopes: vec!["repo".into(), "read:org".into()],
            skip_ssl_validation: false,
            token_url: "https://github.com/login/oauth/access_token".into(),
        }
    }

    #[test]
    fn providers_seal_secrets() {
        let cipher = Cipher::fixture();
        let providers = VcsProviders::from_conf(&[github()], &cipher).unwrap();
        let provider = providers.get("github").unwrap();
        assert_ne!(provider.sealed_client_secret, b"hush".to_vec());
        assert_eq!(provider.client_secret(&cipher).unwrap(), "hush");

        let error = providers.get("gitlab").unwrap_err();
        assert!(error.is::<VcsProviderNotFound>());
    }

    #[test]
    fn authorize_url_carries_state() {
        let cipher = Cipher::fixture();
        let providers = VcsProviders::from_conf(&[github()], &cipher).unwrap();
        let provider = providers.get("github").unwrap();
        let url = super::authorize_url(provider, "random-state").unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?client_id=client&"));
        assert!(url.contains("state=random-state"));
        assert!(url.contains("scope=repo+read%3Aorg"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fportal.example.com%2Fv1%2Fvcs%2Foauth%2Fcallback"
        ));
    }
}
