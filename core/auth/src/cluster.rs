//! Obtain tokens from the authentication endpoints of registered clusters.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;

use portal_conf::ClustersConf;
use portal_context::Context;
use portal_errors::ClusterRejected;
use portal_errors::ClusterUnreachable;
use portal_errors::ReauthenticationRequired;
use portal_models::cluster::ClusterKind;
use portal_models::cluster::ClusterRegistration;
use portal_models::token::TokenPair;

use crate::oauth2::TokenError;

/// Operations implemented by cluster authentication clients.
#[async_trait::async_trait]
pub trait ClusterAuthBackend: Send + Sync {
    /// Exchange user credentials for a cluster token pair.
    ///
    /// Must fail with [`ClusterUnreachable`] if the cluster could not be reached
    /// and with [`ClusterRejected`] if the credentials were refused.
    async fn login(
        &self,
        context: &Context,
        cluster: &ClusterRegistration,
        username: &str,
        password: &str,
    ) -> Result<TokenPair>;

    /// Exchange a refresh token for a new cluster token pair.
    ///
    /// Must fail with [`ReauthenticationRequired`] if the refresh token was refused.
    async fn refresh(
        &self,
        context: &Context,
        cluster: &ClusterRegistration,
        refresh_token: &str,
    ) -> Result<TokenPair>;
}

/// Obtain tokens from the authentication endpoints of registered clusters.
#[derive(Clone)]
pub struct ClusterAuth {
    inner: Arc<dyn ClusterAuthBackend>,
}

impl ClusterAuth {
    /// Exchange user credentials for a cluster token pair.
    pub async fn login(
        &self,
        context: &Context,
        cluster: &ClusterRegistration,
        username: &str,
        password: &str,
    ) -> Result<TokenPair> {
        self.inner.login(context, cluster, username, password).await
    }

    /// Exchange a refresh token for a new cluster token pair.
    pub async fn refresh(
        &self,
        context: &Context,
        cluster: &ClusterRegistration,
        refresh_token: &str,
    ) -> Result<TokenPair> {
        self.inner.refresh(context, cluster, refresh_token).await
    }
}

impl<T> From<T> for ClusterAuth
where
    T: ClusterAuthBackend + 'static,
{
    fn from(value: T) -> Self {
        let inner = Arc::new(value);
        ClusterAuth { inner }
    }
}

/// Subset of the cluster info document used to discover the token endpoint.
#[derive(Debug, Deserialize)]
struct ClusterInfo {
    token_endpoint: String,
}

/// Cluster authentication over HTTP(S).
///
/// Token endpoints are located based on the cluster kind:
///
/// - `hcf` clusters advertise their token endpoint in the `/v2/info` document.
/// - `hce` clusters serve tokens from `/oauth/token` under their API endpoint.
pub struct HttpClusterAuth {
    client_id: String,
    client_secret: String,
    insecure: Client,
    strict: Client,
}

impl HttpClusterAuth {
    /// Initialise clients for cluster authentication endpoints.
    pub fn new(conf: &ClustersConf) -> Result<HttpClusterAuth> {
        let timeout = Duration::from_secs(conf.request_timeout_sec);
        Ok(HttpClusterAuth {
            client_id: conf.client_id.clone(),
            client_secret: conf.client_secret.clone(),
            insecure: crate::oauth2::client(true, timeout)?,
            strict: crate::oauth2::client(false, timeout)?,
        })
    }

    fn client(&self, cluster: &ClusterRegistration) -> &Client {
        match cluster.skip_ssl_validation {
            true => &self.insecure,
            false => &self.strict,
        }
    }

    /// Locate the OAuth token endpoint of a cluster.
    async fn token_url(&self, cluster: &ClusterRegistration) -> Result<String, TokenError> {
        let api = cluster.api_endpoint.trim_end_matches('/');
        match cluster.kind {
            ClusterKind::Hce => Ok(format!("{}/oauth/token", api)),
            ClusterKind::Hcf => {
                let response = self
                    .client(cluster)
                    .get(format!("{}/v2/info", api))
                    .send()
                    .await
                    .and_then(|response| response.error_for_status())
                    .map_err(TokenError::Unreachable)?;
                let text = response.text().await.map_err(TokenError::Unreachable)?;
                let info: ClusterInfo = serde_json::from_str(&text)
                    .map_err(|error| TokenError::InvalidResponse(error.to_string()))?;
                let endpoint = info.token_endpoint.trim_end_matches('/');
                Ok(format!("{}/oauth/token", endpoint))
            }
        }
    }

    async fn token(
        &self,
        cluster: &ClusterRegistration,
        form: &[(&str, &str)],
    ) -> Result<TokenPair, TokenError> {
        let url = self.token_url(cluster).await?;
        crate::oauth2::request_token(
            self.client(cluster),
            &url,
            &self.client_id,
            &self.client_secret,
            form,
        )
        .await
    }
}

#[async_trait::async_trait]
impl ClusterAuthBackend for HttpClusterAuth {
    async fn login(
        &self,
        context: &Context,
        cluster: &ClusterRegistration,
        username: &str,
        password: &str,
    ) -> Result<TokenPair> {
        let form = [
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
        ];
        match self.token(cluster, &form).await {
            Ok(tokens) => Ok(tokens),
            Err(error) if error.is_rejected() => {
                slog::debug!(
                    context.logger, "Cluster rejected login";
                    "cluster" => &cluster.guid, "error" => %error
                );
                Err(anyhow::anyhow!(error).context(ClusterRejected::new(&cluster.guid)))
            }
            Err(error) => {
                Err(anyhow::anyhow!(error).context(ClusterUnreachable::new(&cluster.guid)))
            }
        }
    }

    async fn refresh(
        &self,
        context: &Context,
        cluster: &ClusterRegistration,
        refresh_token: &str,
    ) -> Result<TokenPair> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        match self.token(cluster, &form).await {
            Ok(tokens) => Ok(tokens),
            Err(error) if error.is_rejected() => {
                slog::debug!(
                    context.logger, "Cluster rejected token refresh";
                    "cluster" => &cluster.guid, "error" => %error
                );
                let error = ReauthenticationRequired::new(&cluster.guid);
                Err(anyhow::anyhow!(error))
            }
            Err(error) => {
                Err(anyhow::anyhow!(error).context(ClusterUnreachable::new(&cluster.guid)))
            }
        }
    }
}
