//! Forward authenticated requests to registered clusters and VCS providers.
//!
//! Dispatch swaps the browser session for the credentials the session holds with the
//! upstream: the caller never sees (or sends) cluster or VCS tokens.
//!
//! A single forwarding operation serves both regular and streaming requests.
//! When the upstream rejects the stored access token the token pair is refreshed
//! once and the request retried; a second rejection asks the user to login again.
use anyhow::Result;
use bytes::Bytes;
use once_cell::sync::Lazy;
use prometheus::CounterVec;
use prometheus::Opts;
use prometheus::Registry as MetricsRegistry;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use reqwest::StatusCode;
use time::OffsetDateTime;

use portal_auth::VcsClient;
use portal_clients_upstream::UpstreamRequest;
use portal_clients_upstream::UpstreamResponse;
use portal_context::Context;
use portal_errors::NotLoggedInToCluster;
use portal_errors::ReauthenticationRequired;
use portal_errors::Unauthorized;
use portal_errors::VcsNotLinked;
use portal_injector::Injector;
use portal_models::cluster::ClusterRegistration;
use portal_models::token::TokenPair;

use crate::registry::Registry;
use crate::vault::Target;
use crate::vault::Vault;

/// Request headers never forwarded upstream.
///
/// Includes hop-by-hop headers and the browser credentials replaced by dispatch.
const STRIPPED_REQUEST_HEADERS: [&str; 12] = [
    "authorization",
    "connection",
    "content-length",
    "cookie",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Response headers never returned to the browser.
const STRIPPED_RESPONSE_HEADERS: [&str; 9] = [
    "connection",
    "content-length",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Number of requests forwarded upstream.
pub static DISPATCH_REQUESTS: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "portal_dispatch_requests",
            "Number of requests forwarded upstream",
        ),
        &["upstream"],
    )
    .expect("failed to initialise DISPATCH_REQUESTS counter")
});

/// Number of forwarded requests that failed to reach the upstream.
pub static DISPATCH_UPSTREAM_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        Opts::new(
            "portal_dispatch_upstream_errors",
            "Number of forwarded requests that failed to reach the upstream",
        ),
        &["upstream"],
    )
    .expect("failed to initialise DISPATCH_UPSTREAM_ERRORS counter")
});

/// Register dispatch metrics with the given registry.
pub fn register_metrics(registry: &MetricsRegistry) -> Result<()> {
    registry.register(Box::new(DISPATCH_REQUESTS.clone()))?;
    registry.register(Box::new(DISPATCH_UPSTREAM_ERRORS.clone()))?;
    Ok(())
}

/// Request received from the browser to forward upstream.
#[derive(Clone, Debug)]
pub struct ForwardRequest {
    /// Request payload.
    pub body: Bytes,

    /// Headers received from the browser.
    pub headers: HeaderMap,

    /// HTTP method of the request.
    pub method: Method,

    /// Path of the upstream resource, relative to the upstream base URL.
    pub path: String,

    /// Query string, without the leading `?`.
    pub query: String,

    /// The request opens a long lived stream.
    pub streaming: bool,
}

/// Forward a request to a registered cluster using the session credentials.
pub async fn cluster(
    context: &Context,
    injector: &Injector,
    guid: &str,
    request: ForwardRequest,
) -> Result<UpstreamResponse> {
    let registry = Registry::new(&injector.store);
    let cluster = registry.lookup(context, guid).await?;
    let upstream = ClusterUpstream { cluster };
    forward(context, injector, &upstream, request).await
}

/// Forward a request to a VCS provider API using the session credentials.
pub async fn vcs(
    context: &Context,
    injector: &Injector,
    provider: &str,
    request: ForwardRequest,
) -> Result<UpstreamResponse> {
    let provider = injector.vcs.get(provider)?;
    let upstream = VcsUpstream { provider };
    forward(context, injector, &upstream, request).await
}

/// Remove headers that must not be returned to the browser.
pub fn filter_response_headers(
    headers: &HeaderMap,
) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
    headers
        .iter()
        .filter(|(name, _)| !STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()))
}

/// Upstream services requests can be forwarded to.
#[async_trait::async_trait]
trait Upstream: Send + Sync {
    /// Base URL requests paths are relative to.
    fn base_url(&self) -> &str;

    /// Error returned when the session holds no credentials for the upstream.
    fn not_linked(&self) -> anyhow::Error;

    /// Obtain a new token pair using the refresh token.
    async fn refresh(
        &self,
        context: &Context,
        injector: &Injector,
        refresh_token: &str,
    ) -> Result<TokenPair>;

    /// Skip TLS certificate validation when forwarding requests.
    fn skip_ssl_validation(&self) -> bool;

    /// Identify the upstream credentials are issued for.
    fn target(&self) -> Target<'_>;

    /// Label to group metrics by.
    fn metrics_label(&self) -> &'static str;
}

struct ClusterUpstream {
    cluster: ClusterRegistration,
}

#[async_trait::async_trait]
impl Upstream for ClusterUpstream {
    fn base_url(&self) -> &str {
        &self.cluster.api_endpoint
    }

    fn not_linked(&self) -> anyhow::Error {
        anyhow::anyhow!(NotLoggedInToCluster::new(&self.cluster.guid))
    }

    async fn refresh(
        &self,
        context: &Context,
        injector: &Injector,
        refresh_token: &str,
    ) -> Result<TokenPair> {
        injector
            .clients
            .clusters
            .refresh(context, &self.cluster, refresh_token)
            .await
    }

    fn skip_ssl_validation(&self) -> bool {
        self.cluster.skip_ssl_validation
    }

    fn target(&self) -> Target<'_> {
        Target::Cluster(&self.cluster.guid)
    }

    fn metrics_label(&self) -> &'static str {
        "cluster"
    }
}

struct VcsUpstream<'a> {
    provider: &'a VcsClient,
}

#[async_trait::async_trait]
impl<'a> Upstream for VcsUpstream<'a> {
    fn base_url(&self) -> &str {
        &self.provider.api_url
    }

    fn not_linked(&self) -> anyhow::Error {
        anyhow::anyhow!(VcsNotLinked::new(&self.provider.id))
    }

    async fn refresh(
        &self,
        context: &Context,
        injector: &Injector,
        refresh_token: &str,
    ) -> Result<TokenPair> {
        let secret = self.provider.client_secret(&injector.cipher)?;
        injector
            .clients
            .vcs
            .refresh(context, self.provider, &secret, refresh_token)
            .await
    }

    fn skip_ssl_validation(&self) -> bool {
        self.provider.skip_ssl_validation
    }

    fn target(&self) -> Target<'_> {
        Target::Vcs(&self.provider.id)
    }

    fn metrics_label(&self) -> &'static str {
        "vcs"
    }
}

/// Forward a request upstream, refreshing the session credentials at most once.
async fn forward<U>(
    context: &Context,
    injector: &Injector,
    upstream: &U,
    request: ForwardRequest,
) -> Result<UpstreamResponse>
where
    U: Upstream,
{
    let session_id = context.session_id().ok_or(Unauthorized)?;
    let vault = Vault::new(&injector.cipher, &injector.store);
    let target = upstream.target();
    let tokens = vault
        .lookup(context, session_id, target)
        .await?
        .ok_or_else(|| upstream.not_linked())?;

    // Expired tokens are refreshed before use or, without a refresh token, not used at all.
    let expired = !tokens.is_live(OffsetDateTime::now_utc());
    let (tokens, refreshed) = match tokens.refresh_token.clone() {
        Some(refresh_token) if expired => {
            slog::debug!(
                context.logger, "Refreshing expired upstream token";
                "target" => target.id()
            );
            let tokens = refresh(context, injector, upstream, &vault, &refresh_token).await?;
            (tokens, true)
        }
        None if expired => return Err(upstream.not_linked()),
        _ => (tokens, false),
    };

    let response = send(context, injector, upstream, &request, &tokens).await?;
    if response.status != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    // The upstream rejected the token: refresh once and retry.
    let refresh_token = match (&tokens.refresh_token, refreshed) {
        (Some(refresh_token), false) => refresh_token,
        _ => anyhow::bail!(ReauthenticationRequired::new(target.id())),
    };
    slog::debug!(
        context.logger, "Upstream rejected token, refreshing and retrying";
        "target" => target.id()
    );
    let tokens = refresh(context, injector, upstream, &vault, refresh_token).await?;
    let response = send(context, injector, upstream, &request, &tokens).await?;
    if response.status == StatusCode::UNAUTHORIZED {
        anyhow::bail!(ReauthenticationRequired::new(target.id()));
    }
    Ok(response)
}

/// Refresh the session credentials and store the new token pair.
async fn refresh<U>(
    context: &Context,
    injector: &Injector,
    upstream: &U,
    vault: &Vault,
    refresh_token: &str,
) -> Result<TokenPair>
where
    U: Upstream,
{
    let session_id = context.session_id().ok_or(Unauthorized)?;
    let mut tokens = upstream.refresh(context, injector, refresh_token).await?;
    if tokens.refresh_token.is_none() {
        tokens.refresh_token = Some(refresh_token.to_string());
    }
    vault
        .persist(context, session_id, upstream.target(), &tokens)
        .await?;
    Ok(tokens)
}

/// Build and send the outbound request with the given credentials.
async fn send<U>(
    context: &Context,
    injector: &Injector,
    upstream: &U,
    request: &ForwardRequest,
    tokens: &TokenPair,
) -> Result<UpstreamResponse>
where
    U: Upstream,
{
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers.iter() {
        if !STRIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    let bearer = HeaderValue::from_str(&format!("Bearer {}", tokens.access_token))?;
    headers.insert(AUTHORIZATION, bearer);

    let outbound = UpstreamRequest {
        body: request.body.clone(),
        headers,
        method: request.method.clone(),
        skip_ssl_validation: upstream.skip_ssl_validation(),
        streaming: request.streaming,
        target: upstream.target().id().to_string(),
        url: upstream_url(upstream.base_url(), &request.path, &request.query),
    };
    let label = upstream.metrics_label();
    DISPATCH_REQUESTS.with_label_values(&[label]).inc();
    let response = injector.clients.upstream.send(context, outbound).await;
    if response.is_err() {
        DISPATCH_UPSTREAM_ERRORS.with_label_values(&[label]).inc();
    }
    response
}

/// Join the upstream base URL with the request path and query.
fn upstream_url(base: &str, path: &str, query: &str) -> String {
    let mut url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if !query.is_empty() {
        url.push('?');
        url.push_str(query);
    }
    url
}
