//! Send proxied requests to upstream clusters and VCS providers.
//!
//! The [`Upstream`] client takes a fully prepared [`UpstreamRequest`] (credentials already
//! swapped by the caller) and returns the upstream status, headers and a streaming body.
//!
//! The HTTP implementation honours the `HTTP_PROXY`, `HTTPS_PROXY` and `NO_PROXY`
//! environment variables and never follows redirects so they reach the browser unchanged.
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::Stream;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::Client;
use reqwest::Method;
use reqwest::StatusCode;

use portal_conf::ClustersConf;
use portal_context::Context;
use portal_errors::UpstreamFailure;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::UpstreamFixture;

/// String to set as the user agent in HTTP request.
static CLIENT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Alias for a heap-allocated [`Stream`] of response body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Request to forward to an upstream service.
#[derive(Clone, Debug)]
pub struct UpstreamRequest {
    /// Request payload, forwarded as is.
    pub body: Bytes,

    /// Headers to send upstream.
    pub headers: HeaderMap,

    /// HTTP method of the request.
    pub method: Method,

    /// Skip TLS certificate validation of the upstream.
    pub skip_ssl_validation: bool,

    /// The request serves a long lived stream (such as logs) and gets a longer timeout.
    pub streaming: bool,

    /// Identifier of the upstream (cluster GUID or VCS provider ID) for error reporting.
    pub target: String,

    /// Full URL of the upstream resource.
    pub url: String,
}

/// Response returned by an upstream service.
pub struct UpstreamResponse {
    /// Response payload.
    pub body: BodyStream,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response status code.
    pub status: StatusCode,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("headers", &self.headers)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Operations implemented by upstream clients.
#[async_trait::async_trait]
pub trait UpstreamBackend: Send + Sync {
    /// Send a request upstream and return its response.
    ///
    /// Must fail with [`UpstreamFailure`] if the upstream could not be reached.
    /// Responses with error status codes are returned, not failed.
    async fn send(&self, context: &Context, request: UpstreamRequest) -> Result<UpstreamResponse>;
}

/// Send proxied requests to upstream services.
#[derive(Clone)]
pub struct Upstream {
    inner: Arc<dyn UpstreamBackend>,
}

impl Upstream {
    /// Send a request upstream and return its response.
    pub async fn send(
        &self,
        context: &Context,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse> {
        self.inner.send(context, request).await
    }
}

impl<T> From<T> for Upstream
where
    T: UpstreamBackend + 'static,
{
    fn from(value: T) -> Self {
        let inner = Arc::new(value);
        Upstream { inner }
    }
}

/// Upstream client over HTTP(S).
pub struct HttpUpstream {
    insecure: Client,
    request_timeout: Duration,
    stream_timeout: Duration,
    strict: Client,
}

impl HttpUpstream {
    /// Initialise HTTP clients for upstream requests.
    pub fn new(conf: &ClustersConf) -> Result<HttpUpstream> {
        let connect_timeout = Duration::from_secs(conf.connect_timeout_sec);
        let builder = || {
            Client::builder()
                .connect_timeout(connect_timeout)
                .redirect(reqwest::redirect::Policy::none())
                .user_agent(CLIENT_USER_AGENT)
        };
        Ok(HttpUpstream {
            insecure: builder().danger_accept_invalid_certs(true).build()?,
            request_timeout: Duration::from_secs(conf.request_timeout_sec),
            stream_timeout: Duration::from_secs(conf.stream_timeout_sec),
            strict: builder().build()?,
        })
    }
}

#[async_trait::async_trait]
impl UpstreamBackend for HttpUpstream {
    async fn send(&self, context: &Context, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let client = match request.skip_ssl_validation {
            true => &self.insecure,
            false => &self.strict,
        };
        let timeout = match request.streaming {
            true => self.stream_timeout,
            false => self.request_timeout,
        };
        slog::debug!(
            context.logger, "Forwarding request upstream";
            "target" => &request.target, "method" => %request.method
        );

        let target = request.target;
        let response = client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|error| anyhow::anyhow!(error).context(UpstreamFailure::new(&target)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|error| anyhow::anyhow!(error).context(UpstreamFailure::new(&target)))
            })
            .boxed();
        Ok(UpstreamResponse {
            body,
            headers,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::TryStreamExt;
    use reqwest::header::HeaderMap;
    use reqwest::Method;
    use reqwest::StatusCode;

    use portal_context::Context;
    use portal_errors::UpstreamFailure;

    use super::Upstream;
    use super::UpstreamFixture;
    use super::UpstreamRequest;

    fn request(url: &str) -> UpstreamRequest {
        UpstreamRequest {
            body: Bytes::new(),
            headers: HeaderMap::new(),
            method: Method::GET,
            skip_ssl_validation: false,
            streaming: false,
            target: "guid-1".into(),
            url: url.into(),
        }
    }

    #[tokio::test]
    async fn unreachable_upstream() {
        let context = Context::fixture();
        let conf = portal_conf::ClustersConf {
            connect_timeout_sec: 1,
            ..Default::default()
        };
        let upstream = Upstream::from(super::HttpUpstream::new(&conf).unwrap());
        let error = upstream
            .send(&context, request("http://127.0.0.1:1/v2/apps"))
            .await
            .unwrap_err();
        assert!(error.is::<UpstreamFailure>());
    }

    #[tokio::test]
    async fn fixture_records_requests() {
        let context = Context::fixture();
        let fixture = UpstreamFixture::default();
        fixture.respond(StatusCode::CREATED, "created");
        let upstream = Upstream::from(fixture.clone());

        let response = upstream
            .send(&context, request("https://api.one/v2/apps"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        let body: Vec<Bytes> = response.body.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"created".to_vec());

        let requests = fixture.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://api.one/v2/apps");
    }
}
