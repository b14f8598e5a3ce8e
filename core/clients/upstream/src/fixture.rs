//! In-memory upstream for unit tests.
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use portal_context::Context;
use portal_errors::UpstreamFailure;

use super::UpstreamBackend;
use super::UpstreamRequest;
use super::UpstreamResponse;

/// Upstream that records requests and replies with queued responses.
///
/// When no response is queued requests are answered with `200 OK` and an empty JSON object.
#[derive(Clone)]
pub struct UpstreamFixture {
    reachable: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<UpstreamRequest>>>,
    responses: Arc<Mutex<VecDeque<(StatusCode, String)>>>,
}

impl UpstreamFixture {
    /// Requests received so far.
    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests
            .lock()
            .expect("UpstreamFixture::requests lock poisoned")
            .clone()
    }

    /// Queue a response for the next request.
    pub fn respond<B: Into<String>>(&self, status: StatusCode, body: B) {
        self.responses
            .lock()
            .expect("UpstreamFixture::responses lock poisoned")
            .push_back((status, body.into()));
    }

    /// Control if the fixture behaves as if the upstream could be reached.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl Default for UpstreamFixture {
    fn default() -> Self {
        UpstreamFixture {
            reachable: Arc::new(AtomicBool::new(true)),
            requests: Default::default(),
            responses: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl UpstreamBackend for UpstreamFixture {
    async fn send(&self, _: &Context, request: UpstreamRequest) -> Result<UpstreamResponse> {
        if !self.reachable.load(Ordering::SeqCst) {
            anyhow::bail!(UpstreamFailure::new(&request.target));
        }
        self.requests
            .lock()
            .expect("UpstreamFixture::requests lock poisoned")
            .push(request);

        let (status, body) = self
            .responses
            .lock()
            .expect("UpstreamFixture::responses lock poisoned")
            .pop_front()
            .unwrap_or_else(|| (StatusCode::OK, "{}".to_string()));
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let body = futures::stream::iter(vec![Ok::<_, anyhow::Error>(Bytes::from(body))]).boxed();
        Ok(UpstreamResponse {
            body,
            headers,
            status,
        })
    }
}
