//! Forward browser requests to registered clusters.
//!
//! Also provides the conversions between actix requests and responses and the
//! dispatch types shared with the VCS passthrough endpoint.
use actix_web::http::header::HeaderName as ActixHeaderName;
use actix_web::http::header::HeaderValue as ActixHeaderValue;
use actix_web::http::StatusCode as ActixStatusCode;
use actix_web::web;
use actix_web::web::Data;
use actix_web::web::Path;
use actix_web::web::ServiceConfig;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use anyhow::Result;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::Method;

use portal_clients_upstream::UpstreamResponse;
use portal_context::Context;
use portal_injector::Injector;

use super::guard::Access;
use super::guard::GuardMiddleware;
use super::Error;
use crate::dispatch::ForwardRequest;

/// Configure all API endpoints defined in this module.
pub fn configure(config: &mut ServiceConfig) {
    config
        .service(
            web::resource("/proxy/{cnsi_guid}/{tail:.*}")
                .wrap(GuardMiddleware::new(Access::Session))
                .route(web::route().to(forward)),
        )
        .service(stream);
}

/// Forward any request to the cluster API using the session credentials.
pub async fn forward(
    context: Context,
    injector: Data<Injector>,
    request: HttpRequest,
    path: Path<(String, String)>,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    let (guid, tail) = path.into_inner();
    let forward = forward_request(&request, body, tail, false)?;
    let response = crate::dispatch::cluster(&context, &injector, &guid, forward).await?;
    let response = into_response(response)?;
    Ok(response)
}

/// Stream application logs from a cluster.
#[actix_web::get(
    "/{cnsi_guid}/apps/{app_guid}/stream",
    wrap = "GuardMiddleware::new(Access::Session)"
)]
pub async fn stream(
    context: Context,
    injector: Data<Injector>,
    request: HttpRequest,
    path: Path<(String, String)>,
) -> Result<HttpResponse, Error> {
    let (guid, app_guid) = path.into_inner();
    let path = format!("v2/apps/{}/stream", app_guid);
    let forward = forward_request(&request, Bytes::new(), path, true)?;
    let response = crate::dispatch::cluster(&context, &injector, &guid, forward).await?;
    let response = into_response(response)?;
    Ok(response)
}

/// Convert an incoming request into a dispatch [`ForwardRequest`].
pub(super) fn forward_request(
    request: &HttpRequest,
    body: Bytes,
    path: String,
    streaming: bool,
) -> Result<ForwardRequest> {
    let method = Method::from_bytes(request.method().as_str().as_bytes())?;
    let mut headers = HeaderMap::new();
    for (name, value) in request.headers().iter() {
        let name = HeaderName::from_bytes(name.as_str().as_bytes())?;
        let value = HeaderValue::from_bytes(value.as_bytes())?;
        headers.append(name, value);
    }
    Ok(ForwardRequest {
        body,
        headers,
        method,
        path,
        query: request.query_string().to_string(),
        streaming,
    })
}

/// Relay an upstream response, streaming its body back to the browser.
pub(super) fn into_response(upstream: UpstreamResponse) -> Result<HttpResponse> {
    let status = ActixStatusCode::from_u16(upstream.status.as_u16())?;
    let mut response = HttpResponse::build(status);
    for (name, value) in crate::dispatch::filter_response_headers(&upstream.headers) {
        let name = ActixHeaderName::from_bytes(name.as_str().as_bytes())?;
        let value = ActixHeaderValue::from_bytes(value.as_bytes())?;
        response.append_header((name, value));
    }
    let body = upstream.body.map_err(std::io::Error::other);
    Ok(response.streaming(body))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::call_service;
    use actix_web::test::read_body;
    use actix_web::test::read_body_json;
    use actix_web::test::TestRequest;

    use portal_auth::fixture::ClusterAuthFixture;
    use portal_injector::Injector;

    use crate::api::tests::register_cluster;
    use crate::api::tests::sso_login;

    macro_rules! cluster_login {
        ($app:expr, $cookie:expr, $guid:expr) => {{
            let request = TestRequest::post()
                .uri("/v1/auth/login/cnsi")
                .cookie($cookie.clone())
                .set_form([
                    ("cnsi_guid", $guid),
                    ("username", "alice"),
                    ("password", ClusterAuthFixture::PASSWORD),
                ])
                .to_request();
            let response = call_service($app, request).await;
            assert_eq!(response.status(), StatusCode::OK);
        }};
    }

    #[actix_web::test]
    async fn proxy_without_cluster_login() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri(&format!("/v1/proxy/{}/v2/apps", guid))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(fixture.clients.upstream.requests().is_empty());
    }

    #[actix_web::test]
    async fn proxy_unknown_cluster() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri("/v1/proxy/missing/v2/apps")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn proxy_relays_upstream_errors_verbatim() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");
        cluster_login!(&app, cookie, guid.as_str());

        fixture
            .clients
            .upstream
            .respond(reqwest::StatusCode::NOT_FOUND, r#"{"code":10000}"#);
        let request = TestRequest::delete()
            .uri(&format!("/v1/proxy/{}/v2/apps/abc", guid))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["code"], 10000);

        let requests = fixture.clients.upstream.requests();
        assert_eq!(requests[0].method, reqwest::Method::DELETE);
        assert!(!requests[0].streaming);
    }

    #[actix_web::test]
    async fn proxy_forwards_body() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");
        cluster_login!(&app, cookie, guid.as_str());

        let request = TestRequest::put()
            .uri(&format!("/v1/proxy/{}/v2/apps/abc", guid))
            .cookie(cookie)
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"name":"app"}"#)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let requests = fixture.clients.upstream.requests();
        assert_eq!(requests[0].body.as_ref(), br#"{"name":"app"}"#);
        assert_eq!(
            requests[0].headers.get("content-type").unwrap(),
            "application/json"
        );
    }

    #[actix_web::test]
    async fn proxy_unreachable_upstream() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");
        cluster_login!(&app, cookie, guid.as_str());

        fixture.clients.upstream.set_reachable(false);
        let request = TestRequest::get()
            .uri(&format!("/v1/proxy/{}/v2/info", guid))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn proxy_reauthentication_required() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");
        cluster_login!(&app, cookie, guid.as_str());

        fixture.clients.clusters.set_refresh_allowed(false);
        fixture
            .clients
            .upstream
            .respond(reqwest::StatusCode::UNAUTHORIZED, "{}");
        let request = TestRequest::get()
            .uri(&format!("/v1/proxy/{}/v2/apps", guid))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(fixture.clients.upstream.requests().len(), 1);
    }

    #[actix_web::test]
    async fn stream_app_logs() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");
        cluster_login!(&app, cookie, guid.as_str());

        fixture
            .clients
            .upstream
            .respond(reqwest::StatusCode::OK, "log line\n");
        let request = TestRequest::get()
            .uri(&format!("/v1/{}/apps/app-1/stream", guid))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_body(response).await;
        assert_eq!(body.as_ref(), b"log line\n");

        let requests = fixture.clients.upstream.requests();
        assert_eq!(
            requests[0].url,
            "https://api.dev.example.com/v2/apps/app-1/stream"
        );
        assert!(requests[0].streaming);
    }
}
