//! API endpoints and the middlewares protecting them.
use actix_cors::Cors;
use actix_web::http::Method;
use actix_web::web;
use actix_web::web::ServiceConfig;
use actix_web::HttpResponse;
use serde_json::json;

use portal_conf::HttpConf;
use portal_errors::BadRequest;

pub mod auth;
pub mod clusters;
pub mod cookie;
mod error;
pub mod guard;
pub mod info;
pub mod proxy;
pub mod vcs;

pub use self::error::Error;

/// Largest request payload accepted for proxied requests.
const PAYLOAD_LIMIT: usize = 32 * 1024 * 1024;

/// Configure an HTTP Server with all endpoints in this API module.
///
/// Handlers expect the following application data to be available:
///
/// - [`Data<Injector>`](portal_injector::Injector) with process dependencies.
/// - [`Data<SessionCookies>`](self::cookie::SessionCookies) to verify session cookies.
/// - [`Data<Registry>`](prometheus::Registry) with the metrics to expose.
/// - Optionally, [`Data<Cleanup>`](crate::cleanup::Cleanup) to nudge sessions cleanup.
pub fn configure(config: &mut ServiceConfig) {
    let v1 = web::scope("/v1")
        .configure(self::auth::configure)
        .configure(self::clusters::configure)
        .configure(self::info::configure)
        .configure(self::vcs::configure)
        .configure(self::proxy::configure);
    config
        .app_data(form_config())
        .app_data(query_config())
        .app_data(web::PayloadConfig::new(PAYLOAD_LIMIT))
        .service(self::info::metrics)
        .service(v1);
}

/// Cross-origin policy for browser clients served from the configured origins.
///
/// Credentials are allowed so the session cookie is sent along. The `*` origin
/// accepts any origin.
pub fn cors(conf: &HttpConf) -> Cors {
    let cors = Cors::default()
        .allowed_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
        .allow_any_header()
        .supports_credentials();
    conf.allowed_origins
        .iter()
        .fold(cors, |cors, origin| match origin.as_str() {
            "*" => cors.allow_any_origin(),
            origin => cors.allowed_origin(origin),
        })
}

/// Report payload decoding errors with the API error format.
fn form_config() -> web::FormConfig {
    web::FormConfig::default().error_handler(|error, _| {
        Error::from(BadRequest::new(error.to_string())).into()
    })
}

/// Report query string decoding errors with the API error format.
fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|error, _| {
        Error::from(BadRequest::new(error.to_string())).into()
    })
}

/// Standard response for successful operations with no payload.
pub fn done() -> HttpResponse {
    HttpResponse::Ok().json(json!({}))
}

/// Initialise an actix test service with all API endpoints and fixture dependencies.
#[cfg(test)]
macro_rules! test_app {
    ($fixture:expr) => {{
        let fixture: &portal_injector::InjectorFixture = $fixture;
        let cookies = $crate::api::cookie::SessionCookies::fixture();
        let cleanup = $crate::cleanup::Cleanup::new(&fixture.injector);
        let app = actix_web::App::new()
            .app_data(actix_web::web::Data::new(fixture.injector.clone()))
            .app_data(actix_web::web::Data::new(cookies))
            .app_data(actix_web::web::Data::new(cleanup))
            .app_data(actix_web::web::Data::new(prometheus::Registry::new()))
            .configure($crate::api::configure)
            .wrap(portal_context::ContextMiddleware::new(fixture.injector.context.clone()));
        actix_web::test::init_service(app).await
    }};
}

#[cfg(test)]
pub(crate) use test_app;
