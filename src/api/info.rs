//! Informational endpoints about the proxy and the current session.
use actix_web::web::Data;
use actix_web::web::ServiceConfig;
use actix_web::HttpResponse;
use prometheus::Encoder;
use prometheus::TextEncoder;

use portal_context::Context;
use portal_errors::Unauthorized;
use portal_injector::Injector;
use portal_store::query::LookupSchemaVersion;

use super::guard::Access;
use super::guard::GuardMiddleware;
use super::Error;
use crate::registry::Registry;

/// Configure all API endpoints defined in this module.
pub fn configure(config: &mut ServiceConfig) {
    config.service(info).service(version);
}

/// Identity of the caller and the state of their connections to registered clusters.
#[actix_web::get("/info", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn info(context: Context, injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let identity = context.identity().ok_or(Unauthorized)?;
    let registry = Registry::new(&injector.store);
    let clusters = registry.connections(&context).await?;
    let response = serde_json::json!({
        "clusters": clusters,
        "user": identity,
    });
    Ok(HttpResponse::Ok().json(response))
}

/// Version of the running proxy and of the store schema.
#[actix_web::get("/version", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn version(context: Context, injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let schema_version = injector.store.query(&context, LookupSchemaVersion).await?;
    let response = serde_json::json!({
        "git_hash": crate::GIT_BUILD_HASH,
        "schema_version": schema_version,
        "version": crate::VERSION,
    });
    Ok(HttpResponse::Ok().json(response))
}

/// Expose metrics in the Prometheus text format.
#[actix_web::get("/metrics")]
pub async fn metrics(registry: Data<prometheus::Registry>) -> Result<HttpResponse, Error> {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    let response = HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer);
    Ok(response)
}
