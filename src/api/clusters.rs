//! Cluster registry endpoints.
use actix_web::web::Data;
use actix_web::web::Form;
use actix_web::web::Path;
use actix_web::web::ServiceConfig;
use actix_web::HttpResponse;
use serde::Deserialize;

use portal_context::Context;
use portal_injector::Injector;
use portal_models::cluster::ClusterKind;

use super::guard::Access;
use super::guard::GuardMiddleware;
use super::Error;
use crate::registry::RegisterCluster;
use crate::registry::Registry;

/// Details of a cluster to register.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub api_endpoint: String,
    pub cnsi_name: String,
    #[serde(default)]
    pub skip_ssl_validation: bool,
}

/// Identify a registered cluster.
#[derive(Debug, Deserialize)]
pub struct UnregisterForm {
    pub cnsi_guid: String,
}

/// Configure all API endpoints defined in this module.
pub fn configure(config: &mut ServiceConfig) {
    config
        .service(list)
        .service(list_registered)
        .service(register)
        .service(unregister);
}

/// List all registered clusters.
#[actix_web::get("/cnsis", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn list(context: Context, injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let registry = Registry::new(&injector.store);
    let clusters = registry.list(&context).await?;
    Ok(HttpResponse::Ok().json(clusters))
}

/// List registered clusters the session is logged in to.
#[actix_web::get("/cnsis/registered", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn list_registered(
    context: Context,
    injector: Data<Injector>,
) -> Result<HttpResponse, Error> {
    let registry = Registry::new(&injector.store);
    let connections = registry.list_registered(&context).await?;
    Ok(HttpResponse::Ok().json(connections))
}

/// Register a new cluster of the kind given in the path.
#[actix_web::post("/register/{kind}", wrap = "GuardMiddleware::new(Access::Admin)")]
pub async fn register(
    context: Context,
    injector: Data<Injector>,
    kind: Path<ClusterKind>,
    form: Form<RegisterForm>,
) -> Result<HttpResponse, Error> {
    let form = form.into_inner();
    let request = RegisterCluster {
        api_endpoint: form.api_endpoint,
        kind: kind.into_inner(),
        name: form.cnsi_name,
        skip_ssl_validation: form.skip_ssl_validation,
    };
    let registry = Registry::new(&injector.store);
    let cluster = registry.register(&context, request).await?;
    Ok(HttpResponse::Created().json(cluster))
}

/// Remove a cluster from the registry.
#[actix_web::post("/unregister", wrap = "GuardMiddleware::new(Access::Admin)")]
pub async fn unregister(
    context: Context,
    injector: Data<Injector>,
    form: Form<UnregisterForm>,
) -> Result<HttpResponse, Error> {
    let registry = Registry::new(&injector.store);
    registry.unregister(&context, &form.cnsi_guid).await?;
    Ok(super::done())
}
