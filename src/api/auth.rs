//! Session and per-cluster authentication endpoints.
use actix_web::web::Data;
use actix_web::web::Form;
use actix_web::web::ServiceConfig;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use serde::Deserialize;

use portal_context::Context;
use portal_errors::Unauthorized;
use portal_injector::Injector;
use portal_models::cluster::ClusterConnection;
use portal_models::session::NewSession;

use super::cookie::SessionCookies;
use super::guard::Access;
use super::guard::GuardMiddleware;
use super::Error;
use crate::registry::Registry;
use crate::vault::Target;
use crate::vault::Vault;

/// Username and password credentials.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Credentials to login to a registered cluster.
#[derive(Debug, Deserialize)]
pub struct ClusterLoginForm {
    pub cnsi_guid: String,
    pub username: String,
    pub password: String,
}

/// Identify a registered cluster.
#[derive(Debug, Deserialize)]
pub struct ClusterForm {
    pub cnsi_guid: String,
}

/// Configure all API endpoints defined in this module.
pub fn configure(config: &mut ServiceConfig) {
    config
        .service(login)
        .service(logout)
        .service(login_cluster)
        .service(logout_cluster)
        .service(verify);
}

/// Login with the SSO identity provider and start a new session.
#[actix_web::post("/auth/login/uaa", wrap = "GuardMiddleware::new(Access::Public)")]
pub async fn login(
    context: Context,
    injector: Data<Injector>,
    cookies: Data<SessionCookies>,
    form: Form<LoginForm>,
) -> Result<HttpResponse, Error> {
    let form = form.into_inner();
    let tokens = injector
        .clients
        .sso
        .login(&context, &form.username, &form.password)
        .await
        .map_err(|error| {
            slog::info!(
                context.logger, "SSO login rejected";
                "user_name" => &form.username,
                "error" => format!("{:#}", error),
            );
            error
        })?;
    let admin_scope = &injector.conf.sso.admin_scope;
    let identity = portal_auth::claims::identity(&tokens.access_token, admin_scope)?;

    let vault = Vault::new(&injector.cipher, &injector.store);
    let session = NewSession {
        sso_tokens: vault.seal(&tokens)?,
        user_id: identity.user_id.clone(),
        user_name: identity.user_name.clone(),
    };
    let session = injector.sessions.create(&context, session).await?;
    slog::info!(
        context.logger, "User logged in";
        "user_id" => &identity.user_id,
        "admin" => identity.admin,
    );

    let cookie = cookies.issue(&session.id)?;
    let response = serde_json::json!({
        "identity": identity,
        "session_expires_at": session.expires_at.unix_timestamp(),
    });
    Ok(HttpResponse::Ok().cookie(cookie).json(response))
}

/// End the current session, if any, and forget all credentials it holds.
#[actix_web::post("/auth/logout", wrap = "GuardMiddleware::new(Access::Public)")]
pub async fn logout(
    context: Context,
    injector: Data<Injector>,
    cookies: Data<SessionCookies>,
    request: HttpRequest,
) -> Result<HttpResponse, Error> {
    if let Some(session_id) = cookies.session_id(&request) {
        let vault = Vault::new(&injector.cipher, &injector.store);
        vault.forget_session(&context, &session_id).await?;
        injector.sessions.destroy(&context, &session_id).await?;
        slog::info!(context.logger, "User logged out");
    }
    let response = HttpResponse::Ok()
        .cookie(cookies.expired())
        .json(serde_json::json!({}));
    Ok(response)
}

/// Login to a registered cluster and store the issued tokens with the session.
#[actix_web::post("/auth/login/cnsi", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn login_cluster(
    context: Context,
    injector: Data<Injector>,
    form: Form<ClusterLoginForm>,
) -> Result<HttpResponse, Error> {
    let form = form.into_inner();
    let session_id = context.session_id().ok_or(Unauthorized)?.to_string();
    let registry = Registry::new(&injector.store);
    let cluster = registry.lookup(&context, &form.cnsi_guid).await?;
    let tokens = injector
        .clients
        .clusters
        .login(&context, &cluster, &form.username, &form.password)
        .await?;

    let vault = Vault::new(&injector.cipher, &injector.store);
    vault
        .persist(&context, &session_id, Target::Cluster(&cluster.guid), &tokens)
        .await?;
    slog::info!(
        context.logger, "Logged in to cluster";
        "cnsi_guid" => &cluster.guid,
    );

    let connection = ClusterConnection {
        cluster,
        token_expiry: Some(tokens.expires_at),
    };
    Ok(HttpResponse::Ok().json(connection))
}

/// Forget the session credentials for a registered cluster.
#[actix_web::post("/auth/logout/cnsi", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn logout_cluster(
    context: Context,
    injector: Data<Injector>,
    form: Form<ClusterForm>,
) -> Result<HttpResponse, Error> {
    let session_id = context.session_id().ok_or(Unauthorized)?;
    let vault = Vault::new(&injector.cipher, &injector.store);
    vault
        .forget_cluster(&context, session_id, &form.cnsi_guid)
        .await?;
    Ok(super::done())
}

/// Report the identity attached to a valid session.
#[actix_web::get("/auth/session/verify", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn verify(context: Context) -> Result<HttpResponse, Error> {
    let identity = context.identity().ok_or(Unauthorized)?;
    Ok(HttpResponse::Ok().json(identity))
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::call_service;
    use actix_web::test::read_body_json;
    use actix_web::test::TestRequest;

    use portal_auth::fixture::ClusterAuthFixture;
    use portal_injector::Injector;

    use crate::api::tests::register_cluster;
    use crate::api::tests::sso_login;
    use crate::vault::Target;
    use crate::vault::Vault;

    #[actix_web::test]
    async fn login_sets_session_cookie() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);

        let request = TestRequest::post()
            .uri("/v1/auth/login/uaa")
            .set_form([("username", "alice"), ("password", "password")])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.response().cookies().next().unwrap().into_owned();
        assert_eq!(cookie.name(), fixture.injector.conf.sessions.cookie_name);
        assert_eq!(cookie.http_only(), Some(true));

        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["identity"]["user_id"], "alice-id");
        assert_eq!(body["identity"]["admin"], false);
    }

    #[actix_web::test]
    async fn login_with_bad_password() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);

        let request = TestRequest::post()
            .uri("/v1/auth/login/uaa")
            .set_form([("username", "alice"), ("password", "wrong")])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.response().cookies().count(), 0);
    }

    #[actix_web::test]
    async fn login_with_malformed_payload() {
        let fixture = Injector::fixture();
        let app = crate::api::test_app!(&fixture);

        let request = TestRequest::post()
            .uri("/v1/auth/login/uaa")
            .set_form([("username", "alice")])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["error"], true);
    }

    #[actix_web::test]
    async fn verify_requires_session() {
        let fixture = Injector::fixture();
        let app = crate::api::test_app!(&fixture);

        let request = TestRequest::get()
            .uri("/v1/auth/session/verify")
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn verify_rejects_tampered_cookie() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let mut cookie = sso_login!(&app, "alice");
        cookie.set_value(format!("{}x", cookie.value()));

        let request = TestRequest::get()
            .uri("/v1/auth/session/verify")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn verify_session_identity() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("admin", "password", true);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "admin");

        let request = TestRequest::get()
            .uri("/v1/auth/session/verify")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["user_id"], "admin-id");
        assert_eq!(body["admin"], true);
    }

    #[actix_web::test]
    async fn cluster_login_and_logout() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::post()
            .uri("/v1/auth/login/cnsi")
            .cookie(cookie.clone())
            .set_form([
                ("cnsi_guid", guid.as_str()),
                ("username", "alice"),
                ("password", ClusterAuthFixture::PASSWORD),
            ])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["guid"], guid.as_str());
        assert!(body["token_expiry"].is_string());

        let session_id = crate::api::tests::session_id(&cookie);
        let vault = Vault::new(&fixture.injector.cipher, &fixture.injector.store);
        let context = fixture.injector.context.clone();
        let tokens = vault
            .lookup(&context, &session_id, Target::Cluster(&guid))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tokens.access_token, format!("{}-access-1", guid));

        let request = TestRequest::post()
            .uri("/v1/auth/logout/cnsi")
            .cookie(cookie)
            .set_form([("cnsi_guid", guid.as_str())])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let tokens = vault
            .lookup(&context, &session_id, Target::Cluster(&guid))
            .await
            .unwrap();
        assert!(tokens.is_none());
    }

    #[actix_web::test]
    async fn cluster_login_rejected() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::post()
            .uri("/v1/auth/login/cnsi")
            .cookie(cookie)
            .set_form([
                ("cnsi_guid", guid.as_str()),
                ("username", "alice"),
                ("password", "wrong"),
            ])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn cluster_login_unreachable() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        fixture.clients.clusters.set_reachable(false);
        let guid = register_cluster(&fixture, "dev").await;
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::post()
            .uri("/v1/auth/login/cnsi")
            .cookie(cookie)
            .set_form([
                ("cnsi_guid", guid.as_str()),
                ("username", "alice"),
                ("password", ClusterAuthFixture::PASSWORD),
            ])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn cluster_login_unknown_cluster() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::post()
            .uri("/v1/auth/login/cnsi")
            .cookie(cookie)
            .set_form([
                ("cnsi_guid", "missing"),
                ("username", "alice"),
                ("password", ClusterAuthFixture::PASSWORD),
            ])
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
