//! Authorization middleware chain applied to API routes.
//!
//! Every route declares the [`Access`] level it requires and is wrapped in a
//! [`GuardMiddleware`] for that level. The middleware runs, in order:
//!
//! 1. Session validation (session and admin routes): the signed session cookie must map
//!    to a live session. The request context is marked as authenticated and the session
//!    expiry extended.
//! 2. Post-upgrade guard (all routes): requests are refused while the upgrade lock file exists.
//! 3. Admin guard (admin routes): the session identity must be an admin.
//!
//! Authenticated requests also nudge the expired sessions cleanup.
use std::future::Ready;
use std::rc::Rc;

use actix_web::body::EitherBody;
use actix_web::dev::forward_ready;
use actix_web::dev::Service;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::dev::Transform;
use actix_web::web::Data;
use actix_web::HttpMessage;
use anyhow::Result;
use futures::future::LocalBoxFuture;

use portal_conf::UpgradeConf;
use portal_context::Context;
use portal_errors::Unauthorized;
use portal_errors::UpgradeInProgress;
use portal_injector::Injector;
use portal_models::auth::AuthContext;
use portal_models::auth::Identity;
use portal_models::token::SealedTokens;

use super::cookie::SessionCookies;
use super::Error;
use crate::cleanup::Cleanup;
use crate::vault::Vault;

/// Access level required by a route.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Access {
    /// No session required.
    Public,

    /// A valid session is required.
    Session,

    /// A valid session owned by an admin user is required.
    Admin,
}

/// Wrap routes with the interceptors required for their [`Access`] level.
#[derive(Clone, Copy, Debug)]
pub struct GuardMiddleware {
    access: Access,
}

impl GuardMiddleware {
    pub fn new(access: Access) -> Self {
        GuardMiddleware { access }
    }
}

impl<S, B> Transform<S, ServiceRequest> for GuardMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = GuardService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let service = GuardService {
            access: self.access,
            service: Rc::new(service),
        };
        std::future::ready(Ok(service))
    }
}

/// Apply the interceptors for an [`Access`] level before calling the wrapped service.
pub struct GuardService<S> {
    access: Access,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for GuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        let access = self.access;
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            match intercept(access, &request).await {
                Ok(context) => {
                    request.extensions_mut().insert(context);
                    let response = service.call(request).await?;
                    Ok(response.map_into_left_body())
                }
                Err(error) => {
                    let response = request.error_response(Error::from(error));
                    Ok(response.map_into_right_body())
                }
            }
        })
    }
}

/// Run the interceptors for the access level and return the request context.
async fn intercept(access: Access, request: &ServiceRequest) -> Result<Context> {
    let injector = request
        .app_data::<Data<Injector>>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("injector not available to the guard middleware"))?;
    let context = request
        .extensions()
        .get::<Context>()
        .cloned()
        .unwrap_or_else(|| injector.context.clone());

    let context = match access {
        Access::Public => context,
        Access::Session | Access::Admin => {
            let cookies = request
                .app_data::<Data<SessionCookies>>()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("session cookies not available to the guard"))?;
            let session_id = cookies
                .session_id(request.request())
                .ok_or(Unauthorized)?;
            authenticate(&context, &injector, &session_id).await?
        }
    };

    upgrade_guard(&injector.conf.upgrade)?;
    if access == Access::Admin {
        crate::registry::require_admin(&context, "access admin routes")?;
    }

    if access != Access::Public {
        if let Some(cleanup) = request.app_data::<Data<Cleanup>>() {
            cleanup.nudge(&context);
        }
    }
    Ok(context)
}

/// Validate the session and derive an authenticated context for the request.
async fn authenticate(
    context: &Context,
    injector: &Injector,
    session_id: &str,
) -> Result<Context> {
    let session = injector
        .sessions
        .load(context, session_id)
        .await?
        .ok_or(Unauthorized)?;
    let identity = identity(injector, &session.sso_tokens)?;
    if identity.user_id != session.user_id {
        slog::warn!(
            context.logger, "Session user does not match SSO token claims";
            "session_user" => &session.user_id,
            "token_user" => &identity.user_id,
        );
        anyhow::bail!(Unauthorized);
    }

    let auth = AuthContext {
        identity,
        session_id: session.id,
    };
    let context = context.derive().authenticated(auth).build();
    injector.sessions.touch(&context, session_id).await?;
    Ok(context)
}

/// Derive the user identity from the SSO tokens stored with the session.
fn identity(injector: &Injector, tokens: &SealedTokens) -> Result<Identity> {
    let vault = Vault::new(&injector.cipher, &injector.store);
    let tokens = vault.unseal(tokens)?;
    portal_auth::claims::identity(&tokens.access_token, &injector.conf.sso.admin_scope)
}

/// Refuse requests while a service upgrade is in progress.
fn upgrade_guard(conf: &UpgradeConf) -> Result<()> {
    let locked = conf
        .lock_file
        .as_ref()
        .map(|path| path.exists())
        .unwrap_or(false);
    if locked {
        anyhow::bail!(UpgradeInProgress {
            retry_after: conf.retry_after_sec,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use actix_web::http::StatusCode;
    use actix_web::test::call_service;
    use actix_web::test::init_service;
    use actix_web::test::read_body_json;
    use actix_web::test::TestRequest;
    use actix_web::web;
    use actix_web::web::Data;
    use actix_web::App;
    use actix_web::HttpResponse;

    use portal_conf::UpgradeConf;
    use portal_errors::UpgradeInProgress;
    use portal_injector::Injector;

    use super::Access;
    use super::GuardMiddleware;
    use crate::api::cookie::SessionCookies;

    #[actix_web::test]
    async fn rejected_requests_get_an_error_response() {
        let fixture = Injector::fixture();
        let app = App::new()
            .app_data(Data::new(fixture.injector.clone()))
            .app_data(Data::new(SessionCookies::fixture()))
            .service(
                web::resource("/guarded")
                    .wrap(GuardMiddleware::new(Access::Session))
                    .route(web::get().to(HttpResponse::Ok)),
            );
        let app = init_service(app).await;

        let request = TestRequest::get().uri("/guarded").to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["error"], true);
    }

    #[test]
    fn upgrade_guard_without_lock_file() {
        let conf = UpgradeConf::default();
        super::upgrade_guard(&conf).unwrap();

        let conf = UpgradeConf {
            lock_file: Some(PathBuf::from("/this/path/does/not/exist.lock")),
            retry_after_sec: 10,
        };
        super::upgrade_guard(&conf).unwrap();
    }

    #[test]
    fn upgrade_guard_with_lock_file() {
        let name = format!("portal-upgrade-{}.lock", uuid::Uuid::new_v4());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, b"upgrading").unwrap();
        let conf = UpgradeConf {
            lock_file: Some(path.clone()),
            retry_after_sec: 10,
        };
        let error = super::upgrade_guard(&conf).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        let upgrade = error.downcast_ref::<UpgradeInProgress>().unwrap();
        assert_eq!(upgrade.retry_after, 10);
    }
}
