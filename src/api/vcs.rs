//! Link sessions to VCS provider accounts and forward requests to their APIs.
use actix_web::http::header::LOCATION;
use actix_web::web;
use actix_web::web::Data;
use actix_web::web::Path;
use actix_web::web::Query;
use actix_web::web::ServiceConfig;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use bytes::Bytes;
use serde::Deserialize;
use time::OffsetDateTime;

use portal_auth::vcs::VcsClientInfo;
use portal_context::Context;
use portal_errors::InvalidOAuthState;
use portal_errors::Unauthorized;
use portal_injector::Injector;
use portal_models::oauth::OAuthState;
use portal_store::delete::ConsumeOAuthState;

use super::guard::Access;
use super::guard::GuardMiddleware;
use super::Error;
use crate::vault::Target;
use crate::vault::Vault;

/// Time a session has to complete an OAuth flow once started.
const OAUTH_STATE_LIFETIME: time::Duration = time::Duration::minutes(10);

/// Select a VCS provider.
#[derive(Debug, Deserialize)]
pub struct ProviderQuery {
    pub provider: String,
}

/// Parameters the VCS provider redirects the browser back with.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    pub state: String,
}

/// Configure all API endpoints defined in this module.
pub fn configure(config: &mut ServiceConfig) {
    config
        .service(authorize)
        .service(callback)
        .service(clients)
        .service(verify)
        .service(
            web::resource("/vcs/{provider}/{tail:.*}")
                .wrap(GuardMiddleware::new(Access::Session))
                .route(web::route().to(forward)),
        );
}

/// Start an OAuth flow by redirecting the browser to the provider.
#[actix_web::get("/vcs/oauth/auth", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn authorize(
    context: Context,
    injector: Data<Injector>,
    query: Query<ProviderQuery>,
) -> Result<HttpResponse, Error> {
    let session_id = context.session_id().ok_or(Unauthorized)?;
    let provider = injector.vcs.get(&query.provider)?;
    let state = OAuthState {
        expires_at: OffsetDateTime::now_utc() + OAUTH_STATE_LIFETIME,
        provider: provider.id.clone(),
        session_id: session_id.to_string(),
        state: portal_store::sessions::generate_id(),
    };
    let location = portal_auth::vcs::authorize_url(provider, &state.state)?;
    injector.store.persist(&context, state).await?;
    slog::debug!(
        context.logger, "Started VCS OAuth flow";
        "provider" => &provider.id,
    );
    let response = HttpResponse::Found()
        .insert_header((LOCATION, location))
        .finish();
    Ok(response)
}

/// Complete an OAuth flow and store the issued tokens with the session.
#[actix_web::get("/vcs/oauth/callback", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn callback(
    context: Context,
    injector: Data<Injector>,
    query: Query<CallbackQuery>,
) -> Result<HttpResponse, Error> {
    let query = query.into_inner();
    let session_id = context.session_id().ok_or(Unauthorized)?;

    // States are single use: consume them before checking they are valid.
    let op = ConsumeOAuthState {
        state: query.state,
    };
    let state = injector.store.delete(&context, op).await?;
    let now = OffsetDateTime::now_utc();
    let state = match state {
        Some(state) if state.session_id == session_id && state.is_live(now) => state,
        _ => {
            slog::warn!(context.logger, "Rejected VCS OAuth callback with invalid state");
            return Err(Error::from(InvalidOAuthState));
        }
    };

    let provider = injector.vcs.get(&state.provider)?;
    let secret = provider.client_secret(&injector.cipher)?;
    let tokens = injector
        .clients
        .vcs
        .exchange(&context, provider, &secret, &query.code)
        .await?;
    let vault = Vault::new(&injector.cipher, &injector.store);
    vault
        .persist(&context, session_id, Target::Vcs(&provider.id), &tokens)
        .await?;
    slog::info!(
        context.logger, "Linked VCS provider account";
        "provider" => &provider.id,
    );
    let response = serde_json::json!({
        "provider": provider.id,
        "valid": true,
    });
    Ok(HttpResponse::Ok().json(response))
}

/// List the VCS providers sessions can link to.
#[actix_web::get("/vcs/clients", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn clients(injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let clients: Vec<VcsClientInfo> = injector.vcs.iter().map(VcsClientInfo::from).collect();
    Ok(HttpResponse::Ok().json(clients))
}

/// Report if the session holds a live token for a VCS provider.
#[actix_web::get("/vcs/oauth/verify", wrap = "GuardMiddleware::new(Access::Session)")]
pub async fn verify(
    context: Context,
    injector: Data<Injector>,
    query: Query<ProviderQuery>,
) -> Result<HttpResponse, Error> {
    let session_id = context.session_id().ok_or(Unauthorized)?;
    let provider = injector.vcs.get(&query.provider)?;
    let vault = Vault::new(&injector.cipher, &injector.store);
    let tokens = vault
        .lookup(&context, session_id, Target::Vcs(&provider.id))
        .await?;
    let valid = tokens
        .map(|tokens| tokens.is_live(OffsetDateTime::now_utc()))
        .unwrap_or(false);
    let response = serde_json::json!({
        "provider": provider.id,
        "valid": valid,
    });
    Ok(HttpResponse::Ok().json(response))
}

/// Forward any request to the VCS provider API using the session credentials.
pub async fn forward(
    context: Context,
    injector: Data<Injector>,
    request: HttpRequest,
    path: Path<(String, String)>,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    let (provider, tail) = path.into_inner();
    let forward = super::proxy::forward_request(&request, body, tail, false)?;
    let response = crate::dispatch::vcs(&context, &injector, &provider, forward).await?;
    let response = super::proxy::into_response(response)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::test::call_service;
    use actix_web::test::read_body_json;
    use actix_web::test::TestRequest;
    use time::OffsetDateTime;

    use portal_auth::fixture::VcsOAuthFixture;
    use portal_injector::Injector;
    use portal_models::oauth::OAuthState;

    use crate::api::tests::session_id;
    use crate::api::tests::sso_login;
    use crate::vault::Target;
    use crate::vault::Vault;

    /// Extract the state parameter from an authorize redirect.
    fn redirect_state(location: &str) -> String {
        let url = reqwest::Url::parse(location).unwrap();
        url.query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    #[actix_web::test]
    async fn oauth_flow_links_account() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri("/v1/vcs/oauth/auth?provider=github")
            .cookie(cookie.clone())
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers().get("location").unwrap();
        let location = location.to_str().unwrap();
        assert!(location.starts_with("https://github.com/login/oauth/authorize?"));
        let state = redirect_state(location);

        let request = TestRequest::get()
            .uri(&format!(
                "/v1/vcs/oauth/callback?code={}&state={}",
                VcsOAuthFixture::CODE,
                state
            ))
            .cookie(cookie.clone())
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = TestRequest::get()
            .uri("/v1/vcs/oauth/verify?provider=github")
            .cookie(cookie.clone())
            .to_request();
        let response = call_service(&app, request).await;
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body["valid"], true);
        assert!(body.get("access_token").is_none());

        // States are single use.
        let request = TestRequest::get()
            .uri(&format!(
                "/v1/vcs/oauth/callback?code={}&state={}",
                VcsOAuthFixture::CODE,
                state
            ))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn state_from_another_session_creates_no_credential() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        fixture.clients.sso.add_user("mallory", "password", false);
        let app = crate::api::test_app!(&fixture);
        let alice = sso_login!(&app, "alice");
        let mallory = sso_login!(&app, "mallory");

        let request = TestRequest::get()
            .uri("/v1/vcs/oauth/auth?provider=github")
            .cookie(mallory)
            .to_request();
        let response = call_service(&app, request).await;
        let location = response.headers().get("location").unwrap();
        let state = redirect_state(location.to_str().unwrap());

        let request = TestRequest::get()
            .uri(&format!(
                "/v1/vcs/oauth/callback?code={}&state={}",
                VcsOAuthFixture::CODE,
                state
            ))
            .cookie(alice.clone())
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let vault = Vault::new(&fixture.injector.cipher, &fixture.injector.store);
        let tokens = vault
            .lookup(
                &fixture.injector.context,
                &session_id(&alice),
                Target::Vcs("github"),
            )
            .await
            .unwrap();
        assert!(tokens.is_none());
    }

    #[actix_web::test]
    async fn expired_state_is_rejected() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let state = OAuthState {
            expires_at: OffsetDateTime::now_utc() - time::Duration::seconds(1),
            provider: "github".into(),
            session_id: session_id(&cookie),
            state: "stale-state".into(),
        };
        fixture
            .injector
            .store
            .persist(&fixture.injector.context, state)
            .await
            .unwrap();

        let request = TestRequest::get()
            .uri(&format!(
                "/v1/vcs/oauth/callback?code={}&state=stale-state",
                VcsOAuthFixture::CODE
            ))
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn unknown_provider() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri("/v1/vcs/oauth/auth?provider=gitlab")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn list_clients_hides_secrets() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri("/v1/vcs/clients")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = read_body_json(response).await;
        assert_eq!(body[0]["id"], "github");
        assert!(!body.to_string().contains("github-secret"));
    }

    #[actix_web::test]
    async fn passthrough_requires_linked_account() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri("/v1/vcs/github/user/repos")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(fixture.clients.upstream.requests().is_empty());
    }

    #[actix_web::test]
    async fn passthrough_with_linked_account() {
        let fixture = Injector::fixture();
        fixture.clients.sso.add_user("alice", "password", false);
        let app = crate::api::test_app!(&fixture);
        let cookie = sso_login!(&app, "alice");

        let request = TestRequest::get()
            .uri("/v1/vcs/oauth/auth?provider=github")
            .cookie(cookie.clone())
            .to_request();
        let response = call_service(&app, request).await;
        let location = response.headers().get("location").unwrap();
        let state = redirect_state(location.to_str().unwrap());
        let request = TestRequest::get()
            .uri(&format!(
                "/v1/vcs/oauth/callback?code={}&state={}",
                VcsOAuthFixture::CODE,
                state
            ))
            .cookie(cookie.clone())
            .to_request();
        call_service(&app, request).await;

        let request = TestRequest::get()
            .uri("/v1/vcs/github/user/repos?per_page=10")
            .cookie(cookie)
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let requests = fixture.clients.upstream.requests();
        assert_eq!(
            requests[0].url,
            "https://api.github.com/user/repos?per_page=10"
        );
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            "Bearer github-token"
        );
    }
}
