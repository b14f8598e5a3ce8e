//! The [`Context`] is a general purpose immutable container to carry scoped values around.
//!
//! Code executed as part of Portal Proxy processes can access operation scoped values.
//!
//! Contexts are organised into a tree structure:
//!
//! - A root context represents the general process wide scope.
//! - Derived contexts represents a narrower scope within their parent with additional
//!   or updated information attached to them.
//!
//! For example: [`Context`]s provide access to the current [`Logger`].
//! For the root context this is the process-wide logger with no additional attributes.
//! But for individual requests a derived context is provided with a [`Logger`] decorated
//! with the request ID, method and path and, once the session is validated, the user ID.
use std::future::Ready;

use actix_web::dev::Payload;
use actix_web::Error;
use actix_web::FromRequest;
use actix_web::HttpMessage;
use actix_web::HttpRequest;
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

use portal_models::auth::AuthContext;
use portal_models::auth::Identity;

mod middleware;

pub use self::middleware::ContextMiddleware;

/// The [`Context`] is a general purpose container to carry scoped values around.
///
/// Refer to the [crate level docs](crate) for details.
#[derive(Clone, Debug)]
pub struct Context {
    /// Result of the authentication process for the current request.
    ///
    /// The initial value of `None` indicates no session was validated for the request.
    pub auth: Option<AuthContext>,

    /// Logger with contextual attributes attached to it.
    pub logger: Logger,
}

impl Context {
    /// Derive a new [`Context`] by making changes to the current one.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            auth: self.auth.clone(),
            logger: self.logger.clone(),
        }
    }

    /// Derive a new [`Context`] by making changes to the current one using the provided callback.
    pub fn derive_with<F>(&self, callback: F) -> Context
    where
        F: FnOnce(ContextBuilder) -> ContextBuilder,
    {
        let builder = callback(self.derive());
        builder.build()
    }

    /// Identity of the authenticated user, if the request was authenticated.
    pub fn identity(&self) -> Option<&Identity> {
        self.auth.as_ref().map(|auth| &auth.identity)
    }

    /// Initialise a new root context with no values attached.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder { auth: None, logger }
    }

    /// ID of the session the request belongs to, if the request was authenticated.
    pub fn session_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|auth| auth.session_id.as_str())
    }
}

impl FromRequest for Context {
    type Error = Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let context = request
            .extensions()
            .get::<Context>()
            .cloned()
            .ok_or_else(|| {
                actix_web::error::ErrorInternalServerError("request has no context to extract")
            });
        std::future::ready(context)
    }
}

/// A builder for root and derived contexts.
pub struct ContextBuilder {
    auth: Option<AuthContext>,
    logger: Logger,
}

impl ContextBuilder {
    /// Mark the context to be created as authenticated by the given session.
    ///
    /// The logger is decorated with the ID of the authenticated user.
    pub fn authenticated(mut self, auth: AuthContext) -> Self {
        self.logger = self
            .logger
            .new(slog::o!("user_id" => auth.identity.user_id.clone()));
        self.auth = Some(auth);
        self
    }

    /// Finalise the build process and return a new [`Context`].
    pub fn build(self) -> Context {
        Context {
            auth: self.auth,
            logger: self.logger,
        }
    }

    /// Update the [`Context`] logger to attach new log key/pair values.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Create an empty context useful for test.
    pub fn fixture() -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context { auth: None, logger }
    }

    /// Create a context authenticated as the given user, useful for test.
    pub fn fixture_as(session_id: &str, user_id: &str, admin: bool) -> Context {
        let auth = AuthContext {
            identity: Identity {
                admin,
                issuer: None,
                scopes: Vec::new(),
                user_id: user_id.to_string(),
                user_name: user_id.to_string(),
            },
            session_id: session_id.to_string(),
        };
        Context::fixture().derive().authenticated(auth).build()
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;
    use actix_web::FromRequest;
    use actix_web::HttpMessage;

    use portal_models::auth::AuthContext;
    use portal_models::auth::Identity;

    use super::Context;

    fn fixture_auth() -> AuthContext {
        AuthContext {
            identity: Identity {
                admin: false,
                issuer: Some("uaa".into()),
                scopes: vec!["openid".into()],
                user_id: "user-1".into(),
                user_name: "alice".into(),
            },
            session_id: "session-1".into(),
        }
    }

    #[test]
    fn derive_authenticated() {
        let root = Context::fixture();
        let auth = fixture_auth();
        let context = root.derive().authenticated(auth.clone()).build();
        assert_eq!(context.auth, Some(auth));
        assert_eq!(context.session_id(), Some("session-1"));
        assert_eq!(context.identity().unwrap().user_name, "alice");
    }

    #[test]
    fn derive_authenticated_logs_user() {
        let root = Context::fixture();
        let context = root.derive().authenticated(fixture_auth()).build();
        assert_eq!(format!("{:?}", context.logger.list()), "(user_id)");
    }

    #[test]
    fn derive_log_attributes() {
        let root = Context::fixture();
        let parent = root
            .derive()
            .log_values(slog::o!("root" => "value", "test" => "root"))
            .build();
        let context = parent
            .derive()
            .log_values(slog::o!("test" => "override"))
            .build();
        assert_eq!(format!("{:?}", context.logger.list()), "(test, test, root)");
    }

    #[test]
    fn derive_noop() {
        let parent = Context::fixture();
        let context = parent.derive().build();
        assert_eq!(
            format!("{:?}", parent.logger.list()),
            format!("{:?}", context.logger.list()),
        );
    }

    #[actix_web::test]
    async fn extract_context() {
        let context = Context::fixture();
        let request = TestRequest::get().to_http_request();
        request.extensions_mut().insert(context);
        Context::extract(&request).await.unwrap();
    }

    #[actix_web::test]
    async fn extract_missing_context() {
        let request = TestRequest::get().to_http_request();
        let result = Context::extract(&request).await;
        assert!(result.is_err());
    }
}
