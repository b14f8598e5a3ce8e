//! Dependency injection to give request handlers access to process wide resources.
//!
//! All resources are built once during process initialisation and bundled into an
//! [`Injector`] value which is handed to the HTTP server as application data.
//! Cloning the [`Injector`] is cheap: all members are reference counted handles.
use portal_auth::VcsProviders;
use portal_cipher::Cipher;
use portal_conf::Conf;
use portal_context::Context;
use portal_store::Sessions;
use portal_store::Store;

mod clients;

pub use self::clients::Clients;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::clients::ClientsFixture;

/// Container for all process wide dependencies to be injected in other components.
#[derive(Clone)]
pub struct Injector {
    /// Encrypt and decrypt credentials before they reach storage.
    pub cipher: Cipher,

    /// Clients to external services.
    pub clients: Clients,

    /// Process configuration.
    pub conf: Conf,

    /// Root context for operations not scoped to a request.
    pub context: Context,

    /// Browser sessions store.
    pub sessions: Sessions,

    /// Persistent store of clusters and credentials.
    pub store: Store,

    /// VCS providers users can link their sessions to.
    pub vcs: VcsProviders,
}

/// An [`Injector`] backed by fixtures along with handles to control them.
#[cfg(any(test, feature = "test-fixture"))]
#[derive(Clone)]
pub struct InjectorFixture {
    pub clients: ClientsFixture,
    pub injector: Injector,
}

#[cfg(any(test, feature = "test-fixture"))]
impl Injector {
    /// [`Injector`] instance to be used with unit tests.
    pub fn fixture() -> InjectorFixture {
        let cipher = Cipher::fixture();
        let clients = Clients::fixture();
        let conf = Conf::fixture();
        let context = Context::fixture();
        slog::trace!(context.logger, "Initialising Injector fixture");

        let vcs = match VcsProviders::from_conf(&conf.vcs, &cipher) {
            Ok(vcs) => vcs,
            Err(error) => panic!("unable to seal VCS providers fixture: {:?}", error),
        };
        let injector = Injector {
            cipher,
            clients: clients.clients.clone(),
            conf,
            context,
            sessions: Sessions::fixture(),
            store: Store::fixture(),
            vcs,
        };
        InjectorFixture { clients, injector }
    }
}

#[cfg(test)]
mod tests {
    use super::Injector;

    #[test]
    fn fixture_providers() {
        let fixture = Injector::fixture();
        let provider = fixture.injector.vcs.get("github").unwrap();
        let secret = provider.client_secret(&fixture.injector.cipher).unwrap();
        assert_eq!(secret, "github-secret");
    }
}
