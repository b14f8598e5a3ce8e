//! Container for the clients to external services injected in other components.
use portal_auth::ClusterAuth;
use portal_auth::IdentityProvider;
use portal_auth::VcsOAuth;
use portal_clients_upstream::Upstream;

/// Container for the clients to external services injected in other components.
#[derive(Clone)]
pub struct Clients {
    /// Authentication endpoints of registered clusters.
    pub clusters: ClusterAuth,

    /// SSO identity provider.
    pub sso: IdentityProvider,

    /// Forward proxied requests to clusters and VCS providers.
    pub upstream: Upstream,

    /// OAuth endpoints of VCS providers.
    pub vcs: VcsOAuth,
}

#[cfg(any(test, feature = "test-fixture"))]
impl Clients {
    /// Clients backed by in-memory fixtures, for unit tests.
    pub fn fixture() -> ClientsFixture {
        let clusters = portal_auth::fixture::ClusterAuthFixture::default();
        let sso = portal_auth::fixture::IdentityProviderFixture::default();
        let upstream = portal_clients_upstream::UpstreamFixture::default();
        let clients = Clients {
            clusters: ClusterAuth::from(clusters.clone()),
            sso: IdentityProvider::from(sso.clone()),
            upstream: Upstream::from(upstream.clone()),
            vcs: VcsOAuth::from(portal_auth::fixture::VcsOAuthFixture),
        };
        ClientsFixture {
            clients,
            clusters,
            sso,
            upstream,
        }
    }
}

/// [`Clients`] along with handles to control the fixtures backing them.
#[cfg(any(test, feature = "test-fixture"))]
#[derive(Clone)]
pub struct ClientsFixture {
    pub clients: Clients,
    pub clusters: portal_auth::fixture::ClusterAuthFixture,
    pub sso: portal_auth::fixture::IdentityProviderFixture,
    pub upstream: portal_clients_upstream::UpstreamFixture,
}
