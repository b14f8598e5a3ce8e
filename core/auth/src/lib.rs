//! Clients to the services that issue tokens on behalf of Portal Proxy users.
//!
//! Three kinds of token issuers are involved in the life of a session:
//!
//! - The SSO [`IdentityProvider`] authenticates users and issues the session tokens.
//! - Each registered cluster exposes an authentication endpoint used by [`ClusterAuth`].
//! - Version control providers issue tokens through OAuth flows driven by [`VcsOAuth`].
//!
//! All issuers are treated as opaque OAuth2 style token endpoints.
//! The wire details of the token exchange live in the private `oauth2` module.
//!
//! Each client is a thin wrapper around a trait object so tests can replace the real
//! HTTP clients with in-memory fakes (see the `fixture` module).
pub mod claims;
pub mod cluster;
pub mod sso;
pub mod vcs;

mod oauth2;

#[cfg(any(test, feature = "test-fixture"))]
pub mod fixture;

pub use self::cluster::ClusterAuth;
pub use self::cluster::ClusterAuthBackend;
pub use self::cluster::HttpClusterAuth;
pub use self::oauth2::TokenError;
pub use self::sso::IdentityProvider;
pub use self::sso::IdentityProviderBackend;
pub use self::sso::UaaIdentityProvider;
pub use self::vcs::HttpVcsOAuth;
pub use self::vcs::VcsClient;
pub use self::vcs::VcsOAuth;
pub use self::vcs::VcsOAuthBackend;
pub use self::vcs::VcsProviders;
