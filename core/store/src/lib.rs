//! Persistent storage interfaces for Portal Proxy.
//!
//! Two independent stores are defined here:
//!
//! - The [`Store`] holds cluster registrations, per-session credentials and OAuth states.
//! - The [`Sessions`] store holds server side records of browser sessions.
//!
//! Both stores are expected to be backed by persistent storage so state survives restarts.
//! Each store uses its own connection to the underlying database.
//!
//! ## An ergonomic interface
//!
//! The [`Store`] interface focuses on high level operations grouped into a small set of
//! methods that accept different data and return different data.
//! This is implemented with a combination of an internal (sealed) `trait` and enums.
//!
//! For example to remove a cluster from the registry:
//!
//! ```ignore
//! use portal_store::delete::UnregisterCluster;
//!
//! let cluster = UnregisterCluster::from("0d2e3b43-6c2b-4bb5-a0a4-6b8f62b7c7bc");
//! store.delete(context, cluster).await?;
//! ```
//!
//! ### Backend implementations
//!
//! Backend implementations receive a wrapping `enum` type for the operation group to implement.
//! Backends must ensure the returned type matches what the requested operation expects.
//! If they fail to do so the [`Store`] interface will panic while converting types.
use std::sync::Arc;

use anyhow::Result;

use portal_conf::StoreConf;
use portal_context::Context;

pub mod delete;
pub mod persist;
pub mod query;
pub mod sessions;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::SessionsFixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::StoreFixture;

#[cfg(test)]
mod tests;

pub use self::sessions::Sessions;
pub use self::sessions::SessionsBackend;

use self::delete::DeleteOp;
use self::delete::DeleteOps;
use self::delete::DeleteResponses;
use self::persist::PersistOp;
use self::persist::PersistOps;
use self::persist::PersistResponses;
use self::query::QueryOp;
use self::query::QueryOps;
use self::query::QueryResponses;

/// Query, persist and manipulate proxy state with a database.
#[derive(Clone)]
pub struct Store {
    /// Runtime configured implementation of the persistent store.
    inner: Arc<dyn StoreBackend>,
}

impl Store {
    /// Close the connection to the persistent store.
    ///
    /// Operations attempted after the store is closed fail.
    pub async fn close(&self, context: &Context) -> Result<()> {
        self.inner.close(context).await
    }

    /// Delete individual records from the persistent store.
    pub async fn delete<O>(&self, context: &Context, op: O) -> Result<O::Response>
    where
        O: DeleteOp,
    {
        let op: DeleteOps = op.into();
        let response = self.inner.delete(context, op).await;
        response.map(O::Response::from)
    }

    /// Check the persistent store is reachable and able to serve requests.
    pub async fn ping(&self, context: &Context) -> Result<()> {
        self.inner.ping(context).await
    }

    /// Query records from the persistent store.
    pub async fn query<O>(&self, context: &Context, op: O) -> Result<O::Response>
    where
        O: QueryOp,
    {
        let op: QueryOps = op.into();
        let response = self.inner.query(context, op).await;
        response.map(O::Response::from)
    }

    /// Persist records into the persistent store.
    pub async fn persist<O>(&self, context: &Context, op: O) -> Result<O::Response>
    where
        O: PersistOp,
    {
        let op: PersistOps = op.into();
        let response = self.inner.persist(context, op).await;
        response.map(O::Response::from)
    }
}

impl<T> From<T> for Store
where
    T: StoreBackend + 'static,
{
    fn from(value: T) -> Self {
        Store {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Store {
    /// Initialise a new store backend fixture for unit tests.
    pub fn fixture() -> Self {
        let inner = StoreFixture::default();
        Self::from(inner)
    }
}

/// Operations implemented by Persistent Stores supported by Portal Proxy.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    /// Close the connection to the persistent store.
    async fn close(&self, context: &Context) -> Result<()>;

    /// Delete individual records from the persistent store.
    async fn delete(&self, context: &Context, op: DeleteOps) -> Result<DeleteResponses>;

    /// Check the persistent store is reachable and able to serve requests.
    async fn ping(&self, context: &Context) -> Result<()>;

    /// Query records from the persistent store.
    async fn query(&self, context: &Context, op: QueryOps) -> Result<QueryResponses>;

    /// Persist records into the persistent store.
    async fn persist(&self, context: &Context, op: PersistOps) -> Result<PersistResponses>;
}

/// Initialisation logic for the stores and the clients to access them.
#[async_trait::async_trait]
pub trait StoreFactory: Send + Sync {
    /// Validate the user provided configuration for the backend.
    fn conf_check(&self, context: &Context, conf: &StoreConf) -> Result<()>;

    /// Register backend specific metrics.
    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()>;

    /// Instantiate a [`Sessions`] object to access browser sessions.
    async fn sessions<'a>(&self, args: SessionsFactoryArgs<'a>) -> Result<Sessions>;

    /// Instantiate a [`Store`] object to access persistent state.
    async fn store<'a>(&self, args: StoreFactoryArgs<'a>) -> Result<Store>;

    /// Synchronise (initialise or migrate) the stores to handle operations.
    async fn sync<'a>(&self, args: StoreFactoryArgs<'a>) -> Result<()>;
}

/// Arguments passed to the [`StoreFactory`] client initialisation methods.
pub struct StoreFactoryArgs<'a> {
    /// The configuration block for the backend to initialise.
    pub conf: &'a StoreConf,

    /// Container for operation scoped values.
    pub context: &'a Context,
}

/// Arguments passed to the [`StoreFactory`] sessions initialisation method.
pub struct SessionsFactoryArgs<'a> {
    /// The configuration block for the backend to initialise.
    pub conf: &'a StoreConf,

    /// Container for operation scoped values.
    pub context: &'a Context,

    /// Time a session can be idle before it expires.
    pub ttl: std::time::Duration,
}
