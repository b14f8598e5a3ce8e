//! Process initialisation builder for aspects to initialise for all commands.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use portal_conf::Conf;
use portal_context::Context;
use portal_store::Sessions;
use portal_store::SessionsFactoryArgs;
use portal_store::Store;
use portal_store::StoreFactory;
use portal_store::StoreFactoryArgs;
use portal_store_sqlite::SQLiteFactory;

use super::actix::ActixServer;
use super::readiness::wait_until_ready;

/// Process builder to initialise all Portal Proxy commands.
pub struct GenericInit {
    pub api: ActixServer,
    pub conf: Conf,
    pub context: Context,
    pub metrics: prometheus::Registry,
    pub store_factory: Arc<dyn StoreFactory>,
}

impl GenericInit {
    /// Initialise logging and validate the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let logger = crate::logging::configure(&conf.logging);
        let context = Context::root(logger).build();
        slog::info!(
            context.logger, "Process logging initialised";
            "conf" => serde_json::to_string(&conf.redacted())?,
        );

        let store_factory: Arc<dyn StoreFactory> = Arc::new(SQLiteFactory);
        store_factory.conf_check(&context, &conf.store)?;

        let grace = Duration::from_secs(conf.runtime.shutdown_grace_sec);
        let metrics = prometheus::Registry::new();
        let api = ActixServer::new(conf.http.clone(), grace, metrics.clone());
        let generic = GenericInit {
            api,
            conf,
            context,
            metrics,
            store_factory,
        };
        Ok(generic)
    }

    /// Register metrics for the store backend and proxied requests.
    pub fn register_metrics(&self) -> Result<&Self> {
        self.store_factory.register_metrics(&self.metrics)?;
        crate::dispatch::register_metrics(&self.metrics)?;
        Ok(self)
    }

    /// Initialise the Session Store client.
    pub async fn sessions(&self) -> Result<Sessions> {
        let args = SessionsFactoryArgs {
            conf: &self.conf.store,
            context: &self.context,
            ttl: Duration::from_secs(self.conf.sessions.ttl_sec),
        };
        self.store_factory.sessions(args).await
    }

    /// Initialise or migrate the store and session schemas.
    pub async fn sync_stores(&self) -> Result<()> {
        let args = StoreFactoryArgs {
            conf: &self.conf.store,
            context: &self.context,
        };
        self.store_factory.sync(args).await
    }

    /// Wait for the Persistent Store to accept connections and return a client to it.
    ///
    /// Fails if the store is not reachable within the configured readiness timeout.
    pub async fn wait_for_store(&self) -> Result<Store> {
        let conf = &self.conf.store;
        let context = &self.context;
        let factory = &self.store_factory;
        let interval = Duration::from_millis(conf.readiness_interval_ms);
        let timeout = Duration::from_secs(conf.readiness_timeout_sec);
        wait_until_ready(context, "store", interval, timeout, move || async move {
            let store = factory.store(StoreFactoryArgs { conf, context }).await?;
            store.ping(context).await?;
            Ok(store)
        })
        .await
    }
}
