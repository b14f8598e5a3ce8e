//! Portal Proxy stores synchronisation (initialise or migrate state).
use anyhow::Result;

use portal_conf::Conf;

use super::generic::GenericInit;

/// Process builder to initialise or migrate the stores and exit.
pub struct Sync {
    generic: GenericInit,
}

impl Sync {
    /// Build a sync process from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        Ok(Sync { generic })
    }

    /// Wait for the store to be reachable and apply all schema migrations.
    pub async fn run(self) -> Result<()> {
        let store = self.generic.wait_for_store().await?;
        slog::info!(self.generic.context.logger, "Synchronising stores");
        self.generic.sync_stores().await?;
        store.close(&self.generic.context).await?;
        slog::info!(self.generic.context.logger, "Stores synchronised");
        Ok(())
    }
}
