//! Initialise or migrate Portal Proxy stores.
use anyhow::Result;

use portal_conf::Conf;

use super::Cli;
use crate::init::Sync;

/// Apply store and session schema migrations, then exit.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Sync::configure(conf).await?.run().await
}
