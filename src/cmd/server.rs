//! Run the Portal Proxy server.
use anyhow::Result;

use portal_conf::Conf;

use super::Cli;
use crate::init::Server;

/// Run the Portal Proxy server until the process is asked to stop.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Server::configure(conf)
        .await?
        .with_http_config(crate::api::configure)
        .run()
        .await
}
