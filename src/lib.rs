//! Combine individual logical units to initialise and run a Portal Proxy process.
use anyhow::Context as _;
use anyhow::Result;
use clap::Parser;

use portal_conf::Conf;

pub mod api;
pub mod cleanup;
mod cmd;
pub mod dispatch;
mod init;
pub mod logging;
pub mod registry;
pub mod vault;

pub use self::cmd::Cli;

/// Version of the running proxy.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit the proxy was built from.
pub const GIT_BUILD_HASH: &str = env!("GIT_BUILD_HASH");

/// Initialise the portal-proxy process and invoke a command implementation.
pub async fn execute(cli: Cli, conf: Conf) -> Result<()> {
    match cli.command {
        cmd::Command::Server => cmd::server::run(cli, conf).await,
        cmd::Command::Sync => cmd::sync::run(cli, conf).await,
    }
}

/// Initialise the async runtime for the process and invoke [`execute`].
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let logger = self::logging::starter();
    slog::info!(logger, "Loading configuration"; "path" => &cli.config);
    let conf = portal_conf::load(&cli.config)?;
    conf.runtime
        .clone()
        .into_runtime()
        .context("failed tokio runtime initialisation")?
        .block_on(execute(cli, conf))
}
