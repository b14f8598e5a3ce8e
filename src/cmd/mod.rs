//! Built-in `portal-proxy` commands.
use clap::Parser;
use clap::Subcommand;

pub mod server;
pub mod sync;

/// Authenticating gateway between web sessions and backend clusters.
#[derive(Debug, Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the Portal Proxy configuration to use.
    #[arg(short = 'c', long = "config", default_value_t = String::from("portal-proxy.yaml"))]
    pub config: String,

    /// Select the portal-proxy command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Select the portal-proxy command to run.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Run the Portal Proxy server.
    #[command(alias = "run")]
    Server,

    /// Initialise or migrate the store schemas and exit.
    #[command(alias = "migrate")]
    Sync,
}
