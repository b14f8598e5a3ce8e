//! Initialisation logic for Portal Proxy processes.
mod actix;
mod generic;
mod readiness;
mod server;
mod sync;

pub use self::server::Server;
pub use self::sync::Sync;
