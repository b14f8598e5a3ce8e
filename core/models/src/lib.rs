//! Data models shared by the Portal Proxy crates.
pub mod auth;
pub mod cluster;
pub mod oauth;
pub mod session;
pub mod token;
