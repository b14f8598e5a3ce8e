//! Persistent and session stores backed by an SQLite database.
//!
//! This backend is intended for small scale, single process, deployments.
//! It trades performance for convenience: easy to use and setup but can be inefficient.
//!
//! ## Shared DB file
//!
//! The persistent store and the session store share the same SQLite database file
//! but each of them opens its own connection to it:
//!
//! - Table names are prefixed with `store_` and `sessions_` to avoid clashes.
//! - Schema migration data is kept in the `refinery_schema_history__store` and
//!   `refinery_schema_history__sessions` tables.
mod factory;
mod schema;
mod statements;
mod telemetry;

pub use self::factory::ConfError;
pub use self::factory::SQLiteFactory;
pub use self::factory::MEMORY_PATH;
