//! Schema migrations embedded in the binary.

/// Migrations for the persistent store tables.
pub mod store {
    refinery::embed_migrations!("./migrations/store");
}

/// Migrations for the session store tables.
pub mod sessions {
    refinery::embed_migrations!("./migrations/sessions");
}
