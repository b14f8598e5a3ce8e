//! Initialise SQLite Persistent and Session Stores.
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;
use tokio_rusqlite::Connection;

use portal_conf::StoreConf;
use portal_context::Context;
use portal_store::Sessions;
use portal_store::SessionsFactoryArgs;
use portal_store::Store;
use portal_store::StoreFactory;
use portal_store::StoreFactoryArgs;

/// Special path requesting the use of an in-memory store.
pub const MEMORY_PATH: &str = ":memory:";

/// Name of the table to store refinery migration metadata for the persistent store into.
pub const REFINERY_SCHEMA_TABLE_NAME: &str = "refinery_schema_history__store";

/// Name of the table to store refinery migration metadata for the session store into.
pub const REFINERY_SESSIONS_TABLE_NAME: &str = "refinery_schema_history__sessions";

/// The SQLite store configuration is not valid.
#[derive(Debug, thiserror::Error)]
#[error("the SQLite store configuration is not valid: {0}")]
pub struct ConfError(String);

/// Initialise SQLite Persistent and Session Stores.
pub struct SQLiteFactory;

#[async_trait::async_trait]
impl StoreFactory for SQLiteFactory {
    fn conf_check(&self, _: &Context, conf: &StoreConf) -> Result<()> {
        if conf.path.trim().is_empty() {
            anyhow::bail!(ConfError("store.path must not be empty".into()));
        }
        Ok(())
    }

    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()> {
        crate::telemetry::register_metrics(registry)
    }

    async fn sessions<'a>(&self, args: SessionsFactoryArgs<'a>) -> Result<Sessions> {
        let client = create_client(args.context, &args.conf.path).await?;
        if args.conf.path == MEMORY_PATH {
            migrate(&client, MigrationSet::Sessions).await?;
        }
        let sessions = crate::statements::SQLiteSessions::new(client);
        Ok(Sessions::new(sessions, args.ttl))
    }

    async fn store<'a>(&self, args: StoreFactoryArgs<'a>) -> Result<Store> {
        let client = create_client(args.context, &args.conf.path).await?;
        if args.conf.path == MEMORY_PATH {
            migrate(&client, MigrationSet::Store).await?;
        }
        let store = crate::statements::SQLiteStore::new(client);
        Ok(Store::from(store))
    }

    async fn sync<'a>(&self, args: StoreFactoryArgs<'a>) -> Result<()> {
        let client = create_client(args.context, &args.conf.path).await?;
        slog::info!(args.context.logger, "Migrating persistent store schema");
        migrate(&client, MigrationSet::Store).await?;
        slog::info!(args.context.logger, "Migrating session store schema");
        migrate(&client, MigrationSet::Sessions).await?;
        client.close().await?;
        Ok(())
    }
}

/// Groups of schema migrations managed independently.
#[derive(Clone, Copy, Debug)]
pub(crate) enum MigrationSet {
    Sessions,
    Store,
}

/// Run schema migrations on the given connection.
pub(crate) async fn migrate(client: &Connection, set: MigrationSet) -> Result<()> {
    let init_error: Arc<Mutex<Option<refinery::Error>>> = Default::default();
    let init_error_inner = Arc::clone(&init_error);
    client
        .call(move |connection| {
            let result = match set {
                MigrationSet::Sessions => crate::schema::sessions::migrations::runner()
                    .set_migration_table_name(REFINERY_SESSIONS_TABLE_NAME)
                    .run(connection),
                MigrationSet::Store => crate::schema::store::migrations::runner()
                    .set_migration_table_name(REFINERY_SCHEMA_TABLE_NAME)
                    .run(connection),
            };
            if let Err(error) = result {
                init_error_inner
                    .lock()
                    .expect("SQLite migration error lock poisoned")
                    .replace(error);
            }
            Ok(())
        })
        .await?;

    // Extract the migration error, if any.
    let error = init_error
        .lock()
        .expect("SQLite migration error lock poisoned")
        .take();
    if let Some(error) = error {
        return Err(error.into());
    }
    Ok(())
}

/// Create a SQLite DB [`Connection`] to the persistent store.
///
/// The special [`MEMORY_PATH`] constant can be specified to create an in-memory store.
///
/// NOTE:
///   The use of an in-memory store is only intended for tests and experimentation
///   as all data will be lost as soon as the process terminates.
///   Each in-memory connection is its own DB, so in-memory stores are migrated when created.
pub(crate) async fn create_client(context: &Context, path: &str) -> Result<Connection> {
    let connection = if path == MEMORY_PATH {
        slog::warn!(
            context.logger,
            "Using in-memory store means data will be lost once the process terminates"
        );
        Connection::open_in_memory().await
    } else {
        Connection::open(path).await
    };
    let connection = connection?;
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use portal_conf::StoreConf;
    use portal_context::Context;
    use portal_store::StoreFactory;

    use super::SQLiteFactory;

    #[test]
    fn conf_check_rejects_empty_path() {
        let context = Context::fixture();
        let conf = StoreConf {
            path: " ".into(),
            ..Default::default()
        };
        let result = SQLiteFactory.conf_check(&context, &conf);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sync_in_memory() {
        let context = Context::fixture();
        let conf = StoreConf {
            path: super::MEMORY_PATH.into(),
            ..Default::default()
        };
        let args = portal_store::StoreFactoryArgs {
            conf: &conf,
            context: &context,
        };
        SQLiteFactory.sync(args).await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_store_is_migrated() {
        let context = Context::fixture();
        let conf = StoreConf {
            path: super::MEMORY_PATH.into(),
            ..Default::default()
        };
        let args = portal_store::StoreFactoryArgs {
            conf: &conf,
            context: &context,
        };
        let store = SQLiteFactory.store(args).await.unwrap();
        let version = store
            .query(&context, portal_store::query::LookupSchemaVersion)
            .await
            .unwrap();
        assert_eq!(version, Some(1));
    }
}
