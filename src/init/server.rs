//! Portal Proxy Server initialisation as a builder.
use anyhow::Context as _;
use anyhow::Result;

use portal_auth::HttpClusterAuth;
use portal_auth::HttpVcsOAuth;
use portal_auth::UaaIdentityProvider;
use portal_auth::VcsProviders;
use portal_cipher::Cipher;
use portal_clients_upstream::HttpUpstream;
use portal_conf::Conf;
use portal_context::Context;
use portal_injector::Clients;
use portal_injector::Injector;
use portal_store::Sessions;
use portal_store::Store;

use super::actix::ActixServerRunArgs;
use super::generic::GenericInit;
use crate::api::cookie::SessionCookies;
use crate::cleanup::Cleanup;

/// Process builder to initialise and run a Portal Proxy instance.
pub struct Server {
    generic: GenericInit,
}

impl Server {
    /// Build a server from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        Ok(Server { generic })
    }

    /// Finalise process initialisation and run the Portal Proxy server.
    ///
    /// Runs until the process receives SIGINT or SIGTERM, then shuts down in order:
    /// stop the HTTP server, run a final sessions cleanup and close the stores.
    pub async fn run(self) -> Result<()> {
        let context = self.generic.context.clone();
        self.generic.register_metrics()?;

        // Wait for the store and validate the encryption key before any schema change.
        let store = self.generic.wait_for_store().await?;
        let cipher = cipher(&self.generic.conf)?;
        self.generic.sync_stores().await?;
        let sessions = self.generic.sessions().await?;
        let deps = Dependencies {
            cipher,
            sessions,
            store,
        };
        let injector = injector(&context, &self.generic.conf, deps)?;
        let cookies = SessionCookies::new(&self.generic.conf.sessions)?;

        // Start background tasks and the API server.
        let cleanup = Cleanup::new(&injector);
        let cleanup_task = cleanup.clone().schedule(context.clone());
        slog::debug!(context.logger, "Starting API server");
        let bind = self.generic.api.bind().to_string();
        let server = self.generic.api.run(ActixServerRunArgs {
            cleanup,
            context: context.clone(),
            cookies,
            injector: injector.clone(),
        })?;
        let handle = server.handle();
        let mut server = tokio::spawn(server);
        slog::info!(
            context.logger, "API server listening for connection";
            "address" => bind,
        );

        // Run until user-requested exit or server error.
        let served = tokio::select! {
            result = &mut server => result,
            _ = shutdown_signal(&context) => {
                slog::info!(context.logger, "Shutdown requested, stopping API server");
                handle.stop(true).await;
                server.await
            }
        };

        // Release process resources in order.
        slog::info!(context.logger, "Stopping sessions cleanup");
        if let Err(error) = cleanup_task.stop().await {
            slog::warn!(
                context.logger, "Sessions cleanup did not stop cleanly";
                "error" => format!("{:?}", error),
            );
        }
        injector.store.close(&context).await?;
        injector.sessions.close(&context).await?;
        slog::info!(context.logger, "Portal Proxy shutdown complete");

        served
            .context("API server task panicked")?
            .context("API server failed")?;
        Ok(())
    }

    /// Add an HTTP server configuration closure to be applied when the server is started.
    pub fn with_http_config<F>(mut self, config: F) -> Self
    where
        F: Fn(&mut actix_web::web::ServiceConfig) + Send + Sync + 'static,
    {
        self.generic.api.with_config(config);
        self
    }
}

/// Process dependencies initialised before the [`Injector`].
pub struct Dependencies {
    pub cipher: Cipher,
    pub sessions: Sessions,
    pub store: Store,
}

/// Load the credentials encryption key and build the cipher.
pub fn cipher(conf: &Conf) -> Result<Cipher> {
    let key = portal_cipher::load_key(
        conf.encryption.key.as_deref(),
        conf.encryption.key_file().as_deref(),
    )
    .context("unable to load the credentials encryption key")?;
    Cipher::new(&key)
}

/// Initialise all clients and collect them into an [`Injector`] object.
pub fn injector(context: &Context, conf: &Conf, deps: Dependencies) -> Result<Injector> {
    let Dependencies {
        cipher,
        sessions,
        store,
    } = deps;
    let clients = Clients {
        clusters: HttpClusterAuth::new(&conf.clusters)?.into(),
        sso: UaaIdentityProvider::new(&conf.sso)?.into(),
        upstream: HttpUpstream::new(&conf.clusters)?.into(),
        vcs: HttpVcsOAuth::new()?.into(),
    };
    let vcs = VcsProviders::from_conf(&conf.vcs, &cipher)?;
    slog::info!(
        context.logger, "Process dependencies initialised";
        "vcs_providers" => conf.vcs.len(),
    );

    let injector = Injector {
        cipher,
        clients,
        conf: conf.clone(),
        context: context.clone(),
        sessions,
        store,
        vcs,
    };
    Ok(injector)
}

/// Wait for the process to receive SIGINT or SIGTERM.
async fn shutdown_signal(context: &Context) {
    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            slog::error!(
                context.logger, "Unable to listen for SIGINT";
                "error" => format!("{:?}", error),
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::SignalKind;
        match tokio::signal::unix::signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                slog::error!(
                    context.logger, "Unable to listen for SIGTERM";
                    "error" => format!("{:?}", error),
                );
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
}
