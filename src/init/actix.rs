//! Generic ActixWeb Server initialisation logic.
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Data;
use actix_web::web::ServiceConfig;
use actix_web::App;
use actix_web::HttpServer;
use anyhow::Result;

use portal_conf::HttpConf;
use portal_context::Context;
use portal_context::ContextMiddleware;
use portal_injector::Injector;

use crate::api::cookie::SessionCookies;
use crate::cleanup::Cleanup;

/// Closure applied to every worker App to register endpoints.
type AppConfig = Arc<dyn Fn(&mut ServiceConfig) + Send + Sync>;

/// Builder pattern to configure and start an ActixWeb Server.
#[derive(Clone)]
pub struct ActixServer {
    configs: Vec<AppConfig>,
    conf: HttpConf,
    grace: Duration,
    metrics: prometheus::Registry,
}

impl ActixServer {
    /// Create an ActixWeb Server configuration builder.
    pub fn new(conf: HttpConf, grace: Duration, metrics: prometheus::Registry) -> Self {
        ActixServer {
            configs: Vec::new(),
            conf,
            grace,
            metrics,
        }
    }

    /// Address the server binds to.
    pub fn bind(&self) -> &str {
        &self.conf.bind
    }

    /// Convert the builder into an [`HttpServer`](actix_web::HttpServer) and run it.
    ///
    /// Signal handling is left to the caller, which stops the server with its handle.
    pub fn run(self, args: ActixServerRunArgs) -> Result<actix_web::dev::Server> {
        // Prepare all components shared by server workers.
        let cleanup = Data::new(args.cleanup);
        let configs = self.configs;
        let context = args.context;
        let conf = self.conf.clone();
        let cookies = Data::new(args.cookies);
        let injector = Data::new(args.injector);
        let metrics = Data::new(self.metrics);

        // Initialise and run actix server.
        let server = HttpServer::new(move || {
            let app = App::new()
                .app_data(cleanup.clone())
                .app_data(cookies.clone())
                .app_data(injector.clone())
                .app_data(metrics.clone())
                .wrap(ContextMiddleware::new(context.clone()))
                .wrap(crate::api::cors(&conf));
            configs
                .iter()
                .fold(app, |app, config| app.configure(|service| config(service)))
        })
        .disable_signals()
        .shutdown_timeout(self.grace.as_secs());
        let server = match self.conf.workers {
            Some(workers) => server.workers(workers),
            None => server,
        };
        let server = server.bind(self.conf.bind.as_str())?;
        Ok(server.run())
    }

    /// Add a server configuration closure to be applied when the server is started.
    pub fn with_config<F>(&mut self, config: F) -> &mut Self
    where
        F: Fn(&mut ServiceConfig) + Send + Sync + 'static,
    {
        self.configs.push(Arc::new(config));
        self
    }
}

/// Collection of server runtime arguments.
pub struct ActixServerRunArgs {
    /// Expired sessions cleanup, nudged by authenticated requests.
    pub cleanup: Cleanup,

    /// Top-level context the server will use to derive request contexts.
    pub context: Context,

    /// Issue and verify session cookies.
    pub cookies: SessionCookies,

    /// Process dependencies handlers have access to.
    pub injector: Injector,
}
