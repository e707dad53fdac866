//! Portal HTTP server initialisation.
//!
//! Every request passes through the [`ContextMiddleware`], which asks the configured
//! [`Authenticator`] for the caller (the session layer identity header) and attaches it
//! to the request [`Context`].
//! There is no request level authoriser: endpoints check the caller against the
//! access evaluator for the operation they perform.
use actix_web::web::ServiceConfig;
use actix_web::HttpServer;
use anyhow::Result;

use replisdk::runtime::actix_web::AppConfigurer;
use replisdk::runtime::actix_web::AppFactory;
use replisdk::runtime::actix_web::ServerConfig;

use kportal_auth::Authenticator;
use kportal_context::Context;

use crate::api::context::ContextMiddleware;

/// Prefix for request metrics names.
const REQUEST_METRICS_PREFIX: &str = "kportal";

/// Collect endpoint configuration and start the portal HTTP server.
#[derive(Clone)]
pub struct ActixServer {
    app: AppConfigurer,
    conf: ServerConfig,
    metrics: prometheus::Registry,
}

impl ActixServer {
    /// Prepare a server for the `http` section of the configuration, recording request metrics.
    pub fn new(conf: ServerConfig, metrics: prometheus::Registry) -> Self {
        ActixServer {
            app: Default::default(),
            conf,
            metrics,
        }
    }

    /// Bind the server and start serving requests as the callers the authenticator identifies.
    pub fn run(self, args: ActixServerRunArgs) -> Result<actix_web::dev::Server> {
        slog::debug!(
            args.context.logger, "Starting portal HTTP server";
            "metrics_prefix" => REQUEST_METRICS_PREFIX,
        );
        let context_middleware = ContextMiddleware::new(args.context, args.authenticator);
        let factory = AppFactory::configure(self.app, self.conf.clone())
            .metrics(REQUEST_METRICS_PREFIX, self.metrics)
            .done();

        let server = HttpServer::new(move || {
            let app = factory.initialise().wrap(context_middleware.clone());
            factory.finalise(app)
        })
        .disable_signals();
        let server = self.conf.apply(server)?;
        Ok(server.run())
    }

    /// Add endpoints, such as the `/api/v0` scope, to the server.
    pub fn with_config<F>(&mut self, config: F) -> &mut Self
    where
        F: Fn(&mut ServiceConfig) + Send + Sync + 'static,
    {
        self.app.with_config(config);
        self
    }
}

/// Dependencies the server needs to build request contexts.
pub struct ActixServerRunArgs {
    /// Identify the caller of each request from the trusted identity header.
    pub authenticator: Authenticator,

    /// Process context request contexts are derived from.
    pub context: Context,
}
