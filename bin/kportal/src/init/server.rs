//! kportal server initialisation as a builder.
use anyhow::Result;

use kportal_auth::AuthenticationFactory;
use kportal_conf::Conf;
use kportal_context::Caller;
use kportal_context::Context;
use kportal_context::ContextBuilder;
use kportal_controlplane::ControlPlaneFactoryArgs;
use kportal_injector::Injector;
use kportal_injector::InjectorServices;
use kportal_registry::RegistryFactoryArgs;

use super::actix::ActixServerRunArgs;
use super::backends::Backends;
use super::generic::GenericInit;

/// Process builder to initialise and run a kportal server.
pub struct Server {
    /// Root context for the process.
    context: ContextBuilder,

    /// Process initialisation logic common to all kportal commands.
    generic: GenericInit,
}

impl Server {
    /// Build a server from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        let context = Context::root(generic.telemetry.logger.clone());
        let server = Self { context, generic };
        Ok(server)
    }

    /// Register all supported backends for all process dependencies.
    ///
    /// Supported dependencies can be tuned at compile time using crate features.
    pub fn register_default_backends(mut self) -> Self {
        self.generic.register_default_backends();
        self
    }

    /// Finalise process initialisation and run the kportal server.
    pub async fn run(mut self) -> Result<()> {
        // Prepare for late process initialisation.
        let context = self.context.build();
        self.generic
            .validate_backends_conf(&context)?
            .register_metrics()?;

        // Initialise dependencies and global injector.
        let injector = injector(&context, &self.generic.conf, &self.generic.backends).await?;
        Injector::set_global(injector);
        // Fetch the injector back out to ensure it is set correctly for the process.
        let injector = Injector::global();

        // Start execution of all process components.
        self.generic.run_server(
            &context,
            ActixServerRunArgs {
                authenticator: injector.authenticator.clone(),
                context: injector.context.clone(),
            },
        )?;
        self.watch_controller(&injector);

        // Run until user-requested exit or process error.
        self.generic.wait().await
    }

    /// Add an HTTP server configuration closure to be applied when the server is started.
    pub fn with_http_config<F>(mut self, config: F) -> Self
    where
        F: Fn(&mut actix_web::web::ServiceConfig) + Send + Sync + 'static,
    {
        self.generic.api.with_config(config);
        self
    }

    /// Run the registry watch controller in the background until the process exits.
    fn watch_controller(&mut self, injector: &Injector) {
        let controller = injector.controller.clone();
        let context = injector.context.derive_with(|context| {
            context
                .authenticated(Caller::System)
                .log_values(slog::o!("component" => "controller"))
        });
        slog::debug!(context.logger, "Starting registry watch controller");
        let handle = tokio::spawn(async move {
            controller
                .supervise(&context, std::future::pending())
                .await
        });
        self.generic.shutdown.watch_tokio(handle);
    }
}

/// Initialise all backends and collect them into an [`Injector`] object.
pub async fn injector(context: &Context, conf: &Conf, backends: &Backends) -> Result<Injector> {
    // Grab all dependencies factories.
    let conf = conf.clone();
    let control_plane = backends.control_plane(&conf.cluster.backend)?;
    let registry = backends.registry(&conf.registry.backend)?;

    // Initialise all dependencies.
    let control_plane = control_plane
        .control_plane(ControlPlaneFactoryArgs {
            conf: &conf.cluster.options,
            context,
        })
        .await?;
    let registry = registry
        .registry(RegistryFactoryArgs {
            conf: &conf.registry.options,
            context,
        })
        .await?;
    let auth = serde_json::to_value(&conf.auth)?;
    let authenticator = kportal_auth::header::TrustedHeaderFactory.authenticator(&auth)?;

    // Combine them into an Injector object.
    let services = InjectorServices {
        authenticator,
        control_plane,
        registry,
    };
    let injector = Injector::build(conf, context.clone(), services);
    Ok(injector)
}
