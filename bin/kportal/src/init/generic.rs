//! Process initialisation builder for aspects to initialise for all commands.
use std::time::Duration;

use anyhow::Result;

use replisdk::runtime::shutdown::ShutdownManager;
use replisdk::runtime::shutdown::ShutdownManagerBuilder;
use replisdk::runtime::telemetry;
use replisdk::runtime::telemetry::Telemetry;
use replisdk::runtime::telemetry::TelemetryConfig;
use replisdk::runtime::telemetry::TelemetryOptions;

use kportal_auth::AuthenticationFactory;
use kportal_conf::Conf;
use kportal_context::Context;

use super::actix::ActixServer;
use super::actix::ActixServerRunArgs;
use super::backends::Backends;

/// Process builder to initialise all kportal commands.
pub struct GenericInit {
    pub api: ActixServer,
    pub backends: Backends,
    pub conf: Conf,
    pub shutdown: ShutdownManagerBuilder<()>,
    pub telemetry: Telemetry,
}

impl GenericInit {
    /// Build a process from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let telemetry = telemetry(conf.telemetry.clone()).await?;
        let api = ActixServer::new(conf.http.clone(), telemetry.metrics.clone());
        let shutdown = shutdown_manager(telemetry.logger.clone(), &conf);
        let init = Self {
            api,
            backends: Default::default(),
            conf,
            shutdown,
            telemetry,
        };
        Ok(init)
    }

    /// Register all supported backends for all process dependencies.
    ///
    /// Supported dependencies can be tuned at compile time using crate features.
    pub fn register_default_backends(&mut self) -> &mut Self {
        self.backends
            .register_control_plane(
                "memory",
                kportal_controlplane::memory::MemoryControlPlaneFactory,
            )
            .register_registry("memory", kportal_registry::memory::MemoryRegistryFactory);

        #[cfg(feature = "kubernetes")]
        self.backends
            .register_control_plane("kubernetes", kportal_kube::KubeControlPlaneFactory)
            .register_registry("kubernetes", kportal_kube::KubeRegistryFactory);
        self
    }

    /// Register metrics for all process components and selected backends.
    pub fn register_metrics(&self) -> Result<&Self> {
        let metrics = &self.telemetry.metrics;
        self.backends
            .control_plane(&self.conf.cluster.backend)?
            .register_metrics(metrics)?;
        self.backends
            .registry(&self.conf.registry.backend)?
            .register_metrics(metrics)?;
        kportal_access::register_metrics(metrics)?;
        kportal_bindings::register_metrics(metrics)?;
        kportal_controller::register_metrics(metrics)?;
        kportal_controlplane::register_metrics(metrics)?;
        kportal_registry::register_metrics(metrics)?;
        Ok(self)
    }

    // Configure and run the API server.
    pub fn run_server(
        &mut self,
        context: &Context,
        server_args: ActixServerRunArgs,
    ) -> Result<&mut Self> {
        slog::debug!(context.logger, "Starting API server");
        let server = self.api.clone().run(server_args)?;
        self.shutdown.watch_actix(server, ());
        slog::info!(
            context.logger, "API server listening for connection";
            "address" => &self.conf.http.bind,
        );
        Ok(self)
    }

    /// Validate the loaded configuration objects for the selected backends.
    pub fn validate_backends_conf(&self, context: &Context) -> Result<&Self> {
        self.backends
            .control_plane(&self.conf.cluster.backend)?
            .conf_check(context, &self.conf.cluster.options)?;
        self.backends
            .registry(&self.conf.registry.backend)?
            .conf_check(context, &self.conf.registry.options)?;
        let auth = serde_json::to_value(&self.conf.auth)?;
        kportal_auth::header::TrustedHeaderFactory.conf_check(context, &auth)?;
        Ok(self)
    }

    /// Initialisation done, wait until the process fails or the user shuts it down.
    pub async fn wait(self) -> Result<()> {
        slog::info!(
            self.telemetry.logger,
            "kportal process initialisation complete"
        );
        let exit = self.shutdown.build();
        exit.wait().await
    }
}

/// Initialise process shutdown manager.
pub fn shutdown_manager(logger: slog::Logger, conf: &Conf) -> ShutdownManagerBuilder<()> {
    let grace = Duration::from_secs(conf.runtime.shutdown_grace_sec);
    let mut shutdown = ShutdownManager::builder();
    shutdown
        .logger(logger)
        .graceful_shutdown_timeout(grace)
        .watch_signal_with_default();
    shutdown
}

/// Initialise process telemetry.
pub async fn telemetry(conf: TelemetryConfig) -> Result<Telemetry> {
    let telemetry_options = TelemetryOptions::for_sentry_release(super::RELEASE_ID)
        .for_app(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .finish();
    let telemetry = telemetry::initialise(conf, telemetry_options).await?;
    slog::info!(telemetry.logger, "Process telemetry initialised");
    Ok(telemetry)
}
