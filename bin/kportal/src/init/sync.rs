//! kportal dependency synchronisation (install or upgrade state).
use anyhow::Result;

use kportal_conf::Conf;
use kportal_context::Context;
use kportal_registry::RegistryFactoryArgs;

use super::generic::GenericInit;

/// Process builder to synchronise the state kportal backends depend on.
pub struct Sync {
    generic: GenericInit,
}

impl Sync {
    /// Build a sync process from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        let sync = Self { generic };
        Ok(sync)
    }

    /// Register all supported backends for all process dependencies.
    pub fn register_default_backends(mut self) -> Self {
        self.generic.register_default_backends();
        self
    }

    /// Synchronise the state of the selected backends and exit.
    pub async fn run(self) -> Result<()> {
        let context = Context::root(self.generic.telemetry.logger.clone()).build();
        self.generic.validate_backends_conf(&context)?;

        slog::info!(context.logger, "Synchronising dependences");
        let conf = &self.generic.conf;
        self.generic
            .backends
            .registry(&conf.registry.backend)?
            .sync(RegistryFactoryArgs {
                conf: &conf.registry.options,
                context: &context,
            })
            .await?;
        slog::info!(context.logger, "Dependences synchronised");
        Ok(())
    }
}
