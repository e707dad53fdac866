//! Install or upgrade state kportal backends depend on.
use anyhow::Result;

use kportal_conf::Conf;

use super::Cli;
use crate::init::Sync;

/// Synchronise (install or upgrade) the state backends need before the server can run.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Sync::configure(conf)
        .await?
        .register_default_backends()
        .run()
        .await
}
