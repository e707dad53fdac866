//! Run the kportal server.
use anyhow::Result;

use kportal_conf::Conf;

use super::Cli;
use crate::init::Server;

/// Run the portal API server and registry watch controller.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Server::configure(conf)
        .await?
        .register_default_backends()
        .with_http_config(crate::api::configure)
        .run()
        .await
}
