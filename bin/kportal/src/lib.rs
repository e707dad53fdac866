//! Combine individual logical units to initialise and run a kportal process.
use anyhow::Result;
use clap::Parser;

use kportal_conf::Conf;

mod api;
mod cmd;
mod init;

pub use self::cmd::Cli;

/// Initialise the kportal process and invoke a command implementation.
pub async fn execute(cli: Cli, conf: Conf) -> Result<()> {
    match cli.command {
        cmd::Command::Server => cmd::server::run(cli, conf).await,
        cmd::Command::Sync => cmd::sync::run(cli, conf).await,
    }
}

/// Initialise the async runtime for the process and invoke [`execute`].
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let conf = kportal_conf::load(&cli.config)?;
    conf.runtime
        .tokio
        .clone()
        .into_runtime()
        .expect("failed tokio runtime initialisation")
        .block_on(execute(cli, conf))
}
