//! Built-in `kportal` commands.
use clap::Parser;
use clap::Subcommand;

pub mod server;
pub mod sync;

/// Self-service access portal for multi-tenant clusters.
#[derive(Debug, Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the kportal configuration to use.
    #[arg(short = 'c', long = "config", default_value_t = String::from("kportal.yaml"))]
    pub config: String,

    /// Select the kportal command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Select the kportal command to run.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Run the portal API server and registry watch controller.
    #[command(alias = "run")]
    Server,

    /// Synchronise (install or upgrade) the state backends need before the server can run.
    #[command(alias = "sync-dependencies")]
    Sync,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;
    use super::Command;

    #[test]
    fn default_config_path() {
        let cli = Cli::try_parse_from(["kportal", "server"]).unwrap();
        assert_eq!(cli.config, "kportal.yaml");
        assert!(matches!(cli.command, Command::Server));
    }

    #[test]
    fn command_aliases() {
        let cli = Cli::try_parse_from(["kportal", "-c", "dev.yaml", "run"]).unwrap();
        assert_eq!(cli.config, "dev.yaml");
        assert!(matches!(cli.command, Command::Server));
        let cli = Cli::try_parse_from(["kportal", "sync-dependencies"]).unwrap();
        assert!(matches!(cli.command, Command::Sync));
    }
}
