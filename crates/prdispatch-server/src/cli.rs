use clap::{Parser, Subcommand};

/// prdispatch - GitHub pull requests to builds service jobs
#[derive(Parser, Debug)]
#[command(name = "prdispatchd")]
#[command(version = prdispatch_core::VERSION)]
#[command(about = "prdispatch server daemon", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Listen address, overrides PRDISPATCH_BIND
    #[arg(long, global = true)]
    pub bind: Option<String>,
}

#[derive(Subcommand, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run server in foreground (default if no command given)
    #[default]
    Run,

    /// Apply database migrations and exit
    Migrate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::parse_from(["prdispatchd"]);
        assert_eq!(cli.command.unwrap_or_default(), Commands::Run);
        assert!(cli.bind.is_none());
    }

    #[test]
    fn test_bind_override() {
        let cli = Cli::parse_from(["prdispatchd", "run", "--bind", "127.0.0.1:9000"]);
        assert_eq!(cli.command, Some(Commands::Run));
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:9000"));

        let cli = Cli::parse_from(["prdispatchd", "migrate"]);
        assert_eq!(cli.command, Some(Commands::Migrate));
    }
}
