use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "novelbox")]
#[command(about = "Chapter download scheduler", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler behind the HTTP control API
    Server(ServerArgs),
    /// Print the tasks stored in the ledger
    List(ConfigArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// TOML configuration file (defaults to $NOVELBOX_CONFIG or config/novelbox.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_args() {
        let cli = Cli::parse_from(["novelbox", "server", "--address", "127.0.0.1:9000"]);
        match cli.command {
            Commands::Server(args) => {
                assert_eq!(args.address.unwrap().port(), 9000);
                assert!(args.config.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_list_with_config() {
        let cli = Cli::parse_from(["novelbox", "list", "--config", "custom.toml"]);
        match cli.command {
            Commands::List(args) => assert_eq!(args.config, Some(PathBuf::from("custom.toml"))),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
