//! dirscout - Directory object collector
//!
//! Enumerates the objects of an Azure AD tenant into one JSON-lines file per
//! object type and reports which types were found.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;

use error::CliResult;

/// dirscout - Directory object collector
#[derive(Parser)]
#[command(name = "dirscout")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect with the logged-in Azure CLI account
    Azcli(commands::azcli::AzcliArgs),

    /// Collect as a service principal with a client secret
    Spn(commands::spn::SpnArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dirscout=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Azcli(args) => commands::azcli::execute(args).await,
        Commands::Spn(args) => commands::spn::execute(args).await,
    }
}
