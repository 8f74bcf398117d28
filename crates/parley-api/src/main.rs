//! Parley CLI and REST API entry point.
//!
//! Binary name: `parley`
//!
//! Loads configuration, sets up tracing, then either checks the setup or
//! starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use tracing::instrument::WithSubscriber;

use cli::{Cli, Commands};
use parley_infra::config::{apply_env_overrides, load_config, Secrets};
use parley_observe::tracing_setup::{bootstrap_dispatch, init_tracing, shutdown_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_subscriber(bootstrap_dispatch())
        .await;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    let mut logging = config.logging.clone();
    if cli.quiet {
        logging.filter = "error".to_string();
    }
    init_tracing(&logging, cli.verbose).map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let secrets = Secrets::from_env();

    let result = match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cli::serve::serve(config, secrets, cli.quiet).await
        }

        Commands::Check { ping } => {
            let ok = cli::check::run_check(&config, secrets, ping, cli.json).await?;
            if !ok {
                shutdown_tracing();
                std::process::exit(1);
            }
            Ok(())
        }
    };

    shutdown_tracing();
    result
}
